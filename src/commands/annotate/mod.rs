use crate::{
    annotation::{
        cache::AnnotationCache,
        tool::{Annotator, CommandAnnotator},
    },
    cli::AnnotateArgs,
    core::{
        merge_join::merge_sorted_into_sink,
        record::{locus_key_of_line, VariantRecord},
    },
    error::VcfCleanError,
    io::{vcf_reader::VcfReader, vcf_writer::VcfWriter},
    utils::util::{format_number_with_commas, Result},
};
use std::{collections::HashMap, io::BufRead, path::Path};


#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AnnotationSummary {
    pub records_written: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub tool_records: u64,
    pub tool_runs: u64,
}

/// Signatures sent to the tool and not yet seen in its output, with their input line.
type Outstanding = HashMap<String, u64>;

/// Routes cache hits, already annotated, to `cached_path` and misses, untouched, to `misses_path`.
fn partition_records<R: BufRead>(
    reader: VcfReader<R>,
    cache: &AnnotationCache,
    info_key: &str,
    cached_path: &Path,
    misses_path: &Path,
    summary: &mut AnnotationSummary,
) -> Result<Outstanding> {
    let header = reader.header.clone();
    let mut cached_writer = VcfWriter::new(&header, Some(cached_path))?;
    let mut misses_writer = VcfWriter::new(&header, Some(misses_path))?;
    let mut outstanding = Outstanding::new();

    for next in reader.lines() {
        let (line_number, line) = next?;
        let mut record = VariantRecord::parse(&line, line_number)?;
        let signature = record.signature();
        match cache.lookup(&signature) {
            Some(payload) => {
                if !payload.is_empty() {
                    record.set_info(info_key, Some(payload.to_string()));
                }
                cached_writer.write_line(&record.to_string())?;
                summary.cache_hits += 1;
            }
            None => {
                misses_writer.write_line(&line)?;
                outstanding.entry(signature).or_insert(line_number);
                summary.cache_misses += 1;
            }
        }
    }
    cached_writer.finish()?;
    misses_writer.finish()?;
    Ok(outstanding)
}

fn first_outstanding(outstanding: &Outstanding) -> Option<String> {
    outstanding
        .iter()
        .min_by_key(|(_, line_number)| **line_number)
        .map(|(signature, _)| signature.clone())
}

/// Annotates the input through the cache, invoking `annotator` only for cache misses.
pub fn run_annotation(
    args: &AnnotateArgs,
    annotator: &mut dyn Annotator,
) -> Result<AnnotationSummary> {
    let mut cache = AnnotationCache::load(&args.cache, args.expected_schema.as_deref())?;
    let reader = VcfReader::from_path(&args.input)?;
    let mut header = reader.header.clone();
    let info_key = args.info_key.as_str();

    let workdir = tempfile::Builder::new()
        .prefix("vcfclean-annotate-")
        .tempdir()?;
    let cached_path = workdir.path().join("cached.vcf");
    let misses_path = workdir.path().join("misses.vcf");
    let annotated_path = workdir.path().join("annotated.vcf");

    let mut summary = AnnotationSummary::default();
    let mut outstanding = partition_records(
        reader,
        &cache,
        info_key,
        &cached_path,
        &misses_path,
        &mut summary,
    )?;
    log::info!(
        "Annotation cache: {} hits, {} misses",
        format_number_with_commas(summary.cache_hits),
        format_number_with_commas(summary.cache_misses)
    );

    let tool_reader = if summary.cache_misses == 0 {
        log::info!(
            "All records found in the annotation cache, {} not invoked",
            annotator.name()
        );
        None
    } else {
        annotator.annotate(&misses_path, &annotated_path)?;
        summary.tool_runs += 1;
        let tool_reader = VcfReader::from_path(&annotated_path)?;
        let schema = tool_reader
            .header
            .structured_line("INFO", info_key)
            .ok_or_else(|| {
                crate::vcfclean_error!(
                    "Output of {} does not declare INFO/{info_key}",
                    annotator.name()
                )
            })?;
        cache.check_schema(schema)?;
        Some(tool_reader)
    };

    if let Some(schema) = cache.schema() {
        header.upsert_structured_line("INFO", schema);
    }
    if !args.no_version {
        header.add_version_info();
    }
    let mut writer = VcfWriter::new(&header, args.output.as_deref())?;

    let cached_lines = VcfReader::from_path(&cached_path)?.lines();
    let tool_lines = tool_reader
        .map(VcfReader::lines)
        .into_iter()
        .flatten()
        .map(|next| {
            let (line_number, line) = next?;
            let record = VariantRecord::parse(&line, line_number)?;
            let signature = record.signature();
            if outstanding.remove(&signature).is_none() {
                log::debug!("Annotation output contains unrequested variant {signature}");
            }
            let payload = record.info_value(info_key).unwrap_or_default().to_string();
            cache.store(signature, payload);
            Ok((line_number, line))
        });

    let counts = merge_sorted_into_sink(
        cached_lines,
        tool_lines,
        |(line_number, line): &(u64, String)| locus_key_of_line(line, *line_number),
        |_, (_, line)| writer.write_line(&line),
    )?;
    summary.records_written = writer.finish()?;
    summary.tool_records = counts.secondary;

    cache.persist()?;
    log::debug!(
        "Annotation cache holds {} entries ({} new)",
        format_number_with_commas(cache.len()),
        format_number_with_commas(cache.added())
    );

    if let Some(first) = first_outstanding(&outstanding) {
        return Err(VcfCleanError::IncompleteAnnotation {
            outstanding: outstanding.len(),
            first,
        });
    }
    Ok(summary)
}

pub fn annotate(args: AnnotateArgs) -> Result<()> {
    let mut annotator = CommandAnnotator::new(args.tool.clone(), args.tool_args.clone());
    let summary = run_annotation(&args, &mut annotator)?;
    log::info!(
        "Wrote {} records ({} from cache, {} from {})",
        format_number_with_commas(summary.records_written),
        format_number_with_commas(summary.cache_hits),
        format_number_with_commas(summary.tool_records),
        args.tool
    );
    Ok(())
}
