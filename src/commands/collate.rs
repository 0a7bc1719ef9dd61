use crate::{
    cli::CollateArgs,
    core::{
        header::{structured_line_id, VcfHeader},
        merge_join::{merge_sorted_into_sink, Side},
        record::{locus_key_of_line, VariantRecord},
        sample_remap::SampleRemap,
    },
    io::{vcf_reader::VcfReader, vcf_writer::VcfWriter},
    utils::util::{format_number_with_commas, Result},
};

/// Primary header plus every secondary FORMAT declaration the primary lacks.
pub fn create_collated_header(
    primary: &VcfHeader,
    secondary: &VcfHeader,
    add_version: bool,
) -> VcfHeader {
    let mut header = primary.clone();
    for line in &secondary.meta {
        if let Some(id) = structured_line_id(line, "FORMAT") {
            if !header.declares_format(id) {
                log::debug!("Adding FORMAT/{id} declaration from the secondary input");
                header.meta.push(line.clone());
            }
        }
    }
    if add_version {
        header.add_version_info();
    }
    header
}

/// Rewrites a secondary line into the primary sample layout.
fn remap_line(remap: &SampleRemap, line: &str, line_number: u64) -> Result<String> {
    let mut record = VariantRecord::parse(line, line_number)?;
    remap.apply(&mut record);
    Ok(record.to_string())
}

pub fn collate(args: CollateArgs) -> Result<()> {
    let primary = VcfReader::from_path(&args.primary)?;
    let secondary = VcfReader::from_path(&args.secondary)?;

    let remap = SampleRemap::new(&primary.header.samples, &secondary.header.samples);
    if !remap.dropped_samples().is_empty() {
        log::warn!(
            "Dropping {} secondary sample(s) absent from the primary input: {}",
            remap.dropped_samples().len(),
            remap.dropped_samples().join(", ")
        );
    }
    if remap.missing_count() > 0 {
        log::info!(
            "{} primary sample(s) absent from the secondary input are set to no-call",
            remap.missing_count()
        );
    }
    let identity = remap.is_identity(secondary.header.samples.len());

    let header = create_collated_header(&primary.header, &secondary.header, !args.no_version);
    let mut writer = VcfWriter::new(&header, args.output.as_deref())?;

    let secondary_lines = secondary.lines().map(move |next| {
        let (line_number, line) = next?;
        if identity {
            Ok((line_number, line))
        } else {
            Ok((line_number, remap_line(&remap, &line, line_number)?))
        }
    });

    let counts = merge_sorted_into_sink(
        primary.lines(),
        secondary_lines,
        |(line_number, line): &(u64, String)| locus_key_of_line(line, *line_number),
        |side, (_, line)| {
            if side == Side::Secondary {
                log::trace!("Collating secondary record: {line}");
            }
            writer.write_line(&line)
        },
    )?;
    let written = writer.finish()?;

    log::info!(
        "Collated {} primary and {} secondary records ({} written)",
        format_number_with_commas(counts.primary),
        format_number_with_commas(counts.secondary),
        format_number_with_commas(written)
    );
    Ok(())
}
