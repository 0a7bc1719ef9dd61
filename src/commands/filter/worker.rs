use crate::{
    constants::{MIN_GENOTYPE_COLUMNS, MISSING_VALUE, NOCALL, SPANNING_DELETION_ALLELE},
    core::{
        genotype::{correct_genotype, CallOutcome, FormatLayout},
        record::VariantRecord,
    },
    error::VcfCleanError,
    utils::util::Result,
};
use crossbeam_channel::Sender;
use std::thread;

use super::{
    metrics::PipelineQueueMetrics,
    store::ArtifactStore,
    types::{Batch, BatchArtifact, BatchSummary, FilterContext, SequencerEvent},
};

/// The last kept record, held back until the next data line has been seen.
struct HeldRecord {
    record: VariantRecord,
    line_number: u64,
}

fn check_column_count(line: &str, line_number: u64, expected: usize) -> Result<()> {
    let n_columns = line.split('\t').count();
    if n_columns < MIN_GENOTYPE_COLUMNS {
        return Err(VcfCleanError::malformed(
            line_number,
            format!(
                "expected at least {MIN_GENOTYPE_COLUMNS} columns (FORMAT and one sample), found {n_columns}"
            ),
        ));
    }
    if n_columns != expected {
        return Err(VcfCleanError::malformed(
            line_number,
            format!("header declares {expected} columns, found {n_columns}"),
        ));
    }
    Ok(())
}

fn has_missing_genotype(values: &[String], layout: &FormatLayout) -> bool {
    values.get(layout.gt).map_or(true, |gt| {
        gt.split(['/', '|'])
            .any(|allele| allele.is_empty() || allele == MISSING_VALUE)
    })
}

/// Applies the genotype filter to every sample and rewrites the record into
/// its output shape; `None` when no sample keeps it alive.
fn filter_record(
    mut record: VariantRecord,
    line_number: u64,
    ctx: &FilterContext,
    summary: &mut BatchSummary,
) -> Result<Option<VariantRecord>> {
    let layout = FormatLayout::from_keys(&record.format_keys)
        .map_err(|e| VcfCleanError::malformed(line_number, e.to_string()))?;
    let n_alleles = record.alt_count() + 1;
    let spanning_deletion = record.alt == SPANNING_DELETION_ALLELE;

    let mut keep = false;
    let mut samples = Vec::with_capacity(record.samples.len());
    for (index, values) in record.samples.iter().enumerate() {
        if ctx.excluded.get(index).copied().unwrap_or(false) {
            samples.push(vec![NOCALL.to_string()]);
            continue;
        }
        let corrected = correct_genotype(
            values,
            &layout,
            n_alleles,
            spanning_deletion,
            &ctx.params,
            ctx.sample_name(index),
        )?;
        match corrected.outcome {
            CallOutcome::NoCall if !has_missing_genotype(values, &layout) => {
                summary.calls_nulled += 1
            }
            CallOutcome::ToHomVar => summary.calls_to_hom_var += 1,
            CallOutcome::ToHet => summary.calls_to_het += 1,
            _ => {}
        }
        keep |= corrected.is_non_reference() || (ctx.keep_hom_ref && !corrected.is_nocall());
        samples.push(corrected.render(values, &layout));
    }

    if !keep {
        summary.records_without_variant += 1;
        return Ok(None);
    }

    let block_end = if record.is_block() {
        record.end(line_number)?
    } else {
        None
    };
    record.qual = MISSING_VALUE.to_string();
    record.filter = MISSING_VALUE.to_string();
    record.info.clear();
    if let Some(end) = block_end {
        record.set_info("END", Some(end.to_string()));
    }
    record.format_keys = layout.output_keys(&record.format_keys);
    record.samples = samples;
    Ok(Some(record))
}

/// Settles the held record against the next data line: a reference-only
/// line at the same position is dropped, a block ending where the next line
/// starts is shortened by one base.
fn settle_held(
    held: HeldRecord,
    next: &VariantRecord,
    next_line_number: u64,
    summary: &mut BatchSummary,
) -> Result<Option<VariantRecord>> {
    let HeldRecord {
        mut record,
        line_number,
    } = held;
    if record.chrom != next.chrom {
        return Ok(Some(record));
    }
    if record.pos == next.pos && record.is_reference_only() {
        summary.reference_lines_superseded += 1;
        return Ok(None);
    }
    if !record.is_block() {
        return Ok(Some(record));
    }
    let Some(end) = record.end(line_number)? else {
        return Ok(Some(record));
    };
    if next.is_block() && next.pos < end {
        return Err(VcfCleanError::malformed(
            next_line_number,
            format!(
                "non-variant block at {}:{} overlaps the block at {}:{}-{}",
                next.chrom, next.pos, record.chrom, record.pos, end
            ),
        ));
    }
    if end == next.pos && end > record.pos {
        record.set_info("END", Some((end - 1).to_string()));
        summary.block_ends_trimmed += 1;
    }
    Ok(Some(record))
}

fn push_record(text: &mut String, records: &mut u64, record: &VariantRecord) {
    text.push_str(&record.to_string());
    text.push('\n');
    *records += 1;
}

/// Filters one batch independently of every other batch.
pub fn process_batch(batch: Batch, ctx: &FilterContext) -> Result<BatchArtifact> {
    let mut summary = BatchSummary::default();
    let mut text = String::new();
    let mut records = 0;
    let mut held: Option<HeldRecord> = None;

    for (line_number, line) in batch.lines {
        summary.records_in += 1;
        check_column_count(&line, line_number, ctx.n_columns)?;
        let record = VariantRecord::parse(&line, line_number)?;

        if let Some(previous) = held.take() {
            if let Some(settled) = settle_held(previous, &record, line_number, &mut summary)? {
                push_record(&mut text, &mut records, &settled);
            }
        }

        if let Some(kept) = filter_record(record, line_number, ctx, &mut summary)? {
            held = Some(HeldRecord {
                record: kept,
                line_number,
            });
        }
    }
    if let Some(last) = held {
        push_record(&mut text, &mut records, &last.record);
    }

    summary.records_kept = records;
    Ok(BatchArtifact {
        number: batch.number,
        text,
        records,
        summary,
    })
}

/// Worker entry point: process, stash the artifact, notify the sequencer.
pub fn process_batch_job(
    batch: Batch,
    ctx: &FilterContext,
    store: &ArtifactStore,
    sender: &Sender<SequencerEvent>,
    queue_metrics: &PipelineQueueMetrics,
) -> Result<()> {
    queue_metrics.batches.decrement();
    let current_thread = thread::current();
    let worker_name = current_thread.name().unwrap_or("unnamed");
    let number = batch.number;
    log::debug!(
        "Worker [{worker_name}]: Processing batch {number} ({} lines)",
        batch.lines.len()
    );

    let stored = match process_batch(batch, ctx).and_then(|artifact| store.stash(artifact)) {
        Ok(stored) => stored,
        Err(error) => {
            log::error!("Worker [{worker_name}]: Batch {number} failed: {error}");
            let _ = sender.send(SequencerEvent::WorkerFailed(number));
            return Err(error);
        }
    };

    log::debug!("Worker [{worker_name}]: Batch {number} complete");
    queue_metrics.artifacts.increment();
    if let Err(error) = sender.send(SequencerEvent::Completed(stored)) {
        queue_metrics.artifacts.decrement();
        log::error!("Worker [{worker_name}]: Failed to send batch {number} to sequencer: {error}");
        return Err(crate::vcfclean_error!(
            "Failed to send batch {number} to sequencer: {error}"
        ));
    }
    Ok(())
}
