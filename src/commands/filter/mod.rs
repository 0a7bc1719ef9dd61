use crate::{
    cli::FilterArgs,
    constants::AF_FORMAT_HEADER,
    core::header::VcfHeader,
    io::{vcf_reader::VcfReader, vcf_writer::VcfWriter},
    utils::util::{format_number_with_commas, Result},
};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use rayon::{prelude::*, ThreadPoolBuilder};
use std::{sync::Arc, thread};

mod metrics;
mod sequencer;
mod shutdown;
mod splitter;
mod store;
mod types;
mod worker;

pub use types::{Batch, BatchArtifact, BatchSummary, FilterContext};

use metrics::{compute_in_flight_capacity, PipelineQueueMetrics};
use sequencer::run_sequencer;
use shutdown::finalize_filter_threads;
use splitter::BatchSplitter;
use store::ArtifactStore;
use types::SequencerEvent;
use worker::process_batch_job;

#[cfg(test)]
mod tests;

/// Fails unless the header declares the FORMAT fields genotype filtering reads.
pub fn check_genotype_header(header: &VcfHeader) -> Result<()> {
    header.require_format("GT")?;
    header.require_any_format(&["GQ", "GQX"])?;
    header.require_any_format(&["DP", "DPI", "AD"])?;
    Ok(())
}

fn build_exclusion_mask(header: &VcfHeader, excluded: &[String]) -> Vec<bool> {
    let mut mask = vec![false; header.samples.len()];
    for name in excluded {
        match header.sample_index(name) {
            Some(index) => mask[index] = true,
            None => log::warn!("Excluded sample {name} is not in the input, ignoring"),
        }
    }
    mask
}

fn dispatch_batches<I>(
    splitter: BatchSplitter<I>,
    batch_sender: Sender<Batch>,
    ticket_sender: Sender<()>,
    event_sender: Sender<SequencerEvent>,
    store: &ArtifactStore,
    queue_metrics: &PipelineQueueMetrics,
) -> Result<u64>
where
    I: Iterator<Item = Result<(u64, String)>>,
{
    log::debug!("Dispatcher started.");
    let mut last_batch = None;
    for batch in splitter {
        let batch = batch?;
        let number = batch.number;
        if ticket_sender.send(()).is_err() {
            return Err(crate::vcfclean_error!(
                "Sequencer stopped before batch {number} could be dispatched"
            ));
        }
        log::debug!(
            "Dispatcher: Sending batch {number} ({} lines)",
            batch.lines.len()
        );
        queue_metrics.batches.increment();
        if batch_sender.send(batch).is_err() {
            queue_metrics.batches.decrement();
            return Err(crate::vcfclean_error!(
                "Worker pool stopped before batch {number} could be dispatched"
            ));
        }
        last_batch = Some(number);
    }

    store.record_last_batch(last_batch)?;
    if event_sender.send(SequencerEvent::LastBatch(last_batch)).is_err() {
        return Err(crate::vcfclean_error!(
            "Sequencer stopped before the end of input"
        ));
    }
    let dispatched = last_batch.map_or(0, |last| last + 1);
    log::debug!("Dispatcher finished after {dispatched} batch(es).");
    Ok(dispatched)
}

pub fn filter(args: FilterArgs) -> Result<()> {
    let params = args.filter_args.params()?;
    if let Some(dir) = args.scratch_dir.as_ref() {
        if dir.exists() {
            return Err(crate::error::VcfCleanError::ScratchDirExists { path: dir.clone() });
        }
    }

    let reader = VcfReader::from_path(&args.input)?;
    check_genotype_header(&reader.header)?;

    let excluded = build_exclusion_mask(&reader.header, &args.exclude_samples);
    let ctx = Arc::new(FilterContext {
        params,
        samples: reader.header.samples.clone(),
        excluded,
        keep_hom_ref: args.keep_hom_ref,
        n_columns: reader.header.n_columns(),
    });

    let mut out_header = reader.header.clone();
    out_header.upsert_structured_line("FORMAT", AF_FORMAT_HEADER);
    if !args.no_version {
        out_header.add_version_info();
    }

    let store = Arc::new(match args.scratch_dir.as_ref() {
        Some(dir) => ArtifactStore::scratch(dir)?,
        None => ArtifactStore::InMemory,
    });

    let in_flight_capacity = compute_in_flight_capacity(args.num_threads);
    log::debug!("At most {in_flight_capacity} batches in flight");
    let queue_metrics = Arc::new(PipelineQueueMetrics::default());

    let (batch_sender, batch_receiver): (Sender<Batch>, Receiver<Batch>) = unbounded();
    let (event_sender, event_receiver): (Sender<SequencerEvent>, Receiver<SequencerEvent>) =
        unbounded();
    let (ticket_sender, ticket_receiver): (Sender<()>, Receiver<()>) = bounded(in_flight_capacity);

    let store_sequencer = Arc::clone(&store);
    let queue_metrics_sequencer = Arc::clone(&queue_metrics);
    let output = args.output.clone();
    let sequencer_thread = thread::spawn(move || -> Result<sequencer::SequencerReport> {
        let mut writer = VcfWriter::new(&out_header, output.as_deref())?;
        let report = run_sequencer(
            &mut writer,
            &store_sequencer,
            event_receiver,
            ticket_receiver,
            &queue_metrics_sequencer,
        )?;
        writer.finish()?;
        Ok(report)
    });

    log::debug!(
        "Initializing filter thread pool with {} threads...",
        args.num_threads
    );
    let pool = ThreadPoolBuilder::new()
        .num_threads(args.num_threads)
        .thread_name(|i| format!("vcfclean-filter-{i}"))
        .build()
        .map_err(|e| crate::vcfclean_error!("Failed to initialize filter thread pool: {e}"))?;

    let store_workers = Arc::clone(&store);
    let queue_metrics_workers = Arc::clone(&queue_metrics);
    let event_sender_workers = event_sender.clone();
    let pool_thread = thread::spawn(move || -> Result<()> {
        pool.install(|| {
            batch_receiver.into_iter().par_bridge().try_for_each_with(
                (
                    event_sender_workers,
                    ctx,
                    store_workers,
                    queue_metrics_workers,
                ),
                |state, batch| process_batch_job(batch, &state.1, &state.2, &state.0, &state.3),
            )
        })
    });

    let splitter = BatchSplitter::new(reader.lines(), args.batch_size);
    let dispatch_result = dispatch_batches(
        splitter,
        batch_sender,
        ticket_sender,
        event_sender,
        &store,
        &queue_metrics,
    );

    let (dispatched, report) =
        finalize_filter_threads(dispatch_result, pool_thread, sequencer_thread)?;
    store.finish()?;

    let queue_snapshot = queue_metrics.snapshot();
    log::debug!(
        "Pipeline queue peak depth: batches={} artifacts={}",
        queue_snapshot.batches.peak,
        queue_snapshot.artifacts.peak
    );

    let summary = report.summary;
    log::info!(
        "Filtered {} records in {} batches: kept {}, without variant calls {}, superseded reference lines {}",
        format_number_with_commas(summary.records_in),
        dispatched,
        format_number_with_commas(report.records_written),
        format_number_with_commas(summary.records_without_variant),
        format_number_with_commas(summary.reference_lines_superseded)
    );
    log::info!(
        "Genotype corrections: nulled {}, to homozygous variant {}, to heterozygous {}, block ends trimmed {}",
        format_number_with_commas(summary.calls_nulled),
        format_number_with_commas(summary.calls_to_hom_var),
        format_number_with_commas(summary.calls_to_het),
        format_number_with_commas(summary.block_ends_trimmed)
    );
    Ok(())
}
