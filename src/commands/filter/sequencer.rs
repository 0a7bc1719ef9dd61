use crate::{error::VcfCleanError, io::vcf_writer::VcfWriter, utils::util::Result};
use crossbeam_channel::Receiver;
use std::collections::BTreeMap;

use super::{
    metrics::PipelineQueueMetrics,
    store::{ArtifactStore, StoredArtifact},
    types::{BatchSummary, SequencerEvent},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SequencerReport {
    pub batches: u64,
    pub records_written: u64,
    pub summary: BatchSummary,
}

/// Writes batch artifacts strictly in batch order.
///
/// Artifacts arriving ahead of their turn wait in a reorder buffer. Every
/// written batch hands one ticket back to the dispatcher. Returns once the
/// batch named by the last-batch event has been written, or fails with
/// [`VcfCleanError::IncompleteRun`] when the producers go away first.
pub fn run_sequencer(
    writer: &mut VcfWriter,
    store: &ArtifactStore,
    events: Receiver<SequencerEvent>,
    tickets: Receiver<()>,
    queue_metrics: &PipelineQueueMetrics,
) -> Result<SequencerReport> {
    let mut report = SequencerReport::default();
    let mut waiting: BTreeMap<u64, StoredArtifact> = BTreeMap::new();
    let mut next_batch: u64 = 0;
    let mut last_batch: Option<Option<u64>> = None;

    log::debug!("Sequencer thread started.");
    loop {
        while let Some(stored) = waiting.remove(&next_batch) {
            let artifact = store.release(stored)?;
            writer.write_block(artifact.text.as_bytes(), artifact.records)?;
            queue_metrics.artifacts.decrement();
            report.records_written += artifact.records;
            report.summary += artifact.summary;
            log::debug!(
                "Sequencer: Wrote batch {} ({} records)",
                next_batch,
                artifact.records
            );
            next_batch += 1;
            report.batches = next_batch;
            let _ = tickets.try_recv();
        }

        match last_batch {
            Some(None) if next_batch == 0 => break,
            Some(Some(last)) if next_batch > last => break,
            _ => {}
        }

        match events.recv() {
            Ok(SequencerEvent::Completed(stored)) => {
                let number = stored.number();
                if number < next_batch || waiting.insert(number, stored).is_some() {
                    return Err(crate::vcfclean_error!(
                        "Batch {number} was delivered twice"
                    ));
                }
            }
            Ok(SequencerEvent::LastBatch(last)) => {
                log::debug!("Sequencer: Last batch is {:?}", last);
                last_batch = Some(last);
            }
            Ok(SequencerEvent::WorkerFailed(number)) => {
                log::debug!("Sequencer: Worker failed on batch {number}, stopping");
                return Err(VcfCleanError::IncompleteRun { next_batch });
            }
            Err(_) => return Err(VcfCleanError::IncompleteRun { next_batch }),
        }
    }

    if !waiting.is_empty() {
        return Err(crate::vcfclean_error!(
            "{} batch(es) arrived after the last batch",
            waiting.len()
        ));
    }
    log::debug!("Sequencer thread finished.");
    Ok(report)
}
