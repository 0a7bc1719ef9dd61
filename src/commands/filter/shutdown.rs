use crate::{error::VcfCleanError, utils::util::Result};
use std::{any::Any, thread};

use super::sequencer::SequencerReport;

fn panic_payload_message(panic_payload: &(dyn Any + Send + 'static)) -> String {
    if let Some(message) = panic_payload.downcast_ref::<&str>() {
        return (*message).to_owned();
    }
    if let Some(message) = panic_payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic payload".to_owned()
}

pub(crate) fn join_thread_result<T>(
    thread_name: &str,
    handle: thread::JoinHandle<Result<T>>,
) -> Result<T> {
    match handle.join() {
        Ok(result) => {
            result.map_err(|e| crate::vcfclean_error!("{thread_name} thread failed: {e}"))
        }
        Err(panic_payload) => Err(crate::vcfclean_error!(
            "{thread_name} thread panicked: {}",
            panic_payload_message(panic_payload.as_ref())
        )),
    }
}

pub(crate) fn aggregate_shutdown_errors(mut errors: Vec<VcfCleanError>) -> Result<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => {
            let summary = errors
                .into_iter()
                .enumerate()
                .map(|(index, error)| format!("{}. {}", index + 1, error))
                .collect::<Vec<_>>()
                .join("; ");
            Err(crate::vcfclean_error!(
                "Multiple pipeline errors: {summary}"
            ))
        }
    }
}

/// Joins the worker pool and sequencer threads and folds every failure,
/// the dispatcher's included, into one error.
pub(crate) fn finalize_filter_threads(
    dispatch_result: Result<u64>,
    pool_thread: thread::JoinHandle<Result<()>>,
    sequencer_thread: thread::JoinHandle<Result<SequencerReport>>,
) -> Result<(u64, SequencerReport)> {
    let mut errors = Vec::new();

    let dispatched = match dispatch_result {
        Ok(dispatched) => Some(dispatched),
        Err(error) => {
            errors.push(error);
            None
        }
    };
    match join_thread_result("Worker pool", pool_thread) {
        Ok(()) => log::debug!("Worker pool thread joined successfully."),
        Err(error) => errors.push(error),
    }
    let report = match join_thread_result("Sequencer", sequencer_thread) {
        Ok(report) => {
            log::debug!("Sequencer thread joined successfully.");
            Some(report)
        }
        Err(error) => {
            errors.push(error);
            None
        }
    };

    aggregate_shutdown_errors(errors)?;
    match (dispatched, report) {
        (Some(dispatched), Some(report)) => Ok((dispatched, report)),
        _ => Err(crate::vcfclean_error!("Pipeline ended without a result")),
    }
}
