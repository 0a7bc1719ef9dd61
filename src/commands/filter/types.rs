use crate::core::genotype::FilterParams;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// A numbered, contiguous run of data lines, each with its input line number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    pub number: u64,
    pub lines: Vec<(u64, String)>,
}

/// Counters of one batch; the sequencer sums them for the run summary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub records_in: u64,
    pub records_kept: u64,
    pub calls_nulled: u64,
    pub calls_to_hom_var: u64,
    pub calls_to_het: u64,
    pub records_without_variant: u64,
    pub reference_lines_superseded: u64,
    pub block_ends_trimmed: u64,
}

impl AddAssign for BatchSummary {
    fn add_assign(&mut self, other: Self) {
        self.records_in += other.records_in;
        self.records_kept += other.records_kept;
        self.calls_nulled += other.calls_nulled;
        self.calls_to_hom_var += other.calls_to_hom_var;
        self.calls_to_het += other.calls_to_het;
        self.records_without_variant += other.records_without_variant;
        self.reference_lines_superseded += other.reference_lines_superseded;
        self.block_ends_trimmed += other.block_ends_trimmed;
    }
}

/// Output of one processed batch: newline-terminated record text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchArtifact {
    pub number: u64,
    pub text: String,
    pub records: u64,
    pub summary: BatchSummary,
}

/// Read-only state shared by every worker.
#[derive(Clone, Debug)]
pub struct FilterContext {
    pub params: FilterParams,
    pub samples: Vec<String>,
    pub excluded: Vec<bool>,
    pub keep_hom_ref: bool,
    pub n_columns: usize,
}

impl FilterContext {
    pub fn sample_name(&self, index: usize) -> &str {
        self.samples.get(index).map(String::as_str).unwrap_or("?")
    }
}

pub enum SequencerEvent {
    Completed(super::store::StoredArtifact),
    /// A worker gave up on this batch; the run cannot complete.
    WorkerFailed(u64),
    /// Number of the final batch, `None` when the input had no data lines.
    LastBatch(Option<u64>),
}
