use std::{
    num::{ParseFloatError, ParseIntError},
    path::PathBuf,
    str::Utf8Error,
};
use thiserror::Error;

pub type VcfCleanResult<T> = std::result::Result<T, VcfCleanError>;

#[derive(Debug, Error)]
pub enum VcfCleanError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Htslib(#[from] rust_htslib::errors::Error),
    #[error(transparent)]
    Utf8(#[from] Utf8Error),
    #[error(transparent)]
    ParseInt(#[from] ParseIntError),
    #[error(transparent)]
    ParseFloat(#[from] ParseFloatError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("Malformed record at line {line}: {message}")]
    MalformedRecord { line: u64, message: String },
    #[error("Malformed genotype '{value}' in sample {sample}: {message}")]
    MalformedGenotype {
        value: String,
        sample: String,
        message: String,
    },
    #[error("Required FORMAT field {field} is not declared in the header")]
    MissingFormatField { field: String },
    #[error(
        "Annotation cache {} was built with schema '{cached}' but this run expects '{expected}'. Remove the cache to rebuild it",
        path.display()
    )]
    SchemaMismatch {
        path: PathBuf,
        cached: String,
        expected: String,
    },
    #[error("Scratch directory already exists: {}", path.display())]
    ScratchDirExists { path: PathBuf },
    #[error("Annotation tool output ended with {outstanding} variant(s) never annotated, first: {first}")]
    IncompleteAnnotation { outstanding: usize, first: String },
    #[error("{stream} stream is not sorted: {current} follows {previous}")]
    UnsortedStream {
        stream: String,
        previous: String,
        current: String,
    },
    #[error("Pipeline stopped before batch {next_batch} was produced")]
    IncompleteRun { next_batch: u64 },
}

impl VcfCleanError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub fn malformed(line: u64, message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            line,
            message: message.into(),
        }
    }
}

#[macro_export]
macro_rules! vcfclean_error {
    ($($arg:tt)*) => {
        $crate::error::VcfCleanError::message(format!($($arg)*))
    };
}
