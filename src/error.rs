//! Error types for the staging ETL.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for ETL operations.
pub type Result<T> = std::result::Result<T, EtlError>;

/// Unified error type for the staging ETL.
///
/// Everything except `CheckpointIo` is scoped to a single staging file: the
/// driver logs it, withholds the checkpoint entry and moves on.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("staging file is missing required columns: {}", missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("row {row}: column {column} has unparsable value {value:?}")]
    ValidationType {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("failed to publish batch {batch}: {reason}")]
    Publish { batch: String, reason: String },

    #[error("checkpoint store {}: {source}", path.display())]
    CheckpointIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("staging I/O on {}: {source}", path.display())]
    StagingIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl EtlError {
    /// True when the run cannot continue safely without durable dedup state.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, EtlError::CheckpointIo { .. })
    }

    /// Short stable label used in logs and run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            EtlError::Schema { .. } => "schema",
            EtlError::ValidationType { .. } => "validation_type",
            EtlError::Publish { .. } => "publish",
            EtlError::CheckpointIo { .. } => "checkpoint_io",
            EtlError::StagingIo { .. } => "staging_io",
            EtlError::Csv(_) => "csv",
        }
    }

    pub(crate) fn checkpoint(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EtlError::CheckpointIo {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn staging(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EtlError::StagingIo {
            path: path.into(),
            source,
        }
    }
}
