//! Detection staging ETL
//!
//! Object detections are written as flat staging files by the record
//! producer. This crate ingests those files into a warehouse location without
//! duplicates.
//!
//! # Architecture
//!
//! Components, in dependency order:
//!
//! 1. **Producer** (`producer`): detector seam plus feature derivation; emits
//!    staging files.
//! 2. **Checkpoint store** (`checkpoint`): durable set of staging files
//!    already ingested.
//! 3. **Cleaner** (`clean`): schema check, row filtering, type coercion,
//!    per-file dedup by detection id.
//! 4. **Batcher** (`batch`): one image batch per file, one video batch per
//!    `(source, 10 s window)`.
//! 5. **Loader** (`loader`): writes a batch locally, then publishes it.
//! 6. **Driver** (`pipeline`): runs 3 to 5 per unprocessed file and saves the
//!    checkpoint after each one.
//!
//! Cleaning and batching are pure; all filesystem and process side effects
//! sit behind `CheckpointStore` and `Loader`.
//!
//! Runs are single-threaded and must be serialized by the operator: the
//! checkpoint file is not locked.

pub mod batch;
pub mod checkpoint;
pub mod clean;
pub mod config;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod producer;
pub mod record;

pub use batch::{
    staging_label, window_index, Batch, BatchKind, Batcher, RunStamp, DEFAULT_WINDOW_SECS,
};
pub use checkpoint::{CheckpointSet, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
pub use clean::{clean, parse_staging, read_staging, CleanReport, Cleaned, StagingTable};
pub use config::{EtlConfig, PublishKind, PublishSettings};
pub use error::{EtlError, Result};
pub use loader::{FileLoader, Loader, PublishTarget, RecordingLoader};
pub use pipeline::{
    file_id, list_staging_files, FileOutcome, FileReport, FileStage, Pipeline, PipelineOptions,
    RunSummary,
};
pub use record::{DetectionRecord, SourceKind, COLUMNS};
