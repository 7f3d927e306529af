//! Pipeline driver: staging files in, published batches and checkpoints out.
//!
//! Each staging file moves through `Discovered -> Cleaned -> Batched ->
//! Published -> Checkpointed`, or ends `Skipped` (already checkpointed when
//! the run started), `Empty` (nothing survived cleaning) or `Failed`.
//!
//! The checkpoint is saved right after each file completes, so a killed run
//! loses at most the file in flight. Per-file failures are logged and the
//! run moves on; only checkpoint I/O ends the run early, with one exception:
//! a staging directory that exists but cannot be listed fails the whole run
//! with `StagingIo`, since no file in it can be identified.

use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::batch::{staging_label, Batcher, RunStamp};
use crate::checkpoint::{CheckpointSet, CheckpointStore, FileCheckpointStore};
use crate::clean::{clean, read_staging};
use crate::config::EtlConfig;
use crate::error::{EtlError, Result};
use crate::loader::{FileLoader, Loader};

/// Where in the per-file state machine a file stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileStage {
    Discovered,
    Cleaned,
    Batched,
    Published,
    Checkpointed,
}

impl fmt::Display for FileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FileStage::Discovered => "discovered",
            FileStage::Cleaned => "cleaned",
            FileStage::Batched => "batched",
            FileStage::Published => "published",
            FileStage::Checkpointed => "checkpointed",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FileOutcome {
    Skipped,
    Checkpointed { batches: usize, rows: usize },
    Empty { checkpointed: bool },
    Failed {
        /// Stage the file was trying to reach.
        stage: FileStage,
        kind: &'static str,
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunSummary {
    pub files: Vec<FileReport>,
}

impl RunSummary {
    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.outcome)).count()
    }

    pub fn processed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Checkpointed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped))
    }

    pub fn empty(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Empty { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed { .. }))
    }

    pub fn batches_published(&self) -> usize {
        self.files
            .iter()
            .map(|f| match f.outcome {
                FileOutcome::Checkpointed { batches, .. } => batches,
                _ => 0,
            })
            .sum()
    }

    pub fn rows_published(&self) -> usize {
        self.files
            .iter()
            .map(|f| match f.outcome {
                FileOutcome::Checkpointed { rows, .. } => rows,
                _ => 0,
            })
            .sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} skipped={} empty={} failed={} batches={} rows={}",
            self.processed(),
            self.skipped(),
            self.empty(),
            self.failed(),
            self.batches_published(),
            self.rows_published()
        )
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PipelineOptions {
    pub checkpoint_empty_files: bool,
    pub abort_on_file_error: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            checkpoint_empty_files: true,
            abort_on_file_error: false,
        }
    }
}

pub struct Pipeline<L, C> {
    staging_dir: PathBuf,
    batcher: Batcher,
    loader: L,
    checkpoints: C,
    options: PipelineOptions,
}

impl Pipeline<FileLoader, FileCheckpointStore> {
    pub fn from_config(cfg: &EtlConfig) -> Self {
        Pipeline::new(
            &cfg.staging_dir,
            Batcher::new(cfg.window_secs),
            FileLoader::new(&cfg.processed_dir, cfg.publish.target()),
            FileCheckpointStore::new(&cfg.checkpoint_path),
        )
        .with_options(PipelineOptions {
            checkpoint_empty_files: cfg.checkpoint_empty_files,
            abort_on_file_error: cfg.abort_on_file_error,
        })
    }
}

impl<L: Loader, C: CheckpointStore> Pipeline<L, C> {
    pub fn new(staging_dir: impl Into<PathBuf>, batcher: Batcher, loader: L, checkpoints: C) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            batcher,
            loader,
            checkpoints,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn loader_mut(&mut self) -> &mut L {
        &mut self.loader
    }

    pub fn checkpoints(&self) -> &C {
        &self.checkpoints
    }

    /// Processes every unprocessed staging file once, in path order.
    pub fn run(&mut self, stamp: &RunStamp) -> Result<RunSummary> {
        let files = list_staging_files(&self.staging_dir)?;
        let mut summary = RunSummary::default();
        if files.is_empty() {
            log::info!(
                "no staging files in {}, nothing to do",
                self.staging_dir.display()
            );
            return Ok(summary);
        }

        let mut processed = self.checkpoints.load()?;
        log::info!("staging files already processed (checkpoint): {}", processed.len());

        for path in files {
            let id = match file_id(&path) {
                Ok(id) => id,
                Err(err) => {
                    let outcome = self.fail(&path, FileStage::Discovered, err)?;
                    summary.files.push(FileReport { path, outcome });
                    continue;
                }
            };
            if processed.contains(&id) {
                log::info!("skipping already processed staging file {}", path.display());
                summary.files.push(FileReport {
                    path,
                    outcome: FileOutcome::Skipped,
                });
                continue;
            }

            log::info!("processing staging file {}", path.display());
            log::debug!("{}: {}", path.display(), FileStage::Discovered);
            let outcome = match self.process_file(&path, &id, stamp) {
                Ok(Progress::Published { batches, rows }) => {
                    self.commit(&mut processed, id)?;
                    log::debug!("{}: {}", path.display(), FileStage::Checkpointed);
                    FileOutcome::Checkpointed { batches, rows }
                }
                Ok(Progress::Empty) => {
                    log::warn!("{}: no rows left after cleaning", path.display());
                    let checkpointed = self.options.checkpoint_empty_files;
                    if checkpointed {
                        self.commit(&mut processed, id)?;
                    }
                    FileOutcome::Empty { checkpointed }
                }
                Err((stage, err)) => self.fail(&path, stage, err)?,
            };
            summary.files.push(FileReport { path, outcome });
        }

        log::info!("run complete: {}", summary);
        Ok(summary)
    }

    /// Logs a per-file failure. The run carries on unless
    /// `abort_on_file_error` is set, in which case the error ends it.
    fn fail(&self, path: &Path, stage: FileStage, err: EtlError) -> Result<FileOutcome> {
        log::error!(
            "{}: failed before {} ({}): {}",
            path.display(),
            stage,
            err.kind(),
            err
        );
        if self.options.abort_on_file_error {
            return Err(err);
        }
        Ok(FileOutcome::Failed {
            stage,
            kind: err.kind(),
            reason: err.to_string(),
        })
    }

    fn commit(&mut self, processed: &mut CheckpointSet, id: String) -> Result<()> {
        processed.insert(id);
        self.checkpoints.save(processed)
    }

    fn process_file(
        &mut self,
        path: &Path,
        id: &str,
        stamp: &RunStamp,
    ) -> std::result::Result<Progress, (FileStage, EtlError)> {
        let table = read_staging(path).map_err(|e| (FileStage::Cleaned, e))?;
        let cleaned = clean(&table).map_err(|e| (FileStage::Cleaned, e))?;
        log::debug!("{}: {:?}", path.display(), cleaned.report);
        if cleaned.is_empty() {
            return Ok(Progress::Empty);
        }

        let rows = cleaned.records.len();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let batches = self
            .batcher
            .plan(&staging_label(&stem, id), cleaned.records, stamp);
        log::debug!("{}: {} into {} batches", path.display(), FileStage::Batched, batches.len());

        for batch in &batches {
            self.loader
                .publish(batch)
                .map_err(|e| (FileStage::Published, e))?;
            log::info!("  {}", batch.describe(self.batcher.window_secs()));
        }
        Ok(Progress::Published {
            batches: batches.len(),
            rows,
        })
    }
}

enum Progress {
    Published { batches: usize, rows: usize },
    Empty,
}

/// `*.csv` files directly under `dir`, sorted by path. A missing directory
/// has no files.
pub fn list_staging_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(EtlError::staging(dir, e)),
    };
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| EtlError::staging(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "csv") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Checkpoint id for a staging file: its absolute path with `.` and `..`
/// resolved lexically. Symlinks are not followed, so a file reached through
/// a link and through its target path gets two ids.
pub fn file_id(path: &Path) -> Result<String> {
    let absolute = std::path::absolute(path).map_err(|e| EtlError::staging(path, e))?;
    Ok(normalize(&absolute).to_string_lossy().into_owned())
}

/// Expects an absolute path.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            // `..` at the root stays at the root.
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
