//! Batch publishing.
//!
//! A batch is first written to the local processed directory, then handed to
//! the configured target. Targets are keyed by file name with last-writer-wins
//! semantics; the query engine picks files up from the target location on its
//! own, so there is no registration step.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::batch::Batch;
use crate::checkpoint::write_atomic;
use crate::error::{EtlError, Result};
use crate::record::write_records;

/// Capability to make a batch visible to the warehouse.
pub trait Loader {
    /// Publishes `batch`, returning the local file that was written.
    fn publish(&mut self, batch: &Batch) -> Result<PathBuf>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublishTarget {
    /// Copy into a directory (mounted share, local warehouse location).
    Directory(PathBuf),
    /// `<command> dfs -put -f <local> <dir>`.
    Hdfs { command: String, dir: String },
}

impl PublishTarget {
    pub fn describe(&self) -> String {
        match self {
            PublishTarget::Directory(dir) => format!("dir:{}", dir.display()),
            PublishTarget::Hdfs { dir, .. } => format!("hdfs:{}", dir),
        }
    }
}

/// Writes batches under `processed_dir` and publishes them to `target`.
#[derive(Clone, Debug)]
pub struct FileLoader {
    processed_dir: PathBuf,
    target: PublishTarget,
}

impl FileLoader {
    pub fn new(processed_dir: impl Into<PathBuf>, target: PublishTarget) -> Self {
        Self {
            processed_dir: processed_dir.into(),
            target,
        }
    }

    pub fn target(&self) -> &PublishTarget {
        &self.target
    }

    fn write_local(&self, batch: &Batch) -> Result<PathBuf> {
        fs::create_dir_all(&self.processed_dir)
            .map_err(|e| EtlError::staging(&self.processed_dir, e))?;
        let path = self.processed_dir.join(&batch.name);
        let file = File::create(&path).map_err(|e| EtlError::staging(&path, e))?;
        write_records(BufWriter::new(file), &batch.records)?;
        Ok(path)
    }

    fn push(&self, local: &Path, batch: &Batch) -> Result<()> {
        let publish_err = |reason: String| EtlError::Publish {
            batch: batch.name.clone(),
            reason,
        };
        match &self.target {
            PublishTarget::Directory(dir) => {
                fs::create_dir_all(dir)
                    .map_err(|e| publish_err(format!("create {}: {}", dir.display(), e)))?;
                let data = fs::read(local)
                    .map_err(|e| publish_err(format!("read {}: {}", local.display(), e)))?;
                let dest = dir.join(&batch.name);
                write_atomic(&dest, &data)
                    .map_err(|e| publish_err(format!("copy to {}: {}", dest.display(), e)))
            }
            PublishTarget::Hdfs { command, dir } => {
                let output = Command::new(command)
                    .args(["dfs", "-put", "-f"])
                    .arg(local)
                    .arg(dir)
                    .output()
                    .map_err(|e| publish_err(format!("spawn {}: {}", command, e)))?;
                if output.status.success() {
                    Ok(())
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(publish_err(format!(
                        "{} dfs -put exited with {}: {}",
                        command,
                        output.status,
                        stderr.trim()
                    )))
                }
            }
        }
    }
}

impl Loader for FileLoader {
    fn publish(&mut self, batch: &Batch) -> Result<PathBuf> {
        let local = self.write_local(batch)?;
        log::info!(
            "publishing {} -> {}",
            local.display(),
            self.target.describe()
        );
        self.push(&local, batch)?;
        Ok(local)
    }
}

/// Loader that only records what it was asked to publish.
///
/// Backs `--dry-run` and driver tests.
#[derive(Clone, Debug, Default)]
pub struct RecordingLoader {
    published: Vec<Batch>,
    fail_matching: Vec<String>,
}

impl RecordingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every batch whose name contains `fragment`.
    pub fn failing_on(mut self, fragment: impl Into<String>) -> Self {
        self.fail_matching.push(fragment.into());
        self
    }

    pub fn published(&self) -> &[Batch] {
        &self.published
    }

    pub fn take_published(&mut self) -> Vec<Batch> {
        std::mem::take(&mut self.published)
    }
}

impl Loader for RecordingLoader {
    fn publish(&mut self, batch: &Batch) -> Result<PathBuf> {
        if self.fail_matching.iter().any(|f| batch.name.contains(f)) {
            return Err(EtlError::Publish {
                batch: batch.name.clone(),
                reason: "refused by recording loader".to_string(),
            });
        }
        self.published.push(batch.clone());
        Ok(PathBuf::from(&batch.name))
    }
}
