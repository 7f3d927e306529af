//! Durable record of staging files that were already ingested.
//!
//! The on-disk format is one absolute path per line, UTF-8, sorted. Each save
//! rewrites the whole file through a temp file and a rename, so a crash
//! mid-save leaves the previous checkpoint in place.
//!
//! There is no locking: two drivers sharing one checkpoint path race, and the
//! last save wins. Operators must serialize runs.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{EtlError, Result};

/// Processed staging file ids. Ordered so saves are deterministic.
pub type CheckpointSet = BTreeSet<String>;

pub trait CheckpointStore {
    /// Returns the recorded ids, or an empty set when nothing was saved yet.
    fn load(&self) -> Result<CheckpointSet>;

    /// Replaces the durable record with exactly `ids`.
    fn save(&mut self, ids: &CheckpointSet) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Result<CheckpointSet> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CheckpointSet::new()),
            Err(e) => return Err(EtlError::checkpoint(&self.path, e)),
        };
        Ok(raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn save(&mut self, ids: &CheckpointSet) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| EtlError::checkpoint(parent, e))?;
        }
        let mut body = String::new();
        for id in ids {
            body.push_str(id);
            body.push('\n');
        }
        write_atomic(&self.path, body.as_bytes()).map_err(|e| EtlError::checkpoint(&self.path, e))
    }
}

/// Volatile store for tests and dry runs.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCheckpointStore {
    ids: CheckpointSet,
    saves: usize,
    fail_saves: bool,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Makes every subsequent save fail with a checkpoint I/O error.
    pub fn failing_saves(mut self) -> Self {
        self.fail_saves = true;
        self
    }

    pub fn ids(&self) -> &CheckpointSet {
        &self.ids
    }

    /// Number of successful saves.
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn load(&self) -> Result<CheckpointSet> {
        Ok(self.ids.clone())
    }

    fn save(&mut self, ids: &CheckpointSet) -> Result<()> {
        if self.fail_saves {
            return Err(EtlError::checkpoint(
                "<memory>",
                io::Error::new(io::ErrorKind::Other, "checkpoint saves disabled"),
            ));
        }
        self.ids = ids.clone();
        self.saves += 1;
        Ok(())
    }
}

/// Writes `data` to a hidden sibling of `path`, then renames it into place.
///
/// The leading dot keeps a temp file left behind by a failed rename out of
/// directories that downstream readers scan.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let tmp_path = temp_path(path);
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, path)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp_name = std::ffi::OsString::from(".");
    if let Some(name) = path.file_name() {
        tmp_name.push(name);
    }
    tmp_name.push(".tmp");
    path.with_file_name(tmp_name)
}
