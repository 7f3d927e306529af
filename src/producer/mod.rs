//! Record producer.
//!
//! Turns decoded frames into staging files:
//! - runs a `DetectorBackend` on each frame,
//! - derives geometry, position region and dominant colour per detection,
//! - writes all accumulated records as one `detections_<stamp>.csv` file.
//!
//! Model loading and frame decoding live behind `DetectorBackend` and the
//! caller respectively; this module never opens media files itself.

mod detector;
mod features;

pub use detector::{DetectorBackend, FrameView, RawDetection, StubBackend};
pub use features::{
    build_record, dominant_color, DominantColor, Horizontal, PositionRegion, SourceFrame,
    Vertical, FALLBACK_FPS,
};

use anyhow::{anyhow, Result};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::batch::RunStamp;
use crate::record::{write_records, DetectionRecord};

pub struct Producer<B> {
    backend: B,
    ingestion_date: String,
    records: Vec<DetectionRecord>,
}

impl<B: DetectorBackend> Producer<B> {
    pub fn new(mut backend: B) -> Result<Self> {
        backend.warm_up()?;
        log::info!("record producer using detector backend {}", backend.name());
        Ok(Self {
            backend,
            ingestion_date: chrono::Local::now()
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            records: Vec::new(),
        })
    }

    /// Fixes the ingestion date stamped on every record.
    pub fn with_ingestion_date(mut self, ingestion_date: impl Into<String>) -> Self {
        self.ingestion_date = ingestion_date.into();
        self
    }

    /// Detects objects in one frame and queues their records.
    pub fn process_frame(&mut self, source: &SourceFrame, frame: &FrameView<'_>) -> Result<usize> {
        let detections = self.backend.detect(frame).map_err(|e| {
            anyhow!(
                "detector {} failed on {} frame {}: {}",
                self.backend.name(),
                source.source_id,
                source.frame_number,
                e
            )
        })?;
        for (idx, det) in detections.iter().enumerate() {
            self.records
                .push(build_record(source, frame, det, idx, &self.ingestion_date));
        }
        Ok(detections.len())
    }

    pub fn records(&self) -> &[DetectionRecord] {
        &self.records
    }

    /// Writes queued records into `staging_dir` and clears the queue.
    ///
    /// Returns `None` without writing when nothing was detected.
    pub fn flush(&mut self, staging_dir: &Path, stamp: &RunStamp) -> Result<Option<PathBuf>> {
        if self.records.is_empty() {
            log::warn!("no detections produced, no staging file written");
            return Ok(None);
        }
        let path = write_staging_file(staging_dir, stamp, &self.records)?;
        log::info!(
            "staging file written to {} ({} detections)",
            path.display(),
            self.records.len()
        );
        self.records.clear();
        Ok(Some(path))
    }
}

/// Writes `detections_<stamp>.csv` under `staging_dir`, creating it if needed.
pub fn write_staging_file(
    staging_dir: &Path,
    stamp: &RunStamp,
    records: &[DetectionRecord],
) -> Result<PathBuf> {
    fs::create_dir_all(staging_dir)
        .map_err(|e| anyhow!("failed to create {}: {}", staging_dir.display(), e))?;
    let path = staging_dir.join(format!("detections_{}.csv", stamp));
    let file = File::create(&path)
        .map_err(|e| anyhow!("failed to create {}: {}", path.display(), e))?;
    write_records(BufWriter::new(file), records)?;
    Ok(path)
}
