//! Partitioning of cleaned records into output batches.
//!
//! Image records from one staging file form a single batch. Video records
//! are grouped per `(source_id, window)` where `window = floor(ts / width)`,
//! so window `w` covers `[w * width, (w + 1) * width)` seconds.

use std::collections::BTreeMap;
use std::fmt;

use sha2::{Digest, Sha256};

use crate::record::{DetectionRecord, SourceKind};

/// Default time window width for video batches.
pub const DEFAULT_WINDOW_SECS: u32 = 10;

/// Run timestamp used in batch names, `%Y%m%d_%H%M%S`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunStamp(String);

impl RunStamp {
    pub fn now() -> Self {
        Self(chrono::Local::now().format("%Y%m%d_%H%M%S").to_string())
    }

    pub fn from_datetime<Tz: chrono::TimeZone>(at: &chrono::DateTime<Tz>) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        Self(at.format("%Y%m%d_%H%M%S").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchKind {
    Images,
    VideoWindow { source_id: String, window: i64 },
}

/// A named group of records written and published as one file.
#[derive(Clone, Debug)]
pub struct Batch {
    pub name: String,
    pub kind: BatchKind,
    pub records: Vec<DetectionRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Human-readable description for logs.
    pub fn describe(&self, window_secs: u32) -> String {
        match &self.kind {
            BatchKind::Images => format!("images: {} rows", self.records.len()),
            BatchKind::VideoWindow { source_id, window } => {
                let start = window * window_secs as i64;
                format!(
                    "video {}, window {}-{}s: {} rows",
                    source_id,
                    start,
                    start + window_secs as i64,
                    self.records.len()
                )
            }
        }
    }
}

/// Window index of a timestamp. Timestamps exactly on a boundary open the
/// next window.
pub fn window_index(timestamp_sec: f64, window_secs: u32) -> i64 {
    (timestamp_sec / window_secs as f64).floor() as i64
}

#[derive(Clone, Copy, Debug)]
pub struct Batcher {
    window_secs: u32,
}

impl Default for Batcher {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SECS)
    }
}

impl Batcher {
    pub fn new(window_secs: u32) -> Self {
        Self {
            window_secs: window_secs.max(1),
        }
    }

    pub fn window_secs(&self) -> u32 {
        self.window_secs
    }

    /// Splits one staging file's cleaned records into batches. `staging_label`
    /// names the file in batch names; see [`staging_label`].
    ///
    /// The image batch (if any) comes first, then video batches ordered by
    /// `(source_id, window)`. Record order within a batch follows input order.
    pub fn plan(
        &self,
        staging_label: &str,
        records: Vec<DetectionRecord>,
        stamp: &RunStamp,
    ) -> Vec<Batch> {
        let staging_label = sanitize(staging_label);
        let mut images = Vec::new();
        let mut windows: BTreeMap<(String, i64), Vec<DetectionRecord>> = BTreeMap::new();

        for record in records {
            match record.source_type {
                SourceKind::Image => images.push(record),
                SourceKind::Video => {
                    let window = window_index(record.timestamp_sec, self.window_secs);
                    windows
                        .entry((record.source_id.clone(), window))
                        .or_default()
                        .push(record);
                }
            }
        }

        let mut batches = Vec::with_capacity(windows.len() + 1);
        if !images.is_empty() {
            batches.push(Batch {
                name: format!("images_{}_{}.csv", staging_label, stamp),
                kind: BatchKind::Images,
                records: images,
            });
        }
        for ((source_id, window), records) in windows {
            batches.push(Batch {
                name: format!(
                    "video_{}-{}_win{}_{}_{}.csv",
                    source_stem(&source_id),
                    short_tag(&source_id),
                    window,
                    staging_label,
                    stamp
                ),
                kind: BatchKind::VideoWindow { source_id, window },
                records,
            });
        }
        batches
    }
}

/// Source id with directories and extension removed, safe for file names.
pub fn source_stem(source_id: &str) -> String {
    let base = source_id
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(source_id);
    let stem = match base.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem,
        _ => base,
    };
    sanitize(stem)
}

/// Batch-name label for a staging file: its sanitized stem plus a tag of
/// its checkpoint id, so stems that only differ in replaced characters
/// (`det 1`, `det_1`) stay distinct within a run.
pub fn staging_label(stem: &str, file_id: &str) -> String {
    format!("{}-{}", sanitize(stem), short_tag(file_id))
}

/// Short digest of a full id; disambiguates equal sanitized stems.
fn short_tag(id: &str) -> String {
    let digest = Sha256::digest(id.as_bytes());
    hex::encode(&digest[..4])
}

fn sanitize(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "source".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fixtures;

    fn stamp() -> RunStamp {
        RunStamp("20250101_120000".to_string())
    }

    #[test]
    fn window_boundaries_are_left_inclusive() {
        assert_eq!(window_index(0.0, 10), 0);
        assert_eq!(window_index(9.999, 10), 0);
        assert_eq!(window_index(10.0, 10), 1);
        assert_eq!(window_index(19.999, 10), 1);
        assert_eq!(window_index(20.0, 10), 2);
    }

    #[test]
    fn image_records_form_one_batch() {
        let records: Vec<_> = (0..5).map(|i| fixtures::image(&format!("img_{}", i))).collect();
        let batches = Batcher::default().plan("detections_1", records, &stamp());
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].kind, BatchKind::Images);
        assert_eq!(batches[0].len(), 5);
        assert_eq!(batches[0].name, "images_detections_1_20250101_120000.csv");
    }

    #[test]
    fn video_records_split_per_window() {
        let records = vec![
            fixtures::video("cam1.mp4", 3.0, 0),
            fixtures::video("cam1.mp4", 8.0, 0),
            fixtures::video("cam1.mp4", 11.0, 0),
            fixtures::video("cam1.mp4", 25.0, 0),
        ];
        let batches = Batcher::default().plan("detections_1", records, &stamp());
        let shape: Vec<_> = batches
            .iter()
            .map(|b| match &b.kind {
                BatchKind::VideoWindow { window, .. } => (*window, b.len()),
                BatchKind::Images => panic!("unexpected image batch"),
            })
            .collect();
        assert_eq!(shape, vec![(0, 2), (1, 1), (2, 1)]);
        assert!(batches[0].name.starts_with("video_cam1-"));
        assert!(batches[0].name.contains("_win0_detections_1_20250101_120000"));
    }

    #[test]
    fn groups_are_ordered_by_source_then_window() {
        let records = vec![
            fixtures::video("b.mp4", 15.0, 0),
            fixtures::video("a.mp4", 12.0, 0),
            fixtures::video("b.mp4", 1.0, 0),
            fixtures::image("img"),
            fixtures::video("a.mp4", 2.0, 0),
        ];
        let batches = Batcher::default().plan("s", records, &stamp());
        let keys: Vec<_> = batches
            .iter()
            .map(|b| match &b.kind {
                BatchKind::Images => ("images".to_string(), -1),
                BatchKind::VideoWindow { source_id, window } => (source_id.clone(), *window),
            })
            .collect();
        assert_eq!(
            keys,
            vec![
                ("images".to_string(), -1),
                ("a.mp4".to_string(), 0),
                ("a.mp4".to_string(), 1),
                ("b.mp4".to_string(), 0),
                ("b.mp4".to_string(), 1),
            ]
        );
    }

    #[test]
    fn names_do_not_collide_for_same_stem_sources() {
        let records = vec![
            fixtures::video("cam1.mp4", 1.0, 0),
            fixtures::video("other/cam1.avi", 1.0, 0),
        ];
        let batches = Batcher::default().plan("s", records, &stamp());
        assert_eq!(batches.len(), 2);
        assert_ne!(batches[0].name, batches[1].name);
        assert!(batches.iter().all(|b| b.name.starts_with("video_cam1-")));
    }

    #[test]
    fn names_differ_between_staging_files_in_one_run() {
        let a = Batcher::default().plan("detections_a", vec![fixtures::image("x")], &stamp());
        let b = Batcher::default().plan("detections_b", vec![fixtures::image("x")], &stamp());
        assert_ne!(a[0].name, b[0].name);
    }

    #[test]
    fn staging_labels_differ_for_stems_that_sanitize_alike() {
        let spaced = staging_label("det 1", "/s/det 1.csv");
        let underscored = staging_label("det_1", "/s/det_1.csv");
        assert_ne!(spaced, underscored);
        assert!(spaced.starts_with("det_1-"));
        assert!(underscored.starts_with("det_1-"));
        assert_eq!(staging_label("det_1", "/s/det_1.csv"), underscored);
    }

    #[test]
    fn empty_input_produces_no_batches() {
        assert!(Batcher::default().plan("s", Vec::new(), &stamp()).is_empty());
    }

    #[test]
    fn source_stem_strips_path_and_extension() {
        assert_eq!(source_stem("cam1.mp4"), "cam1");
        assert_eq!(source_stem("/data/raw/videos/front door.mkv"), "front_door");
        assert_eq!(source_stem(r"C:\clips\gate.v2.avi"), "gate_v2");
        assert_eq!(source_stem(".hidden"), "_hidden");
        assert_eq!(source_stem(""), "source");
    }

    #[test]
    fn describe_reports_window_span() {
        let batches =
            Batcher::default().plan("s", vec![fixtures::video("cam1.mp4", 11.0, 0)], &stamp());
        assert_eq!(
            batches[0].describe(10),
            "video cam1.mp4, window 10-20s: 1 rows"
        );
    }
}
