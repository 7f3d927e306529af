//! Detection record model shared by the producer, the cleaner and the batcher.
//!
//! Staging files and output batch files share one tabular layout: a header
//! row naming the columns in [`COLUMNS`] followed by one record per row.

use std::fmt;
use std::io::Write;

use serde::Serialize;

use crate::error::Result;

/// Column names, in file order.
pub const COLUMNS: [&str; 28] = [
    "source_type",
    "source_id",
    "frame_number",
    "class_id",
    "class_name",
    "confidence",
    "x_min",
    "y_min",
    "x_max",
    "y_max",
    "width",
    "height",
    "area_pixels",
    "frame_width",
    "frame_height",
    "bbox_area_ratio",
    "center_x",
    "center_y",
    "center_x_norm",
    "center_y_norm",
    "position_region",
    "dominant_color_name",
    "dom_r",
    "dom_g",
    "dom_b",
    "timestamp_sec",
    "ingestion_date",
    "detection_id",
];

/// Columns whose blank value drops the row during cleaning.
pub const KEY_COLUMNS: [&str; 6] = [
    "source_type",
    "source_id",
    "class_id",
    "class_name",
    "confidence",
    "detection_id",
];

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Image,
    Video,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Image => "image",
            SourceKind::Video => "video",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "image" => Some(SourceKind::Image),
            "video" => Some(SourceKind::Video),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected object instance.
///
/// Field order matches [`COLUMNS`]; serializing a record through `csv`
/// produces a row in staging layout.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct DetectionRecord {
    pub source_type: SourceKind,
    pub source_id: String,
    /// Always 0 for images.
    pub frame_number: i64,
    pub class_id: i64,
    pub class_name: String,
    pub confidence: f64,
    pub x_min: i64,
    pub y_min: i64,
    pub x_max: i64,
    pub y_max: i64,
    pub width: i64,
    pub height: i64,
    pub area_pixels: i64,
    pub frame_width: u32,
    pub frame_height: u32,
    pub bbox_area_ratio: f64,
    pub center_x: f64,
    pub center_y: f64,
    pub center_x_norm: f64,
    pub center_y_norm: f64,
    pub position_region: String,
    pub dominant_color_name: String,
    pub dom_r: u8,
    pub dom_g: u8,
    pub dom_b: u8,
    /// 0 for images, `frame_number / fps` for video.
    pub timestamp_sec: f64,
    pub ingestion_date: String,
    /// `{source_id}_{frame_number}_{local_index}`.
    pub detection_id: String,
}

impl DetectionRecord {
    pub fn has_valid_confidence(&self) -> bool {
        (0.0..=1.0).contains(&self.confidence)
    }

    pub fn has_valid_bbox(&self) -> bool {
        self.x_min >= 0 && self.y_min >= 0 && self.x_max > self.x_min && self.y_max > self.y_min
    }
}

/// Builds a detection id the way the producer assigns them.
pub fn detection_id(source_id: &str, frame_number: i64, local_index: usize) -> String {
    format!("{}_{}_{}", source_id, frame_number, local_index)
}

/// Writes records in staging layout, header first.
///
/// An empty slice still yields a header-only file.
pub fn write_records<W: Write>(writer: W, records: &[DetectionRecord]) -> Result<()> {
    let mut out = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    out.write_record(COLUMNS)?;
    for record in records {
        out.serialize(record)?;
    }
    out.flush().map_err(csv::Error::from)?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A well-formed image record with the given detection id.
    pub(crate) fn image(detection_id: &str) -> DetectionRecord {
        DetectionRecord {
            source_type: SourceKind::Image,
            source_id: "img1.jpg".to_string(),
            frame_number: 0,
            class_id: 0,
            class_name: "person".to_string(),
            confidence: 0.9,
            x_min: 10,
            y_min: 20,
            x_max: 50,
            y_max: 80,
            width: 40,
            height: 60,
            area_pixels: 2400,
            frame_width: 640,
            frame_height: 480,
            bbox_area_ratio: 0.0078125,
            center_x: 30.0,
            center_y: 50.0,
            center_x_norm: 0.046875,
            center_y_norm: 0.10416666666666667,
            position_region: "top-left".to_string(),
            dominant_color_name: "red".to_string(),
            dom_r: 255,
            dom_g: 0,
            dom_b: 0,
            timestamp_sec: 0.0,
            ingestion_date: "2025-01-01 00:00:00".to_string(),
            detection_id: detection_id.to_string(),
        }
    }

    /// A well-formed video record at `timestamp_sec` for `source_id`.
    pub(crate) fn video(source_id: &str, timestamp_sec: f64, local_index: usize) -> DetectionRecord {
        let frame_number = (timestamp_sec * 25.0).round() as i64;
        DetectionRecord {
            source_type: SourceKind::Video,
            source_id: source_id.to_string(),
            frame_number,
            timestamp_sec,
            detection_id: detection_id(source_id, frame_number, local_index),
            ..image("unused")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_matches_column_order() -> anyhow::Result<()> {
        let mut buf = Vec::new();
        write_records(&mut buf, &[fixtures::image("A")])?;
        let text = String::from_utf8(buf)?;
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(COLUMNS.join(",").as_str()));
        let row = lines.next().expect("data row");
        assert!(row.starts_with("image,img1.jpg,0,0,person,0.9,10,20,50,80,"));
        assert!(row.ends_with(",A"));
        assert_eq!(row.split(',').count(), COLUMNS.len());
        Ok(())
    }

    #[test]
    fn empty_record_set_still_writes_header() -> anyhow::Result<()> {
        let mut buf = Vec::new();
        write_records(&mut buf, &[])?;
        assert_eq!(String::from_utf8(buf)?.trim_end(), COLUMNS.join(","));
        Ok(())
    }

    #[test]
    fn source_kind_parses_exact_labels() {
        assert_eq!(SourceKind::parse("image"), Some(SourceKind::Image));
        assert_eq!(SourceKind::parse(" video "), Some(SourceKind::Video));
        assert_eq!(SourceKind::parse("Video"), None);
        assert_eq!(SourceKind::parse("audio"), None);
    }

    #[test]
    fn bbox_and_confidence_predicates() {
        let mut rec = fixtures::image("A");
        assert!(rec.has_valid_bbox());
        assert!(rec.has_valid_confidence());
        rec.x_max = rec.x_min;
        assert!(!rec.has_valid_bbox());
        rec.confidence = 1.0000001;
        assert!(!rec.has_valid_confidence());
    }
}
