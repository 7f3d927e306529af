//! Per-detection feature derivation: box geometry, position region and
//! dominant colour.

use std::fmt;

use crate::record::{detection_id, DetectionRecord, SourceKind};

use super::detector::{FrameView, RawDetection};

/// Frame rate assumed when a video reports none.
pub const FALLBACK_FPS: f64 = 25.0;

/// Identity of the frame a detection came from.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceFrame {
    pub kind: SourceKind,
    pub source_id: String,
    pub frame_number: i64,
    pub timestamp_sec: f64,
}

impl SourceFrame {
    pub fn image(source_id: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Image,
            source_id: source_id.into(),
            frame_number: 0,
            timestamp_sec: 0.0,
        }
    }

    pub fn video(source_id: impl Into<String>, frame_number: i64, fps: f64) -> Self {
        let fps = if fps > 0.0 { fps } else { FALLBACK_FPS };
        Self {
            kind: SourceKind::Video,
            source_id: source_id.into(),
            frame_number,
            timestamp_sec: frame_number as f64 / fps,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Vertical {
    Top,
    Middle,
    Bottom,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Horizontal {
    Left,
    Center,
    Right,
}

/// One of the nine thirds-grid cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PositionRegion {
    pub vertical: Vertical,
    pub horizontal: Horizontal,
}

impl PositionRegion {
    /// Region of a normalized centre point.
    pub fn from_normalized(center_x_norm: f64, center_y_norm: f64) -> Self {
        let vertical = if center_y_norm < 1.0 / 3.0 {
            Vertical::Top
        } else if center_y_norm < 2.0 / 3.0 {
            Vertical::Middle
        } else {
            Vertical::Bottom
        };
        let horizontal = if center_x_norm < 1.0 / 3.0 {
            Horizontal::Left
        } else if center_x_norm < 2.0 / 3.0 {
            Horizontal::Center
        } else {
            Horizontal::Right
        };
        Self {
            vertical,
            horizontal,
        }
    }
}

impl fmt::Display for PositionRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = match self.vertical {
            Vertical::Top => "top",
            Vertical::Middle => "middle",
            Vertical::Bottom => "bottom",
        };
        let h = match self.horizontal {
            Horizontal::Left => "left",
            Horizontal::Center => "center",
            Horizontal::Right => "right",
        };
        write!(f, "{}-{}", v, h)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DominantColor {
    pub name: &'static str,
    pub rgb: [u8; 3],
}

impl DominantColor {
    pub fn unknown() -> Self {
        Self {
            name: "unknown",
            rgb: [0, 0, 0],
        }
    }

    /// Coarse colour name for an averaged RGB triple.
    pub fn classify(rgb: [u8; 3]) -> Self {
        let [r, g, b] = rgb;
        let max_c = r.max(g).max(b);
        let min_c = r.min(g).min(b);
        let name = if max_c < 40 {
            "black"
        } else if min_c > 215 {
            "white"
        } else if max_c - min_c < 25 {
            "gray"
        } else if r == max_c && g < 100 && b < 100 {
            "red"
        } else if g == max_c && r < 100 && b < 100 {
            "green"
        } else if b == max_c && r < 100 && g < 100 {
            "blue"
        } else if r == max_c && g == max_c {
            "yellow"
        } else {
            "other"
        };
        Self { name, rgb }
    }
}

/// Mean colour of the box, clipped to the frame.
pub fn dominant_color(frame: &FrameView<'_>, bbox: [i64; 4]) -> DominantColor {
    let clip = |v: i64, hi: u32| v.clamp(0, hi as i64) as u32;
    let [x_min, y_min, x_max, y_max] = bbox;
    match frame.region_mean(
        clip(x_min, frame.width),
        clip(y_min, frame.height),
        clip(x_max, frame.width),
        clip(y_max, frame.height),
    ) {
        Some(mean) => DominantColor::classify(mean.map(|c| c as u8)),
        None => DominantColor::unknown(),
    }
}

/// Builds the full staging record for one raw detection.
pub fn build_record(
    source: &SourceFrame,
    frame: &FrameView<'_>,
    detection: &RawDetection,
    local_index: usize,
    ingestion_date: &str,
) -> DetectionRecord {
    let [x_min, y_min, x_max, y_max] = detection.bbox.map(|v| v as i64);
    let width = (x_max - x_min).max(1);
    let height = (y_max - y_min).max(1);
    let area_pixels = width * height;

    let center_x = x_min as f64 + width as f64 / 2.0;
    let center_y = y_min as f64 + height as f64 / 2.0;
    let frame_area = (frame.width as i64 * frame.height as i64).max(1);
    let center_x_norm = center_x / frame.width as f64;
    let center_y_norm = center_y / frame.height as f64;

    let color = dominant_color(frame, [x_min, y_min, x_max, y_max]);

    DetectionRecord {
        source_type: source.kind,
        source_id: source.source_id.clone(),
        frame_number: source.frame_number,
        class_id: detection.class_id,
        class_name: detection.class_name.clone(),
        confidence: detection.confidence,
        x_min,
        y_min,
        x_max,
        y_max,
        width,
        height,
        area_pixels,
        frame_width: frame.width,
        frame_height: frame.height,
        bbox_area_ratio: area_pixels as f64 / frame_area as f64,
        center_x,
        center_y,
        center_x_norm,
        center_y_norm,
        position_region: PositionRegion::from_normalized(center_x_norm, center_y_norm).to_string(),
        dominant_color_name: color.name.to_string(),
        dom_r: color.rgb[0],
        dom_g: color.rgb[1],
        dom_b: color.rgb[2],
        timestamp_sec: source.timestamp_sec,
        ingestion_date: ingestion_date.to_string(),
        detection_id: detection_id(&source.source_id, source.frame_number, local_index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        (0..width * height).flat_map(|_| rgb).collect()
    }

    #[test]
    fn regions_cover_the_thirds_grid() {
        let r = |x, y| PositionRegion::from_normalized(x, y).to_string();
        assert_eq!(r(0.1, 0.1), "top-left");
        assert_eq!(r(0.5, 0.5), "middle-center");
        assert_eq!(r(0.9, 0.9), "bottom-right");
        assert_eq!(r(1.0 / 3.0, 2.0 / 3.0), "bottom-center");
        assert_eq!(r(0.0, 0.5), "middle-left");
    }

    #[test]
    fn color_names_follow_thresholds() {
        let name = |rgb| DominantColor::classify(rgb).name;
        assert_eq!(name([10, 20, 39]), "black");
        assert_eq!(name([220, 230, 216]), "white");
        assert_eq!(name([120, 130, 110]), "gray");
        assert_eq!(name([200, 50, 40]), "red");
        assert_eq!(name([30, 180, 60]), "green");
        assert_eq!(name([20, 90, 200]), "blue");
        assert_eq!(name([200, 200, 40]), "yellow");
        assert_eq!(name([200, 150, 100]), "other");
    }

    #[test]
    fn video_timestamp_uses_fallback_fps() {
        assert_eq!(SourceFrame::video("a.mp4", 50, 0.0).timestamp_sec, 2.0);
        assert_eq!(SourceFrame::video("a.mp4", 30, 30.0).timestamp_sec, 1.0);
        let image = SourceFrame::image("a.jpg");
        assert_eq!((image.frame_number, image.timestamp_sec), (0, 0.0));
    }

    #[test]
    fn record_geometry_is_derived_from_the_box() {
        let pixels = solid(100, 50, [250, 10, 10]);
        let frame = FrameView::new(&pixels, 100, 50).unwrap();
        let det = RawDetection {
            class_id: 2,
            class_name: "car".to_string(),
            confidence: 0.75,
            bbox: [10.9, 5.2, 30.7, 25.0],
        };
        let rec = build_record(&SourceFrame::video("cam1.mp4", 75, 25.0), &frame, &det, 3, "2025-01-01 00:00:00");

        assert_eq!((rec.x_min, rec.y_min, rec.x_max, rec.y_max), (10, 5, 30, 25));
        assert_eq!((rec.width, rec.height, rec.area_pixels), (20, 20, 400));
        assert_eq!((rec.center_x, rec.center_y), (20.0, 15.0));
        assert_eq!(rec.bbox_area_ratio, 400.0 / 5000.0);
        assert_eq!((rec.center_x_norm, rec.center_y_norm), (0.2, 0.3));
        assert_eq!(rec.position_region, "top-left");
        assert_eq!(rec.dominant_color_name, "red");
        assert_eq!((rec.dom_r, rec.dom_g, rec.dom_b), (250, 10, 10));
        assert_eq!(rec.timestamp_sec, 3.0);
        assert_eq!(rec.detection_id, "cam1.mp4_75_3");
    }

    #[test]
    fn degenerate_box_gets_unit_size_and_unknown_color() {
        let pixels = solid(10, 10, [0, 0, 0]);
        let frame = FrameView::new(&pixels, 10, 10).unwrap();
        let det = RawDetection {
            class_id: 0,
            class_name: "person".to_string(),
            confidence: 0.5,
            bbox: [4.0, 4.0, 4.0, 4.0],
        };
        let rec = build_record(&SourceFrame::image("a.jpg"), &frame, &det, 0, "now");
        assert_eq!((rec.width, rec.height, rec.area_pixels), (1, 1, 1));
        assert_eq!(rec.dominant_color_name, "unknown");
        assert!(!rec.has_valid_bbox());
    }
}
