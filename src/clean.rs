//! Staging file validation and cleaning.
//!
//! Rules run in a fixed order:
//! 1. every column in [`COLUMNS`] must be present (`Schema`),
//! 2. rows with a blank key column are dropped,
//! 3. typed columns are coerced; one failure rejects the whole file,
//! 4. confidence outside `[0, 1]` is dropped,
//! 5. malformed bounding boxes are dropped,
//! 6. duplicate detection ids are dropped, first occurrence wins.
//!
//! Nothing here touches the filesystem except [`read_staging`].

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use csv::StringRecord;

use crate::error::{EtlError, Result};
use crate::record::{DetectionRecord, SourceKind, COLUMNS, KEY_COLUMNS};

/// Cell spellings treated as missing values.
const NA_TOKENS: [&str; 10] = [
    "", "NaN", "nan", "-nan", "NA", "N/A", "n/a", "null", "NULL", "None",
];

/// Raw rows of one staging file, before any validation.
#[derive(Clone, Debug, Default)]
pub struct StagingTable {
    headers: Vec<String>,
    rows: Vec<StringRecord>,
}

impl StagingTable {
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Per-rule accounting for one cleaning pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub rows_read: usize,
    pub dropped_missing_key: usize,
    pub dropped_confidence: usize,
    pub dropped_bbox: usize,
    pub dropped_duplicate: usize,
    pub kept: usize,
}

#[derive(Clone, Debug, Default)]
pub struct Cleaned {
    pub records: Vec<DetectionRecord>,
    pub report: CleanReport,
}

impl Cleaned {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub fn read_staging(path: &Path) -> Result<StagingTable> {
    let file = File::open(path).map_err(|e| EtlError::staging(path, e))?;
    parse_staging(BufReader::new(file))
}

/// Parses staging text. Short rows are padded with blanks.
pub fn parse_staging<R: Read>(reader: R) -> Result<StagingTable> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader
        .headers()?
        .iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
        .collect();
    let rows = csv_reader.records().collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(StagingTable { headers, rows })
}

/// Applies the cleaning rules to one staging table.
///
/// An empty result is not an error.
pub fn clean(table: &StagingTable) -> Result<Cleaned> {
    let columns = ColumnIndex::new(&table.headers)?;
    let mut report = CleanReport {
        rows_read: table.rows.len(),
        ..CleanReport::default()
    };

    let mut coerced = Vec::with_capacity(table.rows.len());
    for (idx, raw) in table.rows.iter().enumerate() {
        let row = Row {
            raw,
            columns: &columns,
            number: idx + 1,
        };
        if KEY_COLUMNS.iter().any(|col| row.is_blank(col)) {
            report.dropped_missing_key += 1;
            continue;
        }
        coerced.push(row.coerce()?);
    }

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(coerced.len());
    for candidate in coerced {
        if !candidate.record.has_valid_confidence() {
            report.dropped_confidence += 1;
            continue;
        }
        if !candidate.bbox_present || !candidate.record.has_valid_bbox() {
            report.dropped_bbox += 1;
            continue;
        }
        if !seen.insert(candidate.record.detection_id.clone()) {
            report.dropped_duplicate += 1;
            continue;
        }
        records.push(candidate.record);
    }

    report.kept = records.len();
    Ok(Cleaned { records, report })
}

struct ColumnIndex {
    positions: HashMap<&'static str, usize>,
}

impl ColumnIndex {
    fn new(headers: &[String]) -> Result<Self> {
        let by_name: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(pos, name)| (name.as_str(), pos))
            .collect();

        let mut missing = Vec::new();
        let mut positions = HashMap::with_capacity(COLUMNS.len());
        for column in COLUMNS {
            match by_name.get(column) {
                Some(&pos) => {
                    positions.insert(column, pos);
                }
                None => missing.push(column.to_string()),
            }
        }
        if !missing.is_empty() {
            missing.sort();
            return Err(EtlError::Schema { missing });
        }
        Ok(Self { positions })
    }

    fn position(&self, column: &'static str) -> usize {
        self.positions[column]
    }
}

struct Coerced {
    record: DetectionRecord,
    /// A blank coordinate never satisfies the bbox comparisons.
    bbox_present: bool,
}

struct Row<'a> {
    raw: &'a StringRecord,
    columns: &'a ColumnIndex,
    number: usize,
}

impl Row<'_> {
    fn cell(&self, column: &'static str) -> &str {
        self.raw
            .get(self.columns.position(column))
            .map(str::trim)
            .unwrap_or("")
    }

    fn is_blank(&self, column: &'static str) -> bool {
        NA_TOKENS.contains(&self.cell(column))
    }

    fn type_error(&self, column: &'static str) -> EtlError {
        EtlError::ValidationType {
            row: self.number,
            column,
            value: self.cell(column).to_string(),
        }
    }

    fn text(&self, column: &'static str) -> String {
        if self.is_blank(column) {
            String::new()
        } else {
            self.cell(column).to_string()
        }
    }

    fn float(&self, column: &'static str) -> Result<f64> {
        self.cell(column)
            .parse::<f64>()
            .map_err(|_| self.type_error(column))
    }

    fn finite_float(&self, column: &'static str) -> Result<f64> {
        match self.float(column)? {
            v if v.is_finite() => Ok(v),
            _ => Err(self.type_error(column)),
        }
    }

    fn int(&self, column: &'static str) -> Result<i64> {
        parse_int(self.cell(column)).ok_or_else(|| self.type_error(column))
    }

    fn optional_int(&self, column: &'static str) -> Result<Option<i64>> {
        if self.is_blank(column) {
            return Ok(None);
        }
        self.int(column).map(Some)
    }

    fn bounded<T: TryFrom<i64>>(&self, column: &'static str) -> Result<T> {
        T::try_from(self.int(column)?).map_err(|_| self.type_error(column))
    }

    fn coerce(&self) -> Result<Coerced> {
        let source_type =
            SourceKind::parse(self.cell("source_type")).ok_or_else(|| self.type_error("source_type"))?;
        let confidence = self.float("confidence")?;
        let frame_number = self.int("frame_number")?;
        let timestamp_sec = self.finite_float("timestamp_sec")?;

        let bbox = (
            self.optional_int("x_min")?,
            self.optional_int("y_min")?,
            self.optional_int("x_max")?,
            self.optional_int("y_max")?,
        );
        let (bbox_present, [x_min, y_min, x_max, y_max]) = match bbox {
            (Some(a), Some(b), Some(c), Some(d)) => (true, [a, b, c, d]),
            _ => (false, [0; 4]),
        };

        let record = DetectionRecord {
            source_type,
            source_id: self.text("source_id"),
            frame_number,
            class_id: self.int("class_id")?,
            class_name: self.text("class_name"),
            confidence,
            x_min,
            y_min,
            x_max,
            y_max,
            width: self.int("width")?,
            height: self.int("height")?,
            area_pixels: self.int("area_pixels")?,
            frame_width: self.bounded("frame_width")?,
            frame_height: self.bounded("frame_height")?,
            bbox_area_ratio: self.float("bbox_area_ratio")?,
            center_x: self.float("center_x")?,
            center_y: self.float("center_y")?,
            center_x_norm: self.float("center_x_norm")?,
            center_y_norm: self.float("center_y_norm")?,
            position_region: self.text("position_region"),
            dominant_color_name: self.text("dominant_color_name"),
            dom_r: self.bounded("dom_r")?,
            dom_g: self.bounded("dom_g")?,
            dom_b: self.bounded("dom_b")?,
            timestamp_sec,
            ingestion_date: self.text("ingestion_date"),
            detection_id: self.text("detection_id"),
        };
        Ok(Coerced {
            record,
            bbox_present,
        })
    }
}

/// Integer parse that also accepts integral float spellings like `"12.0"`.
fn parse_int(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().or_else(|| {
        let value = raw.parse::<f64>().ok()?;
        (value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15).then_some(value as i64)
    })
}
