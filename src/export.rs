//! Export Serializer - JSON and styled spreadsheet artifacts
//!
//! Filenames follow `export_<YYYY-MM-DD>_<identifier>.<ext>` where the date
//! is the day of serialization, not the document's issue date.

use chrono::NaiveDate;
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, FormatPattern, Workbook, Worksheet, XlsxError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::pipeline::PipelineError;
use crate::records::{Record, RecordSet};
use crate::templates::Document;

pub const SHEET_NAME: &str = "Data";
pub const MIN_COLUMN_WIDTH: usize = 10;
pub const MAX_COLUMN_WIDTH: usize = 50;
const HEADER_FILL: u32 = 0x0070C0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Xlsx,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Xlsx => "xlsx",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "xlsx" | "excel" => Ok(Self::Xlsx),
            other => Err(format!("unknown export format: {other}")),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub filename: String,
    pub format: ExportFormat,
    pub bytes: Vec<u8>,
}

/// Header row plus one record per data row. Every header is a column,
/// even when no row carries a value for it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Record>,
}

impl From<&RecordSet> for Table {
    fn from(set: &RecordSet) -> Self {
        Self {
            headers: set.headers.clone(),
            rows: set.records.clone(),
        }
    }
}

pub fn export_filename(date: NaiveDate, identifier: &str, format: ExportFormat) -> String {
    let identifier: String = identifier
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("export_{}_{}.{}", date.format("%Y-%m-%d"), identifier, format.extension())
}

/// Render `document` as `format`. The spreadsheet carries the record set the
/// document was generated from; `today` names the file.
pub fn serialize(
    document: &Document,
    records: &RecordSet,
    format: ExportFormat,
    today: NaiveDate,
) -> Result<ExportArtifact, PipelineError> {
    let bytes = match format {
        ExportFormat::Json => to_json(document)?,
        ExportFormat::Xlsx => to_xlsx(&Table::from(records))?,
    };

    Ok(ExportArtifact {
        filename: export_filename(today, document.identifier(), format),
        format,
        bytes,
    })
}

/// Pretty JSON with two-space indentation.
pub fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, PipelineError> {
    serde_json::to_vec_pretty(value).map_err(|e| PipelineError::ExportFailed(e.to_string()))
}

/// Single `Data` sheet: styled frozen header row, bordered data rows,
/// objects and arrays flattened to JSON text.
pub fn to_xlsx(table: &Table) -> Result<Vec<u8>, PipelineError> {
    build_workbook(table).map_err(|e| PipelineError::ExportFailed(format!("Failed to generate Excel file: {e}")))
}

fn build_workbook(table: &Table) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    let header_format = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_pattern(FormatPattern::Solid)
        .set_background_color(Color::RGB(HEADER_FILL))
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter)
        .set_border(FormatBorder::Thin);
    let cell_format = Format::new().set_border(FormatBorder::Thin);

    let mut widths = vec![0usize; table.headers.len()];

    for (col, header) in table.headers.iter().enumerate() {
        worksheet.write_string_with_format(0, column(col)?, header, &header_format)?;
        widths[col] = rendered_width(header);
    }

    for (i, record) in table.rows.iter().enumerate() {
        let row = u32::try_from(i + 1).map_err(|_| XlsxError::RowColumnLimitError)?;
        for (col, header) in table.headers.iter().enumerate() {
            let value = record.get(header).unwrap_or(&Value::Null);
            write_cell(worksheet, row, column(col)?, value, &cell_format)?;
            widths[col] = widths[col].max(rendered_width(&render(value)));
        }
    }

    for (col, width) in widths.into_iter().enumerate() {
        worksheet.set_column_width(column(col)?, column_width(width) as f64)?;
    }
    if !table.headers.is_empty() {
        worksheet.set_freeze_panes(1, 0)?;
    }

    let bytes = workbook.save_to_buffer()?;
    debug!(rows = table.rows.len(), columns = table.headers.len(), bytes = bytes.len(), "built workbook");
    Ok(bytes)
}

fn column(index: usize) -> Result<u16, XlsxError> {
    u16::try_from(index).map_err(|_| XlsxError::RowColumnLimitError)
}

fn write_cell(worksheet: &mut Worksheet, row: u32, col: u16, value: &Value, format: &Format) -> Result<(), XlsxError> {
    match value {
        Value::Null => worksheet.write_blank(row, col, format)?,
        Value::Bool(b) => worksheet.write_boolean_with_format(row, col, *b, format)?,
        Value::Number(n) => match n.as_f64() {
            Some(f) => worksheet.write_number_with_format(row, col, f, format)?,
            None => worksheet.write_string_with_format(row, col, n.to_string(), format)?,
        },
        Value::String(s) => worksheet.write_string_with_format(row, col, s, format)?,
        Value::Array(_) | Value::Object(_) => worksheet.write_string_with_format(row, col, value.to_string(), format)?,
    };
    Ok(())
}

/// Text a cell displays.
pub fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Blank cells count as the minimum width.
fn rendered_width(text: &str) -> usize {
    match text.chars().count() {
        0 => MIN_COLUMN_WIDTH,
        n => n,
    }
}

/// Longest rendered value plus padding, clamped to `[10, 50]`.
pub fn column_width(longest: usize) -> usize {
    (longest + 2).clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH)
}

/// Write `artifact` into `dir`, creating it if needed.
pub async fn save(artifact: &ExportArtifact, dir: &Path) -> Result<PathBuf, PipelineError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| PipelineError::ExportFailed(format!("{}: {e}", dir.display())))?;
    let path = dir.join(&artifact.filename);
    tokio::fs::write(&path, &artifact.bytes)
        .await
        .map_err(|e| PipelineError::ExportFailed(format!("{}: {e}", path.display())))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::decode_workbook;
    use crate::records::SourceKind;
    use serde_json::json;

    fn table(v: Value) -> Table {
        let set = RecordSet::from_records(SourceKind::Json, serde_json::from_value(v).unwrap());
        Table::from(&set)
    }

    #[test]
    fn test_filename_convention() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(
            export_filename(date, "070325R000042", ExportFormat::Json),
            "export_2025-03-07_070325R000042.json"
        );
        assert_eq!(
            export_filename(date, "a/b c", ExportFormat::Xlsx),
            "export_2025-03-07_a_b_c.xlsx"
        );
    }

    #[test]
    fn test_column_width_clamped() {
        assert_eq!(column_width(0), 10);
        assert_eq!(column_width(8), 10);
        assert_eq!(column_width(20), 22);
        assert_eq!(column_width(400), 50);
    }

    #[test]
    fn test_json_is_two_space_pretty() {
        let bytes = to_json(&json!({"a": [1]})).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "{\n  \"a\": [\n    1\n  ]\n}");
    }

    #[test]
    fn test_xlsx_reads_back_with_flattened_objects() {
        let bytes = to_xlsx(&table(json!([
            {"code": "A1", "qty": 2, "meta": {"k": "v"}},
            {"code": "B2", "extra": null}
        ])))
        .unwrap();

        let set = decode_workbook(bytes).unwrap();
        assert_eq!(set.headers, vec!["code", "qty", "meta", "extra"]);
        assert_eq!(set.records[0]["qty"], json!(2));
        assert_eq!(set.records[0]["meta"], json!("{\"k\":\"v\"}"));
        assert_eq!(set.records[1]["code"], json!("B2"));
        assert!(!set.records[1].contains_key("qty"));
    }

    #[test]
    fn test_xlsx_keeps_headers_without_values() {
        let set = RecordSet::with_header_seed(SourceKind::Tabular, vec!["code".into(), "note".into()], Vec::new());
        let bytes = to_xlsx(&Table::from(&set)).unwrap();

        let reread = decode_workbook(bytes).unwrap();
        assert_eq!(reread.headers, vec!["code", "note"]);
        assert!(reread.records.is_empty());
    }

    #[test]
    fn test_xlsx_empty_table() {
        let bytes = to_xlsx(&Table::default()).unwrap();
        let set = decode_workbook(bytes).unwrap();
        assert!(set.headers.is_empty());
    }

    #[tokio::test]
    async fn test_save_writes_into_dir() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = ExportArtifact {
            filename: "export_2025-03-07_x.json".into(),
            format: ExportFormat::Json,
            bytes: b"{}".to_vec(),
        };
        let path = save(&artifact, &dir.path().join("out")).await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"{}");
    }
}
