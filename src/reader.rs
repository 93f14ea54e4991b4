//! Source Reader - spreadsheet and JSON decoding
//!
//! Turns the bytes of one user-selected file into a [`RecordSet`]. Decoder
//! errors never escape raw; they become [`PipelineError::InvalidFormat`].

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use chrono::Timelike;
use serde_json::{Number, Value};
use std::io::Cursor;
use tracing::debug;

use crate::aggregate::MAX_EXACT_INTEGER;
use crate::pipeline::PipelineError;
use crate::records::{Record, RecordSet, SourceFile, SourceKind};

/// Cell literal that stands for a null value in exported spreadsheets.
pub const NULL_LITERAL: &str = "NULL";

/// Decode `file` as `kind`.
///
/// Workbook decoding is CPU bound; the bytes move onto the blocking pool.
pub async fn read(file: SourceFile, kind: SourceKind) -> Result<RecordSet, PipelineError> {
    let SourceFile { name, bytes } = file;
    let set = match kind {
        SourceKind::Json => decode_json(&bytes)?,
        SourceKind::Tabular => tokio::task::spawn_blocking(move || decode_workbook(bytes))
            .await
            .map_err(|e| PipelineError::InvalidFormat(format!("workbook decode aborted: {e}")))??,
    };

    debug!(
        file = %name,
        kind = %kind,
        records = set.len(),
        headers = set.headers.len(),
        "decoded source file"
    );
    Ok(set)
}

/// Parse a JSON document: an array of objects, or a single object.
pub fn decode_json(bytes: &[u8]) -> Result<RecordSet, PipelineError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| PipelineError::InvalidFormat(format!("Invalid JSON file format: {e}")))?;

    let records = match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(map) => Ok(map),
                other => Err(PipelineError::InvalidFormat(format!(
                    "element {i} is {}, expected an object",
                    json_type_name(&other)
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Value::Object(map) => vec![map],
        other => {
            return Err(PipelineError::InvalidFormat(format!(
                "top-level JSON value is {}, expected an object or array",
                json_type_name(&other)
            )))
        }
    };

    Ok(RecordSet::from_records(SourceKind::Json, records))
}

/// Decode the first worksheet of a workbook (xlsx, xls, xlsb or ods).
pub fn decode_workbook(bytes: Vec<u8>) -> Result<RecordSet, PipelineError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| PipelineError::InvalidFormat(format!("unreadable workbook: {e}")))?;

    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range.map_err(|e| PipelineError::InvalidFormat(format!("unreadable worksheet: {e}")))?,
        None => return Ok(RecordSet::empty(SourceKind::Tabular)),
    };

    records_from_range(&range)
}

/// Row 1 names the columns; each later row with a value under a named
/// column becomes one record. A sheet with data but no row 1 is rejected.
fn records_from_range(range: &Range<Data>) -> Result<RecordSet, PipelineError> {
    let Some((first_row, first_col)) = range.start() else {
        return Ok(RecordSet::empty(SourceKind::Tabular));
    };
    if first_row != 0 {
        return Err(PipelineError::InvalidFormat(format!(
            "missing header row: first non-empty row is {}",
            first_row + 1
        )));
    }

    // Column slots indexed from column A. Blank header cells stay `None`.
    let mut slots: Vec<Option<String>> = vec![None; first_col as usize + range.width()];
    let mut rows = range.rows();
    if let Some(header_row) = rows.next() {
        for (offset, cell) in header_row.iter().enumerate() {
            slots[first_col as usize + offset] = header_name(cell);
        }
    }

    let mut records = Vec::new();
    for row in rows {
        let mut record = Record::new();
        for (offset, cell) in row.iter().enumerate() {
            if matches!(cell, Data::Empty) {
                continue;
            }
            if let Some(Some(name)) = slots.get(first_col as usize + offset) {
                record.insert(name.clone(), cell_value(cell));
            }
        }
        if !record.is_empty() {
            records.push(record);
        }
    }

    let seed = slots.into_iter().flatten().collect();
    Ok(RecordSet::with_header_seed(SourceKind::Tabular, seed, records))
}

fn header_name(cell: &Data) -> Option<String> {
    let name = match cell {
        Data::Empty => return None,
        Data::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    (!name.is_empty()).then_some(name)
}

/// Convert one cell. The `NULL` literal becomes JSON null.
fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) if s == NULL_LITERAL => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => float_value(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) if naive.time().num_seconds_from_midnight() == 0 => {
                Value::String(naive.date().format("%Y-%m-%d").to_string())
            }
            Some(naive) => Value::String(naive.format("%Y-%m-%dT%H:%M:%S").to_string()),
            None => float_value(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
        Data::Error(e) => Value::String(format!("#{e:?}")),
    }
}

/// Whole floats (the common case for spreadsheet numbers) become integers.
fn float_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < MAX_EXACT_INTEGER {
        Value::from(f as i64)
    } else {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
