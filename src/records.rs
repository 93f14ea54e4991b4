//! Canonical Record Model
//!
//! Every ingested file, spreadsheet or JSON, lands here as an ordered list of
//! key/value records plus the first-seen union of their keys.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// One input row or object. Key order is insertion order.
pub type Record = Map<String, Value>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Spreadsheet workbook, first worksheet only.
    #[default]
    Tabular,
    Json,
}

impl SourceKind {
    /// Guess the kind from a file extension. `None` when the extension is unknown.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Some(Self::Tabular),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EXCEL" | "XLSX" | "TABULAR" => Ok(Self::Tabular),
            "JSON" => Ok(Self::Json),
            other => Err(format!("unknown file kind: {other}")),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tabular => f.write_str("excel"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Raw bytes of a user-selected file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk without blocking the runtime.
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { name, bytes })
    }
}

/// Normalized result of one ingestion.
///
/// `headers` only ever grows while records are scanned; every record's keys
/// are contained in it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSet {
    pub source_kind: SourceKind,
    pub headers: Vec<String>,
    pub records: Vec<Record>,
}

impl RecordSet {
    /// Build a record set whose headers are the union of keys across `records`.
    pub fn from_records(source_kind: SourceKind, records: Vec<Record>) -> Self {
        Self::with_header_seed(source_kind, Vec::new(), records)
    }

    /// Like [`RecordSet::from_records`], but `seed` headers come first even if
    /// no record carries them (a header-only worksheet).
    pub fn with_header_seed(source_kind: SourceKind, seed: Vec<String>, records: Vec<Record>) -> Self {
        let headers = union_headers(seed, &records);
        Self {
            source_kind,
            headers,
            records,
        }
    }

    pub fn empty(source_kind: SourceKind) -> Self {
        Self {
            source_kind,
            headers: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// First-seen ordered union of `seed` and every key of every record.
pub fn union_headers(seed: Vec<String>, records: &[Record]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut headers = Vec::with_capacity(seed.len());

    let keys = seed
        .into_iter()
        .chain(records.iter().flat_map(|r| r.keys().cloned()));
    for key in keys {
        if seen.insert(key.clone()) {
            headers.push(key);
        }
    }
    headers
}
