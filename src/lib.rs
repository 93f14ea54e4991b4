//! DocGen Core - Tabular Ingestion and Batch Document Engine
//!
//! Ingest -> normalize -> generate -> aggregate -> export.
//!
//! 1. Records are normalized once, at ingestion
//! 2. Every document type has one wire shape
//! 3. Derived values are recomputed explicitly, never on read
//! 4. Numbering draws from an injected random source
//! 5. Failures surface as `PipelineError`, never as decoder errors

pub mod records;
pub mod reader;
pub mod numbering;
pub mod config;
pub mod aggregate;
pub mod templates;
pub mod export;
pub mod pipeline;

pub use records::{Record, RecordSet, SourceFile, SourceKind};
pub use config::{ConfigPatch, SessionConfig};
pub use aggregate::{InvoiceTotals, Summary};
pub use templates::{Document, DocumentBody, DocumentMetadata, DocumentType};
pub use export::{ExportArtifact, ExportFormat, Table};
pub use pipeline::{Pipeline, PipelineError};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
