//! Pipeline Orchestrator - Single Session Entry Point
//!
//! Owns the session: selected file kind, current record set, configuration,
//! derived summary and the current document. Ingest and export are gated by
//! one processing flag; a second gated call while one is in flight fails
//! with `Busy` instead of interleaving.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{info, warn};

use crate::aggregate::Summary;
use crate::config::{ConfigPatch, SessionConfig};
use crate::export::{self, ExportArtifact, ExportFormat};
use crate::reader;
use crate::records::{RecordSet, SourceFile, SourceKind};
use crate::templates::{self, Document, DocumentType};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("No file selected")]
    NoFileSelected,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported template: {0}")]
    UnsupportedTemplate(String),

    #[error("Export failed: {0}")]
    ExportFailed(String),

    #[error("Another operation is already in progress")]
    Busy,

    #[error("Configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Default)]
struct SessionState {
    file_kind: SourceKind,
    file_name: Option<String>,
    records: Option<Arc<RecordSet>>,
    config: SessionConfig,
    summary: Summary,
    document_type: Option<DocumentType>,
    document: Option<Arc<Document>>,
    last_error: Option<PipelineError>,
}

impl SessionState {
    /// Recompute everything derived from records and configuration.
    fn refresh(&mut self) {
        let Some(records) = self.records.clone() else {
            self.summary = Summary::default();
            self.document = None;
            return;
        };
        self.summary = Summary::compute(&records.records, &self.config);
        self.document = self
            .document_type
            .map(|t| Arc::new(templates::generate(t, &self.config, &records, Utc::now())));
    }

    fn discard_file(&mut self) {
        self.file_name = None;
        self.records = None;
        self.refresh();
    }
}

/// Clears the processing flag when dropped, on every exit path.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The session object the presentation layer drives.
pub struct Pipeline {
    state: RwLock<SessionState>,
    processing: AtomicBool,
    rng: Mutex<StdRng>,
}

impl Pipeline {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Session with a caller-chosen random source, for reproducible numbering.
    pub fn with_rng(mut config: SessionConfig, mut rng: StdRng) -> Self {
        config.fill_numbering(Utc::now().date_naive(), &mut rng);
        Self {
            state: RwLock::new(SessionState {
                config,
                ..Default::default()
            }),
            processing: AtomicBool::new(false),
            rng: Mutex::new(rng),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) -> Result<ProcessingGuard<'_>, PipelineError> {
        self.processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ProcessingGuard(&self.processing))
            .map_err(|_| PipelineError::Busy)
    }

    /// Record a failure as the session's last error.
    fn settle<T>(&self, operation: &'static str, result: Result<T, PipelineError>) -> Result<T, PipelineError> {
        if let Err(e) = &result {
            warn!(operation, error = %e, "operation failed");
            self.write().last_error = Some(e.clone());
        }
        result
    }

    // ── Operations ──────────────────────────────────────────

    /// Choose how the next file is decoded. Discards the current file.
    pub fn select_file_kind(&self, kind: SourceKind) {
        let mut state = self.write();
        if state.file_kind != kind {
            state.file_kind = kind;
            state.discard_file();
        }
    }

    /// Decode `file` and make it the current record set.
    pub async fn ingest(&self, file: Option<SourceFile>) -> Result<Arc<RecordSet>, PipelineError> {
        let result = self.ingest_inner(file).await;
        self.settle("ingest", result)
    }

    async fn ingest_inner(&self, file: Option<SourceFile>) -> Result<Arc<RecordSet>, PipelineError> {
        let _guard = self.begin()?;

        let kind = {
            let mut state = self.write();
            state.last_error = None;
            state.discard_file();
            state.file_kind
        };

        let file = file.ok_or(PipelineError::NoFileSelected)?;
        let file_name = file.name.clone();
        let records = Arc::new(reader::read(file, kind).await?);

        let mut state = self.write();
        state.file_name = Some(file_name.clone());
        state.records = Some(Arc::clone(&records));
        state.refresh();

        info!(
            file = %file_name,
            kind = %kind,
            records = records.len(),
            headers = records.headers.len(),
            "ingested file"
        );
        Ok(records)
    }

    /// Merge `patch` into the configuration, regenerate numbering fields that
    /// ended up empty, then recompute derived state.
    pub fn configure(&self, patch: ConfigPatch) -> SessionConfig {
        let mut state = self.write();
        state.config.apply(patch);
        {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            state.config.fill_numbering(Utc::now().date_naive(), &mut *rng);
        }
        state.refresh();
        state.config.clone()
    }

    /// Generate the document for `selector` and make it current.
    pub fn generate(&self, selector: &str) -> Result<Arc<Document>, PipelineError> {
        let result = selector
            .parse::<DocumentType>()
            .and_then(|document_type| self.generate_inner(document_type));
        self.settle("generate", result)
    }

    pub fn generate_type(&self, document_type: DocumentType) -> Result<Arc<Document>, PipelineError> {
        let result = self.generate_inner(document_type);
        self.settle("generate", result)
    }

    fn generate_inner(&self, document_type: DocumentType) -> Result<Arc<Document>, PipelineError> {
        let mut state = self.write();
        state.last_error = None;
        let records = state.records.clone().ok_or(PipelineError::NoFileSelected)?;

        let document = Arc::new(templates::generate(document_type, &state.config, &records, Utc::now()));
        state.document_type = Some(document_type);
        state.document = Some(Arc::clone(&document));

        info!(
            document_type = %document_type,
            document_number = %document.identifier(),
            records = records.len(),
            "generated document"
        );
        Ok(document)
    }

    /// Serialize the current document without saving it.
    pub async fn render(&self, format: ExportFormat) -> Result<ExportArtifact, PipelineError> {
        let result = async {
            let _guard = self.begin()?;
            self.render_inner(format).await
        }
        .await;
        self.settle("render", result)
    }

    /// Serialize the current document and save it into `dir`.
    pub async fn export_as(&self, format: ExportFormat, dir: &Path) -> Result<PathBuf, PipelineError> {
        let result = async {
            let _guard = self.begin()?;
            let artifact = self.render_inner(format).await?;
            let path = export::save(&artifact, dir).await?;
            info!(path = %path.display(), bytes = artifact.bytes.len(), "exported document");
            Ok(path)
        }
        .await;
        self.settle("export", result)
    }

    async fn render_inner(&self, format: ExportFormat) -> Result<ExportArtifact, PipelineError> {
        let (document, records) = {
            let mut state = self.write();
            state.last_error = None;
            let records = state.records.clone().ok_or(PipelineError::NoFileSelected)?;
            let document = state
                .document
                .clone()
                .ok_or_else(|| PipelineError::ExportFailed("no document has been generated".into()))?;
            (document, records)
        };

        let today = Utc::now().date_naive();
        tokio::task::spawn_blocking(move || export::serialize(&document, &records, format, today))
            .await
            .map_err(|e| PipelineError::ExportFailed(e.to_string()))?
    }

    /// Pretty JSON of the current document, if any.
    pub fn preview(&self) -> Option<String> {
        let document = self.read().document.clone()?;
        export::to_json(document.as_ref())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
    }

    /// Drop the file, records, document and error. Configuration is kept.
    pub fn reset(&self) {
        let mut state = self.write();
        state.document_type = None;
        state.last_error = None;
        state.discard_file();
    }

    // ── Observers ───────────────────────────────────────────

    pub fn file_kind(&self) -> SourceKind {
        self.read().file_kind
    }

    pub fn file_name(&self) -> Option<String> {
        self.read().file_name.clone()
    }

    pub fn records(&self) -> Option<Arc<RecordSet>> {
        self.read().records.clone()
    }

    pub fn config(&self) -> SessionConfig {
        self.read().config.clone()
    }

    pub fn summary(&self) -> Summary {
        self.read().summary.clone()
    }

    pub fn document(&self) -> Option<Arc<Document>> {
        self.read().document.clone()
    }

    pub fn last_error(&self) -> Option<PipelineError> {
        self.read().last_error.clone()
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
