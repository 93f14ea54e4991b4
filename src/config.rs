//! Session configuration
//!
//! Values the presentation layer supplies, with the defaults the batch
//! formats expect. Numbering fields left empty are filled by the generator.

use chrono::NaiveDate;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::numbering::{app_doc_no, sender_doc_no, DEFAULT_APP_PREFIX};
use crate::pipeline::PipelineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Document-type name written into the generated payload.
    #[serde(alias = "documentType")]
    pub json_name: String,
    pub source_system: String,
    pub sender_doc_no: String,
    pub fast_seq_no: String,
    pub doc_no_app: String,
    pub doc_no_app_prefix: String,
    /// Requester identifier on forwarding batches.
    pub user_nik: String,
    /// Numeric field summed into batch totals.
    pub amount_field: String,
    /// Record field that may carry an explicit application doc number.
    pub doc_no_app_field: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            json_name: "MASTER".to_string(),
            source_system: "AMAN".to_string(),
            sender_doc_no: String::new(),
            fast_seq_no: "1".to_string(),
            doc_no_app: String::new(),
            doc_no_app_prefix: DEFAULT_APP_PREFIX.to_string(),
            user_nik: "1000082742".to_string(),
            amount_field: "AIT_AMOUNT1".to_string(),
            doc_no_app_field: "docNoApp".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))
    }

    /// Generate any numbering field that is still empty. Set values are kept.
    pub fn fill_numbering<R: Rng + ?Sized>(&mut self, date: NaiveDate, rng: &mut R) {
        if self.sender_doc_no.trim().is_empty() {
            self.sender_doc_no = sender_doc_no(date, rng);
        }
        if self.doc_no_app.trim().is_empty() {
            self.doc_no_app = app_doc_no(date, &self.doc_no_app_prefix, rng);
        }
    }

    pub fn apply(&mut self, patch: ConfigPatch) {
        let ConfigPatch {
            json_name,
            source_system,
            sender_doc_no,
            fast_seq_no,
            doc_no_app,
            doc_no_app_prefix,
            user_nik,
            amount_field,
            doc_no_app_field,
        } = patch;

        let fields = [
            (json_name, &mut self.json_name),
            (source_system, &mut self.source_system),
            (sender_doc_no, &mut self.sender_doc_no),
            (fast_seq_no, &mut self.fast_seq_no),
            (doc_no_app, &mut self.doc_no_app),
            (doc_no_app_prefix, &mut self.doc_no_app_prefix),
            (user_nik, &mut self.user_nik),
            (amount_field, &mut self.amount_field),
            (doc_no_app_field, &mut self.doc_no_app_field),
        ];
        for (value, slot) in fields {
            if let Some(value) = value {
                *slot = value;
            }
        }
    }
}

/// Partial update for [`SessionConfig`]. `None` leaves a field alone; an
/// empty numbering field is regenerated on the next fill.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigPatch {
    #[serde(alias = "documentType")]
    pub json_name: Option<String>,
    pub source_system: Option<String>,
    pub sender_doc_no: Option<String>,
    pub fast_seq_no: Option<String>,
    pub doc_no_app: Option<String>,
    pub doc_no_app_prefix: Option<String>,
    pub user_nik: Option<String>,
    pub amount_field: Option<String>,
    pub doc_no_app_field: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()
    }

    #[test]
    fn test_defaults_match_batch_formats() {
        let config = SessionConfig::default();
        assert_eq!(config.json_name, "MASTER");
        assert_eq!(config.source_system, "AMAN");
        assert_eq!(config.fast_seq_no, "1");
        assert_eq!(config.amount_field, "AIT_AMOUNT1");
    }

    #[test]
    fn test_fill_numbering_only_touches_empty_fields() {
        let mut config = SessionConfig {
            sender_doc_no: "310125R000001".into(),
            ..Default::default()
        };
        config.fill_numbering(date(), &mut StdRng::seed_from_u64(3));
        assert_eq!(config.sender_doc_no, "310125R000001");
        assert!(config.doc_no_app.starts_with("25J"));
    }

    #[test]
    fn test_patch_merges_and_clears() {
        let mut config = SessionConfig::default();
        config.fill_numbering(date(), &mut StdRng::seed_from_u64(3));
        let app = config.doc_no_app.clone();

        config.apply(ConfigPatch {
            source_system: Some("BRIS".into()),
            sender_doc_no: Some(String::new()),
            ..Default::default()
        });
        assert_eq!(config.source_system, "BRIS");
        assert_eq!(config.json_name, "MASTER");
        assert!(config.sender_doc_no.is_empty());

        config.fill_numbering(date(), &mut StdRng::seed_from_u64(4));
        assert!(config.sender_doc_no.starts_with("310125R"));
        assert_eq!(config.doc_no_app, app);
    }

    #[test]
    fn test_json_accepts_document_type_alias() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"documentType":"PAYROLL","userNik":"42"}"#).unwrap();
        assert_eq!(config.json_name, "PAYROLL");
        assert_eq!(config.user_nik, "42");
        assert_eq!(config.source_system, "AMAN");
    }

    #[test]
    fn test_from_json_file_reports_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{ nope").unwrap();
        let err = SessionConfig::from_json_file(&path).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
