//! Client configuration for the remote document API.
//!
//! [`DocStoreConfig`] names the project, database and the single document the
//! worker reads and patches. The API key travels as a `key=` query parameter
//! on every request; anyone holding a copy of the config can read and write
//! the document.

use crate::error::DocStoreError;
use serde::{Deserialize, Serialize};

/// Default REST endpoint of the hosted document API.
pub const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";

/// Location of the remote document and the credential used to reach it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocStoreConfig {
    /// REST endpoint root, without a trailing `/projects/...` segment.
    pub base_url: String,
    /// Project that owns the database.
    pub project_id: String,
    /// Database name inside the project.
    pub database: String,
    /// API key sent as the `key` query parameter.
    pub api_key: String,
    /// Collection holding the status document.
    pub collection: String,
    /// Fixed document id inside `collection`.
    pub document_id: String,
    /// Per-request timeout in seconds. `None` leaves requests unbounded.
    pub timeout_seconds: Option<u64>,
}

impl Default for DocStoreConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            project_id: String::new(),
            database: "(default)".to_owned(),
            api_key: String::new(),
            collection: "workerstatus".to_owned(),
            document_id: "workerstatus".to_owned(),
            timeout_seconds: None,
        }
    }
}

impl std::fmt::Debug for DocStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocStoreConfig")
            .field("base_url", &self.base_url)
            .field("project_id", &self.project_id)
            .field("database", &self.database)
            .field("api_key", &"<redacted>")
            .field("collection", &self.collection)
            .field("document_id", &self.document_id)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl DocStoreConfig {
    /// Create a config for `project_id` authenticated by `api_key`, keeping
    /// every other field at its default.
    pub fn new(project_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Point the client at a different endpoint (used by tests and emulators).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `base_url`, `project_id`, `database`, `api_key`, `collection` and
    ///   `document_id` must not be blank
    /// - `timeout_seconds`, when set, must be greater than 0
    pub fn validate(&self) -> Result<(), DocStoreError> {
        let required = [
            ("base_url", &self.base_url),
            ("project_id", &self.project_id),
            ("database", &self.database),
            ("api_key", &self.api_key),
            ("collection", &self.collection),
            ("document_id", &self.document_id),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(DocStoreError::Config(format!("{name} must not be empty")));
            }
        }
        if self.timeout_seconds == Some(0) {
            return Err(DocStoreError::Config(
                "timeout_seconds must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> DocStoreConfig {
        DocStoreConfig::new("demo-project", "demo-key")
    }

    #[test]
    fn defaults_target_workerstatus_document() {
        let config = DocStoreConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.database, "(default)");
        assert_eq!(config.collection, "workerstatus");
        assert_eq!(config.document_id, "workerstatus");
        assert!(config.timeout_seconds.is_none());
    }

    #[test]
    fn default_config_needs_credentials() {
        let err = DocStoreConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("project_id"));
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn blank_api_key_rejected() {
        let config = DocStoreConfig {
            api_key: "  ".into(),
            ..valid()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("api_key"));
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = DocStoreConfig {
            timeout_seconds: Some(0),
            ..valid()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("timeout_seconds"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let rendered = format!("{:?}", valid());
        assert!(!rendered.contains("demo-key"));
        assert!(rendered.contains("<redacted>"));
    }
}
