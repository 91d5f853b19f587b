//! Error types for the tabwarden worker.

use tabwarden_docstore::DocStoreError;

/// Top-level error type for the worker.
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    /// Remote document API error.
    #[error("document store error: {0}")]
    Store(#[from] DocStoreError),

    /// Local key-value storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Browser capability error (tab query, reload, navigate, script injection).
    #[error("browser error: {0}")]
    Browser(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Block list edit or import error.
    #[error("block list error: {0}")]
    BlockList(#[from] crate::blocklist::BlockListError),

    /// Host bridge protocol error.
    #[error("host error: {0}")]
    Host(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, WardenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_convert() {
        let err: WardenError = DocStoreError::Transport("connection reset".into()).into();
        assert_eq!(
            err.to_string(),
            "document store error: transport error: connection reset"
        );
    }

    #[test]
    fn display_browser() {
        let err = WardenError::Browser("no tab with id 7".into());
        assert_eq!(err.to_string(), "browser error: no tab with id 7");
    }
}
