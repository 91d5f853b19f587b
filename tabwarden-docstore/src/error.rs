//! Error types for the tabwarden-docstore crate.
//!
//! Messages carry the HTTP status and response body where one exists. The
//! API key never appears in an error message.

/// Errors that can occur while talking to the remote document API.
#[derive(Debug, thiserror::Error)]
pub enum DocStoreError {
    /// The request never produced an HTTP response (DNS, connect, TLS, reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// The document (or its parent path) does not exist.
    #[error("document not found: {0}")]
    NotFound(String),

    /// Any other non-success HTTP response.
    #[error("document API returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body, as returned by the server.
        body: String,
    },

    /// The response body could not be decoded as a document.
    #[error("decode error: {0}")]
    Decode(String),

    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl DocStoreError {
    /// Returns `true` for the 404 response that triggers create-on-patch.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// HTTP status code carried by this error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound(_) => Some(404),
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Convenience type alias for tabwarden-docstore results.
pub type Result<T> = std::result::Result<T, DocStoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_status_includes_code_and_body() {
        let err = DocStoreError::Status {
            status: 403,
            body: "permission denied".into(),
        };
        assert_eq!(
            err.to_string(),
            "document API returned HTTP 403: permission denied"
        );
    }

    #[test]
    fn display_transport() {
        let err = DocStoreError::Transport("connection refused".into());
        assert_eq!(err.to_string(), "transport error: connection refused");
    }

    #[test]
    fn not_found_is_distinguished() {
        assert!(DocStoreError::NotFound("missing".into()).is_not_found());
        assert!(
            !DocStoreError::Status {
                status: 500,
                body: String::new()
            }
            .is_not_found()
        );
        assert!(!DocStoreError::Transport("x".into()).is_not_found());
    }

    #[test]
    fn status_code_accessor() {
        assert_eq!(DocStoreError::NotFound(String::new()).status(), Some(404));
        assert_eq!(
            DocStoreError::Status {
                status: 503,
                body: String::new()
            }
            .status(),
            Some(503)
        );
        assert_eq!(DocStoreError::Decode("bad".into()).status(), None);
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DocStoreError>();
    }
}
