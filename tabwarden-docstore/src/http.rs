//! Shared HTTP client for document API requests.

use crate::config::DocStoreConfig;
use crate::error::DocStoreError;
use std::time::Duration;

/// User-Agent sent with every request.
const USER_AGENT: &str = concat!("tabwarden/", env!("CARGO_PKG_VERSION"));

/// Build a [`reqwest::Client`] for the document API.
///
/// No timeout is applied unless `timeout_seconds` is configured; a hung
/// request stalls only the task that issued it.
///
/// # Errors
///
/// Returns [`DocStoreError::Config`] if the client cannot be constructed.
pub fn build_client(config: &DocStoreConfig) -> Result<reqwest::Client, DocStoreError> {
    let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
    if let Some(secs) = config.timeout_seconds {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder
        .build()
        .map_err(|e| DocStoreError::Config(format!("failed to build HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_client_without_timeout() {
        let config = DocStoreConfig::new("p", "k");
        assert!(build_client(&config).is_ok());
    }

    #[test]
    fn build_client_with_timeout() {
        let config = DocStoreConfig {
            timeout_seconds: Some(5),
            ..DocStoreConfig::new("p", "k")
        };
        assert!(build_client(&config).is_ok());
    }

    #[test]
    fn user_agent_names_crate() {
        assert!(USER_AGENT.starts_with("tabwarden/"));
    }
}
