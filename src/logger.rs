//! Active-tab activity reporting.
//!
//! Each tick samples the active tab and patches its URL, the identity labels
//! and the current time into the remote status document. Failed writes are
//! queued and retried on a later tick; nothing here ever returns an error to
//! its caller.

use crate::browser::{self, Browser};
use crate::config::IdentityConfig;
use crate::error::Result;
use crate::queue::{DrainReport, FailedLogEntry, FailedLogQueue};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tabwarden_docstore::{Document, DocumentStore, Fields};
use tracing::{debug, error, info, warn};

/// Field holding the last-seen URL.
pub const FIELD_LINK: &str = "link";
/// Field holding the worker identity label.
pub const FIELD_ID: &str = "ID";
/// Field holding the team role label.
pub const FIELD_TEAM_ROLE: &str = "team role";
/// Field holding the time of the last activity write.
pub const FIELD_ACTION_TIMESTAMP: &str = "action_timestamp";

/// Writes the active tab URL to the remote document.
pub struct ActivityLogger {
    store: Arc<dyn DocumentStore>,
    browser: Arc<dyn Browser>,
    queue: Arc<FailedLogQueue>,
    identity: IdentityConfig,
}

impl ActivityLogger {
    /// Create a logger writing through `store` and queueing into `queue`.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        browser: Arc<dyn Browser>,
        queue: Arc<FailedLogQueue>,
        identity: IdentityConfig,
    ) -> Self {
        Self {
            store,
            browser,
            queue,
            identity,
        }
    }

    /// Retry queue this logger feeds.
    pub fn queue(&self) -> &Arc<FailedLogQueue> {
        &self.queue
    }

    /// URL of the active tab, if it is an `http(s)` page.
    ///
    /// Internal pages, local files and the splash page are never sampled.
    pub async fn sample_active_tab(&self) -> Option<String> {
        let tab = match self.browser.active_tab().await {
            Ok(tab) => tab?,
            Err(e) => {
                warn!("active tab query failed: {e}");
                return None;
            }
        };
        let url = tab.url.unwrap_or_default();
        if !browser::is_http_url(&url) {
            debug!(url = %url, "active tab is not an http(s) page");
            return None;
        }
        Some(url)
    }

    /// Field set written for one activity report.
    pub fn build_fields(&self, url: &str, now: DateTime<Utc>) -> Fields {
        Fields::new()
            .with_string(FIELD_LINK, url)
            .with_string(FIELD_ID, self.identity.worker_id.as_str())
            .with_string(FIELD_TEAM_ROLE, self.identity.team_role.as_str())
            .with_timestamp(FIELD_ACTION_TIMESTAMP, now)
    }

    /// Write `url` once with a fresh timestamp. Does not queue on failure.
    ///
    /// # Errors
    ///
    /// Returns the document store error of the failed write.
    pub async fn write_url(&self, url: &str) -> Result<Document> {
        let fields = self.build_fields(url, Utc::now());
        let doc = self.store.patch_fields(&fields).await?;
        info!(
            document = doc.name.as_deref().unwrap_or("<unnamed>"),
            "updated status document"
        );
        Ok(doc)
    }

    /// Write `url`, queueing it for retry on failure.
    ///
    /// Returns `true` when the write reached the remote store.
    pub async fn log_url(&self, url: &str) -> bool {
        match self.write_url(url).await {
            Ok(_) => true,
            Err(e) => {
                error!(url = %url, "activity report failed: {e}");
                if let Err(qe) = self.queue.enqueue(FailedLogEntry::now(url, &e)).await {
                    error!(url = %url, "cannot queue failed activity report: {qe}");
                }
                false
            }
        }
    }

    /// Sample the active tab and report it.
    pub async fn log_current_tab(&self) {
        if let Some(url) = self.sample_active_tab().await {
            self.log_url(&url).await;
        }
    }

    /// Retry every queued report once.
    ///
    /// Retries are written with the current time and identity labels, not
    /// the values of the original attempt.
    pub async fn retry_failed(&self) -> DrainReport {
        let result = self
            .queue
            .drain_and_retry(|url| async move {
                match self.write_url(&url).await {
                    Ok(_) => true,
                    Err(e) => {
                        debug!(url = %url, "retry still failing: {e}");
                        false
                    }
                }
            })
            .await;

        match result {
            Ok(report) => {
                if report.attempted > 0 {
                    info!(
                        attempted = report.attempted,
                        remaining = report.remaining,
                        "retry done"
                    );
                }
                report
            }
            Err(e) => {
                error!("retry queue unavailable: {e}");
                DrainReport::default()
            }
        }
    }
}
