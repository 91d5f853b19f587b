//! Browser tab capability.
//!
//! The worker never talks to a browser directly. Everything it needs from
//! the tab and window APIs goes through [`Browser`].

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Browser-assigned tab identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub i64);

impl std::fmt::Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tab as reported by the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tab {
    /// Tab id. Some tabs (devtools, prerender) have none.
    #[serde(default)]
    pub id: Option<TabId>,
    /// Current URL, absent when the browser withholds it.
    #[serde(default)]
    pub url: Option<String>,
}

/// Tab operations the worker relies on.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Active tab of the focused window.
    async fn active_tab(&self) -> Result<Option<Tab>>;

    /// Look up a tab by id.
    async fn get_tab(&self, tab_id: TabId) -> Result<Option<Tab>>;

    /// Reload a tab.
    async fn reload(&self, tab_id: TabId) -> Result<()>;

    /// Navigate a tab to `url`.
    async fn navigate(&self, tab_id: TabId, url: &str) -> Result<()>;

    /// Show a blocking alert inside the page loaded in a tab.
    async fn show_alert(&self, tab_id: TabId, message: &str) -> Result<()>;
}

/// Returns `true` for URLs starting with `http://` or `https://`.
///
/// Matching is case-sensitive, as used when sampling the active tab.
pub fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Like [`is_http_url`], ignoring ASCII case of the scheme.
pub fn is_http_url_ignore_case(url: &str) -> bool {
    has_prefix_ignore_case(url, "http://") || has_prefix_ignore_case(url, "https://")
}

fn has_prefix_ignore_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}
