//! Categorized list of blocked sites, managed from the admin tool.
//!
//! Entries are normalized URL prefixes (`https://www.example.com/path`,
//! lowercase host, no trailing slash). The whole list is stored as one JSON
//! object mapping category name to entries, and its entries feed
//! [`EnforcementConfig::blocked_prefixes`](crate::config::EnforcementConfig).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Errors from editing a [`BlockList`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockListError {
    /// Input is not a URL or bare domain with a host.
    #[error("not a valid URL or domain: '{0}'")]
    Invalid(String),

    /// The normalized URL is already listed, in any category.
    #[error("already in the block list: {0}")]
    Duplicate(String),

    /// No category with that name.
    #[error("unknown category '{0}'")]
    UnknownCategory(String),

    /// Imported document is not an object of string arrays.
    #[error("invalid block list format: {0}")]
    Format(String),
}

/// Normalize a URL or bare domain for the block list.
///
/// Adds `https://` when no scheme is given, lowercases the host, keeps an
/// explicit port, drops query and fragment, and strips trailing slashes from
/// the path. Returns `None` for blank input or input without a host.
pub fn normalize_url(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_owned()
    } else {
        format!("https://{trimmed}")
    };
    let parsed = url::Url::parse(&candidate).ok()?;
    let host = parsed.host_str().filter(|h| !h.is_empty())?;
    let port = parsed.port().map(|p| format!(":{p}")).unwrap_or_default();
    let path = parsed.path().trim_end_matches('/');
    Some(format!("{}://{host}{port}{path}", parsed.scheme()))
}

/// Blocked URL prefixes grouped by category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockList {
    categories: BTreeMap<String, Vec<String>>,
}

impl Default for BlockList {
    fn default() -> Self {
        let seed: [(&str, &[&str]); 4] = [
            (
                "Gambling",
                &[
                    "https://www.bet365.com",
                    "https://www.draftkings.com",
                    "https://www.fanduel.com",
                ],
            ),
            (
                "Adult Content",
                &[
                    "https://www.pornhub.com",
                    "https://www.xvideos.com",
                    "https://www.xnxx.com",
                ],
            ),
            (
                "Social Media",
                &[
                    "https://www.facebook.com",
                    "https://www.instagram.com",
                    "https://www.tiktok.com",
                    "https://www.snapchat.com",
                    "https://www.reddit.com",
                    "https://www.x.com",
                    "https://www.twitter.com",
                ],
            ),
            (
                "Shopping",
                &[
                    "https://www.amazon.com",
                    "https://www.ebay.com",
                    "https://www.alibaba.com",
                    "https://www.shein.com",
                    "https://www.temu.com",
                ],
            ),
        ];
        Self {
            categories: seed
                .iter()
                .map(|(name, urls)| {
                    (
                        (*name).to_owned(),
                        urls.iter().map(|u| (*u).to_owned()).collect(),
                    )
                })
                .collect(),
        }
    }
}

impl BlockList {
    /// Category names in sorted order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    /// Entries of one category.
    pub fn entries(&self, category: &str) -> Option<&[String]> {
        self.categories.get(category).map(Vec::as_slice)
    }

    /// Returns `true` when `url` is listed in any category.
    pub fn contains(&self, url: &str) -> bool {
        self.categories.values().any(|urls| urls.iter().any(|u| u == url))
    }

    /// Every entry across all categories, deduplicated, in category order.
    pub fn prefixes(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for url in self.categories.values().flatten() {
            if !out.contains(url) {
                out.push(url.clone());
            }
        }
        out
    }

    /// Normalize `raw` and append it to `category`. Returns the stored form.
    ///
    /// # Errors
    ///
    /// Rejects unknown categories, invalid input and entries already
    /// listed anywhere.
    pub fn add(&mut self, category: &str, raw: &str) -> Result<String, BlockListError> {
        if !self.categories.contains_key(category) {
            return Err(BlockListError::UnknownCategory(category.to_owned()));
        }
        let url = normalize_url(raw).ok_or_else(|| BlockListError::Invalid(raw.to_owned()))?;
        if self.contains(&url) {
            return Err(BlockListError::Duplicate(url));
        }
        debug!(category, url = %url, "added block list entry");
        self.categories
            .entry(category.to_owned())
            .or_default()
            .push(url.clone());
        Ok(url)
    }

    /// Remove `url` from `category`. Returns `false` when it was not there.
    pub fn remove(&mut self, category: &str, url: &str) -> bool {
        let Some(urls) = self.categories.get_mut(category) else {
            return false;
        };
        let before = urls.len();
        urls.retain(|u| u != url);
        urls.len() != before
    }

    /// Move `urls` from one category to another. Entries missing from
    /// `from` are skipped; entries already in `to` are not duplicated.
    /// Returns how many entries left `from`.
    ///
    /// # Errors
    ///
    /// Rejects unknown categories.
    pub fn move_urls(&mut self, from: &str, to: &str, urls: &[String]) -> Result<usize, BlockListError> {
        for name in [from, to] {
            if !self.categories.contains_key(name) {
                return Err(BlockListError::UnknownCategory(name.to_owned()));
            }
        }
        let mut moved = Vec::new();
        for url in urls {
            if self.remove(from, url) {
                moved.push(url.clone());
            }
        }
        let target = self.categories.entry(to.to_owned()).or_default();
        for url in &moved {
            if !target.contains(url) {
                target.push(url.clone());
            }
        }
        Ok(moved.len())
    }

    /// Replace this list with an imported JSON object.
    ///
    /// Every entry is normalized; invalid and repeated entries are dropped.
    /// Categories present here but absent from the import are kept, empty.
    ///
    /// # Errors
    ///
    /// Returns [`BlockListError::Format`] unless the input is an object
    /// whose values are arrays of strings.
    pub fn import_json(&mut self, json: &str) -> Result<(), BlockListError> {
        let raw: BTreeMap<String, Vec<String>> =
            serde_json::from_str(json).map_err(|e| BlockListError::Format(e.to_string()))?;

        let mut categories: BTreeMap<String, Vec<String>> = self
            .categories
            .keys()
            .map(|name| (name.clone(), Vec::new()))
            .collect();
        for (name, urls) in raw {
            let list = categories.entry(name).or_default();
            for url in urls.iter().filter_map(|u| normalize_url(u)) {
                if !list.contains(&url) {
                    list.push(url);
                }
            }
        }
        self.categories = categories;
        Ok(())
    }

    /// Pretty JSON export, the same shape [`BlockList::import_json`] reads.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn export_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load from a JSON file, or the default seed list when it is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let mut list = Self {
            categories: BTreeMap::new(),
        };
        list.import_json(&content)?;
        Ok(list)
    }

    /// Save as pretty JSON, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.export_json()?)?;
        Ok(())
    }
}
