//! Configuration types for the tabwarden worker.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tabwarden_docstore::DocStoreConfig;

/// Top-level worker configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Remote status document location and credential.
    pub remote: DocStoreConfig,
    /// Static identity labels written with every activity report.
    pub identity: IdentityConfig,
    /// Timer periods and one-shot delays.
    pub schedule: ScheduleConfig,
    /// Blocking, debounce and warning behaviour.
    pub enforcement: EnforcementConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// Identity labels attached to activity reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Value of the `ID` field.
    pub worker_id: String,
    /// Value of the `team role` field.
    pub team_role: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            worker_id: "JohnA".to_owned(),
            team_role: "software developer".to_owned(),
        }
    }
}

/// Periodic timers and startup delays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Period of the URL logger timer (log active tab, then retry queue).
    pub log_interval_secs: u64,
    /// Period of the action checker timer.
    pub action_poll_secs: u64,
    /// Delay before the first log after install.
    pub install_log_delay_ms: u64,
    /// Delay before the first log after browser startup.
    pub startup_log_delay_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            log_interval_secs: 30,
            action_poll_secs: 5,
            install_log_delay_ms: 2000,
            startup_log_delay_ms: 1000,
        }
    }
}

impl ScheduleConfig {
    /// URL logger timer period.
    pub fn log_interval(&self) -> Duration {
        Duration::from_secs(self.log_interval_secs)
    }

    /// Action checker timer period.
    pub fn action_poll_interval(&self) -> Duration {
        Duration::from_secs(self.action_poll_secs)
    }
}

/// Enforcement policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforcementConfig {
    /// URL prefixes redirected to the splash page without asking the remote
    /// document.
    pub blocked_prefixes: Vec<String>,
    /// Base URL of the extension bundle, e.g. `chrome-extension://<id>/`.
    pub extension_base_url: String,
    /// Splash page path relative to `extension_base_url`.
    pub splash_path: String,
    /// Window during which a tab is not re-enforced after a `block`.
    pub debounce_ms: u64,
    /// Delay between the forced reload and the splash redirect.
    pub redirect_delay_ms: u64,
    /// Text of the in-page alert shown for a `warn` action.
    pub warn_message: String,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            blocked_prefixes: vec!["https://hinge.co/".to_owned()],
            extension_base_url: "chrome-extension://tabwarden/".to_owned(),
            splash_path: "blocked.html".to_owned(),
            debounce_ms: 2000,
            redirect_delay_ms: 800,
            warn_message: "\u{26a0}\u{fe0f} Warning: Please focus on your work.".to_owned(),
        }
    }
}

impl EnforcementConfig {
    /// Add every entry of `list` to [`EnforcementConfig::blocked_prefixes`].
    ///
    /// Existing prefixes are kept. Returns how many new prefixes were added.
    pub fn apply_block_list(&mut self, list: &crate::blocklist::BlockList) -> usize {
        let mut added = 0;
        for prefix in list.prefixes() {
            if !self.blocked_prefixes.contains(&prefix) {
                self.blocked_prefixes.push(prefix);
                added += 1;
            }
        }
        added
    }

    /// Debounce window as a [`Duration`].
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Reload-to-redirect delay as a [`Duration`].
    pub fn redirect_delay(&self) -> Duration {
        Duration::from_millis(self.redirect_delay_ms)
    }

    /// Absolute splash page URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL or path cannot be parsed.
    pub fn splash_url(&self) -> crate::error::Result<String> {
        let base = url::Url::parse(&self.extension_base_url).map_err(|e| {
            crate::error::WardenError::Config(format!(
                "invalid extension_base_url '{}': {e}",
                self.extension_base_url
            ))
        })?;
        let splash = base.join(&self.splash_path).map_err(|e| {
            crate::error::WardenError::Config(format!(
                "invalid splash_path '{}': {e}",
                self.splash_path
            ))
        })?;
        Ok(splash.into())
    }
}

/// Log output settings. Console output always goes to stderr.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Also write a daily rolling log file under the logs directory.
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            file: false,
        }
    }
}

impl WardenConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::WardenError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::WardenError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates this configuration.
    ///
    /// Checks the remote section, non-zero timer periods and a resolvable
    /// splash URL.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::WardenError::Config`] describing the first
    /// invalid field.
    pub fn validate(&self) -> crate::error::Result<()> {
        self.remote
            .validate()
            .map_err(|e| crate::error::WardenError::Config(e.to_string()))?;
        if self.schedule.log_interval_secs == 0 {
            return Err(crate::error::WardenError::Config(
                "schedule.log_interval_secs must be greater than 0".into(),
            ));
        }
        if self.schedule.action_poll_secs == 0 {
            return Err(crate::error::WardenError::Config(
                "schedule.action_poll_secs must be greater than 0".into(),
            ));
        }
        self.enforcement.splash_url()?;
        Ok(())
    }
}
