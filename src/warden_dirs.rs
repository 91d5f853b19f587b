//! Application directory paths for Tabwarden.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | App data | `~/Library/Application Support/tabwarden/` | `~/.local/share/tabwarden/` |
//! | Config | `~/Library/Application Support/tabwarden/` | `~/.config/tabwarden/` |
//!
//! # Environment Overrides
//!
//! - `TABWARDEN_DATA_DIR`: overrides [`data_dir`]
//! - `TABWARDEN_CONFIG_DIR`: overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root directory.
///
/// Holds the persisted key-value state (retry queue, machine id) and logs.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("TABWARDEN_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("tabwarden"))
        .unwrap_or_else(|| PathBuf::from("/tmp/tabwarden-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("TABWARDEN_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("tabwarden"))
        .unwrap_or_else(|| PathBuf::from("/tmp/tabwarden-config"))
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Categorized block list edited by `tabwarden-admin` (`config_dir()/block_lists.json`).
#[must_use]
pub fn block_list_file() -> PathBuf {
    config_dir().join("block_lists.json")
}

/// Persisted key-value state (`data_dir()/state.json`).
#[must_use]
pub fn state_file() -> PathBuf {
    data_dir().join("state.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_share_roots() {
        assert!(logs_dir().starts_with(data_dir()));
        assert!(state_file().starts_with(data_dir()));
        assert!(config_file().starts_with(config_dir()));
        assert!(block_list_file().starts_with(config_dir()));
    }

    #[test]
    fn file_names() {
        assert_eq!(
            config_file().file_name().and_then(|n| n.to_str()),
            Some("config.toml")
        );
        assert_eq!(
            state_file().file_name().and_then(|n| n.to_str()),
            Some("state.json")
        );
    }
}
