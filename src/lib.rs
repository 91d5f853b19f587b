//! Tabwarden: background worker for a workplace-monitoring browser extension.
//!
//! The worker does two things on timers:
//!
//! - **Activity logging**: every 30 s the active tab's URL is written to a
//!   single remote status document, together with fixed identity labels.
//!   Failed writes are persisted locally and retried on the next tick.
//! - **Action enforcement**: every 5 s (and whenever a tab finishes loading
//!   or is activated) the same document is read for a remotely set action.
//!   `block` reloads the tab and redirects it to a splash page, `warn` shows
//!   an alert, `accept` just clears the action.
//!
//! # Architecture
//!
//! The browser and both stores are reached through traits so the logic runs
//! the same against fakes and the real host:
//! - [`browser::Browser`]: tab queries and mutations
//! - [`tabwarden_docstore::DocumentStore`]: the remote status document
//! - [`storage::LocalStore`]: durable local key-value storage
//!
//! [`runtime::Warden`] owns the timers and event dispatch. The
//! `tabwarden-host` binary connects it to a browser shim over
//! newline-delimited JSON on stdin/stdout (see [`host`]).
//!
//! The manager side lives in [`admin`] and [`blocklist`]: listing every
//! worker's status document, setting actions, flagging for review and
//! editing the categorized block list. `tabwarden-admin` exposes them.

pub mod admin;
pub mod blocklist;
pub mod browser;
pub mod config;
pub mod enforcer;
pub mod error;
pub mod host;
pub mod logger;
pub mod queue;
pub mod runtime;
pub mod storage;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod warden_dirs;

pub use browser::{Browser, Tab, TabId};
pub use config::WardenConfig;
pub use enforcer::{Action, ActionEnforcer, EnforcementOutcome, EnforcerState};
pub use error::{Result, WardenError};
pub use logger::ActivityLogger;
pub use queue::{FailedLogEntry, FailedLogQueue};
pub use runtime::{BrowserEvent, Warden};
