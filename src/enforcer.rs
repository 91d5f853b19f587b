//! Remote action polling and enforcement.
//!
//! The remote status document carries an `action` field set from a
//! dashboard. [`ActionEnforcer::evaluate`] reads it for one tab and applies
//! it:
//!
//! - `block`: reload the tab, then after a short delay navigate it to the
//!   splash page and clear the action. Debounced per tab.
//! - `warn`: show an in-page alert and clear the action.
//! - `accept`: clear the action.
//!
//! URLs matching a blocked prefix are sent to the splash page without any
//! remote read. Read failures fail open.
//!
//! A scheduled splash redirect is never cancelled by a later evaluation of
//! the same tab. If the remote action flips between scheduling and firing,
//! the redirect still happens and may repeat once the debounce window
//! expires.

use crate::browser::{self, Browser, TabId};
use crate::config::EnforcementConfig;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tabwarden_docstore::{DocumentStore, Fields};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Field holding the remote directive.
pub const FIELD_ACTION: &str = "action";

/// Directive read from the `action` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Empty or absent.
    None,
    /// Send the tab to the splash page.
    Block,
    /// Alert the user.
    Warn,
    /// Acknowledge and clear.
    Accept,
    /// Any other value; ignored.
    Unrecognized(String),
}

impl Action {
    /// Interpret a raw field value.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            None | Some("") => Self::None,
            Some("block") => Self::Block,
            Some("warn") => Self::Warn,
            Some("accept") => Self::Accept,
            Some(other) => Self::Unrecognized(other.to_owned()),
        }
    }
}

/// What one [`ActionEnforcer::evaluate`] call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnforcementOutcome {
    /// Not an `http(s)` URL, or already the splash page.
    Ignored,
    /// Matched a blocked prefix; redirected without a remote read.
    HardBlocked,
    /// Remote read failed; nothing enforced.
    ReadFailed,
    /// No action set.
    NoAction,
    /// `block` seen within the debounce window of the previous one.
    Debounced,
    /// Tab reloaded and splash redirect scheduled.
    BlockScheduled,
    /// Alert shown.
    Warned,
    /// Action acknowledged.
    Accepted,
    /// Unknown action value.
    Unrecognized(String),
    /// A browser call failed.
    Failed(String),
}

struct PendingRedirect {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Process-wide enforcement state: per-tab debounce timestamps and the
/// registry of scheduled splash redirects.
///
/// Created once and shared by every evaluation path; tests build a fresh
/// one per case.
#[derive(Default)]
pub struct EnforcerState {
    last_enforced: Mutex<HashMap<TabId, Instant>>,
    pending: Mutex<HashMap<TabId, Vec<PendingRedirect>>>,
}

impl std::fmt::Debug for EnforcerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnforcerState")
            .field("tabs_seen", &lock(&self.last_enforced).len())
            .field("tabs_pending", &lock(&self.pending).len())
            .finish()
    }
}

impl EnforcerState {
    /// Empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an enforcement for `tab_id` at `now` unless one happened less
    /// than `window` ago. Returns `true` when the caller may enforce.
    pub fn try_claim(&self, tab_id: TabId, now: Instant, window: Duration) -> bool {
        let mut last = lock(&self.last_enforced);
        if let Some(prev) = last.get(&tab_id) {
            if now.saturating_duration_since(*prev) < window {
                return false;
            }
        }
        last.insert(tab_id, now);
        true
    }

    /// When `tab_id` was last enforced.
    pub fn last_enforced(&self, tab_id: TabId) -> Option<Instant> {
        lock(&self.last_enforced).get(&tab_id).copied()
    }

    /// Scheduled redirects for `tab_id` that have not fired yet.
    pub fn pending_count(&self, tab_id: TabId) -> usize {
        lock(&self.pending)
            .get(&tab_id)
            .map_or(0, |list| list.iter().filter(|p| !p.handle.is_finished()).count())
    }

    fn register(&self, tab_id: TabId, redirect: PendingRedirect) {
        let mut pending = lock(&self.pending);
        let list = pending.entry(tab_id).or_default();
        list.retain(|p| !p.handle.is_finished());
        list.push(redirect);
    }

    /// Cancel every unfired redirect for `tab_id`. Returns how many were
    /// still pending.
    pub fn cancel_pending(&self, tab_id: TabId) -> usize {
        let list = lock(&self.pending).remove(&tab_id).unwrap_or_default();
        cancel_all(list)
    }

    /// Cancel every unfired redirect for every tab.
    pub fn shutdown(&self) -> usize {
        let lists: Vec<_> = lock(&self.pending).drain().map(|(_, list)| list).collect();
        lists.into_iter().map(cancel_all).sum()
    }

    /// Wait until every scheduled redirect has fired or been cancelled.
    pub async fn settle(&self) {
        let redirects: Vec<_> = lock(&self.pending)
            .drain()
            .flat_map(|(_, list)| list)
            .collect();
        for redirect in redirects {
            if let Err(e) = redirect.handle.await {
                warn!("splash redirect task ended abnormally: {e}");
            }
        }
    }
}

fn cancel_all(list: Vec<PendingRedirect>) -> usize {
    let mut cancelled = 0;
    for redirect in list {
        if !redirect.handle.is_finished() {
            redirect.token.cancel();
            cancelled += 1;
        }
    }
    cancelled
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Patch the remote `action` field back to empty.
///
/// Failures are logged and neither retried nor queued. Returns `true` on
/// success.
pub async fn clear_action(store: &dyn DocumentStore) -> bool {
    let fields = Fields::new().with_string(FIELD_ACTION, "");
    match store.patch_fields(&fields).await {
        Ok(_) => {
            debug!("cleared remote action");
            true
        }
        Err(e) => {
            error!("failed to clear remote action: {e}");
            false
        }
    }
}

/// Applies the remote action to tabs.
pub struct ActionEnforcer {
    store: Arc<dyn DocumentStore>,
    browser: Arc<dyn Browser>,
    state: Arc<EnforcerState>,
    splash_url: String,
    blocked_prefixes: Vec<String>,
    debounce: Duration,
    redirect_delay: Duration,
    warn_message: String,
}

impl ActionEnforcer {
    /// Create an enforcer sharing `state` with any other enforcer built from
    /// the same state.
    ///
    /// # Errors
    ///
    /// Returns a config error if the splash URL cannot be resolved.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        browser: Arc<dyn Browser>,
        state: Arc<EnforcerState>,
        config: &EnforcementConfig,
    ) -> Result<Self> {
        Ok(Self {
            store,
            browser,
            state,
            splash_url: config.splash_url()?,
            blocked_prefixes: config.blocked_prefixes.clone(),
            debounce: config.debounce(),
            redirect_delay: config.redirect_delay(),
            warn_message: config.warn_message.clone(),
        })
    }

    /// Absolute splash page URL.
    pub fn splash_url(&self) -> &str {
        &self.splash_url
    }

    /// Shared enforcement state.
    pub fn state(&self) -> &Arc<EnforcerState> {
        &self.state
    }

    /// Evaluate the remote action for one tab and apply it.
    ///
    /// Never fails: errors are logged and reported through the outcome.
    pub async fn evaluate(&self, tab_id: TabId, tab_url: &str) -> EnforcementOutcome {
        match self.try_evaluate(tab_id, tab_url).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(tab = %tab_id, "enforcement failed: {e}");
                EnforcementOutcome::Failed(e.to_string())
            }
        }
    }

    async fn try_evaluate(&self, tab_id: TabId, tab_url: &str) -> Result<EnforcementOutcome> {
        if !browser::is_http_url_ignore_case(tab_url) || tab_url.starts_with(&self.splash_url) {
            return Ok(EnforcementOutcome::Ignored);
        }

        if self
            .blocked_prefixes
            .iter()
            .any(|prefix| tab_url.starts_with(prefix.as_str()))
        {
            info!(tab = %tab_id, url = %tab_url, "blocked domain, redirecting to splash page");
            self.browser.navigate(tab_id, &self.splash_url).await?;
            return Ok(EnforcementOutcome::HardBlocked);
        }

        let fields = match self.store.read_fields().await {
            Ok(fields) => fields,
            Err(e) => {
                warn!(tab = %tab_id, "status document read failed: {e}");
                return Ok(EnforcementOutcome::ReadFailed);
            }
        };

        match Action::parse(fields.string(FIELD_ACTION)) {
            Action::None => Ok(EnforcementOutcome::NoAction),
            Action::Block => {
                if !self.state.try_claim(tab_id, Instant::now(), self.debounce) {
                    debug!(tab = %tab_id, "block debounced");
                    return Ok(EnforcementOutcome::Debounced);
                }
                info!(tab = %tab_id, "action = block, reloading tab");
                self.browser.reload(tab_id).await?;
                self.schedule_splash_redirect(tab_id);
                Ok(EnforcementOutcome::BlockScheduled)
            }
            Action::Warn => {
                info!(tab = %tab_id, "action = warn, showing alert");
                self.browser.show_alert(tab_id, &self.warn_message).await?;
                self.clear_action().await;
                Ok(EnforcementOutcome::Warned)
            }
            Action::Accept => {
                info!("action = accept, clearing");
                self.clear_action().await;
                Ok(EnforcementOutcome::Accepted)
            }
            Action::Unrecognized(value) => {
                warn!(action = %value, "ignoring unrecognized action");
                Ok(EnforcementOutcome::Unrecognized(value))
            }
        }
    }

    /// Patch the remote `action` field back to empty. See [`clear_action`].
    pub async fn clear_action(&self) -> bool {
        clear_action(self.store.as_ref()).await
    }

    fn schedule_splash_redirect(&self, tab_id: TabId) {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let browser = Arc::clone(&self.browser);
        let store = Arc::clone(&self.store);
        let splash = self.splash_url.clone();
        let delay = self.redirect_delay;

        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancelled.cancelled() => {
                    debug!(tab = %tab_id, "splash redirect cancelled");
                }
                () = tokio::time::sleep(delay) => {
                    info!(tab = %tab_id, "redirecting to splash page");
                    match browser.navigate(tab_id, &splash).await {
                        Ok(()) => {
                            clear_action(store.as_ref()).await;
                        }
                        Err(e) => error!(tab = %tab_id, "splash redirect failed: {e}"),
                    }
                }
            }
        });

        self.state.register(tab_id, PendingRedirect { token, handle });
    }
}
