//! Worker runtime: browser events and periodic timers.
//!
//! [`Warden`] owns the logger and enforcer and maps every trigger onto them:
//!
//! | Trigger | Effect |
//! |---------|--------|
//! | URL logger timer (30 s) | log active tab, then retry queued reports |
//! | action checker timer (5 s) | evaluate the active tab |
//! | tab update complete | evaluate that tab |
//! | tab activated | evaluate that tab |
//! | install | log active tab now and again after a short delay |
//! | startup | log active tab after a short delay |
//! | `manual-log` message, toolbar click | log active tab now |
//!
//! Each tick and event runs in its own task so a hung remote call stalls
//! only that task.

use crate::browser::{Browser, TabId};
use crate::config::ScheduleConfig;
use crate::enforcer::{ActionEnforcer, EnforcementOutcome};
use crate::logger::ActivityLogger;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Message kind that triggers an immediate activity report.
pub const MANUAL_LOG_MESSAGE: &str = "manual-log";

/// Tab-load status that triggers enforcement.
pub const STATUS_COMPLETE: &str = "complete";

/// How long shutdown waits for in-flight ticks and events.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Events delivered by the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrowserEvent {
    /// Worker installed or updated.
    Installed,
    /// Browser profile started.
    Startup,
    /// A tab changed loading status or URL.
    TabUpdated {
        tab_id: TabId,
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        url: Option<String>,
    },
    /// The user switched to a tab.
    TabActivated { tab_id: TabId },
    /// Runtime message from another extension context.
    Message { kind: String },
    /// Toolbar button clicked.
    ActionClicked,
}

/// Wires browser triggers to the logger and enforcer.
#[derive(Clone)]
pub struct Warden {
    logger: Arc<ActivityLogger>,
    enforcer: Arc<ActionEnforcer>,
    browser: Arc<dyn Browser>,
    schedule: ScheduleConfig,
}

impl Warden {
    /// Create a runtime around already-built components.
    pub fn new(
        logger: Arc<ActivityLogger>,
        enforcer: Arc<ActionEnforcer>,
        browser: Arc<dyn Browser>,
        schedule: ScheduleConfig,
    ) -> Self {
        Self {
            logger,
            enforcer,
            browser,
            schedule,
        }
    }

    /// Activity logger.
    pub fn logger(&self) -> &Arc<ActivityLogger> {
        &self.logger
    }

    /// Action enforcer.
    pub fn enforcer(&self) -> &Arc<ActionEnforcer> {
        &self.enforcer
    }

    /// URL logger timer body.
    pub async fn url_logger_tick(&self) {
        debug!("urlLogger tick");
        self.logger.log_current_tab().await;
        self.logger.retry_failed().await;
    }

    /// Action checker timer body. Returns the outcome when a tab was
    /// evaluated.
    pub async fn action_checker_tick(&self) -> Option<EnforcementOutcome> {
        let tab = match self.browser.active_tab().await {
            Ok(tab) => tab?,
            Err(e) => {
                warn!("actionChecker active tab query failed: {e}");
                return None;
            }
        };
        let (Some(tab_id), Some(url)) = (tab.id, tab.url) else {
            return None;
        };
        Some(self.enforcer.evaluate(tab_id, &url).await)
    }

    /// Handle one browser event to completion.
    pub async fn handle_event(&self, event: BrowserEvent) {
        match event {
            BrowserEvent::Installed => {
                info!("installed");
                self.logger.log_current_tab().await;
                self.delayed_log(self.schedule.install_log_delay_ms).await;
            }
            BrowserEvent::Startup => {
                info!("startup");
                self.delayed_log(self.schedule.startup_log_delay_ms).await;
            }
            BrowserEvent::TabUpdated {
                tab_id,
                status,
                url,
            } => {
                if status.as_deref() != Some(STATUS_COMPLETE) {
                    return;
                }
                if let Some(url) = url {
                    self.enforcer.evaluate(tab_id, &url).await;
                }
            }
            BrowserEvent::TabActivated { tab_id } => match self.browser.get_tab(tab_id).await {
                Ok(Some(tab)) => {
                    if let Some(url) = tab.url {
                        self.enforcer.evaluate(tab_id, &url).await;
                    }
                }
                Ok(None) => debug!(tab = %tab_id, "activated tab vanished"),
                Err(e) => warn!(tab = %tab_id, "activated tab lookup failed: {e}"),
            },
            BrowserEvent::Message { kind } => {
                if kind == MANUAL_LOG_MESSAGE {
                    info!("manual log requested");
                    self.logger.log_current_tab().await;
                } else {
                    debug!(kind = %kind, "ignoring runtime message");
                }
            }
            BrowserEvent::ActionClicked => {
                self.logger.log_current_tab().await;
            }
        }
    }

    async fn delayed_log(&self, delay_ms: u64) {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        self.logger.log_current_tab().await;
    }

    /// Start the timers and event loop.
    ///
    /// Runs until `cancel` fires. The event channel closing does not stop the
    /// timers. On shutdown pending splash redirects are cancelled and
    /// in-flight tasks get a short grace period.
    pub fn run(
        self,
        mut events: mpsc::Receiver<BrowserEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let log_period = self.schedule.log_interval();
            let poll_period = self.schedule.action_poll_interval();
            info!(
                log_every_secs = log_period.as_secs(),
                poll_every_secs = poll_period.as_secs(),
                "warden started"
            );

            let mut log_timer = tokio::time::interval_at(Instant::now() + log_period, log_period);
            log_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut poll_timer =
                tokio::time::interval_at(Instant::now() + poll_period, poll_period);
            poll_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let tracker = TaskTracker::new();
            let mut events_open = true;

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = log_timer.tick() => {
                        let warden = self.clone();
                        tracker.spawn(async move { warden.url_logger_tick().await });
                    }
                    _ = poll_timer.tick() => {
                        let warden = self.clone();
                        tracker.spawn(async move {
                            warden.action_checker_tick().await;
                        });
                    }
                    event = events.recv(), if events_open => match event {
                        Some(event) => {
                            let warden = self.clone();
                            tracker.spawn(async move { warden.handle_event(event).await });
                        }
                        None => {
                            debug!("browser event channel closed");
                            events_open = false;
                        }
                    },
                }
            }

            let cancelled = self.enforcer.state().shutdown();
            tracker.close();
            if tokio::time::timeout(SHUTDOWN_GRACE, tracker.wait())
                .await
                .is_err()
            {
                warn!(in_flight = tracker.len(), "shutdown grace elapsed with tasks still running");
            }
            info!(cancelled_redirects = cancelled, "warden stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::browser::Tab;
    use crate::config::{EnforcementConfig, IdentityConfig};
    use crate::enforcer::EnforcerState;
    use crate::logger::FIELD_LINK;
    use crate::queue::FailedLogQueue;
    use crate::storage::MemoryStore;
    use crate::test_utils::{BrowserCall, FakeBrowser, FakeDocumentStore};

    struct Harness {
        store: Arc<FakeDocumentStore>,
        browser: Arc<FakeBrowser>,
        warden: Warden,
    }

    fn harness() -> Harness {
        let store = Arc::new(FakeDocumentStore::new());
        let browser = Arc::new(FakeBrowser::new());
        let queue = Arc::new(FailedLogQueue::new(Arc::new(MemoryStore::new())));
        let logger = Arc::new(ActivityLogger::new(
            store.clone(),
            browser.clone(),
            queue,
            IdentityConfig::default(),
        ));
        let enforcer = Arc::new(
            ActionEnforcer::new(
                store.clone(),
                browser.clone(),
                Arc::new(EnforcerState::new()),
                &EnforcementConfig::default(),
            )
            .unwrap(),
        );
        let warden = Warden::new(logger, enforcer, browser.clone(), ScheduleConfig::default());
        Harness {
            store,
            browser,
            warden,
        }
    }

    fn tab(id: i64, url: &str) -> Tab {
        Tab {
            id: Some(TabId(id)),
            url: Some(url.to_owned()),
        }
    }

    #[test]
    fn event_wire_format() {
        let event: BrowserEvent = serde_json::from_str(
            r#"{"type":"tab_updated","tab_id":4,"status":"complete","url":"https://a.test/"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            BrowserEvent::TabUpdated {
                tab_id: TabId(4),
                status: Some("complete".into()),
                url: Some("https://a.test/".into()),
            }
        );

        let event: BrowserEvent =
            serde_json::from_str(r#"{"type":"message","kind":"manual-log"}"#).unwrap();
        assert_eq!(
            event,
            BrowserEvent::Message {
                kind: MANUAL_LOG_MESSAGE.into()
            }
        );

        let json = serde_json::to_string(&BrowserEvent::ActionClicked).unwrap();
        assert_eq!(json, r#"{"type":"action_clicked"}"#);
    }

    #[tokio::test]
    async fn incomplete_tab_updates_are_ignored() {
        let h = harness();
        h.warden
            .handle_event(BrowserEvent::TabUpdated {
                tab_id: TabId(1),
                status: Some("loading".into()),
                url: Some("https://hinge.co/".into()),
            })
            .await;
        assert!(h.browser.calls().is_empty());
    }

    #[tokio::test]
    async fn completed_update_to_blocked_domain_redirects() {
        let h = harness();
        h.warden
            .handle_event(BrowserEvent::TabUpdated {
                tab_id: TabId(1),
                status: Some(STATUS_COMPLETE.into()),
                url: Some("https://hinge.co/profile".into()),
            })
            .await;
        assert_eq!(
            h.browser.calls(),
            vec![BrowserCall::Navigate(
                TabId(1),
                "chrome-extension://tabwarden/blocked.html".into()
            )]
        );
        assert_eq!(h.store.read_count(), 0);
    }

    #[tokio::test]
    async fn activation_looks_up_tab_and_evaluates() {
        let h = harness();
        h.store.set_action("warn");
        h.browser.insert_tab(tab(9, "https://a.test/"));

        h.warden
            .handle_event(BrowserEvent::TabActivated { tab_id: TabId(9) })
            .await;

        assert!(matches!(
            h.browser.calls().as_slice(),
            [BrowserCall::Alert(TabId(9), _)]
        ));
    }

    #[tokio::test]
    async fn activation_of_unknown_tab_is_quiet() {
        let h = harness();
        h.warden
            .handle_event(BrowserEvent::TabActivated { tab_id: TabId(3) })
            .await;
        assert_eq!(h.store.read_count(), 0);
    }

    #[tokio::test]
    async fn manual_message_logs_current_tab() {
        let h = harness();
        h.browser.set_active(Some(tab(1, "https://a.test/manual")));

        h.warden
            .handle_event(BrowserEvent::Message {
                kind: "something-else".into(),
            })
            .await;
        assert_eq!(h.store.patch_count(), 0);

        h.warden
            .handle_event(BrowserEvent::Message {
                kind: MANUAL_LOG_MESSAGE.into(),
            })
            .await;
        assert_eq!(h.store.fields().string(FIELD_LINK), Some("https://a.test/manual"));
    }

    #[tokio::test(start_paused = true)]
    async fn startup_logs_after_delay() {
        let h = harness();
        h.browser.set_active(Some(tab(1, "https://a.test/start")));

        let started = Instant::now();
        h.warden.handle_event(BrowserEvent::Startup).await;

        assert!(started.elapsed() >= Duration::from_millis(1000));
        assert_eq!(h.store.patch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn install_logs_immediately_and_after_delay() {
        let h = harness();
        h.browser.set_active(Some(tab(1, "https://a.test/install")));

        let warden = h.warden.clone();
        let handle = tokio::spawn(async move { warden.handle_event(BrowserEvent::Installed).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.store.patch_count(), 1);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        handle.await.unwrap();
        assert_eq!(h.store.patch_count(), 2);
    }

    #[tokio::test]
    async fn action_checker_needs_id_and_url() {
        let h = harness();
        assert!(h.warden.action_checker_tick().await.is_none());

        h.browser.set_active(Some(Tab {
            id: None,
            url: Some("https://a.test/".into()),
        }));
        assert!(h.warden.action_checker_tick().await.is_none());

        h.browser.set_active(Some(tab(2, "https://a.test/")));
        assert_eq!(
            h.warden.action_checker_tick().await,
            Some(EnforcementOutcome::NoAction)
        );
    }

    #[tokio::test]
    async fn url_logger_tick_logs_then_drains_queue() {
        let h = harness();
        h.store.set_offline(true);
        h.warden.logger().log_url("https://queued.test/").await;
        h.store.set_offline(false);
        h.browser.set_active(Some(tab(1, "https://a.test/now")));

        h.warden.url_logger_tick().await;

        assert!(h.warden.logger().queue().is_empty().await.unwrap());
        // The retried report is written after the fresh one.
        assert_eq!(h.store.fields().string(FIELD_LINK), Some("https://queued.test/"));
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_polls_and_stops_on_cancel() {
        let h = harness();
        h.store.set_action("block");
        h.browser.set_active(Some(tab(5, "https://a.test/")));

        let (_events_tx, events_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = h.warden.clone().run(events_rx, cancel.clone());

        tokio::time::sleep(Duration::from_millis(5100)).await;
        assert_eq!(h.browser.calls_for(TabId(5)).first(), Some(&BrowserCall::Reload(TabId(5))));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_dispatches_events() {
        let h = harness();
        h.browser.set_active(Some(tab(1, "https://a.test/clicked")));

        let (events_tx, events_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = h.warden.clone().run(events_rx, cancel.clone());

        events_tx.send(BrowserEvent::ActionClicked).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.store.fields().string(FIELD_LINK), Some("https://a.test/clicked"));

        drop(events_tx);
        cancel.cancel();
        handle.await.unwrap();
    }
}
