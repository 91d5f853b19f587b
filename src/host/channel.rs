//! Request/reply plumbing between the worker and the browser shim.
//!
//! [`HostBrowser`] implements [`Browser`] by turning each call into an
//! [`Outbound::Command`] and parking the caller on a oneshot until the
//! matching [`Reply`] arrives through [`HostBrowser::resolve`].

use crate::browser::{Browser, Tab, TabId};
use crate::error::{Result, WardenError};
use crate::host::contract::{BrowserCommand, Outbound, Reply};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// How long a browser call waits for its reply by default.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct Waiters {
    closed: bool,
    by_id: HashMap<u64, oneshot::Sender<Reply>>,
}

/// [`Browser`] backed by a line-oriented host connection.
pub struct HostBrowser {
    outbound: mpsc::Sender<Outbound>,
    waiters: Mutex<Waiters>,
    next_id: AtomicU64,
    reply_timeout: Duration,
}

/// Create a host browser and the receiver its commands are written to.
pub fn host_channel(
    capacity: usize,
    reply_timeout: Duration,
) -> (HostBrowser, mpsc::Receiver<Outbound>) {
    let (tx, rx) = mpsc::channel(capacity);
    let browser = HostBrowser {
        outbound: tx,
        waiters: Mutex::new(Waiters::default()),
        next_id: AtomicU64::new(1),
        reply_timeout,
    };
    (browser, rx)
}

impl HostBrowser {
    /// Hand a reply to the call waiting for it.
    ///
    /// Returns `false` when no call is waiting on that id (late reply after a
    /// timeout, or a duplicate).
    pub fn resolve(&self, reply: Reply) -> bool {
        let waiter = self.lock().by_id.remove(&reply.id);
        match waiter {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    /// Fail every waiting call and refuse new ones.
    ///
    /// Called once the browser side of the connection is gone.
    pub fn fail_all(&self) -> usize {
        let mut waiters = self.lock();
        waiters.closed = true;
        let n = waiters.by_id.len();
        // Dropping the senders wakes each receiver with a closed error.
        waiters.by_id.clear();
        n
    }

    /// Calls currently waiting for a reply.
    pub fn in_flight(&self) -> usize {
        self.lock().by_id.len()
    }

    async fn request(&self, command: BrowserCommand) -> Result<Reply> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut waiters = self.lock();
            if waiters.closed {
                return Err(WardenError::Host("browser connection closed".into()));
            }
            waiters.by_id.insert(id, tx);
        }

        if self
            .outbound
            .send(Outbound::Command { id, command })
            .await
            .is_err()
        {
            self.lock().by_id.remove(&id);
            return Err(WardenError::Host("command writer stopped".into()));
        }

        let reply = match tokio::time::timeout(self.reply_timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(WardenError::Host("browser connection closed".into())),
            Err(_) => {
                self.lock().by_id.remove(&id);
                return Err(WardenError::Host(format!(
                    "no reply to command {id} within {:?}",
                    self.reply_timeout
                )));
            }
        };

        if reply.ok {
            Ok(reply)
        } else {
            Err(WardenError::Browser(
                reply.error.unwrap_or_else(|| "unspecified browser error".into()),
            ))
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Waiters> {
        self.waiters
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl Browser for HostBrowser {
    async fn active_tab(&self) -> Result<Option<Tab>> {
        Ok(self.request(BrowserCommand::QueryActiveTab).await?.tab)
    }

    async fn get_tab(&self, tab_id: TabId) -> Result<Option<Tab>> {
        Ok(self.request(BrowserCommand::GetTab { tab_id }).await?.tab)
    }

    async fn reload(&self, tab_id: TabId) -> Result<()> {
        self.request(BrowserCommand::Reload { tab_id }).await?;
        Ok(())
    }

    async fn navigate(&self, tab_id: TabId, url: &str) -> Result<()> {
        self.request(BrowserCommand::Navigate {
            tab_id,
            url: url.to_owned(),
        })
        .await?;
        Ok(())
    }

    async fn show_alert(&self, tab_id: TabId, message: &str) -> Result<()> {
        self.request(BrowserCommand::Alert {
            tab_id,
            message: message.to_owned(),
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::sync::Arc;

    fn command_id(out: Outbound) -> (u64, BrowserCommand) {
        match out {
            Outbound::Command { id, command } => (id, command),
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reply_completes_call() {
        let (browser, mut rx) = host_channel(4, DEFAULT_REPLY_TIMEOUT);
        let browser = Arc::new(browser);

        let caller = {
            let browser = Arc::clone(&browser);
            tokio::spawn(async move { browser.active_tab().await })
        };

        let (id, command) = command_id(rx.recv().await.unwrap());
        assert_eq!(command, BrowserCommand::QueryActiveTab);
        let tab = Tab {
            id: Some(TabId(3)),
            url: Some("https://a.test/".into()),
        };
        assert!(browser.resolve(Reply::ok(id, Some(tab.clone()))));

        assert_eq!(caller.await.unwrap().unwrap(), Some(tab));
        assert_eq!(browser.in_flight(), 0);
    }

    #[tokio::test]
    async fn error_reply_is_browser_error() {
        let (browser, mut rx) = host_channel(4, DEFAULT_REPLY_TIMEOUT);
        let browser = Arc::new(browser);

        let caller = {
            let browser = Arc::clone(&browser);
            tokio::spawn(async move { browser.reload(TabId(9)).await })
        };

        let (id, command) = command_id(rx.recv().await.unwrap());
        assert_eq!(command, BrowserCommand::Reload { tab_id: TabId(9) });
        browser.resolve(Reply::error(id, "No tab with id: 9"));

        let err = caller.await.unwrap().unwrap_err();
        assert!(matches!(err, WardenError::Browser(ref m) if m == "No tab with id: 9"));
    }

    #[tokio::test]
    async fn unknown_reply_is_ignored() {
        let (browser, _rx) = host_channel(4, DEFAULT_REPLY_TIMEOUT);
        assert!(!browser.resolve(Reply::ok(42, None)));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_reply_times_out() {
        let (browser, mut rx) = host_channel(4, Duration::from_millis(50));

        let (result, sent) = tokio::join!(browser.navigate(TabId(1), "https://x.test/"), rx.recv());
        assert!(sent.is_some());
        assert!(matches!(result, Err(WardenError::Host(_))));
        assert_eq!(browser.in_flight(), 0);
    }

    #[tokio::test]
    async fn fail_all_wakes_waiters_and_closes() {
        let (browser, mut rx) = host_channel(4, DEFAULT_REPLY_TIMEOUT);
        let browser = Arc::new(browser);

        let caller = {
            let browser = Arc::clone(&browser);
            tokio::spawn(async move { browser.show_alert(TabId(2), "focus").await })
        };
        rx.recv().await.unwrap();

        assert_eq!(browser.fail_all(), 1);
        assert!(matches!(caller.await.unwrap(), Err(WardenError::Host(_))));
        assert!(matches!(
            browser.get_tab(TabId(2)).await,
            Err(WardenError::Host(_))
        ));
    }

    #[tokio::test]
    async fn stopped_writer_fails_fast() {
        let (browser, rx) = host_channel(4, DEFAULT_REPLY_TIMEOUT);
        drop(rx);
        assert!(matches!(
            browser.reload(TabId(1)).await,
            Err(WardenError::Host(_))
        ));
        assert_eq!(browser.in_flight(), 0);
    }
}
