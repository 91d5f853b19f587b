//! Durable queue of activity reports that failed to reach the remote store.
//!
//! Entries live under [`FAILED_LOGS_KEY`] in the local store. Every storage
//! read-modify-write holds one async mutex, so concurrent drains and enqueues
//! inside one process cannot lose updates. Remote writes during a drain run
//! outside that mutex; at most one drain runs at a time.

use crate::error::Result;
use crate::storage::{self, FAILED_LOGS_KEY, LocalStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// One failed activity report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedLogEntry {
    /// URL that could not be written.
    pub url: String,
    /// When the write failed.
    pub when: DateTime<Utc>,
    /// Rendered error of the failed attempt.
    pub error: String,
}

impl FailedLogEntry {
    /// Entry for a failure observed now.
    pub fn now(url: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            url: url.into(),
            when: Utc::now(),
            error: error.to_string(),
        }
    }
}

/// Outcome of one [`FailedLogQueue::drain_and_retry`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries handed to the writer.
    pub attempted: usize,
    /// Entries the writer accepted; removed from the queue.
    pub succeeded: usize,
    /// Entries still queued after the pass.
    pub remaining: usize,
}

/// Persisted, insertion-ordered retry queue.
pub struct FailedLogQueue {
    store: Arc<dyn LocalStore>,
    lock: Mutex<()>,
    draining: Mutex<()>,
}

impl std::fmt::Debug for FailedLogQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailedLogQueue").finish_non_exhaustive()
    }
}

impl FailedLogQueue {
    /// Queue persisted in `store`.
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
            draining: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Vec<FailedLogEntry>> {
        Ok(storage::get_json(self.store.as_ref(), FAILED_LOGS_KEY)
            .await?
            .unwrap_or_default())
    }

    async fn persist(&self, entries: &[FailedLogEntry]) -> Result<()> {
        storage::set_json(self.store.as_ref(), FAILED_LOGS_KEY, &entries).await
    }

    /// Append an entry.
    ///
    /// # Errors
    ///
    /// Propagates storage errors; the entry is lost in that case.
    pub async fn enqueue(&self, entry: FailedLogEntry) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        debug!(url = %entry.url, queued = entries.len() + 1, "queued failed activity report");
        entries.push(entry);
        self.persist(&entries).await
    }

    /// Snapshot of the queued entries in insertion order.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn entries(&self) -> Result<Vec<FailedLogEntry>> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Number of queued entries.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn len(&self) -> Result<usize> {
        Ok(self.entries().await?.len())
    }

    /// Returns `true` when nothing is queued.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Retry every queued URL once, in insertion order, removing the entries
    /// for which `writer` returned `true`.
    ///
    /// Works on a snapshot: `writer` runs without the queue lock, so it may
    /// take arbitrarily long while other tasks keep enqueueing. Entries added
    /// during the pass are kept. A pass started while another is still
    /// running returns immediately with nothing attempted.
    ///
    /// # Errors
    ///
    /// Propagates storage errors. On a load error nothing is retried; on a
    /// persist error the retried entries stay queued.
    pub async fn drain_and_retry<F, Fut>(&self, mut writer: F) -> Result<DrainReport>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = bool>,
    {
        let Ok(_draining) = self.draining.try_lock() else {
            debug!("retry pass already running; skipping");
            return Ok(DrainReport::default());
        };

        let snapshot = self.entries().await?;
        if snapshot.is_empty() {
            return Ok(DrainReport::default());
        }

        let attempted = snapshot.len();
        let mut delivered = Vec::new();
        for entry in snapshot {
            if writer(entry.url.clone()).await {
                delivered.push(entry);
            }
        }

        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        let mut succeeded = 0;
        for done in &delivered {
            if let Some(pos) = entries.iter().position(|e| e == done) {
                entries.remove(pos);
                succeeded += 1;
            }
        }
        if succeeded > 0 {
            self.persist(&entries).await?;
        }

        Ok(DrainReport {
            attempted,
            succeeded,
            remaining: entries.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn queue() -> FailedLogQueue {
        FailedLogQueue::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn enqueue_preserves_insertion_order() {
        let q = queue();
        q.enqueue(FailedLogEntry::now("https://a.test/", "boom")).await.unwrap();
        q.enqueue(FailedLogEntry::now("https://b.test/", "boom")).await.unwrap();

        let urls: Vec<_> = q.entries().await.unwrap().into_iter().map(|e| e.url).collect();
        assert_eq!(urls, vec!["https://a.test/", "https://b.test/"]);
    }

    #[tokio::test]
    async fn drain_keeps_only_failures() {
        let q = queue();
        for url in ["https://a.test/", "https://b.test/", "https://c.test/"] {
            q.enqueue(FailedLogEntry::now(url, "offline")).await.unwrap();
        }

        let report = q
            .drain_and_retry(|url| async move { url != "https://b.test/" })
            .await
            .unwrap();

        assert_eq!(
            report,
            DrainReport {
                attempted: 3,
                succeeded: 2,
                remaining: 1
            }
        );
        let left = q.entries().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].url, "https://b.test/");
        assert_eq!(left[0].error, "offline");
    }

    #[tokio::test]
    async fn each_entry_is_tried_once_per_drain() {
        let q = queue();
        q.enqueue(FailedLogEntry::now("https://a.test/", "x")).await.unwrap();
        q.enqueue(FailedLogEntry::now("https://a.test/", "y")).await.unwrap();

        let calls = AtomicUsize::new(0);
        let report = q
            .drain_and_retry(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { false }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.remaining, 2);
        assert_eq!(q.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn empty_queue_drain_is_noop() {
        let q = queue();
        let report = q.drain_and_retry(|_| async { true }).await.unwrap();
        assert_eq!(report, DrainReport::default());
        assert!(q.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_enqueues_are_not_lost() {
        let q = Arc::new(queue());
        let mut handles = Vec::new();
        for i in 0..16 {
            let q = Arc::clone(&q);
            handles.push(tokio::spawn(async move {
                q.enqueue(FailedLogEntry::now(format!("https://{i}.test/"), "x"))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(q.len().await.unwrap(), 16);
    }

    #[tokio::test]
    async fn hung_retry_does_not_block_enqueue_or_next_pass() {
        let q = Arc::new(queue());
        q.enqueue(FailedLogEntry::now("https://stuck.test/", "x")).await.unwrap();

        let started = Arc::new(tokio::sync::Notify::new());
        let hung = {
            let q = Arc::clone(&q);
            let started = Arc::clone(&started);
            tokio::spawn(async move {
                q.drain_and_retry(|_| {
                    started.notify_one();
                    std::future::pending::<bool>()
                })
                .await
            })
        };
        started.notified().await;

        tokio::time::timeout(
            std::time::Duration::from_secs(2),
            q.enqueue(FailedLogEntry::now("https://later.test/", "y")),
        )
        .await
        .expect("enqueue blocked by a running retry pass")
        .unwrap();

        let report = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            q.drain_and_retry(|_| async { true }),
        )
        .await
        .expect("second pass blocked by a running retry pass")
        .unwrap();
        assert_eq!(report, DrainReport::default());
        assert_eq!(q.len().await.unwrap(), 2);

        hung.abort();
    }

    #[tokio::test]
    async fn entries_added_during_a_pass_are_kept() {
        let q = queue();
        q.enqueue(FailedLogEntry::now("https://a.test/", "x")).await.unwrap();

        let report = q
            .drain_and_retry(|url| {
                let q = &q;
                async move {
                    q.enqueue(FailedLogEntry::now(format!("{url}again"), "z"))
                        .await
                        .unwrap();
                    true
                }
            })
            .await
            .unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.remaining, 1);
        let left = q.entries().await.unwrap();
        assert_eq!(left[0].url, "https://a.test/again");
    }
}
