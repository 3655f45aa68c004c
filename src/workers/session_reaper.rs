//! Background expiry of login sessions.
//!
//! The reaper is the only owner of the expiry queue. The session store feeds it
//! `(id, expires_at)` notices; the reaper sleeps until the earliest queued expiry and
//! asks the store to evict that session, re-validated against the stored expiry.
//!
//! Renewals and removals leave earlier queue entries behind. The reaper remembers the
//! current expiry of every session it knows about, so every other queued entry is
//! garbage. Once garbage reaches the configured threshold the queue is rebuilt from a
//! snapshot of the live sessions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::store::heap::MinHeap;
use crate::store::sessions::{Eviction, ExpiryEntry, Notice, SessionRegistry};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaperStats {
    pub queue_len: usize,
    pub garbage: usize,
    /// Notices consumed from the store.
    pub processed: u64,
    pub evicted: u64,
    pub rebuilds: u64,
}

/// Lifecycle handle of a running reaper.
///
/// Dropping the handle leaves the reaper running until the store itself is dropped.
#[derive(Debug)]
pub struct ReaperHandle {
    cancel: oneshot::Sender<()>,
    task: JoinHandle<()>,
    stats: watch::Receiver<ReaperStats>,
}

impl ReaperHandle {
    pub fn stats(&self) -> ReaperStats {
        *self.stats.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ReaperStats> {
        self.stats.clone()
    }

    /// Requests cancellation and waits for the loop to exit. Notices still buffered
    /// are not processed.
    pub async fn shutdown(self) {
        let Self { cancel, task, .. } = self;
        let _ = cancel.send(());
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Session reaper task panicked");
        }
    }
}

pub(crate) fn spawn(
    registry: Arc<SessionRegistry>,
    notices: mpsc::Receiver<Notice>,
    garbage_threshold: usize,
) -> ReaperHandle {
    let (cancel, cancel_rx) = oneshot::channel();
    let (stats_tx, stats) = watch::channel(ReaperStats::default());

    let reaper = Reaper {
        registry,
        queue: MinHeap::new(),
        current: HashMap::new(),
        garbage_threshold,
        stats: ReaperStats::default(),
        stats_tx,
    };
    let task = tokio::spawn(reaper.run(notices, cancel_rx));

    ReaperHandle {
        cancel,
        task,
        stats,
    }
}

struct Reaper {
    registry: Arc<SessionRegistry>,
    queue: MinHeap<ExpiryEntry>,
    /// Latest known expiry per session. Exactly one queued entry matches each.
    current: HashMap<Uuid, DateTime<Utc>>,
    garbage_threshold: usize,
    stats: ReaperStats,
    stats_tx: watch::Sender<ReaperStats>,
}

impl Reaper {
    async fn run(mut self, mut notices: mpsc::Receiver<Notice>, mut cancel: oneshot::Receiver<()>) {
        tracing::info!(
            garbage_threshold = self.garbage_threshold,
            "Session reaper started"
        );
        let mut detached = false;

        loop {
            let timer = sleep_until_due(self.next_delay());

            tokio::select! {
                biased;

                signal = &mut cancel, if !detached => match signal {
                    Ok(()) => {
                        tracing::info!("Session reaper cancelled");
                        break;
                    }
                    Err(_) => detached = true,
                },

                notice = notices.recv() => match notice {
                    Some(notice) => {
                        self.stats.processed += 1;
                        self.on_notice(notice).await;
                    }
                    None => {
                        tracing::info!("Session store dropped, reaper exiting");
                        break;
                    }
                },

                () = timer => self.on_due().await,
            }

            self.publish();
        }
    }

    /// Time until the earliest queued expiry, `None` when nothing is queued.
    fn next_delay(&self) -> Option<Duration> {
        let head = self.queue.peek()?;
        let until = head.expires_at - self.registry.now();
        Some(until.to_std().unwrap_or(Duration::ZERO))
    }

    async fn on_notice(&mut self, notice: Notice) {
        match notice {
            Notice::Created(entry) | Notice::Renewed(entry) => {
                // A previous entry for this session, if any, turns into garbage.
                self.current.insert(entry.session_id, entry.expires_at);
                self.queue.push(entry);
            }
            Notice::Removed(session_id) => {
                self.current.remove(&session_id);
            }
        }

        if self.garbage() >= self.garbage_threshold {
            self.rebuild().await;
        }
    }

    /// Queued entries that are not the current expiry of a known session.
    fn garbage(&self) -> usize {
        self.queue.len().saturating_sub(self.current.len())
    }

    async fn rebuild(&mut self) {
        let snapshot = self.registry.expiry_snapshot().await;
        let before = self.queue.len();
        self.current = snapshot
            .iter()
            .map(|entry| (entry.session_id, entry.expires_at))
            .collect();
        self.queue.rebuild(snapshot);
        self.stats.rebuilds += 1;
        tracing::debug!(
            before,
            after = self.queue.len(),
            "Session expiry queue rebuilt"
        );
    }

    fn is_current(&self, entry: &ExpiryEntry) -> bool {
        self.current.get(&entry.session_id) == Some(&entry.expires_at)
    }

    async fn on_due(&mut self) {
        let Some(entry) = self.queue.pop() else {
            return;
        };
        if !self.is_current(&entry) {
            return;
        }

        match self.registry.evict_if_expired(&entry).await {
            Eviction::Pending { stale: false } => self.queue.push(entry),
            // A renewal notice for this session is still in flight and will requeue it.
            Eviction::Absent | Eviction::Pending { stale: true } => {
                self.current.remove(&entry.session_id);
            }
            Eviction::Evicted { .. } => {
                self.current.remove(&entry.session_id);
                self.stats.evicted += 1;
                tracing::debug!(session_id = %entry.session_id, "Expired session reaped");
            }
        }
    }

    fn publish(&mut self) {
        self.stats.queue_len = self.queue.len();
        self.stats.garbage = self.garbage();
        self.stats_tx.send_replace(self.stats);
    }
}

async fn sleep_until_due(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::Duration;
    use uuid::Uuid;

    use crate::clock::{ManualClock, SystemClock};
    use crate::config::SessionConfig;
    use crate::store::sessions::{SessionError, SessionStore};

    use super::*;

    async fn wait_for_stats(
        handle: &ReaperHandle,
        done: impl FnMut(&ReaperStats) -> bool,
    ) -> ReaperStats {
        let mut rx = handle.subscribe();
        let stats = tokio::time::timeout(StdDuration::from_secs(5), rx.wait_for(done))
            .await
            .expect("reaper caught up in time")
            .expect("reaper alive");
        *stats
    }

    #[tokio::test]
    async fn expired_session_is_reaped_without_lookup() {
        let (store, reaper) = SessionStore::start(&SessionConfig::default(), Arc::new(SystemClock));
        let session = store
            .create(Uuid::new_v4(), Duration::milliseconds(50))
            .await
            .unwrap();

        tokio::time::sleep(StdDuration::from_millis(150)).await;

        assert_eq!(store.len().await, 0, "reaper evicted before any lookup");
        assert_eq!(store.lookup(session.id).await, Err(SessionError::NotFound));
        let stats = reaper.stats();
        assert_eq!(stats.evicted, 1);
        assert_eq!(stats.queue_len, 0);
        reaper.shutdown().await;
    }

    #[tokio::test]
    async fn renewed_session_outlives_its_first_deadline() {
        let (store, reaper) = SessionStore::start(&SessionConfig::default(), Arc::new(SystemClock));
        let session = store
            .create(Uuid::new_v4(), Duration::milliseconds(80))
            .await
            .unwrap();

        tokio::time::sleep(StdDuration::from_millis(40)).await;
        store
            .renew(session.id, Duration::milliseconds(400))
            .await
            .unwrap();

        tokio::time::sleep(StdDuration::from_millis(120)).await;
        assert!(store.lookup(session.id).await.is_ok());
        assert_eq!(reaper.stats().evicted, 0);
        reaper.shutdown().await;
    }

    #[tokio::test]
    async fn rapid_renewals_trigger_compaction() {
        let clock = Arc::new(ManualClock::default());
        let config = SessionConfig {
            garbage_threshold: 128,
            ..SessionConfig::default()
        };
        let (store, reaper) = SessionStore::start(&config, clock.clone());
        let session = store
            .create(Uuid::new_v4(), Duration::hours(1))
            .await
            .unwrap();

        for _ in 0..200 {
            clock.advance(Duration::milliseconds(1));
            store.renew(session.id, Duration::hours(1)).await.unwrap();
        }

        let stats = wait_for_stats(&reaper, |s| s.processed >= 201).await;
        let live = store.len().await;
        assert_eq!(live, 1);
        assert!(stats.rebuilds >= 1, "queue was compacted");
        assert!(
            stats.queue_len <= live + config.garbage_threshold,
            "queue holds {} entries for {} live session",
            stats.queue_len,
            live
        );
        assert!(stats.garbage < config.garbage_threshold);
        reaper.shutdown().await;
    }

    #[tokio::test]
    async fn replaced_session_entry_resolves_as_garbage() {
        let (store, reaper) = SessionStore::start(&SessionConfig::default(), Arc::new(SystemClock));
        let owner = Uuid::new_v4();
        let first = store
            .create(owner, Duration::milliseconds(30))
            .await
            .unwrap();
        let second = store.create(owner, Duration::seconds(30)).await.unwrap();

        let stats = wait_for_stats(&reaper, |s| s.processed >= 3 && s.queue_len == 1).await;
        assert_eq!(stats.evicted, 0);
        assert_eq!(stats.garbage, 0);
        assert_eq!(store.lookup(first.id).await, Err(SessionError::NotFound));
        assert!(store.lookup(second.id).await.is_ok());
        reaper.shutdown().await;
    }

    #[tokio::test]
    async fn deleted_sessions_count_as_garbage() {
        let clock = Arc::new(ManualClock::default());
        let config = SessionConfig {
            garbage_threshold: 4,
            ..SessionConfig::default()
        };
        let (store, reaper) = SessionStore::start(&config, clock.clone());

        let mut short_lived = Vec::new();
        for _ in 0..4 {
            let session = store
                .create(Uuid::new_v4(), Duration::seconds(1))
                .await
                .unwrap();
            short_lived.push(session.id);
        }
        for id in &short_lived {
            assert!(store.delete(*id).await);
        }

        let kept = store
            .create(Uuid::new_v4(), Duration::hours(1))
            .await
            .unwrap();
        for _ in 0..3 {
            clock.advance(Duration::milliseconds(1));
            store.renew(kept.id, Duration::hours(1)).await.unwrap();
        }
        clock.advance(Duration::seconds(2));
        for _ in 0..4 {
            clock.advance(Duration::milliseconds(1));
            store.renew(kept.id, Duration::hours(1)).await.unwrap();
        }

        // 4 creates + 4 removals + 1 create + 7 renewals.
        let stats = wait_for_stats(&reaper, |s| s.processed >= 16).await;
        let live = store.len().await;
        assert_eq!(live, 1);
        assert!(stats.rebuilds >= 1);
        assert!(
            stats.queue_len <= live + config.garbage_threshold,
            "queue holds {} entries for {} live session",
            stats.queue_len,
            live
        );
        assert!(stats.garbage < config.garbage_threshold);
        reaper.shutdown().await;
    }

    #[tokio::test]
    async fn queue_stays_bounded_under_mixed_churn() {
        let clock = Arc::new(ManualClock::default());
        let config = SessionConfig {
            garbage_threshold: 8,
            ..SessionConfig::default()
        };
        let (store, reaper) = SessionStore::start(&config, clock.clone());
        let owners: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let mut sessions: Vec<Option<Uuid>> = vec![None; owners.len()];
        let mut sent = 0_u64;

        for step in 0..120 {
            clock.advance(Duration::milliseconds(1));
            let slot = step % owners.len();
            match (step / owners.len()) % 4 {
                // Log in again: replaces whatever the owner had.
                0 => {
                    let session = store.create(owners[slot], Duration::hours(1)).await.unwrap();
                    sent += if sessions[slot].is_some() { 2 } else { 1 };
                    sessions[slot] = Some(session.id);
                }
                3 => {
                    if store.delete_for_owner(owners[slot]).await {
                        sent += 1;
                    }
                    sessions[slot] = None;
                }
                _ => {
                    if let Some(id) = sessions[slot] {
                        store.renew(id, Duration::hours(1)).await.unwrap();
                        sent += 1;
                    }
                }
            }

            let live = store.len().await;
            let stats = wait_for_stats(&reaper, |s| s.processed >= sent).await;
            assert!(
                stats.queue_len <= live + config.garbage_threshold,
                "step {step}: queue holds {} entries for {live} live sessions",
                stats.queue_len
            );
            assert!(stats.queue_len >= live, "every live session stays queued");
            assert!(stats.garbage < config.garbage_threshold);
        }

        assert!(reaper.stats().rebuilds >= 1);
        reaper.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let (store, reaper) = SessionStore::start(&SessionConfig::default(), Arc::new(SystemClock));
        reaper.shutdown().await;

        // The store stays usable; expiry falls back to lookups.
        let session = store
            .create(Uuid::new_v4(), Duration::seconds(5))
            .await
            .unwrap();
        assert!(store.lookup(session.id).await.is_ok());
    }

    #[tokio::test]
    async fn dropped_handle_keeps_reaper_running() {
        let (store, reaper) = SessionStore::start(&SessionConfig::default(), Arc::new(SystemClock));
        let mut stats = reaper.subscribe();
        drop(reaper);

        store
            .create(Uuid::new_v4(), Duration::milliseconds(20))
            .await
            .unwrap();

        let reaped = tokio::time::timeout(StdDuration::from_secs(5), stats.wait_for(|s| s.evicted == 1))
            .await
            .expect("reaped in time")
            .is_ok();
        assert!(reaped);
        assert!(store.is_empty().await);
    }
}
