use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::store::heap::Precedes;
use crate::workers::session_reaper::{self, ReaperHandle};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub owner: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,
    #[error("invalid session ttl: {0}")]
    InvalidTtl(String),
}

/// A scheduled expiry as the reaper sees it. May be stale: the store's record is
/// authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryEntry {
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl ExpiryEntry {
    fn of(session: &Session) -> Self {
        Self {
            session_id: session.id,
            expires_at: session.expires_at,
        }
    }
}

impl Precedes for ExpiryEntry {
    fn precedes(&self, other: &Self) -> bool {
        self.expires_at < other.expires_at
    }
}

/// Messages from the store to the reaper.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Notice {
    Created(ExpiryEntry),
    Renewed(ExpiryEntry),
    /// The store dropped the session itself (delete, replacement, lazy expiry).
    Removed(Uuid),
}

impl Notice {
    fn session_id(&self) -> Uuid {
        match self {
            Self::Created(entry) | Self::Renewed(entry) => entry.session_id,
            Self::Removed(id) => *id,
        }
    }
}

/// Outcome of the reaper asking the store to drop a session whose queued expiry passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Eviction {
    /// Already gone.
    Absent,
    /// Still valid. `stale` is false when the queued expiry equals the stored one,
    /// which means the timer fired early and the entry must be requeued.
    Pending { stale: bool },
    Evicted { stale: bool },
}

#[derive(Debug, Default)]
struct Records {
    sessions: Vec<Session>,
    by_id: HashMap<Uuid, usize>,
    by_owner: HashMap<Uuid, usize>,
}

impl Records {
    fn position(&self, id: &Uuid) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    fn get(&self, id: &Uuid) -> Option<&Session> {
        self.position(id).map(|idx| &self.sessions[idx])
    }

    fn owned_by(&self, owner: &Uuid) -> Option<Uuid> {
        self.by_owner.get(owner).map(|&idx| self.sessions[idx].id)
    }

    fn insert(&mut self, session: Session) {
        let idx = self.sessions.len();
        let previous_id = self.by_id.insert(session.id, idx);
        let previous_owner = self.by_owner.insert(session.owner, idx);
        debug_assert!(previous_id.is_none(), "session id already indexed");
        debug_assert!(previous_owner.is_none(), "owner already has a session");
        self.sessions.push(session);
    }

    /// Swap-remove: O(1), moves the last record into the hole and re-points its
    /// index entries.
    fn remove(&mut self, id: &Uuid) -> Option<Session> {
        let idx = self.by_id.remove(id)?;
        let removed = self.sessions.swap_remove(idx);
        let owner_idx = self.by_owner.remove(&removed.owner);
        debug_assert_eq!(owner_idx, Some(idx), "owner index out of sync");

        if let Some(moved) = self.sessions.get(idx) {
            self.by_id.insert(moved.id, idx);
            self.by_owner.insert(moved.owner, idx);
        }
        Some(removed)
    }
}

/// Session records shared between the store handle and the reaper.
#[derive(Debug)]
pub(crate) struct SessionRegistry {
    records: RwLock<Records>,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(Records::default()),
            clock,
        }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Deletes the session only if its stored expiry has passed.
    pub(crate) async fn evict_if_expired(&self, entry: &ExpiryEntry) -> Eviction {
        let mut records = self.records.write().await;
        let now = self.clock.now();

        let Some(idx) = records.position(&entry.session_id) else {
            return Eviction::Absent;
        };
        let stored = records.sessions[idx].expires_at;
        let stale = stored != entry.expires_at;
        if stored > now {
            return Eviction::Pending { stale };
        }

        records.remove(&entry.session_id);
        Eviction::Evicted { stale }
    }

    /// Copies every live `(id, expires_at)` pair under the read lock.
    pub(crate) async fn expiry_snapshot(&self) -> Vec<ExpiryEntry> {
        let records = self.records.read().await;
        records.sessions.iter().map(ExpiryEntry::of).collect()
    }
}

/// In-memory registry of login sessions, one per owner, expired autonomously by the
/// session reaper.
///
/// Every operation takes the single registry lock for its in-memory step only; the
/// reaper is notified after the lock is released.
#[derive(Debug)]
pub struct SessionStore {
    registry: Arc<SessionRegistry>,
    notices: mpsc::Sender<Notice>,
    max_ttl: Duration,
}

impl SessionStore {
    /// Builds the store and spawns its reaper on the current tokio runtime.
    pub fn start(config: &SessionConfig, clock: Arc<dyn Clock>) -> (Arc<Self>, ReaperHandle) {
        let registry = Arc::new(SessionRegistry::new(clock));
        let (notices, notice_rx) = mpsc::channel(config.channel_capacity.max(1));
        let reaper = session_reaper::spawn(registry.clone(), notice_rx, config.garbage_threshold);

        let store = Arc::new(Self {
            registry,
            notices,
            max_ttl: config.max_ttl,
        });
        (store, reaper)
    }

    /// Returns the live session with this id. An expired record found here is deleted
    /// on the spot and reported as not found.
    pub async fn lookup(&self, id: Uuid) -> Result<Session, SessionError> {
        {
            let records = self.registry.records.read().await;
            let now = self.registry.now();
            match records.get(&id) {
                None => return Err(SessionError::NotFound),
                Some(session) if !session.is_expired_at(now) => return Ok(session.clone()),
                Some(_) => {}
            }
        }

        // Expired under the read lock; re-check under the write lock since a renewal
        // may have landed in between.
        {
            let mut records = self.registry.records.write().await;
            let now = self.registry.now();
            match records.get(&id) {
                None => return Err(SessionError::NotFound),
                Some(session) if !session.is_expired_at(now) => return Ok(session.clone()),
                Some(_) => {
                    records.remove(&id);
                }
            }
        }

        tracing::debug!(session_id = %id, "Expired session evicted on lookup");
        self.notify(Notice::Removed(id)).await;
        Err(SessionError::NotFound)
    }

    /// Opens a session for `owner`, replacing the one it already has.
    pub async fn create(&self, owner: Uuid, ttl: Duration) -> Result<Session, SessionError> {
        self.validate_ttl(ttl)?;

        let (session, replaced) = {
            let mut records = self.registry.records.write().await;
            let replaced = records.owned_by(&owner);
            if let Some(previous) = replaced {
                records.remove(&previous);
                tracing::debug!(%owner, session_id = %previous, "Previous session replaced");
            }

            let mut id = Uuid::new_v4();
            while records.by_id.contains_key(&id) {
                id = Uuid::new_v4();
            }

            let session = Session {
                id,
                owner,
                expires_at: self.registry.now() + ttl,
            };
            records.insert(session.clone());
            (session, replaced)
        };

        if let Some(previous) = replaced {
            self.notify(Notice::Removed(previous)).await;
        }
        self.notify(Notice::Created(ExpiryEntry::of(&session))).await;
        Ok(session)
    }

    /// Pushes the expiry of a live session to `now + ttl`. The expiry never moves
    /// backwards: a shorter ttl than what remains leaves it unchanged.
    pub async fn renew(&self, id: Uuid, ttl: Duration) -> Result<Session, SessionError> {
        self.validate_ttl(ttl)?;

        let renewal = {
            let mut records = self.registry.records.write().await;
            let now = self.registry.now();

            let Some(idx) = records.position(&id) else {
                return Err(SessionError::NotFound);
            };
            if records.sessions[idx].is_expired_at(now) {
                records.remove(&id);
                None
            } else {
                let session = &mut records.sessions[idx];
                let target = now + ttl;
                let extended = target > session.expires_at;
                if extended {
                    session.expires_at = target;
                }
                Some((session.clone(), extended))
            }
        };

        let Some((session, extended)) = renewal else {
            tracing::debug!(session_id = %id, "Expired session evicted on renewal");
            self.notify(Notice::Removed(id)).await;
            return Err(SessionError::NotFound);
        };

        if extended {
            self.notify(Notice::Renewed(ExpiryEntry::of(&session))).await;
        }
        Ok(session)
    }

    /// Removes a session. Returns whether it was present.
    pub async fn delete(&self, id: Uuid) -> bool {
        let removed = self.registry.records.write().await.remove(&id).is_some();
        if removed {
            self.notify(Notice::Removed(id)).await;
        }
        removed
    }

    /// Removes whatever session `owner` holds. Returns whether there was one.
    pub async fn delete_for_owner(&self, owner: Uuid) -> bool {
        let removed = {
            let mut records = self.registry.records.write().await;
            records
                .owned_by(&owner)
                .and_then(|id| records.remove(&id))
                .map(|session| session.id)
        };
        match removed {
            Some(id) => {
                self.notify(Notice::Removed(id)).await;
                true
            }
            None => false,
        }
    }

    /// Current time on the store's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.registry.now()
    }

    /// Number of records currently held, expired-but-unreaped ones included.
    pub async fn len(&self) -> usize {
        self.registry.records.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn validate_ttl(&self, ttl: Duration) -> Result<(), SessionError> {
        if ttl <= Duration::zero() {
            return Err(SessionError::InvalidTtl(format!(
                "ttl must be positive, got {}ms",
                ttl.num_milliseconds()
            )));
        }
        if ttl > self.max_ttl {
            return Err(SessionError::InvalidTtl(format!(
                "session must not last longer than {}s",
                self.max_ttl.num_seconds()
            )));
        }
        Ok(())
    }

    /// Awaits channel capacity rather than dropping: a lost notice would leave the
    /// session to lazy expiry only.
    async fn notify(&self, notice: Notice) {
        if let Err(e) = self.notices.send(notice).await {
            tracing::warn!(
                session_id = %e.0.session_id(),
                "Session reaper stopped, expiry left to lookups"
            );
        }
    }
}
