use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;

use crate::config::Config;
use crate::store::{SessionStore, UserRepository};
use crate::workers::ReaperStats;

#[derive(Clone)]
pub struct AppState {
    sessions: Arc<SessionStore>,
    users: Arc<UserRepository>,
    reaper_stats: watch::Receiver<ReaperStats>,
    config: Arc<Config>,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        sessions: Arc<SessionStore>,
        users: Arc<UserRepository>,
        reaper_stats: watch::Receiver<ReaperStats>,
        config: &Config,
    ) -> Self {
        Self {
            sessions,
            users,
            reaper_stats,
            config: Arc::new(config.clone()),
            started_at: Instant::now(),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn users(&self) -> &UserRepository {
        &self.users
    }

    /// Latest published reaper counters.
    pub fn reaper_stats(&self) -> ReaperStats {
        *self.reaper_stats.borrow()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
