//! In-process session registry
//!
//! Each session sits behind its own async mutex: requests on one session run
//! one at a time, different sessions never wait on each other. Sessions nobody
//! has touched for the idle timeout are dropped by a background sweep.

use askdocs_common::errors::{AppError, Result};
use askdocs_common::pipeline::SessionState;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::info;
use uuid::Uuid;

pub type SessionHandle = Arc<Mutex<SessionState>>;

struct Entry {
    handle: SessionHandle,
    last_used: Instant,
}

#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Entry>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session and return its id
    pub async fn insert(&self, session: SessionState) -> Uuid {
        let id = session.id;
        let entry = Entry {
            handle: Arc::new(Mutex::new(session)),
            last_used: Instant::now(),
        };
        self.sessions.write().await.insert(id, entry);
        id
    }

    /// Look up a session and mark it as used
    pub async fn get(&self, id: Uuid) -> Result<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(&id)
            .ok_or_else(|| AppError::SessionNotFound { id: id.to_string() })?;
        entry.last_used = Instant::now();
        Ok(entry.handle.clone())
    }

    pub async fn remove(&self, id: Uuid) -> Result<()> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::SessionNotFound { id: id.to_string() })
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions unused for at least `idle`; returns how many went.
    ///
    /// A session whose handle is still held by a request is kept.
    pub async fn evict_idle(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|_, entry| {
            now.duration_since(entry.last_used) < idle || Arc::strong_count(&entry.handle) > 1
        });

        before - sessions.len()
    }

    /// Sweep idle sessions periodically for as long as the server runs
    pub fn spawn_eviction(&self, idle: Duration) -> JoinHandle<()> {
        let store = self.clone();
        let period = (idle / 4).max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let evicted = store.evict_idle(idle).await;
                if evicted > 0 {
                    let remaining = store.len().await;
                    info!(
                        evicted,
                        remaining,
                        idle_secs = idle.as_secs(),
                        "Evicted idle sessions"
                    );
                }
            }
        })
    }
}
