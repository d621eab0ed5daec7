//! In-memory session store backing [`ClientService`].

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use pingscope_core::services::ClientService;
use pingscope_core::{ClientId, LookupError, LookupOutcome, SessionSnapshot};
use tracing::debug;

/// Session state keyed by client id.
///
/// Lookups can be slowed down or made to fail per client, and every lookup is
/// counted so callers can tell how often a client was queried.
pub struct SessionStore {
    sessions: DashMap<ClientId, SessionSnapshot>,
    failures: DashMap<ClientId, LookupError>,
    delays: DashMap<ClientId, Duration>,
    lookups: DashMap<ClientId, u64>,
    latency: Duration,
}

impl SessionStore {
    pub fn new(latency: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            failures: DashMap::new(),
            delays: DashMap::new(),
            lookups: DashMap::new(),
            latency,
        }
    }

    /// Insert or replace the session of `snapshot.client_id`.
    pub fn upsert(&self, snapshot: SessionSnapshot) {
        self.sessions.insert(snapshot.client_id.clone(), snapshot);
    }

    pub fn get(&self, client_id: &ClientId) -> Option<SessionSnapshot> {
        self.sessions.get(client_id).map(|s| s.value().clone())
    }

    pub fn remove(&self, client_id: &ClientId) -> Option<SessionSnapshot> {
        self.sessions.remove(client_id).map(|(_, s)| s)
    }

    /// Flip the connected flag off, keeping the session. Returns `false` if
    /// there is no session for the client.
    pub fn mark_disconnected(&self, client_id: &ClientId) -> bool {
        match self.sessions.get_mut(client_id) {
            Some(mut session) => {
                session.connected = false;
                true
            }
            None => false,
        }
    }

    /// Make every later lookup of `client_id` fail with `error`.
    pub fn fail_lookups_for(&self, client_id: ClientId, error: LookupError) {
        self.failures.insert(client_id, error);
    }

    pub fn clear_failure(&self, client_id: &ClientId) {
        self.failures.remove(client_id);
    }

    /// Override the store-wide latency for one client.
    pub fn delay_lookups_for(&self, client_id: ClientId, delay: Duration) {
        self.delays.insert(client_id, delay);
    }

    /// Number of lookups started for `client_id`.
    pub fn lookup_count(&self, client_id: &ClientId) -> u64 {
        self.lookups.get(client_id).map_or(0, |c| *c)
    }

    pub fn total_lookups(&self) -> u64 {
        self.lookups.iter().map(|c| *c.value()).sum()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[async_trait]
impl ClientService for SessionStore {
    async fn get_session(&self, client_id: &ClientId) -> LookupOutcome {
        *self.lookups.entry(client_id.clone()).or_insert(0) += 1;

        let delay = self
            .delays
            .get(client_id)
            .map_or(self.latency, |d| *d);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.failures.get(client_id).map(|e| e.value().clone()) {
            debug!(client_id = %client_id, error = %error, "injected lookup failure");
            return Err(error);
        }
        Ok(self.get(client_id))
    }
}
