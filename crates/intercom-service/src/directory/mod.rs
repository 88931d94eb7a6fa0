//! Session directory.
//!
//! Owns productions (through a [`ProductionStore`]) and user sessions, tracks
//! session liveness and wakes long-pollers when the participant picture
//! changes.
//!
//! # Session liveness
//!
//! ```text
//! created -> active <-> inactive -> expired
//!               \___________\________-> deleted
//! ```
//!
//! - active: `last_seen` within the active threshold (10s)
//! - inactive: within the disconnect threshold (30s); still listed
//! - expired: beyond it; hidden from listings and reaped by `sweep`
//!
//! WHIP/WHEP sessions are always active and never reaped; they end on DELETE.

mod notify;
mod store;

pub use notify::{ChangeNotifier, ChangeWaiter};
pub use store::{InMemoryProductionStore, Line, NewLine, Production, ProductionStore};

use crate::bridge::EndpointDescription;
use crate::errors::IntercomError;
use chrono::{DateTime, Utc};
use common::types::{LineId, ProductionId, SessionId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// How the session was negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Broker offers, client answers and heartbeats.
    Legacy,
    Whip,
    Whep,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Legacy => "legacy",
            SessionKind::Whip => "whip",
            SessionKind::Whep => "whep",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Active,
    Inactive,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessThresholds {
    pub active: Duration,
    pub disconnect: Duration,
}

impl Default for LivenessThresholds {
    fn default() -> Self {
        Self {
            active: Duration::from_secs(10),
            disconnect: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserSession {
    pub session_id: SessionId,
    pub production_id: ProductionId,
    pub line_id: LineId,
    pub name: String,
    pub conference_id: String,
    pub endpoint_id: String,
    /// Last description sent to (or received from) the bridge.
    pub description: EndpointDescription,
    pub kind: SessionKind,
    pub created_at: DateTime<Utc>,
    pub last_seen: Instant,
}

impl UserSession {
    pub fn liveness(&self, now: Instant, thresholds: &LivenessThresholds) -> Liveness {
        if self.kind != SessionKind::Legacy {
            return Liveness::Active;
        }
        let idle = now.saturating_duration_since(self.last_seen);
        if idle <= thresholds.active {
            Liveness::Active
        } else if idle <= thresholds.disconnect {
            Liveness::Inactive
        } else {
            Liveness::Expired
        }
    }
}

/// Input for [`SessionDirectory::create_user_session`].
#[derive(Debug, Clone)]
pub struct NewSession {
    pub session_id: SessionId,
    pub production_id: ProductionId,
    pub line_id: LineId,
    pub name: String,
    pub conference_id: String,
    pub endpoint_id: String,
    pub description: EndpointDescription,
    pub kind: SessionKind,
}

/// A session as shown in participant listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub session_id: SessionId,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounts {
    pub active: usize,
    pub inactive: usize,
    pub expired: usize,
}

/// Outcome of one [`SessionDirectory::sweep`].
#[derive(Debug, Clone)]
pub struct SweepReport {
    /// Counts of the sessions left after reaping.
    pub counts: SessionCounts,
    pub reaped: Vec<UserSession>,
    pub notified: bool,
}

#[derive(Debug, Default)]
struct SessionState {
    sessions: HashMap<SessionId, UserSession>,
    last_counts: SessionCounts,
}

pub struct SessionDirectory {
    store: Arc<dyn ProductionStore>,
    state: Mutex<SessionState>,
    notifier: ChangeNotifier,
    thresholds: LivenessThresholds,
}

impl SessionDirectory {
    pub fn new(store: Arc<dyn ProductionStore>, thresholds: LivenessThresholds) -> Self {
        Self {
            store,
            state: Mutex::new(SessionState::default()),
            notifier: ChangeNotifier::new(),
            thresholds,
        }
    }

    /// Directory backed by an [`InMemoryProductionStore`].
    pub fn in_memory(thresholds: LivenessThresholds) -> Self {
        Self::new(Arc::new(InMemoryProductionStore::new()), thresholds)
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Productions and lines
    // ------------------------------------------------------------------

    pub async fn create_production(
        &self,
        name: String,
        lines: Vec<NewLine>,
    ) -> Result<Production, IntercomError> {
        self.store.create_production(name, lines).await
    }

    pub async fn get_production(&self, id: ProductionId) -> Result<Production, IntercomError> {
        self.store.get_production(id).await
    }

    pub async fn list_productions(&self) -> Result<Vec<Production>, IntercomError> {
        self.store.list_productions().await
    }

    /// Delete a production and every session attached to it. Returns the
    /// removed sessions so their bridge endpoints can be expired.
    pub async fn delete_production(
        &self,
        id: ProductionId,
    ) -> Result<Vec<UserSession>, IntercomError> {
        self.store.delete_production(id).await?;
        Ok(self.remove_sessions_where(|s| s.production_id == id))
    }

    pub async fn add_line(&self, id: ProductionId, line: NewLine) -> Result<Line, IntercomError> {
        self.store.add_line(id, line).await
    }

    pub async fn rename_line(
        &self,
        id: ProductionId,
        line_id: LineId,
        name: String,
    ) -> Result<Line, IntercomError> {
        self.store.rename_line(id, line_id, name).await
    }

    /// Delete a line and its sessions. Returns the removed sessions.
    pub async fn delete_line(
        &self,
        id: ProductionId,
        line_id: LineId,
    ) -> Result<Vec<UserSession>, IntercomError> {
        self.store.delete_line(id, line_id).await?;
        Ok(self.remove_sessions_where(|s| s.production_id == id && s.line_id == line_id))
    }

    pub async fn get_line(&self, id: ProductionId, line_id: LineId) -> Result<Line, IntercomError> {
        self.store
            .get_production(id)
            .await?
            .line(line_id)
            .cloned()
            .ok_or_else(|| IntercomError::LineNotFound(line_id.to_string()))
    }

    /// The only writer of `Line::bridge_conference_id`. Callers go through
    /// the serialized allocation path in the orchestrator.
    pub async fn set_line_conference_id(
        &self,
        id: ProductionId,
        line_id: LineId,
        conference_id: String,
    ) -> Result<(), IntercomError> {
        self.store
            .set_line_conference_id(id, line_id, conference_id)
            .await
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    pub fn create_user_session(&self, new: NewSession) -> UserSession {
        let session = UserSession {
            session_id: new.session_id,
            production_id: new.production_id,
            line_id: new.line_id,
            name: new.name,
            conference_id: new.conference_id,
            endpoint_id: new.endpoint_id,
            description: new.description,
            kind: new.kind,
            created_at: Utc::now(),
            last_seen: Instant::now(),
        };
        self.lock()
            .sessions
            .insert(session.session_id, session.clone());

        debug!(
            target: "intercom.directory",
            session_id = %session.session_id,
            kind = session.kind.as_str(),
            "Session created"
        );
        self.notifier.notify();
        session
    }

    pub fn get_session(&self, session_id: SessionId) -> Result<UserSession, IntercomError> {
        self.lock()
            .sessions
            .get(&session_id)
            .cloned()
            .ok_or_else(|| IntercomError::SessionNotFound(session_id.to_string()))
    }

    /// Store the negotiated description and refresh `last_seen`.
    pub fn update_session_endpoint(
        &self,
        session_id: SessionId,
        description: EndpointDescription,
    ) -> Result<(), IntercomError> {
        let mut state = self.lock();
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| IntercomError::SessionNotFound(session_id.to_string()))?;
        session.description = description;
        session.last_seen = Instant::now();
        Ok(())
    }

    pub fn record_heartbeat(&self, session_id: SessionId, now: Instant) -> Result<(), IntercomError> {
        let mut state = self.lock();
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| IntercomError::SessionNotFound(session_id.to_string()))?;
        session.last_seen = now;
        Ok(())
    }

    pub fn delete_user_session(&self, session_id: SessionId) -> Result<UserSession, IntercomError> {
        let removed = self
            .lock()
            .sessions
            .remove(&session_id)
            .ok_or_else(|| IntercomError::SessionNotFound(session_id.to_string()))?;

        debug!(target: "intercom.directory", session_id = %session_id, "Session deleted");
        self.notifier.notify();
        Ok(removed)
    }

    fn remove_sessions_where(&self, predicate: impl Fn(&UserSession) -> bool) -> Vec<UserSession> {
        let removed: Vec<UserSession> = {
            let mut state = self.lock();
            let ids: Vec<SessionId> = state
                .sessions
                .values()
                .filter(|&s| predicate(s))
                .map(|s| s.session_id)
                .collect();
            ids.iter()
                .filter_map(|id| state.sessions.remove(id))
                .collect()
        };
        if !removed.is_empty() {
            self.notifier.notify();
        }
        removed
    }

    /// Non-expired sessions on a line, oldest first.
    pub fn get_users_for_line(&self, production_id: ProductionId, line_id: LineId) -> Vec<Participant> {
        self.users_for_line_at(production_id, line_id, Instant::now())
    }

    fn users_for_line_at(
        &self,
        production_id: ProductionId,
        line_id: LineId,
        now: Instant,
    ) -> Vec<Participant> {
        let state = self.lock();
        let mut sessions: Vec<(&UserSession, Liveness)> = state
            .sessions
            .values()
            .filter(|s| s.production_id == production_id && s.line_id == line_id)
            .map(|s| (s, s.liveness(now, &self.thresholds)))
            .filter(|(_, liveness)| *liveness != Liveness::Expired)
            .collect();
        sessions.sort_by_key(|(s, _)| s.created_at);

        sessions
            .into_iter()
            .map(|(s, liveness)| Participant {
                session_id: s.session_id,
                name: s.name.clone(),
                is_active: liveness == Liveness::Active,
            })
            .collect()
    }

    /// Wait for the next change notification, or `timeout`, then return the
    /// line's current participants.
    pub async fn wait_for_users_change(
        &self,
        production_id: ProductionId,
        line_id: LineId,
        timeout: Duration,
    ) -> Vec<Participant> {
        let mut waiter = self.notifier.subscribe();
        if tokio::time::timeout(timeout, waiter.changed()).await.is_err() {
            debug!(target: "intercom.directory", "Participant long-poll timed out");
        }
        drop(waiter);
        self.get_users_for_line(production_id, line_id)
    }

    pub fn session_counts(&self) -> SessionCounts {
        let now = Instant::now();
        let state = self.lock();
        count_sessions(state.sessions.values(), now, &self.thresholds)
    }

    /// Reap expired legacy sessions and notify waiters when the aggregate
    /// counts changed or anything was reaped. Reaped sessions are returned so
    /// their bridge endpoints can be released.
    pub fn sweep(&self, now: Instant) -> SweepReport {
        let (counts, reaped, changed) = {
            let mut state = self.lock();
            let thresholds = self.thresholds;

            let expired: Vec<SessionId> = state
                .sessions
                .iter()
                .filter(|(_, s)| s.liveness(now, &thresholds) == Liveness::Expired)
                .map(|(id, _)| *id)
                .collect();
            let reaped: Vec<UserSession> = expired
                .iter()
                .filter_map(|id| state.sessions.remove(id))
                .collect();

            let counts = count_sessions(state.sessions.values(), now, &thresholds);
            let changed = counts != state.last_counts;
            state.last_counts = counts;
            (counts, reaped, changed)
        };

        if !reaped.is_empty() {
            info!(target: "intercom.directory", reaped = reaped.len(), "Reaped expired sessions");
        }
        let notified = changed || !reaped.is_empty();
        if notified {
            self.notifier.notify();
        }
        SweepReport {
            counts,
            reaped,
            notified,
        }
    }
}

fn count_sessions<'a>(
    sessions: impl Iterator<Item = &'a UserSession>,
    now: Instant,
    thresholds: &LivenessThresholds,
) -> SessionCounts {
    let mut counts = SessionCounts::default();
    for session in sessions {
        match session.liveness(now, thresholds) {
            Liveness::Active => counts.active += 1,
            Liveness::Inactive => counts.inactive += 1,
            Liveness::Expired => counts.expired += 1,
        }
    }
    counts
}
