//! Session Registry
//!
//! Owns the map of live sessions and a connection → sessions index used for
//! disconnect cleanup. The map itself never leaves this module; everything
//! else sees `SessionHandle`s.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{RelayError, Result};
use crate::gateway::ConnectionGateway;
use crate::id::IdGenerator;
use crate::session::{ConnectionId, Session, SessionId};
use crate::session_actor::{SessionHandle, SessionSnapshot, spawn_session};

pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    by_connection: RwLock<HashMap<ConnectionId, HashSet<SessionId>>>,
    id_generator: Box<dyn IdGenerator>,
    max_id_attempts: usize,
    gateway: Arc<ConnectionGateway>,
}

impl SessionRegistry {
    pub fn new(
        id_generator: Box<dyn IdGenerator>,
        max_id_attempts: usize,
        gateway: Arc<ConnectionGateway>,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            by_connection: RwLock::new(HashMap::new()),
            id_generator,
            max_id_attempts: max_id_attempts.max(1),
            gateway,
        }
    }

    /// Allocate a fresh session owned by `host_connection_id`.
    pub async fn create(&self, host_connection_id: &str) -> Result<SessionHandle> {
        let mut sessions = self.sessions.write().await;

        let mut id = None;
        for attempt in 1..=self.max_id_attempts {
            let candidate = self.id_generator.generate();
            if !sessions.contains_key(&candidate) {
                id = Some(candidate);
                break;
            }
            warn!(attempt, candidate = %candidate, "Session id collision, regenerating");
        }
        let id = id.ok_or(RelayError::IdCollision {
            attempts: self.max_id_attempts,
        })?;

        let session = Session::new(id.clone(), host_connection_id.to_string());
        let handle = spawn_session(session, self.gateway.clone());
        sessions.insert(id.clone(), handle.clone());

        self.by_connection
            .write()
            .await
            .entry(host_connection_id.to_string())
            .or_default()
            .insert(id.clone());

        info!(session_id = %id, host = %host_connection_id, "Presentation created");
        Ok(handle)
    }

    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Like `get`, for callers that propagate the miss.
    pub async fn require(&self, id: &str) -> Result<SessionHandle> {
        self.get(id)
            .await
            .ok_or_else(|| RelayError::NotFound(id.to_string()))
    }

    /// Remove a session and stop its actor, which tells the room the
    /// presentation ended. Returns how many members were notified.
    pub async fn delete(&self, id: &str) -> Option<usize> {
        let handle = self.sessions.write().await.remove(id)?;
        self.by_connection.write().await.retain(|_, ids| {
            ids.remove(id);
            !ids.is_empty()
        });
        debug!(session_id = %id, "Presentation removed from registry");

        match handle.end().await {
            Ok(notified) => Some(notified),
            Err(e) => {
                warn!(session_id = %id, "Session already stopped: {}", e);
                Some(0)
            }
        }
    }

    /// Every session in which the connection is host or remote.
    pub async fn find_by_connection(&self, connection_id: &str) -> Vec<SessionHandle> {
        let ids: Vec<SessionId> = self
            .by_connection
            .read()
            .await
            .get(connection_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();

        let sessions = self.sessions.read().await;
        ids.iter()
            .filter_map(|id| sessions.get(id).cloned())
            .collect()
    }

    /// Record that a remote joined a session.
    pub async fn track_remote(&self, connection_id: &str, session_id: &str) {
        if !self.sessions.read().await.contains_key(session_id) {
            return;
        }
        self.by_connection
            .write()
            .await
            .entry(connection_id.to_string())
            .or_default()
            .insert(session_id.to_string());
    }

    pub async fn untrack_remote(&self, connection_id: &str, session_id: &str) {
        let mut index = self.by_connection.write().await;
        if let Some(ids) = index.get_mut(connection_id) {
            ids.remove(session_id);
            if ids.is_empty() {
                index.remove(connection_id);
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn snapshots(&self) -> Vec<SessionSnapshot> {
        let handles: Vec<SessionHandle> = self.sessions.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(snapshot) = handle.snapshot().await {
                out.push(snapshot);
            }
        }
        out
    }
}
