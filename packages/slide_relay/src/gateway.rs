//! Connection Gateway
//!
//! Owns the outbound half of every live connection and the room table.
//! Delivery is at-most-once: a send to a connection that is gone (or whose
//! queue is full) is dropped and logged, never surfaced to the caller.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

use crate::metrics::RelayMetrics;
use crate::protocol::ServerEvent;
use crate::session::ConnectionId;

const ROOM_PREFIX: &str = "presentation-";

/// Broadcast group of one presentation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId(String);

impl RoomId {
    pub fn for_session(session_id: &str) -> Self {
        Self(format!("{ROOM_PREFIX}{session_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct ConnectionGateway {
    connections: RwLock<HashMap<ConnectionId, mpsc::Sender<ServerEvent>>>,
    rooms: RwLock<HashMap<RoomId, HashSet<ConnectionId>>>,
    channel_capacity: usize,
    metrics: Arc<RelayMetrics>,
}

impl ConnectionGateway {
    pub fn new(channel_capacity: usize, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            rooms: RwLock::new(HashMap::new()),
            channel_capacity: channel_capacity.max(1),
            metrics,
        }
    }

    /// Register a connection and hand back the queue its writer drains.
    pub async fn register(&self, connection_id: &str) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        self.connections
            .write()
            .await
            .insert(connection_id.to_string(), tx);
        rx
    }

    /// Forget a connection and drop it from every room.
    pub async fn unregister(&self, connection_id: &str) {
        self.connections.write().await.remove(connection_id);

        let mut rooms = self.rooms.write().await;
        rooms.retain(|_, members| {
            members.remove(connection_id);
            !members.is_empty()
        });
    }

    pub async fn is_connected(&self, connection_id: &str) -> bool {
        self.connections.read().await.contains_key(connection_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn join_room(&self, connection_id: &str, room: &RoomId) {
        self.rooms
            .write()
            .await
            .entry(room.clone())
            .or_default()
            .insert(connection_id.to_string());
    }

    pub async fn leave_room(&self, connection_id: &str, room: &RoomId) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(room) {
            members.remove(connection_id);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
    }

    pub async fn room_members(&self, room: &RoomId) -> Vec<ConnectionId> {
        self.rooms
            .read()
            .await
            .get(room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Queue an event for one connection. Returns whether it was queued.
    pub async fn send(&self, connection_id: &str, event: ServerEvent) -> bool {
        let sender = self.connections.read().await.get(connection_id).cloned();
        match sender {
            Some(sender) => self.deliver(connection_id, &sender, event),
            None => {
                debug!(conn_id = %connection_id, event = event.name(), "Dropping event for unknown connection");
                self.metrics.message_dropped();
                false
            }
        }
    }

    /// Queue an event for every member of a room, optionally skipping one.
    /// Returns the number of connections it was queued for.
    pub async fn broadcast(&self, room: &RoomId, event: ServerEvent, except: Option<&str>) -> usize {
        let members = self.room_members(room).await;
        let targets: Vec<(ConnectionId, Option<mpsc::Sender<ServerEvent>>)> = {
            let connections = self.connections.read().await;
            members
                .into_iter()
                .filter(|id| Some(id.as_str()) != except)
                .map(|id| {
                    let sender = connections.get(&id).cloned();
                    (id, sender)
                })
                .collect()
        };

        let mut delivered = 0;
        for (connection_id, sender) in targets {
            let queued = match sender {
                Some(sender) => self.deliver(&connection_id, &sender, event.clone()),
                None => {
                    debug!(conn_id = %connection_id, room = %room, "Room member has no live connection");
                    self.metrics.message_dropped();
                    false
                }
            };
            if queued {
                delivered += 1;
            }
        }
        delivered
    }

    fn deliver(
        &self,
        connection_id: &str,
        sender: &mpsc::Sender<ServerEvent>,
        event: ServerEvent,
    ) -> bool {
        let name = event.name();
        match sender.try_send(event) {
            Ok(()) => {
                self.metrics.message_sent();
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(conn_id = %connection_id, event = name, "Outbound queue full, dropping event");
                self.metrics.message_dropped();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(conn_id = %connection_id, event = name, "Connection closed, dropping event");
                self.metrics.message_dropped();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SlideState;

    fn gateway() -> ConnectionGateway {
        ConnectionGateway::new(8, Arc::new(RelayMetrics::new()))
    }

    fn sync(current: usize) -> ServerEvent {
        ServerEvent::SyncSlide(SlideState {
            current_slide: current,
            total_slides: 5,
        })
    }

    #[test]
    fn test_room_id_format() {
        assert_eq!(RoomId::for_session("abc12345").as_str(), "presentation-abc12345");
    }

    #[tokio::test]
    async fn test_send_preserves_order() {
        let gw = gateway();
        let mut rx = gw.register("c1").await;

        assert!(gw.send("c1", sync(1)).await);
        assert!(gw.send("c1", sync(2)).await);

        assert_eq!(rx.recv().await, Some(sync(1)));
        assert_eq!(rx.recv().await, Some(sync(2)));
    }

    #[tokio::test]
    async fn test_send_to_unknown_connection_is_dropped() {
        let gw = gateway();
        assert!(!gw.send("ghost", sync(0)).await);
        assert_eq!(gw.metrics.snapshot().messages.dropped, 1);
    }

    #[tokio::test]
    async fn test_send_to_closed_receiver_is_dropped() {
        let gw = gateway();
        let rx = gw.register("c1").await;
        drop(rx);
        assert!(!gw.send("c1", sync(0)).await);
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        let gw = ConnectionGateway::new(1, Arc::new(RelayMetrics::new()));
        let _rx = gw.register("c1").await;
        assert!(gw.send("c1", sync(0)).await);
        assert!(!gw.send("c1", sync(1)).await);
    }

    #[tokio::test]
    async fn test_broadcast_with_exclusion() {
        let gw = gateway();
        let room = RoomId::for_session("s1");
        let mut host = gw.register("host").await;
        let mut remote = gw.register("remote").await;
        let mut outsider = gw.register("outsider").await;
        gw.join_room("host", &room).await;
        gw.join_room("remote", &room).await;

        assert_eq!(gw.broadcast(&room, sync(3), None).await, 2);
        assert_eq!(host.recv().await, Some(sync(3)));
        assert_eq!(remote.recv().await, Some(sync(3)));

        assert_eq!(gw.broadcast(&room, sync(4), Some("host")).await, 1);
        assert_eq!(remote.recv().await, Some(sync(4)));
        assert!(host.try_recv().is_err());
        assert!(outsider.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregister_leaves_rooms() {
        let gw = gateway();
        let room = RoomId::for_session("s1");
        let _rx = gw.register("c1").await;
        gw.join_room("c1", &room).await;
        assert_eq!(gw.room_members(&room).await, vec!["c1".to_string()]);

        gw.unregister("c1").await;
        assert!(gw.room_members(&room).await.is_empty());
        assert!(!gw.is_connected("c1").await);
        assert_eq!(gw.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_leave_room() {
        let gw = gateway();
        let room = RoomId::for_session("s1");
        let _a = gw.register("a").await;
        let _b = gw.register("b").await;
        gw.join_room("a", &room).await;
        gw.join_room("b", &room).await;
        gw.leave_room("a", &room).await;
        assert_eq!(gw.room_members(&room).await, vec!["b".to_string()]);
    }
}
