use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{RelayError, Result};
use crate::gateway::{ConnectionGateway, RoomId};
use crate::protocol::{Command, RelayedCommand, ServerEvent};
use crate::session::{ConnectionId, Role, Session, SessionId, SlideState};

/// Commands that can be sent to a session actor
#[derive(Debug)]
pub enum SessionCommand {
    Join {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<SlideState>,
    },
    /// A remote went away. Replies with the remaining remote count, or
    /// `None` when the connection was not a remote of this session.
    Leave {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<Option<usize>>,
    },
    Command {
        connection_id: ConnectionId,
        command: Command,
        respond_to: oneshot::Sender<Result<SlideState>>,
    },
    Update {
        connection_id: ConnectionId,
        current_slide: usize,
        total_slides: usize,
        respond_to: oneshot::Sender<Result<SlideState>>,
    },
    Snapshot {
        respond_to: oneshot::Sender<SessionSnapshot>,
    },
    /// The host went away: notify the room and stop.
    End {
        respond_to: oneshot::Sender<usize>,
    },
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub host_connection_id: ConnectionId,
    #[serde(flatten)]
    pub slides: SlideState,
    pub remotes: usize,
    pub created_at: DateTime<Utc>,
}

/// Handle to communicate with a session actor
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    host_connection_id: ConnectionId,
    sender: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn host_connection_id(&self) -> &str {
        &self.host_connection_id
    }

    pub fn room(&self) -> RoomId {
        RoomId::for_session(&self.id)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| RelayError::SessionClosed(self.id.clone()))?;
        rx.await
            .map_err(|_| RelayError::SessionClosed(self.id.clone()))
    }

    pub async fn join(&self, connection_id: &str) -> Result<SlideState> {
        let connection_id = connection_id.to_string();
        self.request(|respond_to| SessionCommand::Join {
            connection_id,
            respond_to,
        })
        .await
    }

    pub async fn leave(&self, connection_id: &str) -> Result<Option<usize>> {
        let connection_id = connection_id.to_string();
        self.request(|respond_to| SessionCommand::Leave {
            connection_id,
            respond_to,
        })
        .await
    }

    pub async fn command(&self, connection_id: &str, command: Command) -> Result<SlideState> {
        let connection_id = connection_id.to_string();
        self.request(|respond_to| SessionCommand::Command {
            connection_id,
            command,
            respond_to,
        })
        .await?
    }

    pub async fn update(
        &self,
        connection_id: &str,
        current_slide: usize,
        total_slides: usize,
    ) -> Result<SlideState> {
        let connection_id = connection_id.to_string();
        self.request(|respond_to| SessionCommand::Update {
            connection_id,
            current_slide,
            total_slides,
            respond_to,
        })
        .await?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.request(|respond_to| SessionCommand::Snapshot { respond_to })
            .await
    }

    /// Returns how many room members were told the presentation ended.
    pub async fn end(&self) -> Result<usize> {
        self.request(|respond_to| SessionCommand::End { respond_to })
            .await
    }
}

/// The session actor: sole owner of one `Session`.
///
/// Mutations and the events they produce are handled one message at a time,
/// so `sync-slide` broadcasts leave in the same order the state changed.
struct SessionActor {
    session: Session,
    room: RoomId,
    gateway: Arc<ConnectionGateway>,
    receiver: mpsc::Receiver<SessionCommand>,
}

impl SessionActor {
    fn spawn(session: Session, gateway: Arc<ConnectionGateway>) -> SessionHandle {
        let (sender, receiver) = mpsc::channel(32);
        let handle = SessionHandle {
            id: session.id.clone(),
            host_connection_id: session.host_connection_id.clone(),
            sender,
        };

        let actor = SessionActor {
            room: RoomId::for_session(&session.id),
            session,
            gateway,
            receiver,
        };

        tokio::spawn(async move {
            actor.run().await;
        });

        handle
    }

    async fn run(mut self) {
        let id = self.session.id.clone();
        debug!(session_id = %id, "Session actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                SessionCommand::Join {
                    connection_id,
                    respond_to,
                } => {
                    let total_remotes = self.session.add_remote(connection_id.clone());
                    self.gateway.join_room(&connection_id, &self.room).await;
                    self.gateway
                        .send(
                            &self.session.host_connection_id,
                            ServerEvent::RemoteConnected {
                                client_id: connection_id,
                                total_remotes,
                            },
                        )
                        .await;
                    let _ = respond_to.send(self.session.slide_state());
                }

                SessionCommand::Leave {
                    connection_id,
                    respond_to,
                } => {
                    let remaining = self.session.remove_remote(&connection_id);
                    if let Some(total_remotes) = remaining {
                        self.gateway.leave_room(&connection_id, &self.room).await;
                        self.gateway
                            .send(
                                &self.session.host_connection_id,
                                ServerEvent::RemoteDisconnected {
                                    client_id: connection_id,
                                    total_remotes,
                                },
                            )
                            .await;
                    }
                    let _ = respond_to.send(remaining);
                }

                SessionCommand::Command {
                    connection_id,
                    command,
                    respond_to,
                } => {
                    if !self.session.is_member(&connection_id, Role::Remote) {
                        let _ = respond_to.send(Err(self.unauthorized(connection_id)));
                        continue;
                    }
                    let state = self.session.apply_command(&command);
                    debug!(
                        session_id = %id,
                        command = command.name(),
                        slide = state.current_slide,
                        "Remote command applied"
                    );
                    self.gateway
                        .send(
                            &self.session.host_connection_id,
                            ServerEvent::RemoteCommand(RelayedCommand::new(
                                &command,
                                state.current_slide,
                                connection_id,
                            )),
                        )
                        .await;
                    self.gateway
                        .broadcast(&self.room, ServerEvent::SyncSlide(state), None)
                        .await;
                    let _ = respond_to.send(Ok(state));
                }

                SessionCommand::Update {
                    connection_id,
                    current_slide,
                    total_slides,
                    respond_to,
                } => {
                    if !self.session.is_member(&connection_id, Role::Host) {
                        let _ = respond_to.send(Err(self.unauthorized(connection_id)));
                        continue;
                    }
                    let state = self.session.apply_update(current_slide, total_slides);
                    self.gateway
                        .broadcast(
                            &self.room,
                            ServerEvent::SyncSlide(state),
                            Some(&self.session.host_connection_id),
                        )
                        .await;
                    let _ = respond_to.send(Ok(state));
                }

                SessionCommand::Snapshot { respond_to } => {
                    let _ = respond_to.send(SessionSnapshot {
                        id: self.session.id.clone(),
                        host_connection_id: self.session.host_connection_id.clone(),
                        slides: self.session.slide_state(),
                        remotes: self.session.remote_count(),
                        created_at: self.session.created_at,
                    });
                }

                SessionCommand::End { respond_to } => {
                    let notified = self
                        .gateway
                        .broadcast(
                            &self.room,
                            ServerEvent::PresentationEnded {},
                            Some(&self.session.host_connection_id),
                        )
                        .await;
                    for member in self.gateway.room_members(&self.room).await {
                        self.gateway.leave_room(&member, &self.room).await;
                    }
                    let _ = respond_to.send(notified);
                    break;
                }
            }
        }

        debug!(session_id = %id, "Session actor stopped");
    }

    fn unauthorized(&self, connection_id: ConnectionId) -> RelayError {
        RelayError::Unauthorized {
            session: self.session.id.clone(),
            connection: connection_id,
        }
    }
}

/// Start an actor for a fresh session and return its handle
pub fn spawn_session(session: Session, gateway: Arc<ConnectionGateway>) -> SessionHandle {
    SessionActor::spawn(session, gateway)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RelayMetrics;

    async fn setup() -> (
        Arc<ConnectionGateway>,
        SessionHandle,
        mpsc::Receiver<ServerEvent>,
    ) {
        let gateway = Arc::new(ConnectionGateway::new(16, Arc::new(RelayMetrics::new())));
        let host_rx = gateway.register("host").await;
        let session = Session::new("s1".into(), "host".into());
        gateway.join_room("host", &RoomId::for_session("s1")).await;
        let handle = spawn_session(session, gateway.clone());
        (gateway, handle, host_rx)
    }

    #[tokio::test]
    async fn test_join_notifies_host() {
        let (gateway, handle, mut host_rx) = setup().await;
        let _r1 = gateway.register("r1").await;

        let state = handle.join("r1").await.unwrap();
        assert_eq!(state.current_slide, 0);
        assert_eq!(state.total_slides, 0);
        assert_eq!(
            host_rx.recv().await,
            Some(ServerEvent::RemoteConnected {
                client_id: "r1".into(),
                total_remotes: 1
            })
        );
        assert!(gateway.room_members(&handle.room()).await.contains(&"r1".to_string()));
    }

    #[tokio::test]
    async fn test_command_from_non_remote_is_unauthorized() {
        let (_gateway, handle, _host_rx) = setup().await;
        let err = handle.command("stranger", Command::Next).await.unwrap_err();
        assert!(matches!(err, RelayError::Unauthorized { .. }));

        // The host is not a remote of its own session either.
        let err = handle.command("host", Command::Next).await.unwrap_err();
        assert!(matches!(err, RelayError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_update_from_remote_is_unauthorized() {
        let (gateway, handle, _host_rx) = setup().await;
        let _r1 = gateway.register("r1").await;
        handle.join("r1").await.unwrap();

        let err = handle.update("r1", 3, 10).await.unwrap_err();
        assert!(matches!(err, RelayError::Unauthorized { .. }));
        assert_eq!(handle.snapshot().await.unwrap().slides.total_slides, 0);
    }

    #[tokio::test]
    async fn test_end_stops_actor() {
        let (gateway, handle, _host_rx) = setup().await;
        let mut r1 = gateway.register("r1").await;
        handle.join("r1").await.unwrap();

        assert_eq!(handle.end().await.unwrap(), 1);
        assert_eq!(r1.recv().await, Some(ServerEvent::PresentationEnded {}));
        assert!(gateway.room_members(&handle.room()).await.is_empty());
        assert!(matches!(
            handle.snapshot().await,
            Err(RelayError::SessionClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_leave_unknown_remote_is_noop() {
        let (_gateway, handle, mut host_rx) = setup().await;
        assert_eq!(handle.leave("nobody").await.unwrap(), None);
        assert!(host_rx.try_recv().is_err());
    }
}
