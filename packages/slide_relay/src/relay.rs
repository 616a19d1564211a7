//! Command Relay
//!
//! The protocol state machine. Turns decoded client events into registry
//! and session-actor calls, and answers acknowledged requests.
//!
//! Only `join-remote` has a caller-visible failure. Commands and updates
//! from senders lacking the required role, or aimed at sessions that do
//! not exist, are dropped without a reply.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::RelayError;
use crate::gateway::ConnectionGateway;
use crate::metrics::RelayMetrics;
use crate::protocol::{AckReply, ClientEvent, Command, ServerEvent, decode_frame};
use crate::public_url::PublicUrl;
use crate::registry::SessionRegistry;

pub const NOT_FOUND_MESSAGE: &str = "Presentation not found";

pub struct CommandRelay {
    registry: Arc<SessionRegistry>,
    gateway: Arc<ConnectionGateway>,
    public_url: PublicUrl,
    metrics: Arc<RelayMetrics>,
}

impl CommandRelay {
    pub fn new(
        registry: Arc<SessionRegistry>,
        gateway: Arc<ConnectionGateway>,
        public_url: PublicUrl,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            registry,
            gateway,
            public_url,
            metrics,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn gateway(&self) -> &Arc<ConnectionGateway> {
        &self.gateway
    }

    /// A transport connection opened. Returns the queue its writer drains.
    pub async fn connect(&self, connection_id: &str) -> mpsc::Receiver<ServerEvent> {
        let rx = self.gateway.register(connection_id).await;
        self.metrics.connection_opened();
        self.gateway
            .send(
                connection_id,
                ServerEvent::Connected {
                    client_id: connection_id.to_string(),
                },
            )
            .await;
        debug!(conn_id = %connection_id, "Client connected");
        rx
    }

    /// Decode and dispatch one text frame.
    pub async fn handle_text(&self, connection_id: &str, text: &str) {
        self.metrics.message_received();

        let frame = match decode_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(conn_id = %connection_id, "Dropping malformed frame: {}", e);
                self.metrics.message_malformed();
                if let Some(ack) = e.ack {
                    self.gateway
                        .send(
                            connection_id,
                            ServerEvent::Ack {
                                ack,
                                reply: AckReply::failed(&e),
                            },
                        )
                        .await;
                }
                return;
            }
        };

        let reply = self.handle(connection_id, frame.event).await;
        if let (Some(ack), Some(reply)) = (frame.ack, reply) {
            self.gateway
                .send(connection_id, ServerEvent::Ack { ack, reply })
                .await;
        }
    }

    /// Dispatch a decoded event. Returns the ack body for request-style events.
    pub async fn handle(&self, connection_id: &str, event: ClientEvent) -> Option<AckReply> {
        match event {
            ClientEvent::CreatePresentation => Some(self.create_presentation(connection_id).await),
            ClientEvent::JoinRemote { session_id } => {
                Some(self.join_remote(connection_id, &session_id).await)
            }
            ClientEvent::RemoteCommand {
                session_id,
                command,
            } => {
                self.remote_command(connection_id, &session_id, command)
                    .await;
                None
            }
            ClientEvent::UpdatePresentation {
                session_id,
                current_slide,
                total_slides,
            } => {
                self.update_presentation(connection_id, &session_id, current_slide, total_slides)
                    .await;
                None
            }
        }
    }

    pub async fn create_presentation(&self, caller: &str) -> AckReply {
        match self.registry.create(caller).await {
            Ok(handle) => {
                self.gateway.join_room(caller, &handle.room()).await;
                self.metrics.session_created();
                let qr_url = self.public_url.remote_url(handle.id());
                AckReply::created(handle.id().to_string(), qr_url)
            }
            Err(e) => {
                error!(conn_id = %caller, "Failed to create presentation: {}", e);
                AckReply::failed(e)
            }
        }
    }

    pub async fn join_remote(&self, caller: &str, session_id: &str) -> AckReply {
        let Some(handle) = self.registry.get(session_id).await else {
            debug!(conn_id = %caller, session_id = %session_id, "Join for unknown presentation");
            self.metrics.join_rejected();
            return AckReply::failed(NOT_FOUND_MESSAGE);
        };

        // Indexed before the actor sees the join, so a dropped request still
        // gets cleaned up on disconnect.
        self.registry.track_remote(caller, session_id).await;
        match handle.join(caller).await {
            Ok(state) => {
                self.metrics.remote_joined();
                info!(conn_id = %caller, session_id = %session_id, "Remote joined presentation");
                AckReply::joined(state)
            }
            Err(e) => {
                debug!(conn_id = %caller, session_id = %session_id, "Join raced with teardown: {}", e);
                self.registry.untrack_remote(caller, session_id).await;
                self.metrics.join_rejected();
                AckReply::failed(NOT_FOUND_MESSAGE)
            }
        }
    }

    pub async fn remote_command(&self, caller: &str, session_id: &str, command: Command) {
        let handle = match self.registry.require(session_id).await {
            Ok(handle) => handle,
            Err(e) => return self.reject(caller, &e),
        };

        let name = command.name();
        let navigation = command.is_navigation();
        match handle.command(caller, command).await {
            Ok(state) if navigation => {
                debug!(session_id = %session_id, command = name, slide = state.current_slide, "Navigation relayed");
            }
            Ok(_) => {}
            Err(e) => self.reject(caller, &e),
        }
    }

    pub async fn update_presentation(
        &self,
        caller: &str,
        session_id: &str,
        current_slide: usize,
        total_slides: usize,
    ) {
        let handle = match self.registry.require(session_id).await {
            Ok(handle) => handle,
            Err(e) => return self.reject(caller, &e),
        };

        if let Err(e) = handle.update(caller, current_slide, total_slides).await {
            self.reject(caller, &e);
        }
    }

    /// A transport connection closed: end hosted sessions, prune memberships.
    pub async fn disconnect(&self, connection_id: &str) {
        for handle in self.registry.find_by_connection(connection_id).await {
            if handle.host_connection_id() == connection_id {
                if let Some(notified) = self.registry.delete(handle.id()).await {
                    info!(session_id = %handle.id(), remotes = notified, "Presentation ended (host disconnected)");
                    self.metrics.session_ended();
                }
            } else {
                match handle.leave(connection_id).await {
                    Ok(Some(remaining)) => {
                        debug!(conn_id = %connection_id, session_id = %handle.id(), remaining, "Remote left presentation");
                    }
                    Ok(None) => {}
                    Err(e) => debug!(session_id = %handle.id(), "Leave after teardown: {}", e),
                }
                self.registry
                    .untrack_remote(connection_id, handle.id())
                    .await;
            }
        }

        self.gateway.unregister(connection_id).await;
        self.metrics.connection_closed();
        debug!(conn_id = %connection_id, "Client disconnected");
    }

    fn reject(&self, caller: &str, err: &RelayError) {
        if matches!(err, RelayError::Unauthorized { .. }) {
            self.metrics.message_unauthorized();
        }
        debug!(conn_id = %caller, "Ignoring message: {}", err);
    }
}
