//! Wire Protocol Types
//!
//! Every WebSocket text frame is a JSON envelope `{"event", "data", "ack"?}`.
//! Inbound frames are decoded once, here, into typed events; nothing past
//! this module looks at raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::{ConnectionId, SessionId, SlideState};

pub const EVENT_CREATE_PRESENTATION: &str = "create-presentation";
pub const EVENT_JOIN_REMOTE: &str = "join-remote";
pub const EVENT_REMOTE_COMMAND: &str = "remote-command";
pub const EVENT_UPDATE_PRESENTATION: &str = "update-presentation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

/// A control command sent by a remote.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Next,
    Previous,
    /// Requested index as sent by the client; clamped when applied.
    Goto { index: i64 },
    Scroll { direction: ScrollDirection },
    ScrollSync { position: f64 },
    Presenter { toggle: Option<bool> },
    Focus { toggle: Option<bool> },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Next => "next",
            Command::Previous => "previous",
            Command::Goto { .. } => "goto",
            Command::Scroll { .. } => "scroll",
            Command::ScrollSync { .. } => "scroll-sync",
            Command::Presenter { .. } => "presenter",
            Command::Focus { .. } => "focus",
        }
    }

    pub fn is_navigation(&self) -> bool {
        matches!(
            self,
            Command::Next | Command::Previous | Command::Goto { .. }
        )
    }

    fn from_raw(raw: &RawRemoteCommand) -> Result<Self, DecodeError> {
        let command = match raw.command.as_str() {
            "next" => Command::Next,
            "previous" => Command::Previous,
            "goto" => Command::Goto {
                index: raw.slide_index.ok_or(DecodeError::MissingField {
                    command: "goto",
                    field: "slideIndex",
                })?,
            },
            "scroll" => Command::Scroll {
                direction: raw.scroll_direction.ok_or(DecodeError::MissingField {
                    command: "scroll",
                    field: "scrollDirection",
                })?,
            },
            "scroll-sync" => Command::ScrollSync {
                position: raw.scroll_position.ok_or(DecodeError::MissingField {
                    command: "scroll-sync",
                    field: "scrollPosition",
                })?,
            },
            "presenter" => Command::Presenter { toggle: raw.toggle },
            "focus" => Command::Focus { toggle: raw.toggle },
            other => return Err(DecodeError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }
}

/// Decoded client event.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    CreatePresentation,
    JoinRemote {
        session_id: SessionId,
    },
    RemoteCommand {
        session_id: SessionId,
        command: Command,
    },
    UpdatePresentation {
        session_id: SessionId,
        current_slide: usize,
        total_slides: usize,
    },
}

/// A decoded inbound frame together with its acknowledgement id.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientFrame {
    pub ack: Option<u64>,
    pub event: ClientEvent,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON frame: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("unknown event `{0}`")]
    UnknownEvent(String),

    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    #[error("`{command}` command requires `{field}`")]
    MissingField {
        command: &'static str,
        field: &'static str,
    },

    #[error("invalid `{event}` payload: {source}")]
    InvalidPayload {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Decode failure, carrying the ack id when the envelope itself was readable.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct FrameError {
    pub ack: Option<u64>,
    #[source]
    pub error: DecodeError,
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    ack: Option<u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JoinPayload {
    Id(String),
    Object {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRemoteCommand {
    session_id: String,
    command: String,
    #[serde(default)]
    slide_index: Option<i64>,
    #[serde(default)]
    scroll_direction: Option<ScrollDirection>,
    #[serde(default)]
    scroll_position: Option<f64>,
    #[serde(default)]
    toggle: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUpdate {
    session_id: String,
    current_slide: usize,
    total_slides: usize,
}

fn payload<T: serde::de::DeserializeOwned>(
    event: &'static str,
    data: Value,
) -> Result<T, DecodeError> {
    serde_json::from_value(data).map_err(|source| DecodeError::InvalidPayload { event, source })
}

/// Decode a text frame into a typed client event.
pub fn decode_frame(text: &str) -> Result<ClientFrame, FrameError> {
    let raw: RawFrame = serde_json::from_str(text).map_err(|e| FrameError {
        ack: None,
        error: DecodeError::InvalidJson(e),
    })?;
    let ack = raw.ack;
    decode_event(&raw.event, raw.data)
        .map(|event| ClientFrame { ack, event })
        .map_err(|error| FrameError { ack, error })
}

fn decode_event(event: &str, data: Value) -> Result<ClientEvent, DecodeError> {
    match event {
        EVENT_CREATE_PRESENTATION => Ok(ClientEvent::CreatePresentation),
        EVENT_JOIN_REMOTE => {
            let session_id = match payload::<JoinPayload>(EVENT_JOIN_REMOTE, data)? {
                JoinPayload::Id(id) | JoinPayload::Object { session_id: id } => id,
            };
            Ok(ClientEvent::JoinRemote { session_id })
        }
        EVENT_REMOTE_COMMAND => {
            let raw: RawRemoteCommand = payload(EVENT_REMOTE_COMMAND, data)?;
            let command = Command::from_raw(&raw)?;
            Ok(ClientEvent::RemoteCommand {
                session_id: raw.session_id,
                command,
            })
        }
        EVENT_UPDATE_PRESENTATION => {
            let raw: RawUpdate = payload(EVENT_UPDATE_PRESENTATION, data)?;
            Ok(ClientEvent::UpdatePresentation {
                session_id: raw.session_id,
                current_slide: raw.current_slide,
                total_slides: raw.total_slides,
            })
        }
        other => Err(DecodeError::UnknownEvent(other.to_string())),
    }
}

/// Reply body of an acknowledged request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_slide: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_slides: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AckReply {
    pub fn created(session_id: SessionId, qr_url: String) -> Self {
        Self {
            success: true,
            session_id: Some(session_id),
            qr_url: Some(qr_url),
            ..Default::default()
        }
    }

    pub fn joined(state: SlideState) -> Self {
        Self {
            success: true,
            current_slide: Some(state.current_slide),
            total_slides: Some(state.total_slides),
            ..Default::default()
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Default::default()
        }
    }
}

/// A remote command as forwarded to the host, carrying the server-resolved index.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayedCommand {
    pub command: &'static str,
    pub slide_index: usize,
    pub from_client: ConnectionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scroll_direction: Option<ScrollDirection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scroll_position: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toggle: Option<bool>,
}

impl RelayedCommand {
    pub fn new(command: &Command, slide_index: usize, from_client: ConnectionId) -> Self {
        let mut relayed = Self {
            command: command.name(),
            slide_index,
            from_client,
            scroll_direction: None,
            scroll_position: None,
            toggle: None,
        };
        match command {
            Command::Scroll { direction } => relayed.scroll_direction = Some(*direction),
            Command::ScrollSync { position } => relayed.scroll_position = Some(*position),
            Command::Presenter { toggle } | Command::Focus { toggle } => relayed.toggle = *toggle,
            Command::Next | Command::Previous | Command::Goto { .. } => {}
        }
        relayed
    }
}

/// Messages sent FROM the server TO a client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    Connected { client_id: ConnectionId },
    Ack {
        ack: u64,
        #[serde(flatten)]
        reply: AckReply,
    },
    #[serde(rename_all = "camelCase")]
    RemoteConnected {
        client_id: ConnectionId,
        total_remotes: usize,
    },
    #[serde(rename_all = "camelCase")]
    RemoteDisconnected {
        client_id: ConnectionId,
        total_remotes: usize,
    },
    RemoteCommand(RelayedCommand),
    SyncSlide(SlideState),
    PresentationEnded {},
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::Ack { .. } => "ack",
            ServerEvent::RemoteConnected { .. } => "remote-connected",
            ServerEvent::RemoteDisconnected { .. } => "remote-disconnected",
            ServerEvent::RemoteCommand(_) => "remote-command",
            ServerEvent::SyncSlide(_) => "sync-slide",
            ServerEvent::PresentationEnded {} => "presentation-ended",
        }
    }
}
