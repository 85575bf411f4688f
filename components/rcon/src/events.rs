use crate::frame::PartHeader;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// One command-reply frame as received, fragmentation sub-header included.
/// The [`ReplyAssembler`](crate::frame::ReplyAssembler) turns streams of
/// these into whole responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub seq: u8,
    pub part: Option<PartHeader>,
    pub payload: Bytes,
}

/// An asynchronous server message. The engine has already acknowledged it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMessage {
    pub seq: u8,
    pub message: String,
}

/// Informational and error events published on the session event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The server accepted the password; the session is online.
    LoggedIn,
    /// The server rejected the password. Terminal: the engine will not retry.
    AuthFailed,
    /// A command exhausted its retries without any reply fragment arriving.
    SendTimeout { seq: u8 },
    /// A command was assigned a sequence whose retry slot was still occupied.
    /// Happens only with 256 unacknowledged commands in flight.
    SlotOverrun { seq: u8 },
    /// Too many consecutive send timeouts; the link is considered dead.
    PeerDead,
    /// The connection failed (socket error, read deadline, dead peer).
    LinkDown { reason: String },
    /// The engine is pausing before its next connection attempt.
    Reconnecting { delay: Duration },
}

impl SessionEvent {
    /// Stable machine-readable kind, used in logs and by consumers that
    /// switch on event types without matching the full payload.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::LoggedIn => "logged_in",
            SessionEvent::AuthFailed => "auth_failed",
            SessionEvent::SendTimeout { .. } => "send_timeout",
            SessionEvent::SlotOverrun { .. } => "slot_overrun",
            SessionEvent::PeerDead => "peer_dead",
            SessionEvent::LinkDown { .. } => "link_down",
            SessionEvent::Reconnecting { .. } => "reconnecting",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionEvent::AuthFailed)
    }
}

/// Errors surfaced to command producers by [`CommandSender`](crate::session::CommandSender).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("command queue full")]
    QueueFull,
    #[error("session closed")]
    Closed,
}
