//! Error types.
//!
//! Every error here is scoped to a single message, a single device, or a
//! single collaborator call. None of them is allowed to take the orchestrator
//! down; callers log and carry on.

use crate::domain::models::{DeviceId, SessionHandle};
use crate::domain::session::SessionState;
use thiserror::Error;

/// A frame from the accessory could not be accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty frame")]
    EmptyFrame,

    #[error("unknown message kind {0:#04x}")]
    UnknownKind(u8),

    /// The accessory sent a kind only the host may send.
    #[error("accessory sent host-only message kind {0:#04x}")]
    WrongDirection(u8),
}

/// The ranging engine rejected an accessory configuration blob.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid accessory configuration: {reason}")]
pub struct ParseError {
    pub reason: String,
}

impl ParseError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Connect, disconnect or send failed at the link layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("device {0} is not known to the transport")]
    UnknownDevice(DeviceId),

    #[error("device {0} is not connected")]
    NotConnected(DeviceId),

    #[error("link error: {0}")]
    Link(String),
}

/// Why the ranging engine invalidated a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidationError {
    #[error("session invalidated: {0}")]
    Recoverable(String),

    #[error("nearby interaction access was not granted")]
    PermissionDenied,

    #[error("accessory configuration rejected by the ranging engine")]
    InvalidConfiguration,
}

/// An event could not be applied to a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no live session for device {0}")]
    NoSession(DeviceId),

    #[error("{0} is not a live session")]
    StaleHandle(SessionHandle),

    #[error("{event} not valid in state {state:?}")]
    InvalidTransition {
        state: SessionState,
        event: &'static str,
    },
}
