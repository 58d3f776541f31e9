//! Accessory Protocol
//!
//! This module contains the frame definitions for talking to a UWB
//! accessory over the data channel.
//!
//! # Frame Structure
//!
//! ```text
//! [0]     : Message kind (u8, see `MessageKind`)
//! [1..N]  : Kind-specific payload (may be empty)
//! ```
//!
//! Kind values are shared with the accessory firmware and must not change.

use crate::error::ProtocolError;
use tracing::trace;

/// Message kinds exchanged with the accessory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Accessory → host: opaque ranging configuration blob
    AccessoryConfigurationData,
    /// Accessory → host: UWB radio started
    AccessoryUwbDidStart,
    /// Accessory → host: UWB radio stopped
    AccessoryUwbDidStop,
    /// Host → accessory: begin the configuration handshake
    Initialize,
    /// Host → accessory: shareable configuration, start ranging
    ConfigureAndStart,
    /// Host → accessory: stop ranging
    Stop,
    /// Accessory → host: reserved for user-defined reads
    GetReserved,
    /// Accessory → host: reserved for user-defined writes
    SetReserved,
    /// Accessory → host: notification
    Notify,
}

/// Which side of the link may send a kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    AccessoryToHost,
    HostToAccessory,
}

impl MessageKind {
    pub const ALL: [MessageKind; 9] = [
        Self::AccessoryConfigurationData,
        Self::AccessoryUwbDidStart,
        Self::AccessoryUwbDidStop,
        Self::Initialize,
        Self::ConfigureAndStart,
        Self::Stop,
        Self::GetReserved,
        Self::SetReserved,
        Self::Notify,
    ];

    /// Get the wire value for this kind
    pub fn as_byte(self) -> u8 {
        match self {
            Self::AccessoryConfigurationData => 0x01,
            Self::AccessoryUwbDidStart => 0x02,
            Self::AccessoryUwbDidStop => 0x03,
            Self::Initialize => 0x0A,
            Self::ConfigureAndStart => 0x0B,
            Self::Stop => 0x0C,
            Self::GetReserved => 0x20,
            Self::SetReserved => 0x21,
            Self::Notify => 0x2F,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_byte() == byte)
    }

    pub fn direction(self) -> Direction {
        match self {
            Self::Initialize | Self::ConfigureAndStart | Self::Stop => Direction::HostToAccessory,
            _ => Direction::AccessoryToHost,
        }
    }
}

/// A decoded but not yet direction-checked frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: MessageKind,
    pub payload: Vec<u8>,
}

/// Split raw bytes into kind and payload
pub fn decode(bytes: &[u8]) -> Result<Frame, ProtocolError> {
    let (&first, payload) = bytes.split_first().ok_or(ProtocolError::EmptyFrame)?;
    let kind = MessageKind::from_byte(first).ok_or(ProtocolError::UnknownKind(first))?;

    trace!("Decoded frame {:?}: {:02X?}", kind, payload);

    Ok(Frame {
        kind,
        payload: payload.to_vec(),
    })
}

/// Prefix a payload with its kind byte
pub fn encode(kind: MessageKind, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(payload.len() + 1);
    bytes.push(kind.as_byte());
    bytes.extend_from_slice(payload);
    bytes
}

/// Messages an accessory may legitimately send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessoryMessage {
    ConfigurationData(Vec<u8>),
    UwbDidStart,
    UwbDidStop,
    /// Reserved and notify kinds; accepted but carry no meaning yet
    Reserved { kind: MessageKind, payload: Vec<u8> },
}

impl AccessoryMessage {
    /// Decode a frame received from an accessory, rejecting host-only kinds
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let frame = decode(bytes)?;

        if frame.kind.direction() == Direction::HostToAccessory {
            return Err(ProtocolError::WrongDirection(frame.kind.as_byte()));
        }

        Ok(match frame.kind {
            MessageKind::AccessoryConfigurationData => Self::ConfigurationData(frame.payload),
            MessageKind::AccessoryUwbDidStart => Self::UwbDidStart,
            MessageKind::AccessoryUwbDidStop => Self::UwbDidStop,
            kind => Self::Reserved {
                kind,
                payload: frame.payload,
            },
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::ConfigurationData(blob) => encode(MessageKind::AccessoryConfigurationData, blob),
            Self::UwbDidStart => encode(MessageKind::AccessoryUwbDidStart, &[]),
            Self::UwbDidStop => encode(MessageKind::AccessoryUwbDidStop, &[]),
            Self::Reserved { kind, payload } => encode(*kind, payload),
        }
    }
}

/// Messages the host sends to an accessory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMessage {
    Initialize,
    ConfigureAndStart(Vec<u8>),
    Stop,
}

impl HostMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Initialize => MessageKind::Initialize,
            Self::ConfigureAndStart(_) => MessageKind::ConfigureAndStart,
            Self::Stop => MessageKind::Stop,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::ConfigureAndStart(shareable) => encode(self.kind(), shareable),
            _ => encode(self.kind(), &[]),
        }
    }

    /// Decode a frame on the accessory side; used by the simulator
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let frame = decode(bytes)?;
        match frame.kind {
            MessageKind::Initialize => Ok(Self::Initialize),
            MessageKind::ConfigureAndStart => Ok(Self::ConfigureAndStart(frame.payload)),
            MessageKind::Stop => Ok(Self::Stop),
            other => Err(ProtocolError::WrongDirection(other.as_byte())),
        }
    }
}
