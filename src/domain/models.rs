use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier the transport assigns to an accessory when it is discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub i64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque identity of one ranging run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionHandle(pub u64);

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Correlation value the ranging engine attaches to a tracked accessory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiscoveryToken(pub Vec<u8>);

impl fmt::Display for DiscoveryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeviceStatus {
    #[default]
    Unknown,
    Discovered,
    Connecting,
    Connected,
    Ranging,
    Disconnected,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unknown => "Unknown",
            Self::Discovered => "Discovered",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Ranging => "Ranging",
            Self::Disconnected => "Disconnected",
        };
        f.write_str(label)
    }
}

/// Three-component vector in the host's reference frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Project a horizontal bearing (radians) onto the horizontal plane.
    pub fn from_horizontal_angle(rad: f32) -> Self {
        Self::new(rad.sin(), 0.0, rad.cos())
    }
}

/// Coarse vertical position reported when full direction is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VerticalEstimate {
    #[default]
    Unknown,
    Same,
    Above,
    Below,
    AboveOrBelow,
}

impl VerticalEstimate {
    /// Raw value as reported by the engine.
    pub fn raw(self) -> i32 {
        match self {
            Self::Unknown => 0,
            Self::Same => 1,
            Self::Above => 2,
            Self::Below => 3,
            Self::AboveOrBelow => 4,
        }
    }
}

/// One measurement from the ranging engine for a tracked accessory.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RangingSample {
    pub distance: Option<f32>,
    pub direction: Option<Vec3>,
    pub horizontal_angle: Option<f32>,
    pub vertical_estimate: VerticalEstimate,
}

/// A sample attributed to the object the engine is tracking.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyObject {
    pub token: DiscoveryToken,
    pub sample: RangingSample,
}

/// Cached location of an accessory as last seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LocationSnapshot {
    pub distance: Option<f32>,
    pub direction: Option<Vec3>,
    pub elevation: Option<VerticalEstimate>,
    /// Set when the latest sample could not refresh the direction.
    pub stale: bool,
}

/// Read-only view handed to the UI collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub name: Option<String>,
    pub status: DeviceStatus,
    pub location: LocationSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotConvergedReason {
    InsufficientLighting,
    InsufficientMovement,
    InsufficientHorizontalSweep,
    InsufficientVerticalSweep,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceStatus {
    Converged,
    NotConverged(Vec<NotConvergedReason>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    Timeout,
    Other,
}

/// Events surfaced to the UI collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    LocationUpdated(DeviceSnapshot),
    StatusChanged(DeviceId, DeviceStatus),
    NoActiveAccessories,
    PermissionRequired,
    Log(StatusMessage),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}
