//! Link-layer seam.
//!
//! Scanning, connecting and byte delivery live outside this crate. The
//! orchestrator only issues the three commands below and receives the
//! link's callbacks through [`crate::orchestrator::TransportDelegate`].

use crate::domain::models::DeviceId;
use crate::error::TransportError;

/// Commands the orchestrator issues to the link layer.
///
/// Implementations must not block; completion is reported back as a
/// connectivity callback.
pub trait Transport {
    fn connect(&mut self, device: DeviceId) -> Result<(), TransportError>;

    fn disconnect(&mut self, device: DeviceId) -> Result<(), TransportError>;

    fn send(&mut self, bytes: &[u8], device: DeviceId) -> Result<(), TransportError>;
}
