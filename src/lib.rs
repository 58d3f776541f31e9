//! UWB accessory ranging orchestrator.
//!
//! Drives the binary handshake with UWB accessories, keeps one ranging
//! session per connected accessory, and turns engine samples into per-device
//! location snapshots.

pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod orchestrator;

pub use domain::models::{DeviceId, DeviceSnapshot, DeviceStatus, SessionHandle, UiEvent};
pub use orchestrator::AccessoryService;
