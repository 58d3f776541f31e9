//! Device Registry
//!
//! Bookkeeping for every accessory the transport has told us about: its
//! connection status, name, and the last location the engine reported.

use crate::domain::models::{
    DeviceId, DeviceSnapshot, DeviceStatus, LocationSnapshot, RangingSample, Vec3,
};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub id: DeviceId,
    pub name: Option<String>,
    pub status: DeviceStatus,
    pub location: LocationSnapshot,
}

impl Device {
    fn new(id: DeviceId, status: DeviceStatus) -> Self {
        Self {
            id,
            name: None,
            status,
            location: LocationSnapshot::default(),
        }
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            id: self.id,
            name: self.name.clone(),
            status: self.status,
            location: self.location,
        }
    }
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<DeviceId, Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a discovery. An existing device is only reset to `Discovered`
    /// when it is not already connecting or connected.
    pub fn upsert_discovered(&mut self, id: DeviceId) -> &Device {
        let device = self
            .devices
            .entry(id)
            .or_insert_with(|| Device::new(id, DeviceStatus::Discovered));

        if matches!(
            device.status,
            DeviceStatus::Unknown | DeviceStatus::Disconnected
        ) {
            device.status = DeviceStatus::Discovered;
        }
        device
    }

    pub fn mark_connecting(&mut self, id: DeviceId) {
        self.set_status(id, DeviceStatus::Connecting);
    }

    /// Connected events can arrive for accessories that were never reported
    /// as discovered; those are registered on the spot.
    pub fn mark_connected(&mut self, id: DeviceId) {
        self.devices
            .entry(id)
            .or_insert_with(|| Device::new(id, DeviceStatus::Connected))
            .status = DeviceStatus::Connected;
    }

    /// Drop the device. Returns `None` for an unknown id, otherwise whether
    /// the registry is now empty.
    pub fn mark_disconnected(&mut self, id: DeviceId) -> Option<bool> {
        self.devices.remove(&id)?;
        debug!("Removed {} from registry", id);
        Some(self.devices.is_empty())
    }

    pub fn remove(&mut self, id: DeviceId) -> Option<Device> {
        self.devices.remove(&id)
    }

    /// Returns `false` if the device is unknown.
    pub fn set_status(&mut self, id: DeviceId, status: DeviceStatus) -> bool {
        match self.devices.get_mut(&id) {
            Some(device) => {
                device.status = status;
                true
            }
            None => false,
        }
    }

    pub fn set_name(&mut self, id: DeviceId, name: &str) {
        if let Some(device) = self.devices.get_mut(&id) {
            device.name = Some(name.to_string());
        }
    }

    pub fn get(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(&id)
    }

    pub fn count(&self) -> usize {
        self.devices.len()
    }

    pub fn snapshots(&self) -> Vec<DeviceSnapshot> {
        self.devices.values().map(Device::snapshot).collect()
    }

    /// Merge a ranging sample into the cached location.
    ///
    /// A direction vector always wins. Without one, a converged session may
    /// derive direction from the horizontal angle; anything else only marks
    /// the snapshot stale and keeps the last good direction.
    pub fn update_location(
        &mut self,
        id: DeviceId,
        sample: &RangingSample,
        converged: bool,
    ) -> Option<&Device> {
        let device = self.devices.get_mut(&id)?;
        let location = &mut device.location;

        if let Some(distance) = sample.distance {
            location.distance = Some(distance);
        }

        match (sample.direction, sample.horizontal_angle) {
            (Some(direction), _) => {
                location.direction = Some(direction);
                location.stale = false;
            }
            (None, Some(angle)) if converged => {
                location.direction = Some(Vec3::from_horizontal_angle(angle));
                location.elevation = Some(sample.vertical_estimate);
                location.stale = false;
            }
            _ => location.stale = true,
        }

        device.status = DeviceStatus::Ranging;
        Some(device)
    }
}
