use crate::domain::models::{DeviceId, DeviceStatus};
use crate::domain::registry::DeviceRegistry;

/// Decide whether a timed-out session should restart its handshake.
///
/// A device that has fallen back to `Discovered` is left to the normal
/// discovery/connect flow. Devices the registry no longer knows count as
/// `Unknown` and are retried.
pub fn should_retry(registry: &DeviceRegistry, device: DeviceId) -> bool {
    let status = registry
        .get(device)
        .map(|d| d.status)
        .unwrap_or(DeviceStatus::Unknown);

    status != DeviceStatus::Discovered
}
