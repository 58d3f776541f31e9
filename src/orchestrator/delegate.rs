//! Callback interfaces for the external collaborators.
//!
//! The link layer and the ranging engine report everything through these two
//! traits. Collaborators running on other tasks push [`AccessoryEvent`]s into
//! an [`EventSink`] instead; [`dispatch`] turns each event back into a trait
//! call on the single dispatch context.

use crate::domain::models::{
    ConvergenceStatus, DeviceId, DiscoveryToken, NearbyObject, RemovalReason, SessionHandle,
};
use crate::error::InvalidationError;
use tokio::sync::mpsc;

pub trait TransportDelegate {
    fn on_discovered(&mut self, device: DeviceId);

    /// The accessory stopped advertising before we connected.
    fn on_timeout(&mut self, device: DeviceId);

    fn on_connected(&mut self, device: DeviceId);

    fn on_disconnected(&mut self, device: DeviceId);

    fn on_data(&mut self, bytes: &[u8], name: &str, device: DeviceId);
}

pub trait RangingDelegate {
    /// The engine produced the configuration the accessory needs to start.
    fn on_shareable_configuration(
        &mut self,
        session: SessionHandle,
        token: &DiscoveryToken,
        shareable: Vec<u8>,
    );

    fn on_convergence_update(
        &mut self,
        session: SessionHandle,
        token: Option<&DiscoveryToken>,
        status: &ConvergenceStatus,
    );

    fn on_samples_update(&mut self, session: SessionHandle, objects: &[NearbyObject]);

    fn on_objects_removed(
        &mut self,
        session: SessionHandle,
        tokens: &[DiscoveryToken],
        reason: RemovalReason,
    );

    fn on_suspended(&mut self, session: SessionHandle);

    fn on_suspension_ended(&mut self, session: SessionHandle);

    fn on_invalidated(&mut self, session: SessionHandle, error: &InvalidationError);
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Discovered(DeviceId),
    Timeout(DeviceId),
    Connected(DeviceId),
    Disconnected(DeviceId),
    Data {
        device: DeviceId,
        name: String,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RangingEvent {
    ShareableConfiguration {
        session: SessionHandle,
        token: DiscoveryToken,
        shareable: Vec<u8>,
    },
    Convergence {
        session: SessionHandle,
        token: Option<DiscoveryToken>,
        status: ConvergenceStatus,
    },
    Samples {
        session: SessionHandle,
        objects: Vec<NearbyObject>,
    },
    ObjectsRemoved {
        session: SessionHandle,
        tokens: Vec<DiscoveryToken>,
        reason: RemovalReason,
    },
    Suspended(SessionHandle),
    SuspensionEnded(SessionHandle),
    Invalidated {
        session: SessionHandle,
        error: InvalidationError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AccessoryEvent {
    Transport(TransportEvent),
    Ranging(RangingEvent),
}

impl From<TransportEvent> for AccessoryEvent {
    fn from(event: TransportEvent) -> Self {
        Self::Transport(event)
    }
}

impl From<RangingEvent> for AccessoryEvent {
    fn from(event: RangingEvent) -> Self {
        Self::Ranging(event)
    }
}

/// Handed to collaborators at construction so they can report back.
pub type EventSink = mpsc::UnboundedSender<AccessoryEvent>;

pub fn dispatch<D>(delegate: &mut D, event: AccessoryEvent)
where
    D: TransportDelegate + RangingDelegate + ?Sized,
{
    match event {
        AccessoryEvent::Transport(event) => match event {
            TransportEvent::Discovered(device) => delegate.on_discovered(device),
            TransportEvent::Timeout(device) => delegate.on_timeout(device),
            TransportEvent::Connected(device) => delegate.on_connected(device),
            TransportEvent::Disconnected(device) => delegate.on_disconnected(device),
            TransportEvent::Data {
                device,
                name,
                bytes,
            } => delegate.on_data(&bytes, &name, device),
        },
        AccessoryEvent::Ranging(event) => match event {
            RangingEvent::ShareableConfiguration {
                session,
                token,
                shareable,
            } => delegate.on_shareable_configuration(session, &token, shareable),
            RangingEvent::Convergence {
                session,
                token,
                status,
            } => delegate.on_convergence_update(session, token.as_ref(), &status),
            RangingEvent::Samples { session, objects } => {
                delegate.on_samples_update(session, &objects)
            }
            RangingEvent::ObjectsRemoved {
                session,
                tokens,
                reason,
            } => delegate.on_objects_removed(session, &tokens, reason),
            RangingEvent::Suspended(session) => delegate.on_suspended(session),
            RangingEvent::SuspensionEnded(session) => delegate.on_suspension_ended(session),
            RangingEvent::Invalidated { session, error } => {
                delegate.on_invalidated(session, &error)
            }
        },
    }
}
