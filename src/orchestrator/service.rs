//! Accessory Service
//!
//! The orchestrator facade: implements both delegate traits, runs every event
//! through the [`EventRouter`], and executes the resulting commands against
//! the transport, the ranging engine and the UI channel.

use crate::domain::models::{
    ConvergenceStatus, DeviceId, DeviceSnapshot, DiscoveryToken, NearbyObject, RemovalReason,
    SessionHandle, UiEvent,
};
use crate::domain::settings::Settings;
use crate::error::InvalidationError;
use crate::infrastructure::accessory::Transport;
use crate::infrastructure::ranging::RangingEngine;
use crate::orchestrator::delegate::{dispatch, AccessoryEvent, RangingDelegate, TransportDelegate};
use crate::orchestrator::router::{Command, EventRouter};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub struct AccessoryService<T, E> {
    router: EventRouter,
    transport: T,
    engine: E,
    ui_sender: mpsc::UnboundedSender<UiEvent>,
}

impl<T, E> AccessoryService<T, E>
where
    T: Transport,
    E: RangingEngine,
{
    pub fn new(
        transport: T,
        engine: E,
        ui_sender: mpsc::UnboundedSender<UiEvent>,
        settings: &Settings,
    ) -> Self {
        Self {
            router: EventRouter::new(settings),
            transport,
            engine,
            ui_sender,
        }
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn snapshot(&self, device: DeviceId) -> Option<DeviceSnapshot> {
        self.router.registry().get(device).map(|d| d.snapshot())
    }

    pub fn snapshots(&self) -> Vec<DeviceSnapshot> {
        self.router.registry().snapshots()
    }

    /// Process events one at a time until every sender is gone.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<AccessoryEvent>) -> Self {
        info!("Accessory service running");
        while let Some(event) = events.recv().await {
            dispatch(&mut self, event);
        }
        info!("Accessory service stopped: event channel closed");
        self
    }

    fn execute(&mut self, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::Connect(device) => {
                    if let Err(e) = self.transport.connect(device) {
                        error!("Failed to connect to accessory {}: {}", device, e);
                        self.router.connect_failed(device);
                    }
                }
                Command::Disconnect(device) => {
                    if let Err(e) = self.transport.disconnect(device) {
                        error!("Failed to disconnect from accessory {}: {}", device, e);
                    }
                }
                Command::Send {
                    device,
                    session,
                    message,
                } => self.send(device, session, message.encode()),
                Command::OpenSession(session) => self.engine.open_session(session),
                Command::RunSession {
                    session,
                    configuration,
                } => self.engine.run(session, &configuration),
                Command::InvalidateSession(session) => self.engine.invalidate(session),
                Command::Ui(event) => {
                    let _ = self.ui_sender.send(event);
                }
            }
        }
    }

    fn send(&mut self, device: DeviceId, session: SessionHandle, bytes: Vec<u8>) {
        if !self.router.sessions().is_live(device, session) {
            warn!("Not sending for {}: no longer live for {}", session, device);
            return;
        }

        debug!("Sending to {}: {:02X?}", device, bytes);
        if let Err(e) = self.transport.send(&bytes, device) {
            error!("Failed to send data to accessory {}: {}", device, e);
        }
    }
}

impl<T, E> TransportDelegate for AccessoryService<T, E>
where
    T: Transport,
    E: RangingEngine,
{
    fn on_discovered(&mut self, device: DeviceId) {
        let commands = self.router.discovered(device);
        self.execute(commands);
    }

    fn on_timeout(&mut self, device: DeviceId) {
        let commands = self.router.timeout(device);
        self.execute(commands);
    }

    fn on_connected(&mut self, device: DeviceId) {
        let commands = self.router.connected(device);
        self.execute(commands);
    }

    fn on_disconnected(&mut self, device: DeviceId) {
        let commands = self.router.disconnected(device);
        self.execute(commands);
    }

    fn on_data(&mut self, bytes: &[u8], name: &str, device: DeviceId) {
        let commands = self.router.data(bytes, name, device, &self.engine);
        self.execute(commands);
    }
}

impl<T, E> RangingDelegate for AccessoryService<T, E>
where
    T: Transport,
    E: RangingEngine,
{
    fn on_shareable_configuration(
        &mut self,
        session: SessionHandle,
        token: &DiscoveryToken,
        shareable: Vec<u8>,
    ) {
        let commands = self.router.shareable_configuration(session, token, shareable);
        self.execute(commands);
    }

    fn on_convergence_update(
        &mut self,
        session: SessionHandle,
        token: Option<&DiscoveryToken>,
        status: &ConvergenceStatus,
    ) {
        let commands = self.router.convergence(session, token, status);
        self.execute(commands);
    }

    fn on_samples_update(&mut self, session: SessionHandle, objects: &[NearbyObject]) {
        let commands = self.router.samples(session, objects);
        self.execute(commands);
    }

    fn on_objects_removed(
        &mut self,
        session: SessionHandle,
        tokens: &[DiscoveryToken],
        reason: RemovalReason,
    ) {
        let commands = self.router.objects_removed(session, tokens, reason);
        self.execute(commands);
    }

    fn on_suspended(&mut self, session: SessionHandle) {
        let commands = self.router.suspended(session);
        self.execute(commands);
    }

    fn on_suspension_ended(&mut self, session: SessionHandle) {
        let commands = self.router.suspension_ended(session);
        self.execute(commands);
    }

    fn on_invalidated(&mut self, session: SessionHandle, error: &InvalidationError) {
        let commands = self.router.invalidated(session, error);
        self.execute(commands);
    }
}
