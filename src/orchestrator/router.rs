//! Event Router
//!
//! Owns the registry, the session manager and the token cache, and turns
//! collaborator events into [`Command`]s. Nothing here touches the transport
//! or the engine directly, except for parsing configuration blobs, which has
//! to happen before the session can move on.

use crate::domain::models::{
    ConvergenceStatus, DeviceId, DeviceStatus, DiscoveryToken, MessageSeverity, NearbyObject,
    RemovalReason, SessionHandle, StatusMessage, UiEvent,
};
use crate::domain::registry::DeviceRegistry;
use crate::domain::retry::should_retry;
use crate::domain::session::{SessionCommand, SessionManager};
use crate::domain::settings::Settings;
use crate::domain::tokens::TokenCache;
use crate::error::{InvalidationError, SessionError};
use crate::infrastructure::accessory::{AccessoryMessage, HostMessage};
use crate::infrastructure::ranging::{AccessoryConfiguration, RangingEngine};
use tracing::{debug, info, warn};

/// Work for the facade to carry out, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Connect(DeviceId),
    Disconnect(DeviceId),
    Send {
        device: DeviceId,
        session: SessionHandle,
        message: HostMessage,
    },
    OpenSession(SessionHandle),
    RunSession {
        session: SessionHandle,
        configuration: AccessoryConfiguration,
    },
    InvalidateSession(SessionHandle),
    Ui(UiEvent),
}

pub struct EventRouter {
    registry: DeviceRegistry,
    sessions: SessionManager,
    tokens: TokenCache,
    auto_connect: bool,
    camera_assistance: bool,
    permission_notified: bool,
}

impl EventRouter {
    pub fn new(settings: &Settings) -> Self {
        Self {
            registry: DeviceRegistry::new(),
            sessions: SessionManager::new(),
            tokens: TokenCache::new(),
            auto_connect: settings.auto_connect,
            camera_assistance: settings.camera_assistance,
            permission_notified: false,
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    // Transport events

    pub fn discovered(&mut self, device: DeviceId) -> Vec<Command> {
        let status = self.registry.upsert_discovered(device).status;
        info!("Accessory {} discovered ({})", device, status);

        if !self.auto_connect || status != DeviceStatus::Discovered {
            return Vec::new();
        }

        self.registry.mark_connecting(device);
        vec![
            Command::Ui(UiEvent::StatusChanged(device, DeviceStatus::Connecting)),
            Command::Connect(device),
        ]
    }

    /// The transport could not start a connection; let discovery try again.
    pub fn connect_failed(&mut self, device: DeviceId) {
        if self
            .registry
            .get(device)
            .is_some_and(|d| d.status == DeviceStatus::Connecting)
        {
            self.registry.set_status(device, DeviceStatus::Discovered);
        }
    }

    pub fn timeout(&mut self, device: DeviceId) -> Vec<Command> {
        match self.registry.get(device).map(|d| d.status) {
            Some(DeviceStatus::Discovered) => {
                info!("Accessory {} timed out before connecting", device);
                self.registry.remove(device);
                Vec::new()
            }
            status => {
                debug!("Ignoring discovery timeout for {} ({:?})", device, status);
                Vec::new()
            }
        }
    }

    pub fn connected(&mut self, device: DeviceId) -> Vec<Command> {
        info!("Accessory {} connected", device);
        self.registry.mark_connected(device);

        let mut commands = vec![Command::Ui(UiEvent::StatusChanged(
            device,
            DeviceStatus::Connected,
        ))];
        self.forget_token(device);
        let opened = self.sessions.open(device);
        commands.extend(self.convert(opened));
        commands
    }

    pub fn disconnected(&mut self, device: DeviceId) -> Vec<Command> {
        info!("Accessory {} disconnected", device);

        self.forget_token(device);
        let closed = self.sessions.close(device);
        let mut commands = self.convert(closed);

        match self.registry.mark_disconnected(device) {
            Some(empty) => {
                commands.push(Command::Ui(UiEvent::StatusChanged(
                    device,
                    DeviceStatus::Disconnected,
                )));
                if empty {
                    info!("No active accessories");
                    commands.push(Command::Ui(UiEvent::NoActiveAccessories));
                }
            }
            None => debug!("Disconnect for unknown accessory {}", device),
        }
        commands
    }

    /// Demultiplex a frame from an accessory. Malformed frames are logged and
    /// dropped without side effects.
    pub fn data<E>(
        &mut self,
        bytes: &[u8],
        name: &str,
        device: DeviceId,
        engine: &E,
    ) -> Vec<Command>
    where
        E: RangingEngine + ?Sized,
    {
        let message = match AccessoryMessage::decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping frame from '{}' ({}): {}", name, device, e);
                return Vec::new();
            }
        };

        match message {
            AccessoryMessage::ConfigurationData(blob) => {
                self.configuration_data(&blob, name, device, engine)
            }
            AccessoryMessage::UwbDidStart => self.accessory_started(name, device),
            AccessoryMessage::UwbDidStop => {
                info!("Accessory '{}' stopped ranging", name);
                let result = self.sessions.accessory_stopped(device);
                self.after(result)
            }
            AccessoryMessage::Reserved { kind, payload } => {
                info!(
                    "{:?} from '{}' ({} bytes) not implemented in this version",
                    kind,
                    name,
                    payload.len()
                );
                Vec::new()
            }
        }
    }

    fn configuration_data<E>(
        &mut self,
        blob: &[u8],
        name: &str,
        device: DeviceId,
        engine: &E,
    ) -> Vec<Command>
    where
        E: RangingEngine + ?Sized,
    {
        info!("Received configuration data from '{}'", name);

        if blob.is_empty() {
            warn!("Configuration data from '{}' is empty", name);
            return Vec::new();
        }

        let mut configuration = match engine.parse_configuration(blob) {
            Ok(configuration) => configuration,
            Err(e) => {
                warn!("Failed to create configuration for '{}': {}", name, e);
                return Vec::new();
            }
        };
        configuration.camera_assistance = self.camera_assistance;
        let token = configuration.token.clone();
        let previous = self.current_token(device);

        match self.sessions.configure(device, configuration) {
            Ok(commands) => {
                if let Some(previous) = previous {
                    self.tokens.remove(&previous);
                }
                self.tokens.insert(token, name);
                self.registry.set_name(device, name);
                info!("Accessory session configured for '{}'", name);
                self.convert(commands)
            }
            Err(e) => {
                warn!("Cannot configure '{}': {}", name, e);
                Vec::new()
            }
        }
    }

    fn accessory_started(&mut self, name: &str, device: DeviceId) -> Vec<Command> {
        if let Err(e) = self.sessions.accessory_started(device) {
            warn!("Unexpected UWB start from '{}': {}", name, e);
            return Vec::new();
        }

        info!("Accessory session started for '{}'", name);
        self.registry.set_status(device, DeviceStatus::Ranging);
        vec![
            Command::Ui(UiEvent::StatusChanged(device, DeviceStatus::Ranging)),
            Command::Ui(UiEvent::Log(StatusMessage {
                message: format!("Ranging with '{}'", name),
                severity: MessageSeverity::Success,
            })),
        ]
    }

    // Ranging engine events

    pub fn shareable_configuration(
        &mut self,
        session: SessionHandle,
        token: &DiscoveryToken,
        shareable: Vec<u8>,
    ) -> Vec<Command> {
        debug!(
            "Shareable configuration for '{}': {:02X?}",
            self.tokens.label(token),
            shareable
        );
        let result = self.sessions.shareable_configuration(session, token, shareable);
        self.after(result)
    }

    pub fn convergence(
        &mut self,
        session: SessionHandle,
        token: Option<&DiscoveryToken>,
        status: &ConvergenceStatus,
    ) -> Vec<Command> {
        let label = token.map(|t| self.tokens.label(t));
        match self.sessions.set_convergence(session, status) {
            Ok(converged) => debug!("Convergence for {:?}: {}", label, converged),
            Err(e) => debug!("Convergence update dropped: {}", e),
        }
        Vec::new()
    }

    pub fn samples(&mut self, session: SessionHandle, objects: &[NearbyObject]) -> Vec<Command> {
        // One accessory per session
        let Some(object) = objects.first() else {
            return Vec::new();
        };
        let Some(device) = self
            .sessions
            .device_for(session)
            .filter(|d| self.sessions.is_live(*d, session))
        else {
            debug!("Samples for {} dropped: not a live session", session);
            return Vec::new();
        };

        let converged = self
            .sessions
            .session(device)
            .is_some_and(|s| s.converged);

        let previous = self.registry.get(device).map(|d| d.status);
        let Some(updated) = self
            .registry
            .update_location(device, &object.sample, converged)
        else {
            return Vec::new();
        };

        let mut commands = Vec::with_capacity(2);
        if previous != Some(updated.status) {
            commands.push(Command::Ui(UiEvent::StatusChanged(device, updated.status)));
        }
        commands.push(Command::Ui(UiEvent::LocationUpdated(updated.snapshot())));
        commands
    }

    pub fn objects_removed(
        &mut self,
        session: SessionHandle,
        tokens: &[DiscoveryToken],
        reason: RemovalReason,
    ) -> Vec<Command> {
        if reason != RemovalReason::Timeout {
            return Vec::new();
        }
        let Some(token) = tokens.first() else {
            return Vec::new();
        };

        let name = self.tokens.remove(token);
        info!("Session timed out for '{}'", name.as_deref().unwrap_or("unknown"));

        let Some(device) = self.sessions.device_for(session) else {
            debug!("Timeout for {} dropped: unknown session", session);
            return Vec::new();
        };

        let retry = should_retry(&self.registry, device);
        if !retry {
            info!("Not retrying {}; waiting for discovery", device);
        }
        let result = self.sessions.object_timed_out(session, retry);
        self.after(result)
    }

    pub fn suspended(&mut self, session: SessionHandle) -> Vec<Command> {
        info!("{} was suspended", session);
        let result = self.sessions.suspended(session);
        self.after(result)
    }

    pub fn suspension_ended(&mut self, session: SessionHandle) -> Vec<Command> {
        info!("{} suspension ended", session);
        let result = self.sessions.suspension_ended(session);
        self.after(result)
    }

    pub fn invalidated(
        &mut self,
        session: SessionHandle,
        error: &InvalidationError,
    ) -> Vec<Command> {
        match error {
            InvalidationError::Recoverable(_) => info!("{}: {}. Restarting", session, error),
            InvalidationError::PermissionDenied => {
                warn!("Nearby interaction access required; change it in Settings")
            }
            InvalidationError::InvalidConfiguration => {
                warn!("The accessory configuration data is invalid; debug it and try again")
            }
        }
        if matches!(error, InvalidationError::Recoverable(_)) {
            // The replacement session starts without a configuration
            if let Some(device) = self
                .sessions
                .device_for(session)
                .filter(|d| self.sessions.is_live(*d, session))
            {
                self.forget_token(device);
            }
        }
        let result = self.sessions.invalidated(session, error);
        self.after(result)
    }

    fn current_token(&self, device: DeviceId) -> Option<DiscoveryToken> {
        self.sessions
            .session(device)
            .and_then(|s| s.configuration.as_ref())
            .map(|c| c.token.clone())
    }

    /// Drop the cached name for the device's session before it is replaced
    /// or removed.
    fn forget_token(&mut self, device: DeviceId) {
        if let Some(token) = self.current_token(device) {
            self.tokens.remove(&token);
        }
    }

    fn after(&mut self, result: Result<Vec<SessionCommand>, SessionError>) -> Vec<Command> {
        match result {
            Ok(commands) => self.convert(commands),
            Err(e) => {
                warn!("Session event rejected: {}", e);
                Vec::new()
            }
        }
    }

    fn convert(&mut self, commands: Vec<SessionCommand>) -> Vec<Command> {
        let mut converted = Vec::with_capacity(commands.len());
        for command in commands {
            match command {
                SessionCommand::Open(session) => converted.push(Command::OpenSession(session)),
                SessionCommand::Run {
                    session,
                    configuration,
                } => converted.push(Command::RunSession {
                    session,
                    configuration,
                }),
                SessionCommand::Invalidate(session) => {
                    converted.push(Command::InvalidateSession(session))
                }
                SessionCommand::Send {
                    device,
                    session,
                    message,
                } => converted.push(Command::Send {
                    device,
                    session,
                    message,
                }),
                SessionCommand::Disconnect(device) => converted.push(Command::Disconnect(device)),
                SessionCommand::NotifyPermissionRequired(device) => {
                    if !self.permission_notified {
                        debug!("Permission prompt raised by {}", device);
                        self.permission_notified = true;
                        converted.push(Command::Ui(UiEvent::PermissionRequired));
                    }
                }
            }
        }
        converted
    }
}
