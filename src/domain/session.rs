//! Ranging session state machine.
//!
//! One [`RangingSession`] per connected accessory. The manager never talks to
//! the transport or the engine itself; each transition returns the
//! [`SessionCommand`]s the caller has to execute, in order.
//!
//! ```text
//!            connect                config data              UwbDidStart
//!  (none) ───────────> Idle ──────────────────> AwaitingConfig ──────────> Ranging
//!                       ^  ^                         │                       │
//!   suspension ended    │  │ timeout retry            │ suspended             │ UwbDidStop
//!                       │  └─────────────────────────┴───────────────────────┤
//!                  Suspended <───────────────────────────────────────────────┤
//!                                                                             v
//!      recoverable invalidation: new handle, back to Idle                  Stopped
//!      permission denied / invalid configuration: Invalidated
//! ```

use crate::domain::models::{
    ConvergenceStatus, DeviceId, DiscoveryToken, NotConvergedReason, SessionHandle,
};
use crate::error::{InvalidationError, SessionError};
use crate::infrastructure::accessory::HostMessage;
use crate::infrastructure::ranging::AccessoryConfiguration;
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// `initialize` sent, waiting for the accessory's configuration data
    Idle,
    /// Engine running with the accessory configuration, waiting for the
    /// accessory to confirm it started
    AwaitingConfig,
    Ranging,
    Suspended,
    Stopped,
    Invalidated,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Invalidated)
    }
}

/// Work the caller must carry out after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// Create the engine session and bind it to the shared reference frame
    Open(SessionHandle),
    Run {
        session: SessionHandle,
        configuration: AccessoryConfiguration,
    },
    Invalidate(SessionHandle),
    Send {
        device: DeviceId,
        session: SessionHandle,
        message: HostMessage,
    },
    Disconnect(DeviceId),
    NotifyPermissionRequired(DeviceId),
}

#[derive(Debug, Clone)]
pub struct RangingSession {
    pub handle: SessionHandle,
    pub device: DeviceId,
    pub state: SessionState,
    pub configuration: Option<AccessoryConfiguration>,
    pub shareable_configuration: Option<Vec<u8>>,
    pub converged: bool,
}

impl RangingSession {
    fn new(handle: SessionHandle, device: DeviceId) -> Self {
        Self {
            handle,
            device,
            state: SessionState::Idle,
            configuration: None,
            shareable_configuration: None,
            converged: false,
        }
    }

    fn send(&self, message: HostMessage) -> SessionCommand {
        SessionCommand::Send {
            device: self.device,
            session: self.handle,
            message,
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!("{} ({}): {:?} -> {:?}", self.handle, self.device, self.state, next);
        self.state = next;
    }
}

#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: HashMap<DeviceId, RangingSession>,
    devices_by_handle: HashMap<SessionHandle, DeviceId>,
    next_handle: u64,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self, device: DeviceId) -> Option<&RangingSession> {
        self.sessions.get(&device)
    }

    pub fn state(&self, device: DeviceId) -> Option<SessionState> {
        self.sessions.get(&device).map(|s| s.state)
    }

    pub fn handle(&self, device: DeviceId) -> Option<SessionHandle> {
        self.sessions.get(&device).map(|s| s.handle)
    }

    pub fn device_for(&self, handle: SessionHandle) -> Option<DeviceId> {
        self.devices_by_handle.get(&handle).copied()
    }

    /// True if `handle` is the device's current, non-terminal session.
    pub fn is_live(&self, device: DeviceId, handle: SessionHandle) -> bool {
        self.sessions
            .get(&device)
            .is_some_and(|s| s.handle == handle && !s.state.is_terminal())
    }

    pub fn live_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|s| !s.state.is_terminal())
            .count()
    }

    /// Start a fresh session for a newly connected device.
    pub fn open(&mut self, device: DeviceId) -> Vec<SessionCommand> {
        let mut commands = self.close(device);

        let handle = self.mint_handle();
        let session = RangingSession::new(handle, device);
        info!("Opened {} for {}", handle, device);

        commands.push(SessionCommand::Open(handle));
        commands.push(session.send(HostMessage::Initialize));

        self.devices_by_handle.insert(handle, device);
        self.sessions.insert(device, session);
        commands
    }

    /// Forget the device's session, invalidating it in the engine.
    pub fn close(&mut self, device: DeviceId) -> Vec<SessionCommand> {
        let Some(session) = self.sessions.remove(&device) else {
            return Vec::new();
        };
        self.devices_by_handle.remove(&session.handle);
        info!("Closed {} for {}", session.handle, device);

        if session.state == SessionState::Invalidated {
            Vec::new()
        } else {
            vec![SessionCommand::Invalidate(session.handle)]
        }
    }

    pub fn configure(
        &mut self,
        device: DeviceId,
        configuration: AccessoryConfiguration,
    ) -> Result<Vec<SessionCommand>, SessionError> {
        let session = self.live_by_device(device)?;

        match session.state {
            SessionState::Idle => {}
            SessionState::AwaitingConfig | SessionState::Ranging => {
                warn!("{} reconfigured while {:?}", session.handle, session.state);
            }
            state => {
                return Err(SessionError::InvalidTransition {
                    state,
                    event: "configure",
                })
            }
        }

        session.configuration = Some(configuration.clone());
        session.shareable_configuration = None;
        session.transition(SessionState::AwaitingConfig);

        Ok(vec![SessionCommand::Run {
            session: session.handle,
            configuration,
        }])
    }

    /// Relay the engine's shareable configuration to the accessory.
    ///
    /// Configurations generated for a token other than the session's own are
    /// ignored.
    pub fn shareable_configuration(
        &mut self,
        handle: SessionHandle,
        token: &DiscoveryToken,
        shareable: Vec<u8>,
    ) -> Result<Vec<SessionCommand>, SessionError> {
        let session = self.live_by_handle(handle)?;

        let matches_token = session
            .configuration
            .as_ref()
            .is_some_and(|c| &c.token == token);
        if !matches_token {
            debug!("{} ignoring shareable configuration for {}", handle, token);
            return Ok(Vec::new());
        }

        if session.state != SessionState::AwaitingConfig {
            return Err(SessionError::InvalidTransition {
                state: session.state,
                event: "shareable configuration",
            });
        }

        session.shareable_configuration = Some(shareable.clone());
        Ok(vec![session.send(HostMessage::ConfigureAndStart(shareable))])
    }

    pub fn accessory_started(&mut self, device: DeviceId) -> Result<(), SessionError> {
        let session = self.live_by_device(device)?;
        match session.state {
            SessionState::AwaitingConfig | SessionState::Ranging => {
                session.transition(SessionState::Ranging);
                Ok(())
            }
            state => Err(SessionError::InvalidTransition {
                state,
                event: "accessory started",
            }),
        }
    }

    pub fn accessory_stopped(
        &mut self,
        device: DeviceId,
    ) -> Result<Vec<SessionCommand>, SessionError> {
        let session = self.live_by_device(device)?;
        session.transition(SessionState::Stopped);
        Ok(vec![SessionCommand::Disconnect(device)])
    }

    pub fn suspended(
        &mut self,
        handle: SessionHandle,
    ) -> Result<Vec<SessionCommand>, SessionError> {
        let session = self.live_by_handle(handle)?;
        session.transition(SessionState::Suspended);
        Ok(vec![session.send(HostMessage::Stop)])
    }

    pub fn suspension_ended(
        &mut self,
        handle: SessionHandle,
    ) -> Result<Vec<SessionCommand>, SessionError> {
        let session = self.live_by_handle(handle)?;
        if session.state != SessionState::Suspended {
            return Err(SessionError::InvalidTransition {
                state: session.state,
                event: "suspension ended",
            });
        }

        session.transition(SessionState::Idle);
        Ok(vec![session.send(HostMessage::Initialize)])
    }

    pub fn invalidated(
        &mut self,
        handle: SessionHandle,
        error: &InvalidationError,
    ) -> Result<Vec<SessionCommand>, SessionError> {
        let session = self.live_by_handle(handle)?;
        let device = session.device;

        match error {
            InvalidationError::Recoverable(_) => {
                // The engine already dropped the old handle; everything from
                // here on is attributed to the replacement.
                self.sessions.remove(&device);
                self.devices_by_handle.remove(&handle);

                let replacement = self.mint_handle();
                let session = RangingSession::new(replacement, device);
                info!("Replaced {} with {} for {}", handle, replacement, device);

                let commands = vec![
                    SessionCommand::Open(replacement),
                    session.send(HostMessage::Stop),
                    session.send(HostMessage::Initialize),
                ];

                self.devices_by_handle.insert(replacement, device);
                self.sessions.insert(device, session);
                Ok(commands)
            }
            InvalidationError::PermissionDenied => {
                session.transition(SessionState::Invalidated);
                Ok(vec![SessionCommand::NotifyPermissionRequired(device)])
            }
            InvalidationError::InvalidConfiguration => {
                session.transition(SessionState::Invalidated);
                Ok(Vec::new())
            }
        }
    }

    /// The engine lost the accessory. With `retry`, restart the handshake on
    /// the same handle.
    pub fn object_timed_out(
        &mut self,
        handle: SessionHandle,
        retry: bool,
    ) -> Result<Vec<SessionCommand>, SessionError> {
        let session = self.live_by_handle(handle)?;
        if !retry {
            return Ok(Vec::new());
        }

        session.shareable_configuration = None;
        session.transition(SessionState::Idle);
        Ok(vec![
            session.send(HostMessage::Stop),
            session.send(HostMessage::Initialize),
        ])
    }

    /// Record convergence. Returns the new converged flag.
    pub fn set_convergence(
        &mut self,
        handle: SessionHandle,
        status: &ConvergenceStatus,
    ) -> Result<bool, SessionError> {
        let session = self.live_by_handle(handle)?;

        session.converged = match status {
            ConvergenceStatus::Converged => true,
            ConvergenceStatus::NotConverged(reasons)
                if reasons.contains(&NotConvergedReason::InsufficientLighting) =>
            {
                info!("{} not converged: more light required", handle);
                false
            }
            ConvergenceStatus::NotConverged(reasons) => {
                debug!("{} not converged: {:?}", handle, reasons);
                false
            }
        };
        Ok(session.converged)
    }

    fn mint_handle(&mut self) -> SessionHandle {
        self.next_handle += 1;
        SessionHandle(self.next_handle)
    }

    fn live_by_device(
        &mut self,
        device: DeviceId,
    ) -> Result<&mut RangingSession, SessionError> {
        self.sessions
            .get_mut(&device)
            .filter(|s| !s.state.is_terminal())
            .ok_or(SessionError::NoSession(device))
    }

    fn live_by_handle(
        &mut self,
        handle: SessionHandle,
    ) -> Result<&mut RangingSession, SessionError> {
        let device = self
            .devices_by_handle
            .get(&handle)
            .copied()
            .ok_or(SessionError::StaleHandle(handle))?;

        self.sessions
            .get_mut(&device)
            .filter(|s| s.handle == handle && !s.state.is_terminal())
            .ok_or(SessionError::StaleHandle(handle))
    }
}
