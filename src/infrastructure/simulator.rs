//! Simulated accessories and ranging engine.
//!
//! Both halves share one [`SimulationState`] so the engine only produces
//! samples for accessories whose radio the host actually started. Replies are
//! pushed into the orchestrator's [`EventSink`], never delivered inline.

use crate::domain::models::{
    ConvergenceStatus, DeviceId, DiscoveryToken, NearbyObject, NotConvergedReason, RangingSample,
    SessionHandle, Vec3, VerticalEstimate,
};
use crate::domain::settings::SimulatorSettings;
use crate::error::{ParseError, TransportError};
use crate::infrastructure::accessory::{AccessoryMessage, HostMessage, Transport};
use crate::infrastructure::ranging::{AccessoryConfiguration, RangingEngine};
use crate::orchestrator::{AccessoryEvent, EventSink, RangingEvent, TransportEvent};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Prefix of every simulated configuration blob
pub const BLOB_MAGIC: &[u8; 4] = b"UWB1";
const TOKEN_LEN: usize = 8;

struct SimAccessory {
    name: String,
    token: DiscoveryToken,
    connected: bool,
    ranging: bool,
    samples_sent: u32,
    stop_reported: bool,
}

#[derive(Default)]
struct EngineSession {
    token: Option<DiscoveryToken>,
    convergence_reported: bool,
}

#[derive(Default)]
struct SimulationState {
    accessories: BTreeMap<DeviceId, SimAccessory>,
    sessions: HashMap<SessionHandle, EngineSession>,
}

#[derive(Clone)]
pub struct Simulation {
    state: Arc<Mutex<SimulationState>>,
    events: EventSink,
    settings: SimulatorSettings,
}

impl Simulation {
    pub fn new(settings: SimulatorSettings, events: EventSink) -> Self {
        let mut state = SimulationState::default();
        for n in 1..=settings.accessories {
            let id = DeviceId(i64::from(n));
            let mut token = vec![0u8; TOKEN_LEN];
            token[..4].copy_from_slice(&n.to_be_bytes());
            token[4..].copy_from_slice(b"SIMT");
            state.accessories.insert(
                id,
                SimAccessory {
                    name: format!("Tag {}", n),
                    token: DiscoveryToken(token),
                    connected: false,
                    ranging: false,
                    samples_sent: 0,
                    stop_reported: false,
                },
            );
        }

        Self {
            state: Arc::new(Mutex::new(state)),
            events,
            settings,
        }
    }

    pub fn transport(&self) -> SimulatedTransport {
        SimulatedTransport {
            simulation: self.clone(),
        }
    }

    pub fn engine(&self) -> SimulatedEngine {
        SimulatedEngine {
            simulation: self.clone(),
        }
    }

    /// Report every simulated accessory as discovered.
    pub fn announce(&self) {
        let ids: Vec<DeviceId> = self
            .with_state(|state| state.accessories.keys().copied().collect())
            .unwrap_or_default();
        for id in ids {
            self.emit(TransportEvent::Discovered(id));
        }
    }

    /// Produce samples on a fixed interval until the task is dropped.
    pub async fn drive(self) {
        let period = tokio::time::Duration::from_millis(self.settings.sample_interval_ms.max(1));
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            self.tick();
        }
    }

    fn tick(&self) {
        let report_direction = self.settings.report_direction;
        let limit = self.settings.samples_per_accessory;

        let events = self
            .with_state(|state| {
                let mut events: Vec<AccessoryEvent> = Vec::new();
                let SimulationState {
                    accessories,
                    sessions,
                } = state;

                for (handle, session) in sessions.iter_mut() {
                    let Some(token) = session.token.clone() else {
                        continue;
                    };
                    let Some((id, accessory)) = accessories
                        .iter_mut()
                        .find(|(_, a)| a.token == token && a.connected && a.ranging)
                    else {
                        continue;
                    };

                    if !session.convergence_reported {
                        session.convergence_reported = true;
                        let status = if report_direction {
                            ConvergenceStatus::Converged
                        } else {
                            ConvergenceStatus::NotConverged(vec![
                                NotConvergedReason::InsufficientLighting,
                            ])
                        };
                        events.push(
                            RangingEvent::Convergence {
                                session: *handle,
                                token: Some(token.clone()),
                                status,
                            }
                            .into(),
                        );
                    }

                    accessory.samples_sent += 1;
                    events.push(
                        RangingEvent::Samples {
                            session: *handle,
                            objects: vec![NearbyObject {
                                token,
                                sample: synthetic_sample(accessory.samples_sent, report_direction),
                            }],
                        }
                        .into(),
                    );

                    if accessory.samples_sent >= limit && !accessory.stop_reported {
                        accessory.stop_reported = true;
                        accessory.ranging = false;
                        events.push(
                            TransportEvent::Data {
                                device: *id,
                                name: accessory.name.clone(),
                                bytes: AccessoryMessage::UwbDidStop.encode(),
                            }
                            .into(),
                        );
                    }
                }
                events
            })
            .unwrap_or_default();

        for event in events {
            self.emit(event);
        }
    }

    fn emit(&self, event: impl Into<AccessoryEvent>) {
        if self.events.send(event.into()).is_err() {
            debug!("Event dropped: orchestrator is gone");
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut SimulationState) -> R) -> Option<R> {
        match self.state.lock() {
            Ok(mut state) => Some(f(&mut state)),
            Err(_) => {
                warn!("Simulation state lock poisoned");
                None
            }
        }
    }
}

fn synthetic_sample(n: u32, report_direction: bool) -> RangingSample {
    let t = n as f32;
    let angle = (t * 0.2).sin() * 0.8;
    let distance = 1.5 + (t * 0.3).sin() * 0.5;

    if report_direction {
        RangingSample {
            distance: Some(distance),
            direction: Some(Vec3::from_horizontal_angle(angle)),
            horizontal_angle: Some(angle),
            vertical_estimate: VerticalEstimate::Same,
        }
    } else {
        RangingSample {
            distance: Some(distance),
            direction: None,
            horizontal_angle: Some(angle),
            vertical_estimate: VerticalEstimate::Same,
        }
    }
}

/// Link layer for the simulated accessories
pub struct SimulatedTransport {
    simulation: Simulation,
}

impl SimulatedTransport {
    fn lock_error() -> TransportError {
        TransportError::Link("simulation state unavailable".to_string())
    }
}

impl Transport for SimulatedTransport {
    fn connect(&mut self, device: DeviceId) -> Result<(), TransportError> {
        self.simulation
            .with_state(|state| {
                let accessory = state
                    .accessories
                    .get_mut(&device)
                    .ok_or(TransportError::UnknownDevice(device))?;
                accessory.connected = true;
                Ok(())
            })
            .ok_or_else(Self::lock_error)??;

        self.simulation.emit(TransportEvent::Connected(device));
        Ok(())
    }

    fn disconnect(&mut self, device: DeviceId) -> Result<(), TransportError> {
        self.simulation
            .with_state(|state| {
                let accessory = state
                    .accessories
                    .get_mut(&device)
                    .ok_or(TransportError::UnknownDevice(device))?;
                accessory.connected = false;
                accessory.ranging = false;
                Ok(())
            })
            .ok_or_else(Self::lock_error)??;

        self.simulation.emit(TransportEvent::Disconnected(device));
        Ok(())
    }

    fn send(&mut self, bytes: &[u8], device: DeviceId) -> Result<(), TransportError> {
        let message =
            HostMessage::decode(bytes).map_err(|e| TransportError::Link(e.to_string()))?;

        let reply = self
            .simulation
            .with_state(|state| {
                let accessory = state
                    .accessories
                    .get_mut(&device)
                    .ok_or(TransportError::UnknownDevice(device))?;
                if !accessory.connected {
                    return Err(TransportError::NotConnected(device));
                }

                let reply = match message {
                    HostMessage::Initialize => {
                        accessory.ranging = false;
                        let mut blob = BLOB_MAGIC.to_vec();
                        blob.extend_from_slice(&accessory.token.0);
                        Some(AccessoryMessage::ConfigurationData(blob))
                    }
                    HostMessage::ConfigureAndStart(_) => {
                        accessory.ranging = true;
                        Some(AccessoryMessage::UwbDidStart)
                    }
                    HostMessage::Stop => {
                        accessory.ranging = false;
                        None
                    }
                };
                Ok(reply.map(|r| (accessory.name.clone(), r)))
            })
            .ok_or_else(Self::lock_error)??;

        if let Some((name, reply)) = reply {
            self.simulation.emit(TransportEvent::Data {
                device,
                name,
                bytes: reply.encode(),
            });
        }
        Ok(())
    }
}

/// Ranging engine for the simulated accessories
pub struct SimulatedEngine {
    simulation: Simulation,
}

impl RangingEngine for SimulatedEngine {
    fn parse_configuration(&self, data: &[u8]) -> Result<AccessoryConfiguration, ParseError> {
        if data.len() != BLOB_MAGIC.len() + TOKEN_LEN {
            return Err(ParseError::new(format!(
                "expected {} bytes, got {}",
                BLOB_MAGIC.len() + TOKEN_LEN,
                data.len()
            )));
        }
        if !data.starts_with(BLOB_MAGIC) {
            return Err(ParseError::new("bad magic"));
        }

        Ok(AccessoryConfiguration {
            token: DiscoveryToken(data[BLOB_MAGIC.len()..].to_vec()),
            camera_assistance: false,
            data: data.to_vec(),
        })
    }

    fn open_session(&mut self, session: SessionHandle) {
        self.simulation.with_state(|state| {
            state.sessions.insert(session, EngineSession::default());
        });
    }

    fn run(&mut self, session: SessionHandle, configuration: &AccessoryConfiguration) {
        let started = self
            .simulation
            .with_state(|state| match state.sessions.get_mut(&session) {
                Some(engine_session) => {
                    engine_session.token = Some(configuration.token.clone());
                    engine_session.convergence_reported = false;
                    true
                }
                None => false,
            })
            .unwrap_or(false);

        if !started {
            warn!("Run requested for unknown {}", session);
            return;
        }

        info!(
            "Engine running {} (camera assistance: {})",
            session, configuration.camera_assistance
        );
        let mut shareable = vec![0xAA, 0xBB];
        shareable.extend_from_slice(&configuration.token.0);
        self.simulation.emit(RangingEvent::ShareableConfiguration {
            session,
            token: configuration.token.clone(),
            shareable,
        });
    }

    fn invalidate(&mut self, session: SessionHandle) {
        self.simulation.with_state(|state| {
            state.sessions.remove(&session);
        });
    }
}
