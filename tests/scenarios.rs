use tokio::sync::mpsc;
use uwb_accessory_tracker::domain::models::{
    ConvergenceStatus, DeviceId, DeviceStatus, DiscoveryToken, NearbyObject, NotConvergedReason,
    RangingSample, RemovalReason, SessionHandle, UiEvent, Vec3,
};
use uwb_accessory_tracker::domain::session::SessionState;
use uwb_accessory_tracker::domain::settings::Settings;
use uwb_accessory_tracker::error::{InvalidationError, ParseError, TransportError};
use uwb_accessory_tracker::infrastructure::accessory::Transport;
use uwb_accessory_tracker::infrastructure::ranging::{AccessoryConfiguration, RangingEngine};
use uwb_accessory_tracker::orchestrator::{
    AccessoryEvent, AccessoryService, RangingDelegate, RangingEvent, TransportDelegate,
    TransportEvent,
};

const INITIALIZE: u8 = 0x0A;
const CONFIGURE_AND_START: u8 = 0x0B;
const STOP: u8 = 0x0C;
const CONFIGURATION_DATA: u8 = 0x01;
const UWB_DID_START: u8 = 0x02;
const UWB_DID_STOP: u8 = 0x03;

#[derive(Default)]
struct RecordingTransport {
    sent: Vec<(DeviceId, Vec<u8>)>,
    connects: Vec<DeviceId>,
    disconnects: Vec<DeviceId>,
    fail_sends: bool,
}

impl Transport for RecordingTransport {
    fn connect(&mut self, device: DeviceId) -> Result<(), TransportError> {
        self.connects.push(device);
        Ok(())
    }

    fn disconnect(&mut self, device: DeviceId) -> Result<(), TransportError> {
        self.disconnects.push(device);
        Ok(())
    }

    fn send(&mut self, bytes: &[u8], device: DeviceId) -> Result<(), TransportError> {
        if self.fail_sends {
            return Err(TransportError::Link("radio off".into()));
        }
        self.sent.push((device, bytes.to_vec()));
        Ok(())
    }
}

/// Accepts 12-byte blobs; the first 8 bytes are the token.
#[derive(Default)]
struct RecordingEngine {
    opened: Vec<SessionHandle>,
    runs: Vec<(SessionHandle, AccessoryConfiguration)>,
    invalidated: Vec<SessionHandle>,
}

impl RangingEngine for RecordingEngine {
    fn parse_configuration(&self, data: &[u8]) -> Result<AccessoryConfiguration, ParseError> {
        if data.len() != 12 {
            return Err(ParseError::new("bad length"));
        }
        Ok(AccessoryConfiguration {
            token: DiscoveryToken(data[..8].to_vec()),
            camera_assistance: false,
            data: data.to_vec(),
        })
    }

    fn open_session(&mut self, session: SessionHandle) {
        self.opened.push(session);
    }

    fn run(&mut self, session: SessionHandle, configuration: &AccessoryConfiguration) {
        self.runs.push((session, configuration.clone()));
    }

    fn invalidate(&mut self, session: SessionHandle) {
        self.invalidated.push(session);
    }
}

type Service = AccessoryService<RecordingTransport, RecordingEngine>;

struct Harness {
    service: Service,
    ui: mpsc::UnboundedReceiver<UiEvent>,
}

impl Harness {
    fn new() -> Self {
        let (ui_tx, ui) = mpsc::unbounded_channel();
        let service = AccessoryService::new(
            RecordingTransport::default(),
            RecordingEngine::default(),
            ui_tx,
            &Settings::default(),
        );
        Self { service, ui }
    }

    fn sent(&self) -> Vec<Vec<u8>> {
        self.service
            .transport()
            .sent
            .iter()
            .map(|(_, bytes)| bytes.clone())
            .collect()
    }

    fn sent_to(&self, device: DeviceId) -> Vec<Vec<u8>> {
        self.service
            .transport()
            .sent
            .iter()
            .filter(|(d, _)| *d == device)
            .map(|(_, bytes)| bytes.clone())
            .collect()
    }

    fn handle(&self, device: DeviceId) -> SessionHandle {
        self.service.router().sessions().handle(device).unwrap()
    }

    fn state(&self, device: DeviceId) -> Option<SessionState> {
        self.service.router().sessions().state(device)
    }

    fn ui_events(&mut self) -> Vec<UiEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.ui.try_recv() {
            events.push(event);
        }
        events
    }

    /// Scenario A: connect, receive a configuration blob.
    fn configured(&mut self, device: DeviceId, token: [u8; 8]) -> SessionHandle {
        self.service.on_connected(device);
        let mut frame = vec![CONFIGURATION_DATA];
        frame.extend_from_slice(&token);
        frame.extend_from_slice(&[0xC0, 0xFF, 0xEE, 0x00]);
        self.service.on_data(&frame, "Cat tag", device);
        self.handle(device)
    }

    /// Scenario B: shareable configuration relayed, accessory started.
    fn ranging(&mut self, device: DeviceId, token: [u8; 8]) -> SessionHandle {
        let handle = self.configured(device, token);
        self.service.on_shareable_configuration(
            handle,
            &DiscoveryToken(token.to_vec()),
            vec![0xAA, 0xBB],
        );
        self.service.on_data(&[UWB_DID_START], "Cat tag", device);
        handle
    }
}

const TOKEN: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];

#[test]
fn scenario_a_connect_and_configure() {
    let mut harness = Harness::new();
    let device = DeviceId(7);

    harness.service.on_connected(device);
    let handle = harness.handle(device);
    assert_eq!(harness.sent(), vec![vec![INITIALIZE]]);
    assert_eq!(harness.service.engine().opened, vec![handle]);
    assert_eq!(harness.state(device), Some(SessionState::Idle));

    let mut frame = vec![CONFIGURATION_DATA];
    frame.extend_from_slice(&TOKEN);
    frame.extend_from_slice(&[9, 9, 9, 9]);
    harness.service.on_data(&frame, "Cat tag", device);

    assert_eq!(harness.state(device), Some(SessionState::AwaitingConfig));
    let runs = &harness.service.engine().runs;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].0, handle);
    assert_eq!(runs[0].1.token, DiscoveryToken(TOKEN.to_vec()));
    assert!(runs[0].1.camera_assistance);
    assert_eq!(
        harness
            .service
            .router()
            .tokens()
            .name(&DiscoveryToken(TOKEN.to_vec())),
        Some("Cat tag")
    );
    assert_eq!(
        harness.service.snapshot(device).unwrap().name.as_deref(),
        Some("Cat tag")
    );
}

#[test]
fn scenario_b_configure_and_start() {
    let mut harness = Harness::new();
    let device = DeviceId(7);
    let handle = harness.configured(device, TOKEN);

    harness.service.on_shareable_configuration(
        handle,
        &DiscoveryToken(TOKEN.to_vec()),
        vec![0xAA, 0xBB],
    );
    assert_eq!(
        harness.sent().last(),
        Some(&vec![CONFIGURE_AND_START, 0xAA, 0xBB])
    );
    assert_eq!(harness.state(device), Some(SessionState::AwaitingConfig));

    harness.service.on_data(&[UWB_DID_START], "Cat tag", device);
    assert_eq!(harness.state(device), Some(SessionState::Ranging));
    assert_eq!(
        harness.service.snapshot(device).unwrap().status,
        DeviceStatus::Ranging
    );
    assert!(harness
        .ui_events()
        .contains(&UiEvent::StatusChanged(device, DeviceStatus::Ranging)));
}

#[test]
fn scenario_c_timeout_retries_on_same_handle() {
    let mut harness = Harness::new();
    let device = DeviceId(7);
    let handle = harness.ranging(device, TOKEN);
    let before = harness.sent().len();

    harness.service.on_objects_removed(
        handle,
        &[DiscoveryToken(TOKEN.to_vec())],
        RemovalReason::Timeout,
    );

    assert_eq!(harness.sent()[before..], [vec![STOP], vec![INITIALIZE]]);
    assert_eq!(harness.handle(device), handle);
    assert!(harness.service.router().tokens().is_empty());
}

#[test]
fn timeout_for_replaced_session_is_ignored() {
    let mut harness = Harness::new();
    let device = DeviceId(7);
    let handle = harness.ranging(device, TOKEN);
    harness.service.on_disconnected(device);
    harness.service.on_connected(device);
    let handle_after = harness.handle(device);
    assert_ne!(handle, handle_after);
    let before = harness.sent().len();

    // Old handle no longer maps to a device
    harness.service.on_objects_removed(
        handle,
        &[DiscoveryToken(TOKEN.to_vec())],
        RemovalReason::Timeout,
    );
    assert_eq!(harness.sent().len(), before);
}

#[test]
fn removal_for_other_reasons_is_ignored() {
    let mut harness = Harness::new();
    let device = DeviceId(7);
    let handle = harness.ranging(device, TOKEN);
    let before = harness.sent().len();

    harness.service.on_objects_removed(
        handle,
        &[DiscoveryToken(TOKEN.to_vec())],
        RemovalReason::Other,
    );

    assert_eq!(harness.sent().len(), before);
    assert_eq!(harness.service.router().tokens().len(), 1);
}

#[test]
fn scenario_d_permission_denied() {
    let mut harness = Harness::new();
    let device = DeviceId(7);
    let other = DeviceId(8);
    let handle = harness.ranging(device, TOKEN);
    let other_handle = harness.ranging(other, [8; 8]);
    harness.ui_events();
    let before = harness.sent().len();

    harness
        .service
        .on_invalidated(handle, &InvalidationError::PermissionDenied);
    harness
        .service
        .on_invalidated(other_handle, &InvalidationError::PermissionDenied);

    assert_eq!(harness.state(device), Some(SessionState::Invalidated));
    assert_eq!(harness.sent().len(), before);
    let prompts = harness
        .ui_events()
        .into_iter()
        .filter(|e| *e == UiEvent::PermissionRequired)
        .count();
    assert_eq!(prompts, 1);

    // Nothing further goes out on the invalidated handle
    harness.service.on_suspended(handle);
    assert_eq!(harness.sent().len(), before);
}

#[test]
fn scenario_e_unconverged_sample_marks_stale() {
    let mut harness = Harness::new();
    let device = DeviceId(7);
    let handle = harness.ranging(device, TOKEN);
    let token = DiscoveryToken(TOKEN.to_vec());

    let with_direction = NearbyObject {
        token: token.clone(),
        sample: RangingSample {
            distance: Some(2.0),
            direction: Some(Vec3::new(0.0, 0.0, 1.0)),
            ..Default::default()
        },
    };
    harness.service.on_samples_update(handle, &[with_direction]);

    harness.service.on_convergence_update(
        handle,
        Some(&token),
        &ConvergenceStatus::NotConverged(vec![NotConvergedReason::InsufficientLighting]),
    );
    let without_direction = NearbyObject {
        token,
        sample: RangingSample {
            distance: Some(2.5),
            horizontal_angle: Some(0.5),
            ..Default::default()
        },
    };
    harness
        .service
        .on_samples_update(handle, &[without_direction]);

    let location = harness.service.snapshot(device).unwrap().location;
    assert!(location.stale);
    assert_eq!(location.direction, Some(Vec3::new(0.0, 0.0, 1.0)));
    assert_eq!(location.distance, Some(2.5));
}

#[test]
fn converged_angle_only_sample_refreshes_direction() {
    let mut harness = Harness::new();
    let device = DeviceId(7);
    let handle = harness.ranging(device, TOKEN);
    let token = DiscoveryToken(TOKEN.to_vec());

    harness
        .service
        .on_convergence_update(handle, Some(&token), &ConvergenceStatus::Converged);
    harness.service.on_samples_update(
        handle,
        &[NearbyObject {
            token,
            sample: RangingSample {
                distance: Some(1.0),
                horizontal_angle: Some(0.0),
                ..Default::default()
            },
        }],
    );

    let location = harness.service.snapshot(device).unwrap().location;
    assert!(!location.stale);
    assert_eq!(location.direction, Some(Vec3::new(0.0, 0.0, 1.0)));
}

#[test]
fn recoverable_invalidation_replaces_session() {
    let mut harness = Harness::new();
    let device = DeviceId(7);
    let old = harness.ranging(device, TOKEN);
    let before = harness.sent().len();

    harness
        .service
        .on_invalidated(old, &InvalidationError::Recoverable("engine reset".into()));

    let new = harness.handle(device);
    assert_ne!(old, new);
    assert_eq!(harness.sent()[before..], [vec![STOP], vec![INITIALIZE]]);
    assert_eq!(harness.service.engine().opened.last(), Some(&new));
    assert_eq!(harness.state(device), Some(SessionState::Idle));

    // Late callbacks for the old handle are dropped
    let after = harness.sent().len();
    harness.service.on_suspended(old);
    harness.service.on_shareable_configuration(
        old,
        &DiscoveryToken(TOKEN.to_vec()),
        vec![0xAA],
    );
    assert_eq!(harness.sent().len(), after);
}

#[test]
fn invalid_configuration_is_terminal_without_retry() {
    let mut harness = Harness::new();
    let device = DeviceId(7);
    let handle = harness.configured(device, TOKEN);
    let before = harness.sent().len();

    harness
        .service
        .on_invalidated(handle, &InvalidationError::InvalidConfiguration);

    assert_eq!(harness.state(device), Some(SessionState::Invalidated));
    assert_eq!(harness.sent().len(), before);
    assert!(!harness.ui_events().contains(&UiEvent::PermissionRequired));
}

#[test]
fn suspension_stops_and_resumes_handshake() {
    let mut harness = Harness::new();
    let device = DeviceId(7);
    let handle = harness.ranging(device, TOKEN);

    harness.service.on_suspended(handle);
    assert_eq!(harness.state(device), Some(SessionState::Suspended));
    assert_eq!(harness.sent().last(), Some(&vec![STOP]));

    harness.service.on_suspension_ended(handle);
    assert_eq!(harness.state(device), Some(SessionState::Idle));
    assert_eq!(harness.sent().last(), Some(&vec![INITIALIZE]));
    assert_eq!(harness.handle(device), handle);
}

#[test]
fn accessory_stop_disconnects_and_cleans_up() {
    let mut harness = Harness::new();
    let device = DeviceId(7);
    let handle = harness.ranging(device, TOKEN);

    harness.service.on_data(&[UWB_DID_STOP], "Cat tag", device);
    assert_eq!(harness.state(device), Some(SessionState::Stopped));
    assert_eq!(harness.service.transport().disconnects, vec![device]);

    harness.service.on_disconnected(device);
    assert_eq!(harness.state(device), None);
    assert!(harness.service.engine().invalidated.contains(&handle));
    assert!(harness.service.snapshot(device).is_none());
    assert!(harness.service.router().tokens().is_empty());
    assert!(harness.ui_events().contains(&UiEvent::NoActiveAccessories));
}

#[test]
fn malformed_frames_have_no_side_effects() {
    let mut harness = Harness::new();
    let device = DeviceId(7);
    harness.service.on_connected(device);
    let before = harness.sent().len();

    for frame in [
        vec![],
        vec![0xFF, 1, 2],
        vec![INITIALIZE],
        vec![CONFIGURE_AND_START, 0xAA],
        vec![STOP],
    ] {
        harness.service.on_data(&frame, "Cat tag", device);
    }
    // Reserved kinds are accepted but do nothing
    harness.service.on_data(&[0x20], "Cat tag", device);
    harness.service.on_data(&[0x2F, 1], "Cat tag", device);

    assert_eq!(harness.sent().len(), before);
    assert_eq!(harness.state(device), Some(SessionState::Idle));
    assert!(harness.service.engine().runs.is_empty());
}

#[test]
fn unparseable_configuration_keeps_session_idle() {
    let mut harness = Harness::new();
    let device = DeviceId(7);
    harness.service.on_connected(device);

    harness
        .service
        .on_data(&[CONFIGURATION_DATA, 1, 2, 3], "Cat tag", device);
    harness.service.on_data(&[CONFIGURATION_DATA], "Cat tag", device);

    assert_eq!(harness.state(device), Some(SessionState::Idle));
    assert!(harness.service.engine().runs.is_empty());
    assert!(harness.service.router().tokens().is_empty());
}

#[test]
fn transport_failures_do_not_change_session_state() {
    let device = DeviceId(7);
    let (ui_tx, _ui) = mpsc::unbounded_channel();
    let transport = RecordingTransport {
        fail_sends: true,
        ..Default::default()
    };
    let mut failing = AccessoryService::new(
        transport,
        RecordingEngine::default(),
        ui_tx,
        &Settings::default(),
    );
    failing.on_connected(device);

    assert_eq!(
        failing.router().sessions().state(device),
        Some(SessionState::Idle)
    );
    assert!(failing.transport().sent.is_empty());
}

#[test]
fn devices_are_independent() {
    let mut harness = Harness::new();
    let a = DeviceId(1);
    let b = DeviceId(2);
    let handle_a = harness.ranging(a, TOKEN);
    harness.ranging(b, [2; 8]);
    let sent_to_b = harness.sent_to(b).len();

    harness
        .service
        .on_invalidated(handle_a, &InvalidationError::Recoverable("lost".into()));
    harness.service.on_data(&[0xFF], "Cat tag", b);

    assert_eq!(harness.state(b), Some(SessionState::Ranging));
    assert_eq!(harness.sent_to(b).len(), sent_to_b);
    assert_eq!(harness.service.router().sessions().live_count(), 2);
}

#[test]
fn discovery_connects_and_late_timeout_is_ignored() {
    let mut harness = Harness::new();
    harness.service.on_discovered(DeviceId(3));
    assert_eq!(harness.service.transport().connects, vec![DeviceId(3)]);

    harness.service.on_discovered(DeviceId(4));
    harness.service.on_connected(DeviceId(4));
    harness.service.on_timeout(DeviceId(4));
    assert!(harness.service.snapshot(DeviceId(4)).is_some());
}

#[test]
fn recoverable_invalidation_forgets_old_token() {
    let mut harness = Harness::new();
    let device = DeviceId(7);
    let old = harness.ranging(device, TOKEN);

    harness
        .service
        .on_invalidated(old, &InvalidationError::Recoverable("engine reset".into()));
    assert!(harness.service.router().tokens().is_empty());

    // The replacement session caches the fresh token from the next handshake
    let mut frame = vec![CONFIGURATION_DATA];
    frame.extend_from_slice(&[9; 8]);
    frame.extend_from_slice(&[0; 4]);
    harness.service.on_data(&frame, "Cat tag", device);
    assert_eq!(harness.service.router().tokens().len(), 1);

    harness.service.on_disconnected(device);
    assert!(harness.service.router().tokens().is_empty());
}

#[test]
fn reconnect_forgets_token_of_replaced_session() {
    let mut harness = Harness::new();
    let device = DeviceId(7);
    harness.ranging(device, TOKEN);

    harness.service.on_connected(device);
    assert!(harness.service.router().tokens().is_empty());

    harness.service.on_disconnected(device);
    assert!(harness.service.router().tokens().is_empty());
}

#[test]
fn reconfigure_replaces_cached_token() {
    let mut harness = Harness::new();
    let device = DeviceId(7);
    harness.configured(device, TOKEN);

    let mut frame = vec![CONFIGURATION_DATA];
    frame.extend_from_slice(&[9; 8]);
    frame.extend_from_slice(&[0; 4]);
    harness.service.on_data(&frame, "Cat tag", device);

    let tokens = harness.service.router().tokens();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens.name(&DiscoveryToken(vec![9; 8])), Some("Cat tag"));
    assert_eq!(tokens.name(&DiscoveryToken(TOKEN.to_vec())), None);
}

#[test]
fn first_sample_reports_ranging_status() {
    let mut harness = Harness::new();
    let device = DeviceId(7);
    let handle = harness.configured(device, TOKEN);
    harness.ui_events();

    let object = NearbyObject {
        token: DiscoveryToken(TOKEN.to_vec()),
        sample: RangingSample {
            distance: Some(1.0),
            ..Default::default()
        },
    };
    harness.service.on_samples_update(handle, &[object.clone()]);
    let events = harness.ui_events();
    assert_eq!(
        events.first(),
        Some(&UiEvent::StatusChanged(device, DeviceStatus::Ranging))
    );
    assert!(matches!(events.last(), Some(UiEvent::LocationUpdated(_))));

    harness.service.on_samples_update(handle, &[object]);
    let events = harness.ui_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], UiEvent::LocationUpdated(_)));
}

#[test]
fn repeated_disconnect_is_not_reported() {
    let mut harness = Harness::new();
    let device = DeviceId(7);
    harness.ranging(device, TOKEN);
    harness.service.on_disconnected(device);
    harness.ui_events();

    harness.service.on_disconnected(device);
    harness.service.on_disconnected(DeviceId(42));

    assert!(harness.ui_events().is_empty());
}

#[tokio::test]
async fn run_loop_processes_events_in_order() {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (ui_tx, _ui) = mpsc::unbounded_channel();
    let service = AccessoryService::new(
        RecordingTransport::default(),
        RecordingEngine::default(),
        ui_tx,
        &Settings::default(),
    );

    let device = DeviceId(11);
    let mut blob = vec![CONFIGURATION_DATA];
    blob.extend_from_slice(&TOKEN);
    blob.extend_from_slice(&[0; 4]);

    let events: Vec<AccessoryEvent> = vec![
        TransportEvent::Discovered(device).into(),
        TransportEvent::Connected(device).into(),
        TransportEvent::Data {
            device,
            name: "Cat tag".into(),
            bytes: blob,
        }
        .into(),
        RangingEvent::ShareableConfiguration {
            session: SessionHandle(1),
            token: DiscoveryToken(TOKEN.to_vec()),
            shareable: vec![0xAA, 0xBB],
        }
        .into(),
        TransportEvent::Data {
            device,
            name: "Cat tag".into(),
            bytes: vec![UWB_DID_START],
        }
        .into(),
    ];
    for event in events {
        event_tx.send(event).unwrap();
    }
    drop(event_tx);

    let service = service.run(event_rx).await;

    assert_eq!(
        service.router().sessions().state(device),
        Some(SessionState::Ranging)
    );
    assert_eq!(
        service.transport().sent,
        vec![
            (device, vec![INITIALIZE]),
            (device, vec![CONFIGURE_AND_START, 0xAA, 0xBB]),
        ]
    );
}
