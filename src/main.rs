use tokio::sync::mpsc;
use tracing::{info, warn};
use uwb_accessory_tracker::domain::models::{MessageSeverity, UiEvent};
use uwb_accessory_tracker::domain::settings::SettingsService;
use uwb_accessory_tracker::infrastructure::logging::init_logger;
use uwb_accessory_tracker::infrastructure::simulator::Simulation;
use uwb_accessory_tracker::AccessoryService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings_service = SettingsService::new()?;
    let settings = settings_service.get().clone();

    let _logging_guard = init_logger(&settings.log_settings)?;
    info!(
        "Starting UWB accessory tracker (settings: {})",
        settings_service.path().display()
    );

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();

    let simulation = Simulation::new(settings.simulator.clone(), event_tx);
    let service = AccessoryService::new(
        simulation.transport(),
        simulation.engine(),
        ui_tx,
        &settings,
    );

    let dispatcher = tokio::spawn(service.run(event_rx));
    let ticker = tokio::spawn(simulation.clone().drive());
    simulation.announce();

    while let Some(event) = ui_rx.recv().await {
        match event {
            UiEvent::LocationUpdated(snapshot) => {
                let location = snapshot.location;
                info!(
                    "{} '{}': distance {:?} m, direction {:?}, stale {}",
                    snapshot.id,
                    snapshot.name.as_deref().unwrap_or("?"),
                    location.distance,
                    location.direction,
                    location.stale
                );
            }
            UiEvent::StatusChanged(device, status) => info!("{} is now {}", device, status),
            UiEvent::PermissionRequired => {
                warn!("Nearby interaction access is required; enable it in Settings")
            }
            UiEvent::Log(message) => match message.severity {
                MessageSeverity::Warning | MessageSeverity::Error => warn!("{}", message.message),
                _ => info!("{}", message.message),
            },
            UiEvent::NoActiveAccessories => {
                info!("All accessories disconnected");
                break;
            }
        }
    }

    ticker.abort();
    dispatcher.abort();
    Ok(())
}
