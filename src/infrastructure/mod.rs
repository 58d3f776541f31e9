pub mod accessory;
pub mod logging;
pub mod ranging;
pub mod simulator;
