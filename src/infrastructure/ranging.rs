//! Ranging engine seam.
//!
//! The platform's ranging engine does the triangulation. The orchestrator
//! only builds configurations from accessory blobs and starts, runs and
//! invalidates sessions; results come back through
//! [`crate::orchestrator::RangingDelegate`].

use crate::domain::models::{DiscoveryToken, SessionHandle};
use crate::error::ParseError;

/// Engine-native configuration built from an accessory's blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessoryConfiguration {
    pub token: DiscoveryToken,
    pub camera_assistance: bool,
    pub data: Vec<u8>,
}

pub trait RangingEngine {
    /// Build a configuration from the bytes an accessory shared
    fn parse_configuration(&self, data: &[u8]) -> Result<AccessoryConfiguration, ParseError>;

    /// Create the engine session for `session` and bind it to the shared
    /// reference frame
    fn open_session(&mut self, session: SessionHandle);

    fn run(&mut self, session: SessionHandle, configuration: &AccessoryConfiguration);

    fn invalidate(&mut self, session: SessionHandle);
}
