//! Accessory Link Module
//!
//! ## Modules
//!
//! - [`protocol`] - Frame kinds, encoding and direction-checked decoding
//! - [`transport`] - The command interface to the external link layer

pub mod protocol;
pub mod transport;

pub use protocol::{AccessoryMessage, HostMessage, MessageKind};
pub use transport::Transport;
