//! Orchestrator Module
//!
//! Sits between the accessory link, the ranging engine and the UI.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐  TransportDelegate   ┌──────────────────┐  RangingDelegate  ┌────────────┐
//! │ Transport │ ───────────────────> │ AccessoryService │ <──────────────── │  Ranging   │
//! │ (link)    │ <─────────────────── │    (facade)      │ ────────────────> │  engine    │
//! └───────────┘ connect/send/disc.   └────────┬─────────┘ open/run/inval.   └────────────┘
//!                                             │
//!                                     ┌───────▼───────┐
//!                                     │  EventRouter  │
//!                                     │ - registry    │
//!                                     │ - sessions    │
//!                                     │ - token cache │
//!                                     └───────┬───────┘
//!                                             │ UiEvent
//!                                             ▼
//!                                            UI
//! ```
//!
//! ## Modules
//!
//! - [`delegate`] - Callback traits and the event enum collaborators push
//! - [`router`] - Event handling, retry policy, command generation
//! - [`service`] - The facade that executes commands

pub mod delegate;
pub mod router;
pub mod service;

pub use delegate::{
    dispatch, AccessoryEvent, EventSink, RangingDelegate, RangingEvent, TransportDelegate,
    TransportEvent,
};
pub use router::{Command, EventRouter};
pub use service::AccessoryService;
