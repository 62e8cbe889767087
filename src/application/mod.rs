//! Application layer - the switch and what it talks to
//!
//! This layer is responsible for:
//! - Serializing every state change behind one lock
//! - Pairing subscribers into calls
//! - Pushing events and roster snapshots to subscriber sinks

pub mod event;
pub mod sink;
pub mod switch;

pub use event::{RosterEntry, Signal, SwitchEvent};
pub use sink::{ChannelSink, EventSink, SinkError};
pub use switch::Switch;
