//! Interface layer - what handsets talk to
//!
//! This layer handles:
//! - The line protocol (command parsing, event encoding)
//! - Per-connection gateways between a byte stream and the switch

pub mod gateway;
pub mod protocol;

pub use gateway::Gateway;
pub use protocol::{ClientCommand, ProtocolError};
