//! Events pushed from the switch to subscribers

use crate::domain::shared::value_objects::SubscriberNumber;
use crate::domain::subscriber::SubscriberState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Audible/visual signal played to the handset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Dial tone, a line was taken
    Ready,
    /// Busy tone, no free line
    Busy,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Ready => "ready",
            Signal::Busy => "busy",
        }
    }
}

/// One row of the roster snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub number: SubscriberNumber,
    pub state: SubscriberState,
}

/// Outbound event for a single subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum SwitchEvent {
    Assigned(SubscriberNumber),
    State(SubscriberState),
    Signal(Signal),
    IncomingCall(SubscriberNumber),
    CallConnected,
    CallEnded,
    Message(String),
    /// Shared by every recipient of one broadcast
    Subscribers(Arc<[RosterEntry]>),
    Error(String),
}
