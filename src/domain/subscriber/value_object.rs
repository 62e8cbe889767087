//! Subscriber value objects

use serde::{Deserialize, Serialize};
use std::fmt;

/// Line state of a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriberState {
    /// Handset on hook
    Idle,
    /// Handset lifted and a line is free
    Ready,
    /// Handset lifted but every line is taken
    Busy,
    /// Calling somebody, waiting for the answer
    Dialing,
    /// Somebody is calling
    Ringing,
    /// Talking
    InCall,
}

impl SubscriberState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriberState::Idle => "Idle",
            SubscriberState::Ready => "Ready",
            SubscriberState::Busy => "Busy",
            SubscriberState::Dialing => "Dialing",
            SubscriberState::Ringing => "Ringing",
            SubscriberState::InCall => "InCall",
        }
    }

    /// Check if state transition is valid
    pub fn can_transition_to(&self, new_state: SubscriberState) -> bool {
        use SubscriberState::*;

        match (self, new_state) {
            // Hanging up is always allowed, including Idle -> Idle
            (_, Idle) => true,

            (Idle, Ready) => true,
            (Idle, Busy) => true,
            (Idle, Ringing) => true,

            (Ready, Dialing) => true,

            (Ringing, InCall) => true,
            (Dialing, InCall) => true,

            _ => false,
        }
    }

    /// States in which the subscriber is attached to a call
    pub fn has_call(&self) -> bool {
        matches!(
            self,
            SubscriberState::Dialing | SubscriberState::Ringing | SubscriberState::InCall
        )
    }

    pub fn can_dial(&self) -> bool {
        matches!(self, SubscriberState::Ready)
    }

    pub fn can_receive_call(&self) -> bool {
        matches!(self, SubscriberState::Idle)
    }
}

impl fmt::Display for SubscriberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
