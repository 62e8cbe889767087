//! Call aggregate root

use crate::domain::shared::value_objects::{CallId, SubscriberNumber};
use chrono::{DateTime, Duration, Utc};

/// Call aggregate root
///
/// A call exists from the moment the callee starts ringing until either side
/// hangs up or disconnects. It only records who is involved; the subscribers'
/// line states are driven by the switch.
#[derive(Debug, Clone)]
pub struct Call {
    id: CallId,
    /// Calling party
    caller: SubscriberNumber,
    /// Called party
    callee: SubscriberNumber,
    /// When the call was placed
    established_at: DateTime<Utc>,
    /// When the callee picked up
    answered_at: Option<DateTime<Utc>>,
}

impl Call {
    pub fn new(caller: SubscriberNumber, callee: SubscriberNumber) -> Self {
        Self {
            id: CallId::new(),
            caller,
            callee,
            established_at: Utc::now(),
            answered_at: None,
        }
    }

    pub fn answer(&mut self) {
        if self.answered_at.is_none() {
            self.answered_at = Some(Utc::now());
        }
    }

    /// The participant on the other end from `number`
    pub fn other_party(&self, number: &SubscriberNumber) -> Option<&SubscriberNumber> {
        if *number == self.caller {
            Some(&self.callee)
        } else if *number == self.callee {
            Some(&self.caller)
        } else {
            None
        }
    }

    pub fn involves(&self, number: &SubscriberNumber) -> bool {
        self.other_party(number).is_some()
    }

    /// Time spent talking, `None` if never answered
    pub fn talk_duration(&self) -> Option<Duration> {
        self.answered_at.map(|answered| Utc::now() - answered)
    }

    // Getters
    pub fn id(&self) -> CallId {
        self.id
    }

    pub fn caller(&self) -> &SubscriberNumber {
        &self.caller
    }

    pub fn callee(&self) -> &SubscriberNumber {
        &self.callee
    }

    /// Time since the caller dialled
    pub fn age(&self) -> Duration {
        Utc::now() - self.established_at
    }
}
