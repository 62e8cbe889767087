//! Subscriber entity

use super::value_object::SubscriberState;
use crate::domain::shared::error::SwitchError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{CallId, SubscriberNumber};
use chrono::{DateTime, Utc};

/// A registered endpoint.
///
/// The attached call is held by id only; the switch owns the call itself.
/// `call` is `Some` exactly when the state is Dialing, Ringing or InCall.
#[derive(Debug, Clone)]
pub struct Subscriber {
    number: SubscriberNumber,
    state: SubscriberState,
    call: Option<CallId>,
    registered_at: DateTime<Utc>,
}

impl Subscriber {
    pub fn new(number: SubscriberNumber) -> Self {
        Self {
            number,
            state: SubscriberState::Idle,
            call: None,
            registered_at: Utc::now(),
        }
    }

    /// Lift the handset while idle. Takes a line if one is free.
    pub fn pick_up(&mut self, line_free: bool) -> Result<SubscriberState> {
        if self.state != SubscriberState::Idle {
            return Err(SwitchError::InvalidState);
        }
        let next = if line_free {
            SubscriberState::Ready
        } else {
            SubscriberState::Busy
        };
        self.transition_to(next)?;
        Ok(next)
    }

    /// Caller side of a new call
    pub fn start_dialing(&mut self, call: CallId) -> Result<()> {
        self.transition_to(SubscriberState::Dialing)?;
        self.call = Some(call);
        Ok(())
    }

    /// Callee side of a new call
    pub fn ring(&mut self, call: CallId) -> Result<()> {
        self.transition_to(SubscriberState::Ringing)?;
        self.call = Some(call);
        Ok(())
    }

    /// Both sides go InCall once the callee answers.
    pub fn connect(&mut self) -> Result<()> {
        self.transition_to(SubscriberState::InCall)
    }

    /// Back on hook, detached from any call
    pub fn reset(&mut self) {
        self.state = SubscriberState::Idle;
        self.call = None;
    }

    fn transition_to(&mut self, new_state: SubscriberState) -> Result<()> {
        if !self.state.can_transition_to(new_state) {
            return Err(SwitchError::InvalidState);
        }
        self.state = new_state;
        Ok(())
    }

    // Getters
    pub fn number(&self) -> &SubscriberNumber {
        &self.number
    }

    pub fn state(&self) -> SubscriberState {
        self.state
    }

    pub fn call(&self) -> Option<CallId> {
        self.call
    }

    /// Time since registration
    pub fn connected_for(&self) -> chrono::Duration {
        Utc::now() - self.registered_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber() -> Subscriber {
        Subscriber::new(SubscriberNumber::format(1, 3))
    }

    #[test]
    fn test_new_subscriber_is_idle() {
        let s = subscriber();
        assert_eq!(s.state(), SubscriberState::Idle);
        assert!(s.call().is_none());
        assert_eq!(s.number(), "001");
        assert!(s.connected_for() >= chrono::Duration::zero());
    }

    #[test]
    fn test_pick_up_depends_on_free_line() {
        let mut s = subscriber();
        assert_eq!(s.pick_up(true).unwrap(), SubscriberState::Ready);

        let mut s = subscriber();
        assert_eq!(s.pick_up(false).unwrap(), SubscriberState::Busy);
    }

    #[test]
    fn test_pick_up_twice_is_rejected() {
        let mut s = subscriber();
        s.pick_up(true).unwrap();
        assert_eq!(s.pick_up(true), Err(SwitchError::InvalidState));
        assert_eq!(s.state(), SubscriberState::Ready);
    }

    #[test]
    fn test_dialing_requires_ready() {
        let mut s = subscriber();
        assert!(s.start_dialing(CallId::new()).is_err());
        assert!(s.call().is_none());

        s.pick_up(true).unwrap();
        let call = CallId::new();
        s.start_dialing(call).unwrap();
        assert_eq!(s.state(), SubscriberState::Dialing);
        assert_eq!(s.call(), Some(call));
    }

    #[test]
    fn test_ring_answer_reset() {
        let mut s = subscriber();
        let call = CallId::new();
        s.ring(call).unwrap();
        assert_eq!(s.state(), SubscriberState::Ringing);

        s.connect().unwrap();
        assert_eq!(s.state(), SubscriberState::InCall);
        assert_eq!(s.call(), Some(call));

        s.reset();
        assert_eq!(s.state(), SubscriberState::Idle);
        assert!(s.call().is_none());
    }

    #[test]
    fn test_busy_cannot_ring() {
        let mut s = subscriber();
        s.pick_up(false).unwrap();
        assert!(s.ring(CallId::new()).is_err());
        assert!(s.call().is_none());
    }
}
