//! The exchange switch
//!
//! Owns every subscriber and every active call. All mutation goes through a
//! single lock, so no operation can observe half of another one. Outbound
//! events are queued on the subscribers' sinks while the lock is held; sinks
//! never block.

use super::event::{RosterEntry, Signal, SwitchEvent};
use super::sink::EventSink;
use crate::config::ExchangeConfig;
use crate::domain::call::Call;
use crate::domain::shared::error::SwitchError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{CallId, SubscriberNumber};
use crate::domain::subscriber::{Subscriber, SubscriberState};
use crate::infrastructure::metrics;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// A registered subscriber together with its outbound sink
struct Line {
    subscriber: Subscriber,
    sink: Arc<dyn EventSink>,
}

struct Registry {
    config: ExchangeConfig,
    /// Next sequence number to hand out. Never reused.
    next_sequence: u64,
    /// In registration order
    lines: Vec<Line>,
    calls: HashMap<CallId, Call>,
    /// Subscribers whose sink failed during the current operation
    dead: Vec<SubscriberNumber>,
}

/// Switch
///
/// Brokers calls between registered subscribers, bounded by
/// `max_connections` concurrent calls.
pub struct Switch {
    registry: Mutex<Registry>,
}

impl Switch {
    pub fn new(config: ExchangeConfig) -> Self {
        Self {
            registry: Mutex::new(Registry {
                config,
                next_sequence: 1,
                lines: Vec::new(),
                calls: HashMap::new(),
                dead: Vec::new(),
            }),
        }
    }

    /// Register a new subscriber and hand it a fresh number
    pub async fn register(&self, sink: Arc<dyn EventSink>) -> SubscriberNumber {
        let mut registry = self.registry.lock().await;

        let number =
            SubscriberNumber::format(registry.next_sequence, registry.config.number_length);
        registry.next_sequence += 1;

        registry.lines.push(Line {
            subscriber: Subscriber::new(number.clone()),
            sink,
        });
        info!("Subscriber {} registered", number);

        registry.send(&number, SwitchEvent::Assigned(number.clone()));
        registry.send(&number, SwitchEvent::State(SubscriberState::Idle));
        registry.broadcast_roster();
        registry.finish();

        number
    }

    /// Remove a subscriber, tearing down its call first.
    ///
    /// Unknown numbers are ignored, so this is safe to call after the
    /// subscriber was already dropped for a failing sink.
    pub async fn unregister(&self, number: &SubscriberNumber) {
        let mut registry = self.registry.lock().await;
        registry.remove(number);
        registry.finish();
    }

    /// Lift the handset: take a line when idle, answer when ringing
    pub async fn pickup(&self, number: &SubscriberNumber) -> Result<()> {
        let mut registry = self.registry.lock().await;
        let result = registry.pickup(number);
        registry.finish();
        result
    }

    /// Call `target` from a Ready subscriber
    pub async fn dial(&self, number: &SubscriberNumber, target: &str) -> Result<()> {
        let mut registry = self.registry.lock().await;
        let result = registry.dial(number, target);
        registry.finish();
        result
    }

    /// End the current call, or just go back on hook
    pub async fn hangup(&self, number: &SubscriberNumber) -> Result<()> {
        let mut registry = self.registry.lock().await;
        let result = registry.hangup(number);
        registry.finish();
        result
    }

    /// Forward `text` to the call peer. Ignored unless the call is answered.
    pub async fn relay(&self, number: &SubscriberNumber, text: &str) -> Result<()> {
        let mut registry = self.registry.lock().await;
        let result = registry.relay(number, text);
        registry.finish();
        result
    }

    /// Current roster in registration order
    pub async fn snapshot(&self) -> Vec<RosterEntry> {
        self.registry.lock().await.roster()
    }

    pub async fn state_of(&self, number: &SubscriberNumber) -> Option<SubscriberState> {
        let registry = self.registry.lock().await;
        registry
            .position(number)
            .map(|i| registry.lines[i].subscriber.state())
    }

    pub async fn active_call_count(&self) -> usize {
        self.registry.lock().await.calls.len()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.registry.lock().await.lines.len()
    }
}

impl Registry {
    fn position(&self, number: &SubscriberNumber) -> Option<usize> {
        self.lines
            .iter()
            .position(|line| line.subscriber.number() == number)
    }

    fn position_of(&self, number: &str) -> Option<usize> {
        self.lines
            .iter()
            .position(|line| line.subscriber.number() == number)
    }

    fn line_free(&self) -> bool {
        self.calls.len() < self.config.max_connections
    }

    fn pickup(&mut self, number: &SubscriberNumber) -> Result<()> {
        let i = self.position(number).ok_or(SwitchError::NotRegistered)?;

        match self.lines[i].subscriber.state() {
            SubscriberState::Ringing => self.answer(i),
            SubscriberState::Idle => {
                let line_free = self.line_free();
                let state = self.lines[i].subscriber.pick_up(line_free)?;
                let signal = if line_free { Signal::Ready } else { Signal::Busy };
                debug!("Subscriber {} picked up: {}", number, state);

                self.send(number, SwitchEvent::Signal(signal));
                self.send(number, SwitchEvent::State(state));
                self.broadcast_roster();
                Ok(())
            }
            _ => Err(SwitchError::InvalidState),
        }
    }

    fn answer(&mut self, callee_index: usize) -> Result<()> {
        let call_id = self.lines[callee_index]
            .subscriber
            .call()
            .ok_or(SwitchError::InvalidState)?;
        let (caller, callee) = {
            let call = self.calls.get(&call_id).ok_or(SwitchError::InvalidState)?;
            (call.caller().clone(), call.callee().clone())
        };
        let caller_index = self.position(&caller).ok_or(SwitchError::InvalidState)?;

        self.lines[callee_index].subscriber.connect()?;
        self.lines[caller_index].subscriber.connect()?;
        if let Some(call) = self.calls.get_mut(&call_id) {
            call.answer();
        }
        metrics::record_call_answered();
        info!("Call connected: {} <-> {}", caller, callee);

        for party in [&callee, &caller] {
            self.send(party, SwitchEvent::CallConnected);
            self.send(party, SwitchEvent::State(SubscriberState::InCall));
        }
        self.broadcast_roster();
        Ok(())
    }

    fn dial(&mut self, number: &SubscriberNumber, target: &str) -> Result<()> {
        let i = self.position(number).ok_or(SwitchError::NotRegistered)?;
        if !self.lines[i].subscriber.state().can_dial() {
            return Err(SwitchError::InvalidState);
        }

        let j = self
            .position_of(target)
            .ok_or_else(|| SwitchError::TargetNotFound(target.to_string()))?;
        if !self.lines[j].subscriber.state().can_receive_call() {
            return Err(SwitchError::TargetBusy(target.to_string()));
        }
        // Lines are taken at pickup, but the limit must hold even when more
        // subscribers reached Ready than there are lines.
        if !self.line_free() {
            return Err(SwitchError::NoFreeLine);
        }

        let callee = self.lines[j].subscriber.number().clone();
        let call = Call::new(number.clone(), callee.clone());
        let call_id = call.id();

        self.lines[i].subscriber.start_dialing(call_id)?;
        self.lines[j].subscriber.ring(call_id)?;
        self.calls.insert(call_id, call);
        metrics::record_call_placed();
        info!("Call {}: {} -> {}", call_id, number, callee);

        self.send(number, SwitchEvent::State(SubscriberState::Dialing));
        self.send(&callee, SwitchEvent::IncomingCall(number.clone()));
        self.send(&callee, SwitchEvent::State(SubscriberState::Ringing));
        self.broadcast_roster();
        Ok(())
    }

    fn hangup(&mut self, number: &SubscriberNumber) -> Result<()> {
        let i = self.position(number).ok_or(SwitchError::NotRegistered)?;

        match self.lines[i].subscriber.call() {
            Some(call_id) => self.tear_down(call_id),
            None => {
                self.lines[i].subscriber.reset();
                self.send(number, SwitchEvent::State(SubscriberState::Idle));
            }
        }
        self.broadcast_roster();
        Ok(())
    }

    fn relay(&mut self, number: &SubscriberNumber, text: &str) -> Result<()> {
        let i = self.position(number).ok_or(SwitchError::NotRegistered)?;
        let subscriber = &self.lines[i].subscriber;
        if subscriber.state() != SubscriberState::InCall {
            return Ok(());
        }

        let peer = subscriber
            .call()
            .and_then(|id| self.calls.get(&id))
            .and_then(|call| call.other_party(number))
            .cloned();
        if let Some(peer) = peer {
            self.send(&peer, SwitchEvent::Message(text.to_string()));
        }
        Ok(())
    }

    /// Remove a call and put both parties back on hook. Does not broadcast.
    fn tear_down(&mut self, call_id: CallId) {
        let Some(call) = self.calls.remove(&call_id) else {
            return;
        };

        match call.talk_duration() {
            Some(talk) => info!(
                "Call {} ended: {} <-> {} after {}s",
                call_id,
                call.caller(),
                call.callee(),
                talk.num_seconds()
            ),
            None => info!(
                "Call {} ended before answer: {} -> {} after {}s ringing",
                call_id,
                call.caller(),
                call.callee(),
                call.age().num_seconds()
            ),
        }

        for party in [call.caller(), call.callee()] {
            if let Some(i) = self.position(party) {
                self.lines[i].subscriber.reset();
                self.send(party, SwitchEvent::CallEnded);
                self.send(party, SwitchEvent::State(SubscriberState::Idle));
            }
        }
    }

    fn remove(&mut self, number: &SubscriberNumber) {
        let Some(i) = self.position(number) else {
            return;
        };

        if let Some(call_id) = self.lines[i].subscriber.call() {
            self.tear_down(call_id);
        }
        // Tearing down never adds or removes lines, so `i` is still valid.
        let line = self.lines.remove(i);
        info!(
            "Subscriber {} unregistered after {}s",
            number,
            line.subscriber.connected_for().num_seconds()
        );

        self.broadcast_roster();
    }

    fn roster(&self) -> Vec<RosterEntry> {
        self.lines
            .iter()
            .map(|line| RosterEntry {
                number: line.subscriber.number().clone(),
                state: line.subscriber.state(),
            })
            .collect()
    }

    fn send(&mut self, to: &SubscriberNumber, event: SwitchEvent) {
        let Some(line) = self.lines.iter().find(|l| l.subscriber.number() == to) else {
            return;
        };
        if let Err(e) = line.sink.deliver(event) {
            warn!("Failed to deliver to {}: {}", to, e);
            self.dead.push(to.clone());
        }
    }

    fn broadcast_roster(&mut self) {
        let roster: Arc<[RosterEntry]> = self.roster().into();
        for line in &self.lines {
            if let Err(e) = line.sink.deliver(SwitchEvent::Subscribers(roster.clone())) {
                warn!("Failed to deliver roster to {}: {}", line.subscriber.number(), e);
                self.dead.push(line.subscriber.number().clone());
            }
        }
    }

    /// Drop subscribers whose sink failed, then publish gauges.
    fn finish(&mut self) {
        while let Some(number) = self.dead.pop() {
            if self.position(&number).is_some() {
                debug!("Dropping subscriber {} after failed delivery", number);
                self.remove(&number);
            }
        }

        metrics::update_active_calls(self.calls.len());
        metrics::update_registered_subscribers(self.lines.len());
    }
}
