//! Outbound sinks

use super::event::SwitchEvent;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("Endpoint is gone")]
    Closed,

    #[error("Endpoint is not reading, outbound queue full")]
    Full,
}

/// Where the switch pushes events for one subscriber.
///
/// `deliver` is called while the switch holds its lock, so it must not
/// block. Implementations queue the event and write it elsewhere.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: SwitchEvent) -> Result<(), SinkError>;
}

/// Sink backed by a bounded channel drained by a single writer task.
///
/// When the queue is full the sink raises its overflow signal, so the owning
/// session can hang up on a peer that stopped reading.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<SwitchEvent>,
    overflow: Arc<Notify>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SwitchEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let sink = Self {
            tx,
            overflow: Arc::new(Notify::new()),
        };
        (sink, rx)
    }

    /// Signalled once the queue overflowed
    pub fn overflow(&self) -> Arc<Notify> {
        self.overflow.clone()
    }
}

impl EventSink for ChannelSink {
    fn deliver(&self, event: SwitchEvent) -> Result<(), SinkError> {
        self.tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => {
                self.overflow.notify_one();
                SinkError::Full
            }
            TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}
