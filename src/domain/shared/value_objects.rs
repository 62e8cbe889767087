//! Shared value objects used across the exchange

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Call identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(Uuid);

impl CallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscriber (phone) number
///
/// Zero-padded decimal rendering of a registration sequence number. Numbers
/// wider than the configured width are kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberNumber(String);

impl SubscriberNumber {
    pub fn format(sequence: u64, width: usize) -> Self {
        Self(format!("{:0width$}", sequence, width = width))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriberNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for SubscriberNumber {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for SubscriberNumber {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
