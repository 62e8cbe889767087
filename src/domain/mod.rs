//! Domain layer - line states and calls
//!
//! This layer contains:
//! - Entities: subscribers, keyed by their number
//! - Aggregates: calls pairing two subscribers
//! - Value Objects: numbers, call ids, line states

pub mod call;
pub mod shared;
pub mod subscriber;

// Re-export commonly used types
pub use shared::{Result, SwitchError};
