//! Shared kernel - Common types used across the exchange

pub mod error;
pub mod result;
pub mod value_objects;

pub use error::SwitchError;
pub use result::Result;
pub use value_objects::*;
