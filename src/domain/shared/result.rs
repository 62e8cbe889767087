//! Switch result type

use super::error::SwitchError;

/// Standard result type for switch operations
pub type Result<T> = std::result::Result<T, SwitchError>;
