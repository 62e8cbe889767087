//! Switch errors

use thiserror::Error;

/// A rejected command.
///
/// The `Display` text is the reason sent back to the issuing endpoint as
/// `ERROR:<reason>`, so keep it short and stable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwitchError {
    #[error("invalid state")]
    InvalidState,

    #[error("target not found")]
    TargetNotFound(String),

    #[error("target busy")]
    TargetBusy(String),

    #[error("no free line")]
    NoFreeLine,

    #[error("not registered")]
    NotRegistered,

    #[error("already registered")]
    AlreadyRegistered,
}

impl SwitchError {
    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            SwitchError::InvalidState => "invalid_state",
            SwitchError::TargetNotFound(_) => "target_not_found",
            SwitchError::TargetBusy(_) => "target_busy",
            SwitchError::NoFreeLine => "no_free_line",
            SwitchError::NotRegistered => "not_registered",
            SwitchError::AlreadyRegistered => "already_registered",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_reasons() {
        assert_eq!(SwitchError::InvalidState.to_string(), "invalid state");
        assert_eq!(
            SwitchError::TargetNotFound("002".to_string()).to_string(),
            "target not found"
        );
        assert_eq!(SwitchError::NoFreeLine.to_string(), "no free line");
    }
}
