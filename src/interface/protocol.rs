//! Line protocol between handsets and the switch
//!
//! One UTF-8 command or event per line. Commands:
//! `CONNECT`, `PICKUP`, `HANGUP`, `DIAL:<number>`, `MESSAGE:<text>`.

use crate::application::event::SwitchEvent;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("malformed command")]
    Malformed,

    #[error("Failed to encode roster: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Label for the rejected-command metric
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolError::UnknownCommand(_) => "unknown_command",
            ProtocolError::Malformed => "malformed",
            ProtocolError::Encode(_) => "encode",
        }
    }
}

/// Command sent by a handset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Connect,
    Pickup,
    Hangup,
    Dial(String),
    Message(String),
}

impl FromStr for ClientCommand {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        match line {
            "CONNECT" => return Ok(ClientCommand::Connect),
            "PICKUP" => return Ok(ClientCommand::Pickup),
            "HANGUP" => return Ok(ClientCommand::Hangup),
            _ => {}
        }

        if let Some(target) = line.strip_prefix("DIAL:") {
            Ok(ClientCommand::Dial(target.trim().to_string()))
        } else if let Some(text) = line.strip_prefix("MESSAGE:") {
            Ok(ClientCommand::Message(text.to_string()))
        } else {
            Err(ProtocolError::UnknownCommand(line.to_string()))
        }
    }
}

/// Decode raw bytes read off the wire into a line
pub fn decode_line(bytes: &[u8]) -> Result<&str, ProtocolError> {
    std::str::from_utf8(bytes).map_err(|_| ProtocolError::Malformed)
}

/// Parse one raw line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<ClientCommand>, ProtocolError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    line.parse().map(Some)
}

/// Render an event as a wire line, without the trailing newline
pub fn encode(event: &SwitchEvent) -> Result<String, ProtocolError> {
    let line = match event {
        SwitchEvent::Assigned(number) => format!("ASSIGNED:{}", number),
        SwitchEvent::State(state) => format!("STATE:{}", state),
        SwitchEvent::Signal(signal) => format!("SIGNAL:{}", signal.as_str()),
        SwitchEvent::IncomingCall(number) => format!("INCOMING_CALL:{}", number),
        SwitchEvent::CallConnected => "CALL_CONNECTED".to_string(),
        SwitchEvent::CallEnded => "CALL_ENDED".to_string(),
        SwitchEvent::Message(text) => format!("MESSAGE:{}", text),
        SwitchEvent::Subscribers(roster) => {
            format!("SUBSCRIBERS:{}", serde_json::to_string(&roster[..])?)
        }
        SwitchEvent::Error(reason) => format!("ERROR:{}", reason),
    };
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::event::{RosterEntry, Signal};
    use crate::domain::shared::value_objects::SubscriberNumber;
    use crate::domain::subscriber::SubscriberState;
    use std::sync::Arc;

    #[test]
    fn test_parse_commands() {
        assert_eq!("CONNECT".parse::<ClientCommand>().unwrap(), ClientCommand::Connect);
        assert_eq!("PICKUP".parse::<ClientCommand>().unwrap(), ClientCommand::Pickup);
        assert_eq!("HANGUP".parse::<ClientCommand>().unwrap(), ClientCommand::Hangup);
        assert_eq!(
            "DIAL:002".parse::<ClientCommand>().unwrap(),
            ClientCommand::Dial("002".to_string())
        );
    }

    #[test]
    fn test_message_payload_keeps_inner_text() {
        // Only the line's outer whitespace goes; colons and inner spaces stay.
        assert_eq!(
            parse_line("MESSAGE:a: b \r").unwrap(),
            Some(ClientCommand::Message("a: b".to_string()))
        );
        assert_eq!(
            parse_line("MESSAGE: x  y").unwrap(),
            Some(ClientCommand::Message(" x  y".to_string()))
        );
        assert_eq!(
            parse_line("MESSAGE:").unwrap(),
            Some(ClientCommand::Message(String::new()))
        );
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        assert_eq!(decode_line(b"PICKUP\n").unwrap(), "PICKUP\n");
        let err = decode_line(b"MESSAGE:\xff\xfe\n").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed));
        assert_eq!(err.to_string(), "malformed command");
    }

    #[test]
    fn test_parse_line_trims_and_skips_blank() {
        assert_eq!(parse_line("PICKUP\r").unwrap(), Some(ClientCommand::Pickup));
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(parse_line("").unwrap(), None);
    }

    #[test]
    fn test_unknown_command() {
        let err = parse_line("pickup").unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCommand(ref line) if line == "pickup"));
        assert_eq!(err.to_string(), "unknown command: pickup");
        assert!(parse_line("DIAL").is_err());
    }

    #[test]
    fn test_encode_events() {
        let number = SubscriberNumber::format(1, 3);
        assert_eq!(encode(&SwitchEvent::Assigned(number.clone())).unwrap(), "ASSIGNED:001");
        assert_eq!(
            encode(&SwitchEvent::State(SubscriberState::InCall)).unwrap(),
            "STATE:InCall"
        );
        assert_eq!(encode(&SwitchEvent::Signal(Signal::Busy)).unwrap(), "SIGNAL:busy");
        assert_eq!(
            encode(&SwitchEvent::IncomingCall(number)).unwrap(),
            "INCOMING_CALL:001"
        );
        assert_eq!(encode(&SwitchEvent::CallEnded).unwrap(), "CALL_ENDED");
        assert_eq!(
            encode(&SwitchEvent::Error("target busy".to_string())).unwrap(),
            "ERROR:target busy"
        );
    }

    #[test]
    fn test_encode_roster() {
        let roster: Arc<[RosterEntry]> = vec![
            RosterEntry {
                number: SubscriberNumber::format(1, 3),
                state: SubscriberState::Ready,
            },
            RosterEntry {
                number: SubscriberNumber::format(2, 3),
                state: SubscriberState::Idle,
            },
        ]
        .into();
        assert_eq!(
            encode(&SwitchEvent::Subscribers(roster)).unwrap(),
            r#"SUBSCRIBERS:[{"number":"001","state":"Ready"},{"number":"002","state":"Idle"}]"#
        );
    }
}
