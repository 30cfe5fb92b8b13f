//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to the monitor
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Echo mismatch: sent {sent:?}, received {received:?}")]
    EchoMismatch { sent: Vec<u8>, received: Vec<u8> },

    #[error("Line acknowledgment mismatch: received {received:?}")]
    AckViolation { received: Vec<u8> },

    #[error("No prompt within the wait budget")]
    PromptTimeout,

    #[error("Command failed after {attempts} attempts")]
    RetryExhausted { attempts: u32 },

    #[error("Cancelled by operator")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether this error only invalidates the current attempt and the
    /// command may be retried after a resync
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProtocolError::EchoMismatch { .. } | ProtocolError::AckViolation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let echo = ProtocolError::EchoMismatch {
            sent: b"rw".to_vec(),
            received: b"rx".to_vec(),
        };
        assert!(echo.is_transient());
        assert!(ProtocolError::AckViolation { received: vec![] }.is_transient());
        assert!(!ProtocolError::Cancelled.is_transient());
        assert!(!ProtocolError::PromptTimeout.is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = ProtocolError::RetryExhausted { attempts: 3 };
        assert_eq!(err.to_string(), "Command failed after 3 attempts");
    }
}
