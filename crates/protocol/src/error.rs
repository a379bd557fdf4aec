//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering all possible failure modes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    // Transport errors
    /// Connect, accept, read or write failed at the socket level.
    #[error("transport error: {0}")]
    Transport(String),

    /// Operation timed out.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Connection was closed unexpectedly.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    // Format errors
    /// Frame shorter than the minimum size or unparseable payload.
    #[error("malformed message: {0}")]
    Format(String),

    /// Envelope buffer is shorter than the fixed fields require.
    #[error("frame too short: {size} bytes, minimum is {min} bytes")]
    FrameTooShort {
        /// Actual buffer size.
        size: usize,
        /// Minimum frame size for the receiving key.
        min: usize,
    },

    // Cryptographic errors
    /// Tag verification or key unwrap failed.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Encryption operation failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Invalid or malformed public key.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    // Handshake errors
    /// Public key exchange failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Attempted to use a protected channel before the key exchange finished.
    #[error("handshake incomplete: cannot perform operation before handshake is finished")]
    HandshakeIncomplete,

    // Command errors
    /// Decoded structure carries no recognised command key.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Serial device open, write or read failed.
    #[error("device error: {0}")]
    Device(String),
}

impl ProtocolError {
    /// Returns true for connection-level failures that a dialer retries after a backoff.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProtocolError::Transport(_)
                | ProtocolError::Timeout(_)
                | ProtocolError::ConnectionClosed(_)
        )
    }

    /// Returns true when the peer should get an error notice and the connection stays open.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProtocolError::UnknownCommand(_) | ProtocolError::Device(_)
        )
    }
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

// Conversions from underlying crate errors

impl From<serde_yaml::Error> for ProtocolError {
    fn from(err: serde_yaml::Error) -> Self {
        ProtocolError::Format(err.to_string())
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => ProtocolError::Timeout(err.to_string()),
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => ProtocolError::ConnectionClosed(err.to_string()),
            _ => ProtocolError::Transport(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_display() {
        let err = ProtocolError::Format("not a mapping".to_string());
        assert_eq!(err.to_string(), "malformed message: not a mapping");
    }

    #[test]
    fn test_frame_too_short_display() {
        let err = ProtocolError::FrameTooShort { size: 12, min: 288 };
        assert_eq!(
            err.to_string(),
            "frame too short: 12 bytes, minimum is 288 bytes"
        );
    }

    #[test]
    fn test_authentication_error_display() {
        let err = ProtocolError::Authentication("tag mismatch".to_string());
        assert_eq!(err.to_string(), "authentication failed: tag mismatch");
    }

    #[test]
    fn test_handshake_incomplete_error_display() {
        let err = ProtocolError::HandshakeIncomplete;
        assert_eq!(
            err.to_string(),
            "handshake incomplete: cannot perform operation before handshake is finished"
        );
    }

    #[test]
    fn test_unknown_command_display() {
        let err = ProtocolError::UnknownCommand("msg: REBOOT".to_string());
        assert_eq!(err.to_string(), "unknown command: msg: REBOOT");
    }

    #[test]
    fn test_transport_classification() {
        assert!(ProtocolError::Transport("refused".into()).is_transport());
        assert!(ProtocolError::Timeout("accept".into()).is_transport());
        assert!(ProtocolError::ConnectionClosed("reset".into()).is_transport());
        assert!(!ProtocolError::Authentication("tag".into()).is_transport());
        assert!(!ProtocolError::Format("short".into()).is_transport());
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(ProtocolError::UnknownCommand("x".into()).is_recoverable());
        assert!(ProtocolError::Device("busy".into()).is_recoverable());
        assert!(!ProtocolError::Authentication("tag".into()).is_recoverable());
        assert!(!ProtocolError::Format("yaml".into()).is_recoverable());
        assert!(!ProtocolError::Timeout("read".into()).is_recoverable());
    }

    #[test]
    fn test_from_serde_yaml_error() {
        let yaml_err = serde_yaml::from_str::<Vec<u8>>("{ unclosed").unwrap_err();
        let protocol_err: ProtocolError = yaml_err.into();
        assert!(matches!(protocol_err, ProtocolError::Format(_)));
    }

    #[test]
    fn test_from_io_error_timeout() {
        let io_err = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let protocol_err: ProtocolError = io_err.into();
        assert!(matches!(protocol_err, ProtocolError::Timeout(_)));
    }

    #[test]
    fn test_from_io_error_connection_closed() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let protocol_err: ProtocolError = io_err.into();
        assert!(matches!(protocol_err, ProtocolError::ConnectionClosed(_)));
    }

    #[test]
    fn test_from_io_error_other() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let protocol_err: ProtocolError = io_err.into();
        assert!(matches!(protocol_err, ProtocolError::Transport(_)));
        assert!(protocol_err.is_transport());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProtocolError>();
    }
}
