use thiserror::Error;

/// Errors that can occur talking to the control-plane service.
#[derive(Debug, Error)]
pub enum NetError {
    /// The connection was closed by the remote peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// The connection was refused by the remote peer.
    #[error("connection refused")]
    ConnectionRefused,

    /// An operation timed out.
    #[error("timeout")]
    Timeout,

    /// An I/O error from the underlying transport.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The frame exceeds the maximum allowed size.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The payload cannot be framed (embedded delimiter) or the frame is not UTF-8 JSON.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// JSON encoding/decoding of a control-plane document failed.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl NetError {
    /// Map an I/O error, keeping refused connections distinguishable.
    pub fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => NetError::ConnectionClosed,
            std::io::ErrorKind::TimedOut => NetError::Timeout,
            _ => NetError::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_connection_closed() {
        assert_eq!(NetError::ConnectionClosed.to_string(), "connection closed");
    }

    #[test]
    fn test_display_message_too_large() {
        let err = NetError::MessageTooLarge {
            size: 5_000_000,
            max: 4 * 1024 * 1024,
        };
        let s = err.to_string();
        assert!(s.contains("message too large"));
        assert!(s.contains("5000000"));
    }

    #[test]
    fn test_from_io_classification() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "nope");
        assert!(matches!(NetError::from_io(refused), NetError::ConnectionRefused));

        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(NetError::from_io(reset), NetError::ConnectionClosed));

        let other = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = NetError::from_io(other);
        assert!(matches!(err, NetError::Io(_)));
        assert!(err.to_string().contains("denied"));
    }
}
