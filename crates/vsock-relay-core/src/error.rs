//! Error types for the vsock relay

use thiserror::Error;

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Relay error types
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Socket could not be created
    #[error("socket: {0}")]
    Socket(String),

    /// Endpoint could not be bound (e.g. port already in use)
    #[error("bind: {0}")]
    Bind(String),

    /// Endpoint could not enter listening mode
    #[error("listen: {0}")]
    Listen(String),

    /// Accepting the guest connection failed
    #[error("accept: {0}")]
    Accept(String),

    /// Guest launch or shutdown action failed
    #[error("Orchestration error: {0}")]
    Orchestration(String),

    /// Send/receive failure on the relayed stream
    #[error("Relay error: {0}")]
    Relay(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport not available on this platform
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl BridgeError {
    /// Whether this error belongs to the fatal setup class
    /// (socket, bind, listen, accept).
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            BridgeError::Socket(_)
                | BridgeError::Bind(_)
                | BridgeError::Listen(_)
                | BridgeError::Accept(_)
        )
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_classification() {
        assert!(BridgeError::Bind("Address in use".into()).is_setup());
        assert!(BridgeError::Accept("EINVAL".into()).is_setup());
        assert!(!BridgeError::Relay("EPIPE".into()).is_setup());
        assert!(!BridgeError::Orchestration("exit 255".into()).is_setup());
    }

    #[test]
    fn test_display_names_stage() {
        let err = BridgeError::Bind("Address already in use".into());
        assert_eq!(err.to_string(), "bind: Address already in use");
    }

    #[test]
    fn test_from_serde_json() {
        let err: BridgeError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, BridgeError::Config(_)));
    }
}
