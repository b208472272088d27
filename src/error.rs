// MIT License - Copyright (c) 2026 Peter Wright
// Error types

/// All errors that can occur in the qolsys-iq-client library.
#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("TLS error: {details}")]
    Tls { details: String },

    #[error("No ACK from panel for {command}")]
    AckTimeout { command: String },

    #[error("Not connected to panel")]
    NotConnected,

    #[error("Socket disconnected")]
    Disconnected,

    #[error("Failed to encode action: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Invalid configuration: {details}")]
    InvalidConfig { details: String },
}

impl PanelError {
    /// Whether this error is transient and the connection should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PanelError::Io(_)
                | PanelError::ConnectionTimeout
                | PanelError::AckTimeout { .. }
                | PanelError::NotConnected
                | PanelError::Disconnected
        )
    }
}

pub type Result<T> = std::result::Result<T, PanelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(PanelError::ConnectionTimeout.is_retryable());
        assert!(PanelError::Disconnected.is_retryable());
        assert!(
            PanelError::AckTimeout {
                command: "ARMING".to_string()
            }
            .is_retryable()
        );
        assert!(
            !PanelError::Tls {
                details: "bad certificate".to_string()
            }
            .is_retryable()
        );
        assert!(
            !PanelError::InvalidConfig {
                details: "missing host".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_display() {
        let err = PanelError::AckTimeout {
            command: "heartbeat".to_string(),
        };
        assert_eq!(err.to_string(), "No ACK from panel for heartbeat");
    }
}
