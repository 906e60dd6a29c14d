//! Error types for the remote converter client.

/// Error type for configuring the client and running conversion jobs.
///
/// Configuration and illegal-state errors are returned synchronously to the
/// caller. Everything else is reported through the affected job's
/// [`JobHandle`](crate::engine::JobHandle) only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConverterError {
    /// Invalid or missing builder input.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The remote call failed: connection refused, timeout, malformed response.
    #[error("Network error: {0}")]
    Network(String),

    /// The conversion server answered with an unexpected HTTP status.
    #[error("Conversion server responded with HTTP {status}: {message}")]
    Server { status: u16, message: String },

    /// Server and client speak different protocol versions. Never fatal.
    #[error("Server protocol version ({server}) does not match client protocol version ({client})")]
    ProtocolMismatch { server: u32, client: u32 },

    /// Operation attempted after the converter was shut down.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// The job was cancelled before it produced a result.
    #[error("Conversion job was cancelled")]
    Cancelled,

    /// The document source could not be read.
    #[error("Failed to read document source: {0}")]
    Source(String),

    /// The result consumer failed to accept the converted document.
    #[error("Result consumer failed: {0}")]
    Consumer(String),
}

impl ConverterError {
    /// Create a new Configuration error.
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a new Network error.
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Create a new IllegalState error.
    pub fn illegal_state<S: Into<String>>(msg: S) -> Self {
        Self::IllegalState(msg.into())
    }

    /// Returns true for errors that a caller may resolve by retrying later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ConverterError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Network(format!("request timed out: {}", e))
        } else if e.is_connect() {
            Self::Network(format!("connection failed: {}", e))
        } else if e.is_decode() {
            Self::Network(format!("malformed response: {}", e))
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Result type alias using [`ConverterError`].
pub type Result<T> = std::result::Result<T, ConverterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConverterError::configuration("The base URI was not set");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: The base URI was not set"
        );

        let err = ConverterError::ProtocolMismatch { server: 2, client: 1 };
        assert_eq!(
            err.to_string(),
            "Server protocol version (2) does not match client protocol version (1)"
        );
    }

    #[test]
    fn test_transient_errors() {
        assert!(ConverterError::network("connection refused").is_transient());
        assert!(ConverterError::Server {
            status: 503,
            message: "busy".to_string()
        }
        .is_transient());
        assert!(!ConverterError::Server {
            status: 400,
            message: "bad request".to_string()
        }
        .is_transient());
        assert!(!ConverterError::Cancelled.is_transient());
    }
}
