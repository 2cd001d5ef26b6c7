//! Error types for connection lifecycle management.

use std::io;
use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for session operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during network communication.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Establishing the native resource failed.
    #[error("Failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: Box<Error>,
    },

    /// Releasing the native resource failed. The handle is disconnected regardless.
    #[error("Failed to release connection: {source}")]
    Disconnect {
        #[source]
        source: Box<Error>,
    },

    /// The resource behind a connected handle did not answer.
    #[error("Liveness check failed: {source}")]
    Liveness {
        #[source]
        source: Box<Error>,
    },

    /// Operation requires a connected handle.
    #[error("Not connected")]
    NotConnected,

    /// Process memory could not be read.
    #[error("Memory measurement failed: {message}")]
    Measurement { message: String },

    /// Statement execution failed.
    #[error("Query failed: {message}")]
    Query { message: String },

    /// Row fetch failed.
    #[error("Fetch failed: {message}")]
    Fetch { message: String },

    /// Invalid configuration value.
    #[error("Invalid configuration for {key}: {message}")]
    Config { key: String, message: String },

    /// Connection refused by the listener.
    #[error("Connection refused: {message}")]
    ConnectionRefused { message: String },

    /// Invalid service name.
    #[error("Invalid service name: {service_name}")]
    InvalidServiceName { service_name: String },

    /// Invalid SID.
    #[error("Invalid SID: {sid}")]
    InvalidSid { sid: String },

    /// Server version not supported.
    #[error("Server version not supported (minimum required: {min_version})")]
    ServerVersionNotSupported { min_version: u16 },

    /// Protocol error.
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Unexpected packet type received.
    #[error("Unexpected packet type: expected {expected}, got {actual}")]
    UnexpectedPacketType { expected: u8, actual: u8 },

    /// Connection closed by the peer.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Invalid connect string.
    #[error("Invalid connect string: {message}")]
    InvalidConnectString { message: String },

    /// Connection timed out during DNS resolution or TCP connect.
    #[error("Connection to {host}:{port} timed out after {timeout:?}")]
    ConnectionTimeout {
        host: String,
        port: u16,
        timeout: std::time::Duration,
    },

    /// DNS resolution failed.
    #[error("Failed to resolve hostname '{hostname}': {message}")]
    DnsResolutionFailed { hostname: String, message: String },
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connect,
    Disconnect,
    Liveness,
    Measurement,
    Query,
    Fetch,
    Config,
    Protocol,
}

impl Error {
    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a query error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Create a fetch error.
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch {
            message: message.into(),
        }
    }

    /// Create a measurement error.
    pub fn measurement(message: impl Into<String>) -> Self {
        Self::Measurement {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            message: message.into(),
        }
    }

    pub(crate) fn connect(target: impl Into<String>, source: Error) -> Self {
        Self::Connect {
            target: target.into(),
            source: Box::new(source),
        }
    }

    pub(crate) fn disconnect(source: Error) -> Self {
        Self::Disconnect {
            source: Box::new(source),
        }
    }

    pub(crate) fn liveness(source: Error) -> Self {
        Self::Liveness {
            source: Box::new(source),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connect { .. }
            | Error::ConnectionRefused { .. }
            | Error::InvalidServiceName { .. }
            | Error::InvalidSid { .. }
            | Error::ConnectionTimeout { .. }
            | Error::DnsResolutionFailed { .. } => ErrorKind::Connect,
            Error::Disconnect { .. } => ErrorKind::Disconnect,
            Error::Liveness { .. } | Error::NotConnected | Error::ConnectionClosed => {
                ErrorKind::Liveness
            }
            Error::Measurement { .. } => ErrorKind::Measurement,
            Error::Query { .. } => ErrorKind::Query,
            Error::Fetch { .. } => ErrorKind::Fetch,
            Error::Config { .. } | Error::InvalidConnectString { .. } => ErrorKind::Config,
            Error::Io(_)
            | Error::Protocol { .. }
            | Error::UnexpectedPacketType { .. }
            | Error::ServerVersionNotSupported { .. } => ErrorKind::Protocol,
        }
    }

    /// The innermost error, looking through the lifecycle wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Connect { source, .. }
            | Error::Disconnect { source }
            | Error::Liveness { source } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_carries_native_message() {
        let err = Error::connect(
            "localhost:1521/ORCL",
            Error::ConnectionRefused {
                message: "(ERR=12541)".to_string(),
            },
        );
        assert_eq!(err.kind(), ErrorKind::Connect);
        assert_eq!(
            err.to_string(),
            "Failed to connect to localhost:1521/ORCL: Connection refused: (ERR=12541)"
        );
        assert!(matches!(err.root(), Error::ConnectionRefused { .. }));
    }

    #[test]
    fn test_kind_of_wrapped_io_error() {
        let io = io::Error::new(io::ErrorKind::BrokenPipe, "pipe");
        assert_eq!(Error::from(io).kind(), ErrorKind::Protocol);

        let io = io::Error::new(io::ErrorKind::BrokenPipe, "pipe");
        let err = Error::liveness(Error::from(io));
        assert_eq!(err.kind(), ErrorKind::Liveness);
        assert!(matches!(err.root(), Error::Io(_)));
    }
}
