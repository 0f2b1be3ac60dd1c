//! Error types for the gateway.
//!
//! # Design
//! Transports report failures as a typed `TransportError`, so deciding whether
//! a failure means "the backend host is unreachable" is a pattern match rather
//! than inspecting message strings. A response with any HTTP status is not a
//! transport failure; non-2xx statuses surface as `GatewayError::HttpStatus`
//! with the status and body exactly as received.

use thiserror::Error;

use crate::storage::StorageError;

/// A failure to obtain any HTTP response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The host actively refused the connection.
    #[error("connection refused")]
    ConnectionRefused,

    /// The host name could not be resolved.
    #[error("DNS lookup failed")]
    DnsFailure,

    /// Some other failure while establishing the connection.
    #[error("host unreachable: {0}")]
    Unreachable(String),

    /// The transport failed after connecting, or could not build the request.
    #[error("transport error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// True when no response was obtainable because the host could not be
    /// reached. These are the failures that trigger base endpoint fallback.
    pub fn is_network_unreachable(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout
                | TransportError::ConnectionRefused
                | TransportError::DnsFailure
                | TransportError::Unreachable(_)
        )
    }
}

/// Errors returned to callers of the gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// No response was received.
    #[error("network error: {0}")]
    Network(#[from] TransportError),

    /// The backend answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// A session operation could not read or write the credential store.
    #[error("credential storage: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GatewayError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The backend rejected the session credential.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }

    pub fn is_network(&self) -> bool {
        matches!(self, GatewayError::Network(_))
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
