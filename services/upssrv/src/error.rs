//! Error handling for the UPS exporter
//!
//! Per-target failures (`Connect`, `Transport`) never leave the poller; they
//! degrade into an `up 0` measurement. `UnknownFamily` is a startup-time
//! error that stops the process.

use errors::ServiceError;
use thiserror::Error;

/// UPS exporter error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpsSrvError {
    /// A session to the device could not be opened
    #[error("Connect to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    /// A register read failed at the transport level (timeout, malformed reply, ...)
    #[error("Transport error on {address}: {reason}")]
    Transport { address: String, reason: String },

    /// No register map is registered under this family identifier
    #[error("Unknown device family: {0}")]
    UnknownFamily(String),

    /// Exposition encoding errors
    #[error("Encoding error: {0}")]
    Encoding(String),
}

/// Result type alias for the UPS exporter
pub type Result<T> = std::result::Result<T, UpsSrvError>;

impl UpsSrvError {
    pub fn connect(address: impl Into<String>, reason: impl Into<String>) -> Self {
        UpsSrvError::Connect {
            address: address.into(),
            reason: reason.into(),
        }
    }

    pub fn transport(address: impl Into<String>, reason: impl Into<String>) -> Self {
        UpsSrvError::Transport {
            address: address.into(),
            reason: reason.into(),
        }
    }
}

impl From<UpsSrvError> for ServiceError {
    fn from(err: UpsSrvError) -> Self {
        match err {
            UpsSrvError::Connect { address, reason } => ServiceError::ConnectionFailed {
                endpoint: address,
                reason,
            },
            UpsSrvError::Transport { address, reason } => ServiceError::Protocol {
                protocol: "snmp".to_string(),
                message: format!("{}: {}", address, reason),
            },
            UpsSrvError::UnknownFamily(family) => ServiceError::UnknownFamily(family),
            UpsSrvError::Encoding(msg) => ServiceError::Serialization(msg),
        }
    }
}

impl From<prometheus::Error> for UpsSrvError {
    fn from(err: prometheus::Error) -> Self {
        UpsSrvError::Encoding(err.to_string())
    }
}
