//! # Modem Error Handling
//!
//! This module defines the ModemError enum, which represents the different error
//! types that can occur in the modem-rs crate.

use thiserror::Error;

/// Represents the different error types that can occur in the modem crate.
#[derive(Debug, Error)]
pub enum ModemError {
    /// The requested port is not present in the connection registry.
    #[error("Port not connected: {0}")]
    NotConnected(String),

    /// No terminator arrived before the deadline. Carries whatever partial
    /// response was read, which may be empty.
    #[error("Timeout waiting for modem response (partial: {0:?})")]
    Timeout(String),

    /// Write or read failure on the underlying byte stream, including a
    /// transport that was closed while a transaction was pending.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Malformed PDU field.
    #[error("PDU codec error in {field}: {reason}")]
    CodecError { field: &'static str, reason: String },

    /// The device answered a command with `ERROR`, `+CME ERROR` or `+CMS ERROR`.
    #[error("Modem replied with error: {0}")]
    ProtocolError(String),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A catch‑all error for uncategorized cases.
    #[error("Other error: {0}")]
    Other(String),
}

impl ModemError {
    /// Shorthand for a [`ModemError::CodecError`] on `field`.
    pub fn codec(field: &'static str, reason: impl Into<String>) -> Self {
        ModemError::CodecError {
            field,
            reason: reason.into(),
        }
    }

    /// Returns true for errors raised by the transport or its deadline, as
    /// opposed to errors in the data exchanged over it.
    pub fn is_transport(&self) -> bool {
        matches!(self, ModemError::Timeout(_) | ModemError::TransportError(_))
    }
}

impl From<std::io::Error> for ModemError {
    fn from(err: std::io::Error) -> Self {
        ModemError::TransportError(err.to_string())
    }
}

impl From<tokio_serial::Error> for ModemError {
    fn from(err: tokio_serial::Error) -> Self {
        ModemError::TransportError(err.to_string())
    }
}
