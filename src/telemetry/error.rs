//! Error definitions for the telemetry connection

use super::property_codec::PropertyType;
use thiserror::Error;

/// Errors raised while talking to the property server
///
/// None of these reach a hardware callback: connection faults are retried by
/// the reconnect loop and protocol errors only drop the offending line.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Socket level failure (refused, reset, broken pipe)
    #[error("Connection error: {0}")]
    ConnectionError(#[from] std::io::Error),

    /// The TCP connect did not complete in time
    #[error("Connect timed out after {0}ms")]
    ConnectTimeout(u64),

    /// The server did not greet us with the expected banner
    #[error("Handshake failed: {0}")]
    HandshakeError(String),

    /// The server closed the stream
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// A line from the server did not follow the property grammar
    #[error("Malformed property line: {0}")]
    ProtocolParseError(String),

    /// The type field of a property line is not one we know
    #[error("Unknown property type: {0}")]
    UnknownPropertyType(String),

    /// The value could not be decoded as its declared type
    #[error("Invalid {property_type} value: {value}")]
    InvalidValue {
        property_type: PropertyType,
        value: String,
    },
}
