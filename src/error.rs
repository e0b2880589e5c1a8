//! Error types for SoleStream
//!
//! This module defines all error types used throughout the engine. None of
//! them is fatal to the tick loop: read errors trigger a fallback to the
//! simulated source, connect and control errors are returned to the caller.

use thiserror::Error;

/// Result type alias for SoleStream operations
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Main error type for SoleStream operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TelemetryError {
    /// Opening a hardware source failed
    #[error("Connect error: {0}")]
    Connect(#[from] ConnectError),

    /// Reading from a hardware source failed
    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    /// A simulation control command was rejected
    #[error("Control error: {0}")]
    Control(#[from] ControlError),

    /// Invalid engine configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The engine task is no longer running
    #[error("Engine stopped")]
    EngineStopped,
}

impl TelemetryError {
    /// Stable identifier reported as `errorKind` on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect(e) => e.kind(),
            Self::Read(e) => e.kind(),
            Self::Control(e) => e.kind(),
            Self::Config(_) => "InvalidConfig",
            Self::EngineStopped => "EngineStopped",
        }
    }
}

/// Errors while discovering, opening or probing a hardware source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectError {
    /// Discovery returned no matching device
    #[error("No {kind} device found")]
    NoDeviceFound { kind: String },

    /// The transport opened but never produced a valid record
    #[error("Handshake with {device} failed: {reason}")]
    HandshakeFailed { device: String, reason: String },

    /// The platform transport layer refused to open or enumerate
    #[error("Transport error on {device}: {reason}")]
    Transport { device: String, reason: String },

    /// The requested source kind is not a hardware transport
    #[error("Unsupported source kind {kind:?}")]
    UnsupportedKind { kind: String },
}

impl ConnectError {
    /// Stable identifier reported as `errorKind` on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoDeviceFound { .. } => "NoDeviceFound",
            Self::HandshakeFailed { .. } => "HandshakeFailed",
            Self::Transport { .. } => "TransportError",
            Self::UnsupportedKind { .. } => "UnsupportedKind",
        }
    }
}

/// Errors while reading one record from an open hardware source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadError {
    /// The record did not parse to exactly eight numbers
    #[error("Malformed record {record:?}: {reason}")]
    Malformed { record: String, reason: String },

    /// The peer closed the transport
    #[error("Transport closed")]
    TransportClosed,

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(String),
}

impl ReadError {
    /// Stable identifier reported as `errorKind` on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed { .. } => "Malformed",
            Self::TransportClosed => "TransportClosed",
            Self::Io(_) => "IoError",
        }
    }
}

impl From<std::io::Error> for ReadError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted => Self::TransportClosed,
            _ => Self::Io(err.to_string()),
        }
    }
}

/// Rejections of simulation control commands
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControlError {
    /// Simulation controls only apply while the simulated source is active
    #[error("Simulation controls are disabled while a hardware source is active")]
    SimulationControlsDisabled,

    /// Unknown pattern, sensor index out of range, ...
    #[error("Invalid control: {0}")]
    InvalidControl(String),
}

impl ControlError {
    /// Stable identifier reported as `errorKind` on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SimulationControlsDisabled => "SimulationControlsDisabled",
            Self::InvalidControl(_) => "InvalidControl",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelemetryError::Connect(ConnectError::HandshakeFailed {
            device: "/dev/ttyUSB0".to_string(),
            reason: "no record within 3000ms".to_string(),
        });
        let msg = format!("{}", err);
        assert!(msg.contains("Handshake"));
        assert!(msg.contains("/dev/ttyUSB0"));
    }

    #[test]
    fn test_error_conversion() {
        let control_err = ControlError::SimulationControlsDisabled;
        let err: TelemetryError = control_err.into();
        assert!(matches!(err, TelemetryError::Control(_)));
        assert_eq!(err.kind(), "SimulationControlsDisabled");
    }

    #[test]
    fn test_error_kinds() {
        let no_device: TelemetryError = ConnectError::NoDeviceFound {
            kind: "serial".to_string(),
        }
        .into();
        assert_eq!(no_device.kind(), "NoDeviceFound");
        let unsupported = ConnectError::UnsupportedKind {
            kind: "zigbee".to_string(),
        };
        assert_eq!(unsupported.kind(), "UnsupportedKind");
        assert!(unsupported.to_string().contains("zigbee"));
        assert_eq!(ReadError::TransportClosed.kind(), "TransportClosed");
        assert_eq!(TelemetryError::EngineStopped.kind(), "EngineStopped");
    }

    #[test]
    fn test_io_error_mapping() {
        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert_eq!(ReadError::from(eof), ReadError::TransportClosed);

        let other = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert!(matches!(ReadError::from(other), ReadError::Io(_)));
    }
}
