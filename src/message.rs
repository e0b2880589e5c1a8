// SoleStream - Insole telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Subscriber-facing wire messages
//!
//! Everything a subscriber receives is JSON with camelCase keys. Two shapes
//! are pushed on the stream:
//!
//! ```text
//! telemetry: {sensors, timestamp, pattern, connection, simulationMode,
//!             testMode, testSensor, analytics}
//! status:    {simulationMode, connectionType, deviceName, fallbackReason?}
//! ```
//!
//! A published message is serialized once and shared by every subscriber
//! through a [`SharedEnvelope`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analytics::Analytics;
use crate::error::{ControlError, TelemetryError};
use crate::layout::SENSOR_COUNT;
use crate::simulator::GaitPattern;

/// One frame plus its analytics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryMessage {
    pub sensors: [f64; SENSOR_COUNT],
    pub timestamp: f64,
    pub pattern: GaitPattern,
    /// Transport name while connected to hardware
    pub connection: Option<String>,
    pub simulation_mode: bool,
    pub test_mode: bool,
    /// Index of the tested sensor, `-1` when no test runs
    pub test_sensor: i32,
    pub analytics: Analytics,
}

/// Connection state change notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    pub simulation_mode: bool,
    pub connection_type: Option<String>,
    pub device_name: Option<String>,
    /// Set only when hardware was dropped because of a read failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl StatusMessage {
    pub fn simulated() -> Self {
        Self {
            simulation_mode: true,
            connection_type: None,
            device_name: None,
            fallback_reason: None,
        }
    }

    pub fn with_fallback_reason(mut self, reason: impl Into<String>) -> Self {
        self.fallback_reason = Some(reason.into());
        self
    }
}

/// Any message pushed to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Telemetry(Box<TelemetryMessage>),
    Status(StatusMessage),
}

/// A message and its serialized form
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub message: OutboundMessage,
    pub json: String,
}

/// Envelope shared by all recipients of one publish
pub type SharedEnvelope = Arc<Envelope>;

impl Envelope {
    /// Serialize a message once for fan-out
    pub fn encode(message: OutboundMessage) -> serde_json::Result<SharedEnvelope> {
        let json = serde_json::to_string(&message)?;
        Ok(Arc::new(Envelope { message, json }))
    }

    pub fn telemetry(&self) -> Option<&TelemetryMessage> {
        match &self.message {
            OutboundMessage::Telemetry(t) => Some(t),
            OutboundMessage::Status(_) => None,
        }
    }

    pub fn status(&self) -> Option<&StatusMessage> {
        match &self.message {
            OutboundMessage::Status(s) => Some(s),
            OutboundMessage::Telemetry(_) => None,
        }
    }
}

/// Simulation control request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ControlCommand {
    Pattern { pattern: String },
    Play,
    Pause,
    Stop,
    Clear,
    TestSensor {
        #[serde(alias = "index")]
        sensor: usize,
    },
}

impl ControlCommand {
    pub fn pattern(pattern: GaitPattern) -> Self {
        ControlCommand::Pattern {
            pattern: pattern.as_str().to_string(),
        }
    }

    /// Parse a JSON control request
    pub fn from_json(text: &str) -> Result<Self, ControlError> {
        serde_json::from_str(text).map_err(|e| ControlError::InvalidControl(e.to_string()))
    }

    pub fn action(&self) -> &'static str {
        match self {
            ControlCommand::Pattern { .. } => "pattern",
            ControlCommand::Play => "play",
            ControlCommand::Pause => "pause",
            ControlCommand::Stop => "stop",
            ControlCommand::Clear => "clear",
            ControlCommand::TestSensor { .. } => "testSensor",
        }
    }
}

/// Result of a connect request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    /// `connected` or `error`
    pub status: String,
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ConnectResponse {
    pub fn connected(device: impl Into<String>) -> Self {
        Self {
            status: "connected".to_string(),
            device: Some(device.into()),
            error_kind: None,
            message: None,
        }
    }

    pub fn error(err: &TelemetryError) -> Self {
        Self {
            status: "error".to_string(),
            device: None,
            error_kind: Some(err.kind().to_string()),
            message: Some(err.to_string()),
        }
    }

    pub fn from_result(result: &Result<String, TelemetryError>) -> Self {
        match result {
            Ok(device) => Self::connected(device.as_str()),
            Err(e) => Self::error(e),
        }
    }
}

/// Result of a disconnect request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectResponse {
    pub status: String,
}

impl Default for DisconnectResponse {
    fn default() -> Self {
        Self {
            status: "disconnected".to_string(),
        }
    }
}

/// Result of a control request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ControlResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            error_kind: None,
            message: None,
        }
    }

    pub fn from_result(result: &Result<(), TelemetryError>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(e) => Self {
                status: "error".to_string(),
                error_kind: Some(e.kind().to_string()),
                message: Some(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectError;
    use serde_json::{json, Value};

    #[test]
    fn test_status_shape() {
        let json = serde_json::to_value(StatusMessage::simulated()).unwrap();
        assert_eq!(
            json,
            json!({"simulationMode": true, "connectionType": null, "deviceName": null})
        );

        let with_reason = StatusMessage::simulated().with_fallback_reason("transport closed");
        let json = serde_json::to_value(with_reason).unwrap();
        assert_eq!(json["fallbackReason"], "transport closed");
    }

    #[test]
    fn test_telemetry_shape() {
        let message = TelemetryMessage {
            sensors: [2.0; SENSOR_COUNT],
            timestamp: 1_700_000_000.5,
            pattern: GaitPattern::Walking,
            connection: None,
            simulation_mode: true,
            test_mode: false,
            test_sensor: -1,
            analytics: Analytics::from_forces([0.0; SENSOR_COUNT]),
        };
        let envelope = Envelope::encode(OutboundMessage::Telemetry(Box::new(message))).unwrap();
        let json: Value = serde_json::from_str(&envelope.json).unwrap();

        assert_eq!(json["sensors"].as_array().unwrap().len(), 8);
        assert_eq!(json["pattern"], "walking");
        assert!(json["connection"].is_null());
        assert_eq!(json["simulationMode"], true);
        assert_eq!(json["testMode"], false);
        assert_eq!(json["testSensor"], -1);
        assert_eq!(json["analytics"]["gaitPhase"], "Swing");
        assert!(envelope.telemetry().is_some());
        assert!(envelope.status().is_none());
    }

    #[test]
    fn test_control_parsing() {
        assert_eq!(
            ControlCommand::from_json(r#"{"action":"pattern","pattern":"running"}"#).unwrap(),
            ControlCommand::pattern(GaitPattern::Running)
        );
        assert_eq!(
            ControlCommand::from_json(r#"{"action":"testSensor","index":3}"#).unwrap(),
            ControlCommand::TestSensor { sensor: 3 }
        );
        assert_eq!(
            ControlCommand::from_json(r#"{"action":"pause"}"#).unwrap(),
            ControlCommand::Pause
        );
        assert!(matches!(
            ControlCommand::from_json(r#"{"action":"dance"}"#),
            Err(ControlError::InvalidControl(_))
        ));
    }

    #[test]
    fn test_connect_response() {
        let ok = ConnectResponse::from_result(&Ok("/dev/ttyUSB0".to_string()));
        assert_eq!(ok.status, "connected");
        assert_eq!(ok.device.as_deref(), Some("/dev/ttyUSB0"));

        let err: TelemetryError = ConnectError::NoDeviceFound {
            kind: "hardware-serial".into(),
        }
        .into();
        let json = serde_json::to_value(ConnectResponse::error(&err)).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["errorKind"], "NoDeviceFound");
    }
}
