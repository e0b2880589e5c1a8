// SoleStream - Insole telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Connection state machine
//!
//! Decides which source is active and whether simulation controls apply.
//!
//! ```text
//!             begin_connect              complete_connect
//! Simulated ───────────────▶ Connecting ─────────────────▶ Connected
//!     ▲                          │ abort_connect               │
//!     │                          ▼                             │
//!     │                  (previous state)                      │
//!     │      complete_disconnect          begin_disconnect     │
//!     └───────────────────── Disconnecting ◀───────────────────┘
//!     ▲                                                        │
//!     └──────────────── report_source_failure ─────────────────┘
//! ```
//!
//! At most one transition is in flight: while `Connecting` or
//! `Disconnecting`, new connect/disconnect requests must wait.

use log::{info, warn};
use serde::Serialize;

use crate::error::ControlError;
use crate::message::StatusMessage;
use crate::source::TransportKind;

/// Current connection state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ConnectionState {
    /// The simulated generator is active
    #[default]
    Simulated,
    /// A connect request is discovering and probing a device
    Connecting { kind: TransportKind },
    /// A hardware source is active
    Connected { kind: TransportKind, device: String },
    /// The hardware transport is being released
    Disconnecting,
}

impl ConnectionState {
    pub fn is_simulated(&self) -> bool {
        matches!(self, Self::Simulated)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// A transition is in flight
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting { .. } | Self::Disconnecting)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Simulated => "simulated",
            Self::Connecting { .. } => "connecting",
            Self::Connected { .. } => "connected",
            Self::Disconnecting => "disconnecting",
        }
    }
}

/// Owner of [`ConnectionState`]
#[derive(Debug, Default)]
pub struct ConnectionMachine {
    state: ConnectionState,
    /// State to restore if the in-flight connect fails
    restore: Option<ConnectionState>,
}

impl ConnectionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Enter `Connecting`
    ///
    /// Returns `false` if another transition is already in flight.
    pub fn begin_connect(&mut self, kind: TransportKind) -> bool {
        if self.state.is_transitioning() {
            return false;
        }
        let previous = std::mem::replace(&mut self.state, ConnectionState::Connecting { kind });
        self.restore = Some(previous);
        info!("connecting to {} source", kind);
        true
    }

    /// Finish a successful connect
    pub fn complete_connect(&mut self, device: impl Into<String>) {
        if let ConnectionState::Connecting { kind } = self.state {
            let device = device.into();
            info!("connected to {} device {}", kind, device);
            self.state = ConnectionState::Connected { kind, device };
            self.restore = None;
        }
    }

    /// Abandon a failed connect and restore the state it started from
    pub fn abort_connect(&mut self) {
        if matches!(self.state, ConnectionState::Connecting { .. }) {
            self.state = self.restore.take().unwrap_or_default();
            info!("connect aborted, staying {}", self.state.name());
        }
    }

    /// Enter `Disconnecting`
    ///
    /// Returns `false` when there is nothing to disconnect.
    pub fn begin_disconnect(&mut self) -> bool {
        match self.state {
            ConnectionState::Connected { .. } => {
                self.state = ConnectionState::Disconnecting;
                true
            }
            _ => false,
        }
    }

    pub fn complete_disconnect(&mut self) {
        if self.state == ConnectionState::Disconnecting {
            info!("disconnected, simulation resumed");
            self.state = ConnectionState::Simulated;
        }
    }

    /// Record that the active hardware source failed
    ///
    /// Returns `true` if a hardware source was actually lost. A failure while
    /// a new connect is in flight makes that connect fall back to simulation
    /// should it fail.
    pub fn report_source_failure(&mut self, reason: &str) -> bool {
        let lost = match &self.state {
            ConnectionState::Connected { .. } | ConnectionState::Disconnecting => {
                self.state = ConnectionState::Simulated;
                true
            }
            ConnectionState::Connecting { .. } => {
                let was_connected = matches!(self.restore, Some(ConnectionState::Connected { .. }));
                self.restore = Some(ConnectionState::Simulated);
                was_connected
            }
            ConnectionState::Simulated => false,
        };
        if lost {
            warn!("hardware source failed ({}), falling back to simulation", reason);
        }
        lost
    }

    /// Simulation controls only apply to the simulated source
    pub fn ensure_simulation_controls(&self) -> Result<(), ControlError> {
        if self.state.is_simulated() {
            Ok(())
        } else {
            Err(ControlError::SimulationControlsDisabled)
        }
    }

    /// Status message describing the current state
    pub fn status(&self) -> StatusMessage {
        match &self.state {
            ConnectionState::Connected { kind, device } => StatusMessage {
                simulation_mode: false,
                connection_type: Some(kind.as_str().to_string()),
                device_name: Some(device.clone()),
                fallback_reason: None,
            },
            _ => StatusMessage::simulated(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> ConnectionMachine {
        let mut machine = ConnectionMachine::new();
        assert!(machine.begin_connect(TransportKind::Serial));
        machine.complete_connect("/dev/ttyUSB0");
        machine
    }

    #[test]
    fn test_initial_state() {
        let machine = ConnectionMachine::new();
        assert!(machine.state().is_simulated());
        assert!(machine.ensure_simulation_controls().is_ok());
        assert_eq!(machine.status(), StatusMessage::simulated());
    }

    #[test]
    fn test_connect_success() {
        let machine = connected();
        assert_eq!(
            machine.state(),
            &ConnectionState::Connected {
                kind: TransportKind::Serial,
                device: "/dev/ttyUSB0".into()
            }
        );
        let status = machine.status();
        assert!(!status.simulation_mode);
        assert_eq!(status.connection_type.as_deref(), Some("serial"));
        assert_eq!(status.device_name.as_deref(), Some("/dev/ttyUSB0"));
    }

    #[test]
    fn test_one_transition_at_a_time() {
        let mut machine = ConnectionMachine::new();
        assert!(machine.begin_connect(TransportKind::Wireless));
        assert!(!machine.begin_connect(TransportKind::Serial));
        assert!(!machine.begin_disconnect());
        assert!(machine.state().is_transitioning());
    }

    #[test]
    fn test_abort_restores_previous_state() {
        let mut machine = ConnectionMachine::new();
        machine.begin_connect(TransportKind::Serial);
        machine.abort_connect();
        assert!(machine.state().is_simulated());

        let mut machine = connected();
        machine.begin_connect(TransportKind::Wireless);
        machine.abort_connect();
        assert!(machine.state().is_connected());
    }

    #[test]
    fn test_controls_rejected_unless_simulated() {
        let machine = connected();
        assert_eq!(
            machine.ensure_simulation_controls(),
            Err(ControlError::SimulationControlsDisabled)
        );

        let mut machine = ConnectionMachine::new();
        machine.begin_connect(TransportKind::Serial);
        assert!(machine.ensure_simulation_controls().is_err());
    }

    #[test]
    fn test_disconnect() {
        let mut machine = ConnectionMachine::new();
        assert!(!machine.begin_disconnect());

        let mut machine = connected();
        assert!(machine.begin_disconnect());
        assert_eq!(machine.state(), &ConnectionState::Disconnecting);
        machine.complete_disconnect();
        assert!(machine.state().is_simulated());
    }

    #[test]
    fn test_source_failure_falls_back() {
        let mut machine = connected();
        assert!(machine.report_source_failure("transport closed"));
        assert!(machine.state().is_simulated());

        // Already simulated: nothing lost
        assert!(!machine.report_source_failure("again"));
    }

    #[test]
    fn test_source_failure_during_reconnect() {
        let mut machine = connected();
        machine.begin_connect(TransportKind::Wireless);
        assert!(machine.report_source_failure("unplugged"));
        machine.abort_connect();
        assert!(machine.state().is_simulated());
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_value(ConnectionState::Connected {
            kind: TransportKind::Wireless,
            device: "Insole-L".into(),
        })
        .unwrap();
        assert_eq!(json["state"], "connected");
        assert_eq!(json["kind"], "hardware-wireless");
        assert_eq!(json["device"], "Insole-L");
    }
}
