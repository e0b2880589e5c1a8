// SoleStream - Insole telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Frame sources
//!
//! [`Source`] is the single capability the tick scheduler reads from. It is
//! either the simulated generator or a hardware line reader bound to an
//! opened serial port or wireless socket. Callers never see the concrete
//! transport: they get a [`ReadOutcome`] or a [`ReadError`].
//!
//! Hardware transports are obtained through a [`TransportProvider`], which
//! keeps discovery and opening behind a trait so the engine can run against
//! real ports ([`SystemTransports`]) or in-memory pipes ([`MemoryTransports`]).

mod discovery;
mod hardware;
mod memory;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ReadError;
use crate::frame::{SensorFrame, SourceTag};
use crate::simulator::{SimulationParameters, Simulator};

pub use discovery::{
    connect_hardware, enumerate_serial_ports, matches_device_keywords, ConnectSettings,
    SerialPortInfo, SystemTransports, TransportProvider,
};
pub use hardware::{BoxedTransport, HardwareSource};
pub use memory::MemoryTransports;

/// Hardware transport family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    #[serde(rename = "hardware-serial")]
    Serial,
    #[serde(rename = "hardware-wireless")]
    Wireless,
}

impl TransportKind {
    /// Short name used as `connectionType` on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Serial => "serial",
            TransportKind::Wireless => "wireless",
        }
    }

    /// Name used by connect requests
    pub fn source_kind(&self) -> &'static str {
        match self {
            TransportKind::Serial => "hardware-serial",
            TransportKind::Wireless => "hardware-wireless",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source_kind())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hardware-serial" | "serial" | "usb" => Ok(TransportKind::Serial),
            "hardware-wireless" | "wireless" | "bluetooth" => Ok(TransportKind::Wireless),
            other => Err(format!("unknown source kind: {}", other)),
        }
    }
}

/// A wireless device reachable over a connection-oriented socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirelessPeer {
    /// Advertised device name
    pub name: String,
    /// Socket address (`host:port`)
    pub address: String,
}

impl WirelessPeer {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// Result of one non-failing read
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Frame(SensorFrame),
    /// Nothing ready before the poll timeout
    Empty,
}

/// The active origin of frames
#[derive(Debug)]
pub enum Source {
    Simulated(Simulator),
    Hardware(HardwareSource),
}

impl Source {
    pub fn tag(&self) -> SourceTag {
        match self {
            Source::Simulated(_) => SourceTag::Simulated,
            Source::Hardware(_) => SourceTag::Hardware,
        }
    }

    /// Read the next frame
    ///
    /// The simulated variant never fails and never returns `Empty`; it
    /// consumes `params`, which hardware reads ignore.
    pub async fn read_frame(
        &mut self,
        params: &mut SimulationParameters,
    ) -> Result<ReadOutcome, ReadError> {
        match self {
            Source::Simulated(sim) => Ok(ReadOutcome::Frame(sim.generate(params))),
            Source::Hardware(hw) => hw.read_frame().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transport_kind_parsing() {
        assert_eq!("hardware-serial".parse::<TransportKind>(), Ok(TransportKind::Serial));
        assert_eq!("Bluetooth".parse::<TransportKind>(), Ok(TransportKind::Wireless));
        assert!("carrier-pigeon".parse::<TransportKind>().is_err());
    }

    #[test]
    fn test_transport_kind_wire_names() {
        let json = serde_json::to_string(&TransportKind::Wireless).unwrap();
        assert_eq!(json, "\"hardware-wireless\"");
        assert_eq!(TransportKind::Serial.as_str(), "serial");
    }

    #[tokio::test]
    async fn test_simulated_source_always_produces() {
        let mut source = Source::Simulated(Simulator::new(Duration::from_millis(50), Some(1), 10.0));
        let mut params = SimulationParameters::default();
        for _ in 0..10 {
            match source.read_frame(&mut params).await {
                Ok(ReadOutcome::Frame(frame)) => assert_eq!(frame.source(), SourceTag::Simulated),
                other => panic!("unexpected outcome: {:?}", other),
            }
        }
        assert_eq!(source.tag(), SourceTag::Simulated);
    }
}
