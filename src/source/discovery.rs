// SoleStream - Insole telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Hardware discovery and connection
//!
//! Discovery enumerates candidate devices through a [`TransportProvider`].
//! Serial discovery returns every enumerated port and lets the caller's hint
//! pick one; wireless discovery keeps only devices whose name matches one of
//! the configured keywords.
//!
//! Opening a device is followed by a liveness probe: the transport must
//! deliver one well-formed record before the handshake deadline, otherwise
//! the connection is abandoned with [`ConnectError::HandshakeFailed`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tokio_serial::{SerialPortBuilderExt, SerialPortType};

use super::hardware::{BoxedTransport, HardwareSource};
use super::{ReadOutcome, TransportKind, WirelessPeer};
use crate::config::EngineConfig;
use crate::error::{ConnectError, ReadError};

/// An enumerated serial port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialPortInfo {
    pub device: String,
    pub description: Option<String>,
    pub manufacturer: Option<String>,
}

impl SerialPortInfo {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            description: None,
            manufacturer: None,
        }
    }
}

impl From<tokio_serial::SerialPortInfo> for SerialPortInfo {
    fn from(info: tokio_serial::SerialPortInfo) -> Self {
        let (description, manufacturer) = match info.port_type {
            SerialPortType::UsbPort(usb) => (usb.product, usb.manufacturer),
            SerialPortType::BluetoothPort => (Some("Bluetooth serial".to_string()), None),
            SerialPortType::PciPort => (Some("PCI serial".to_string()), None),
            SerialPortType::Unknown => (None, None),
        };
        Self {
            device: info.port_name,
            description,
            manufacturer,
        }
    }
}

/// Platform transport layer
///
/// Implementations enumerate and open devices. Everything above this trait
/// only handles [`BoxedTransport`] byte streams.
#[async_trait]
pub trait TransportProvider: Send + Sync {
    /// Enumerate serial ports (may block briefly)
    fn serial_ports(&self) -> Result<Vec<SerialPortInfo>, ConnectError>;

    /// Enumerate reachable wireless devices
    async fn wireless_devices(&self) -> Result<Vec<WirelessPeer>, ConnectError>;

    async fn open_serial(&self, port: &SerialPortInfo) -> Result<BoxedTransport, ConnectError>;

    async fn open_wireless(&self, peer: &WirelessPeer) -> Result<BoxedTransport, ConnectError>;
}

/// Real serial ports and TCP sockets
#[derive(Debug, Clone)]
pub struct SystemTransports {
    baud_rate: u32,
    peers: Vec<WirelessPeer>,
}

impl SystemTransports {
    pub fn new(baud_rate: u32, peers: Vec<WirelessPeer>) -> Self {
        Self { baud_rate, peers }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.serial.baud_rate, config.wireless.peers.clone())
    }
}

#[async_trait]
impl TransportProvider for SystemTransports {
    fn serial_ports(&self) -> Result<Vec<SerialPortInfo>, ConnectError> {
        let ports = tokio_serial::available_ports().map_err(|e| ConnectError::Transport {
            device: "serial".to_string(),
            reason: e.to_string(),
        })?;
        Ok(ports.into_iter().map(SerialPortInfo::from).collect())
    }

    async fn wireless_devices(&self) -> Result<Vec<WirelessPeer>, ConnectError> {
        Ok(self.peers.clone())
    }

    async fn open_serial(&self, port: &SerialPortInfo) -> Result<BoxedTransport, ConnectError> {
        let stream = tokio_serial::new(port.device.as_str(), self.baud_rate)
            .open_native_async()
            .map_err(|e| ConnectError::Transport {
                device: port.device.clone(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(stream))
    }

    async fn open_wireless(&self, peer: &WirelessPeer) -> Result<BoxedTransport, ConnectError> {
        let stream = TcpStream::connect(peer.address.as_str())
            .await
            .map_err(|e| ConnectError::Transport {
                device: peer.name.clone(),
                reason: e.to_string(),
            })?;
        // Records are tiny and latency matters more than throughput
        let _ = stream.set_nodelay(true);
        Ok(Box::new(stream))
    }
}

/// Case-insensitive match of a device name against discovery keywords
pub fn matches_device_keywords(name: &str, keywords: &[String]) -> bool {
    let name = name.to_lowercase();
    keywords
        .iter()
        .any(|k| !k.is_empty() && name.contains(&k.to_lowercase()))
}

/// Parameters of one connect attempt
#[derive(Debug, Clone)]
pub struct ConnectSettings {
    pub keywords: Vec<String>,
    /// Bound on discovery, open and liveness probe together
    pub handshake_timeout: Duration,
    /// Poll timeout of the resulting source
    pub poll_timeout: Duration,
}

impl ConnectSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            keywords: config.wireless.keywords.clone(),
            handshake_timeout: config.handshake_timeout(),
            poll_timeout: config.read_poll_timeout(),
        }
    }
}

/// Enumerate serial ports on the blocking pool
///
/// Port enumeration walks the OS device tree and must stay off the async
/// workers.
pub async fn enumerate_serial_ports(
    provider: Arc<dyn TransportProvider>,
) -> Result<Vec<SerialPortInfo>, ConnectError> {
    tokio::task::spawn_blocking(move || provider.serial_ports())
        .await
        .map_err(|e| ConnectError::Transport {
            device: "serial".to_string(),
            reason: e.to_string(),
        })?
}

/// Discover, open and probe a hardware source
pub async fn connect_hardware(
    provider: Arc<dyn TransportProvider>,
    kind: TransportKind,
    hint: Option<&str>,
    settings: &ConnectSettings,
) -> Result<HardwareSource, ConnectError> {
    let deadline = Instant::now() + settings.handshake_timeout;
    let hint = hint.map(str::trim).filter(|h| !h.is_empty());

    let opened = timeout_at(deadline, open_device(&provider, kind, hint, settings)).await;
    let (label, transport) = match opened {
        Ok(result) => result?,
        Err(_) => {
            return Err(ConnectError::HandshakeFailed {
                device: hint.unwrap_or(kind.source_kind()).to_string(),
                reason: "discovery timed out".to_string(),
            })
        }
    };

    let mut source = HardwareSource::new(kind, label.clone(), transport, settings.poll_timeout);
    let probe = async {
        loop {
            match source.read_frame().await {
                Ok(ReadOutcome::Frame(_)) => return Ok(()),
                Ok(ReadOutcome::Empty) => continue,
                Err(ReadError::Malformed { record, .. }) => {
                    debug!("{}: ignoring malformed record during handshake: {:?}", label, record);
                }
                Err(e) => return Err(e),
            }
        }
    };

    match timeout_at(deadline, probe).await {
        Ok(Ok(())) => {
            info!("{} device {} answered handshake", kind, label);
            Ok(source)
        }
        Ok(Err(e)) => Err(ConnectError::HandshakeFailed {
            device: label,
            reason: e.to_string(),
        }),
        Err(_) => Err(ConnectError::HandshakeFailed {
            device: label,
            reason: format!(
                "no valid record within {} ms",
                settings.handshake_timeout.as_millis()
            ),
        }),
    }
}

async fn open_device(
    provider: &Arc<dyn TransportProvider>,
    kind: TransportKind,
    hint: Option<&str>,
    settings: &ConnectSettings,
) -> Result<(String, BoxedTransport), ConnectError> {
    match kind {
        TransportKind::Serial => {
            let ports = enumerate_serial_ports(Arc::clone(provider)).await?;
            let port = match hint {
                Some(h) => ports
                    .into_iter()
                    .find(|p| p.device == h)
                    .unwrap_or_else(|| SerialPortInfo::new(h)),
                None => ports.into_iter().next().ok_or(ConnectError::NoDeviceFound {
                    kind: kind.source_kind().to_string(),
                })?,
            };
            debug!("opening serial port {}", port.device);
            let transport = provider.open_serial(&port).await?;
            Ok((port.device, transport))
        }
        TransportKind::Wireless => {
            let peer = provider
                .wireless_devices()
                .await?
                .into_iter()
                .filter(|p| matches_device_keywords(&p.name, &settings.keywords))
                .find(|p| match hint {
                    Some(h) => p.address == h || p.name.to_lowercase().contains(&h.to_lowercase()),
                    None => true,
                })
                .ok_or(ConnectError::NoDeviceFound {
                    kind: kind.source_kind().to_string(),
                })?;
            debug!("opening wireless device {} at {}", peer.name, peer.address);
            let transport = provider.open_wireless(&peer).await?;
            Ok((peer.name, transport))
        }
    }
}
