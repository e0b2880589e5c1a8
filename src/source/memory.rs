// SoleStream - Insole telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! In-memory transport provider
//!
//! Stands in for the platform transport layer in tests and demos. Every
//! registered device hands back the far end of an in-memory pipe; writing
//! records into it is equivalent to the device streaming them.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::io::{duplex, DuplexStream};

use super::discovery::{SerialPortInfo, TransportProvider};
use super::hardware::BoxedTransport;
use super::WirelessPeer;
use crate::error::ConnectError;

/// Pipe capacity per device
const PIPE_CAPACITY: usize = 4096;

#[derive(Debug, Default)]
struct Devices {
    serial: Vec<(SerialPortInfo, VecDeque<DuplexStream>)>,
    wireless: Vec<(WirelessPeer, VecDeque<DuplexStream>)>,
    opened: usize,
}

/// Transport provider backed by in-memory pipes
#[derive(Debug, Default)]
pub struct MemoryTransports {
    devices: Mutex<Devices>,
}

impl MemoryTransports {
    pub fn new() -> Self {
        Self::default()
    }

    fn devices(&self) -> MutexGuard<'_, Devices> {
        self.devices.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a serial port and return the device end of its pipe
    ///
    /// Registering the same port again queues another pipe for the next open.
    pub fn add_serial_port(&self, device: &str) -> DuplexStream {
        let (device_end, host_end) = duplex(PIPE_CAPACITY);
        let mut devices = self.devices();
        match devices.serial.iter_mut().find(|(p, _)| p.device == device) {
            Some((_, pipes)) => pipes.push_back(host_end),
            None => {
                let info = SerialPortInfo {
                    device: device.to_string(),
                    description: Some("In-memory serial".to_string()),
                    manufacturer: None,
                };
                devices.serial.push((info, VecDeque::from([host_end])));
            }
        }
        device_end
    }

    /// Register a wireless peer and return the device end of its pipe
    pub fn add_wireless_peer(&self, peer: WirelessPeer) -> DuplexStream {
        let (device_end, host_end) = duplex(PIPE_CAPACITY);
        let mut devices = self.devices();
        match devices.wireless.iter_mut().find(|(p, _)| *p == peer) {
            Some((_, pipes)) => pipes.push_back(host_end),
            None => devices.wireless.push((peer, VecDeque::from([host_end]))),
        }
        device_end
    }

    /// Unplug a serial port
    pub fn remove_serial_port(&self, device: &str) {
        self.devices().serial.retain(|(p, _)| p.device != device);
    }

    /// Number of transports opened so far
    pub fn opened(&self) -> usize {
        self.devices().opened
    }
}

#[async_trait]
impl TransportProvider for MemoryTransports {
    fn serial_ports(&self) -> Result<Vec<SerialPortInfo>, ConnectError> {
        Ok(self.devices().serial.iter().map(|(p, _)| p.clone()).collect())
    }

    async fn wireless_devices(&self) -> Result<Vec<WirelessPeer>, ConnectError> {
        Ok(self.devices().wireless.iter().map(|(p, _)| p.clone()).collect())
    }

    async fn open_serial(&self, port: &SerialPortInfo) -> Result<BoxedTransport, ConnectError> {
        let mut devices = self.devices();
        let pipe = devices
            .serial
            .iter_mut()
            .find(|(p, _)| p.device == port.device)
            .and_then(|(_, pipes)| pipes.pop_front());
        match pipe {
            Some(pipe) => {
                devices.opened += 1;
                Ok(Box::new(pipe))
            }
            None => Err(ConnectError::Transport {
                device: port.device.clone(),
                reason: "no such port".to_string(),
            }),
        }
    }

    async fn open_wireless(&self, peer: &WirelessPeer) -> Result<BoxedTransport, ConnectError> {
        let mut devices = self.devices();
        let pipe = devices
            .wireless
            .iter_mut()
            .find(|(p, _)| p == peer)
            .and_then(|(_, pipes)| pipes.pop_front());
        match pipe {
            Some(pipe) => {
                devices.opened += 1;
                Ok(Box::new(pipe))
            }
            None => Err(ConnectError::Transport {
                device: peer.name.clone(),
                reason: "peer unreachable".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ports_are_listed_and_opened_once() {
        let transports = MemoryTransports::new();
        let _device = transports.add_serial_port("/dev/ttyUSB0");

        let ports = transports.serial_ports().unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].device, "/dev/ttyUSB0");

        assert!(transports.open_serial(&ports[0]).await.is_ok());
        assert!(transports.open_serial(&ports[0]).await.is_err());
        assert_eq!(transports.opened(), 1);
    }

    #[tokio::test]
    async fn test_remove_port() {
        let transports = MemoryTransports::new();
        let _device = transports.add_serial_port("/dev/ttyUSB0");
        transports.remove_serial_port("/dev/ttyUSB0");
        assert!(transports.serial_ports().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wireless_peers() {
        let transports = MemoryTransports::new();
        let peer = WirelessPeer::new("ESP32-Insole", "10.0.0.9:7000");
        let _a = transports.add_wireless_peer(peer.clone());
        let _b = transports.add_wireless_peer(peer.clone());

        assert_eq!(transports.wireless_devices().await.unwrap(), vec![peer.clone()]);
        assert!(transports.open_wireless(&peer).await.is_ok());
        assert!(transports.open_wireless(&peer).await.is_ok());
        assert!(transports.open_wireless(&peer).await.is_err());
    }
}
