// SoleStream - Insole telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Configuration types for the telemetry engine

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TelemetryError};
use crate::simulator::GaitPattern;
use crate::source::WirelessPeer;

/// Lowest accepted `test_level`; a tested sensor must stand clearly above
/// its baseline
pub const MIN_TEST_LEVEL: f64 = 2.0;

/// Engine-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tick interval in milliseconds (default: 50, i.e. 20 Hz)
    pub tick_interval_ms: u64,

    /// Maximum wait for a hardware record on each tick
    pub read_poll_timeout_ms: u64,

    /// Bound on discovery plus the liveness probe of a new transport
    pub handshake_timeout_ms: u64,

    /// Number of recent frames kept in memory
    pub history_capacity: usize,

    /// Messages buffered per subscriber before it is considered dead
    pub subscriber_queue_depth: usize,

    /// Ticks a single-sensor test lasts
    pub test_duration_ticks: u32,

    /// Capacitance added to the tested sensor above its baseline
    pub test_level: f64,

    /// Pattern active at startup
    pub initial_pattern: GaitPattern,

    /// Whether the simulation starts running
    pub start_running: bool,

    /// Seed for simulated noise (random when absent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Serial transport settings
    pub serial: SerialConfig,

    /// Wireless transport settings
    pub wireless: WirelessConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,
            read_poll_timeout_ms: 20,
            handshake_timeout_ms: 3_000,
            history_capacity: 256,
            subscriber_queue_depth: 64,
            test_duration_ticks: 60, // 3 seconds at 20 Hz
            test_level: 10.0,
            initial_pattern: GaitPattern::Walking,
            start_running: true,
            seed: None,
            serial: SerialConfig::default(),
            wireless: WirelessConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON configuration file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            TelemetryError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            TelemetryError::Config(format!("cannot parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Set the tick interval
    pub fn with_tick_interval_ms(mut self, ms: u64) -> Self {
        self.tick_interval_ms = ms;
        self
    }

    /// Set the random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the single-sensor test duration
    pub fn with_test_duration_ticks(mut self, ticks: u32) -> Self {
        self.test_duration_ticks = ticks;
        self
    }

    /// Set the handshake timeout
    pub fn with_handshake_timeout_ms(mut self, ms: u64) -> Self {
        self.handshake_timeout_ms = ms;
        self
    }

    /// Set the per-subscriber queue depth
    pub fn with_subscriber_queue_depth(mut self, depth: usize) -> Self {
        self.subscriber_queue_depth = depth;
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn read_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.read_poll_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Check the invariants the engine relies on
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(TelemetryError::Config("tick_interval_ms must be > 0".into()));
        }
        if self.read_poll_timeout_ms >= self.tick_interval_ms {
            return Err(TelemetryError::Config(format!(
                "read_poll_timeout_ms ({}) must be below tick_interval_ms ({})",
                self.read_poll_timeout_ms, self.tick_interval_ms
            )));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(TelemetryError::Config("handshake_timeout_ms must be > 0".into()));
        }
        if self.history_capacity == 0 {
            return Err(TelemetryError::Config("history_capacity must be > 0".into()));
        }
        if self.subscriber_queue_depth == 0 {
            return Err(TelemetryError::Config("subscriber_queue_depth must be > 0".into()));
        }
        if self.test_duration_ticks == 0 {
            return Err(TelemetryError::Config("test_duration_ticks must be > 0".into()));
        }
        if !self.test_level.is_finite() || self.test_level <= MIN_TEST_LEVEL {
            return Err(TelemetryError::Config(format!(
                "test_level ({}) must be above {}",
                self.test_level, MIN_TEST_LEVEL
            )));
        }
        Ok(())
    }
}

/// Serial transport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self { baud_rate: 115_200 }
    }
}

/// Wireless transport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WirelessConfig {
    /// Case-insensitive name fragments identifying an insole
    pub keywords: Vec<String>,

    /// Known peers offered to discovery
    pub peers: Vec<WirelessPeer>,
}

impl Default for WirelessConfig {
    fn default() -> Self {
        Self {
            keywords: ["insole", "esp32", "gait", "pressure"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            peers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.tick_interval_ms, 50);
        assert_eq!(config.history_capacity, 256);
        assert_eq!(config.serial.baud_rate, 115_200);
        assert!(config.wireless.keywords.iter().any(|k| k == "insole"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_slow_poll() {
        let mut config = EngineConfig::default();
        config.read_poll_timeout_ms = 50;
        assert!(matches!(config.validate(), Err(TelemetryError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_weak_test_level() {
        for level in [2.0, 0.5, -1.0, f64::NAN, f64::INFINITY] {
            let config = EngineConfig {
                test_level: level,
                ..EngineConfig::default()
            };
            assert!(config.validate().is_err(), "test_level {}", level);
        }
        let config = EngineConfig {
            test_level: 2.5,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_tick() {
        let config = EngineConfig::default().with_tick_interval_ms(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_file_partial() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"tick_interval_ms": 100, "wireless": {{"peers": [{{"name": "Insole-L", "address": "10.0.0.7:9000"}}]}}}}"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.tick_interval_ms, 100);
        assert_eq!(config.read_poll_timeout_ms, 20);
        assert_eq!(config.wireless.peers.len(), 1);
        assert_eq!(config.wireless.peers[0].name, "Insole-L");
        // keywords keep their default
        assert!(!config.wireless.keywords.is_empty());
    }

    #[test]
    fn test_from_json_file_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{{ not json").unwrap();
        file.flush().unwrap();

        let err = EngineConfig::from_json_file(file.path()).unwrap_err();
        assert_eq!(err.kind(), "InvalidConfig");
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::new()
            .with_seed(7)
            .with_test_duration_ticks(5)
            .with_handshake_timeout_ms(500);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.test_duration_ticks, 5);
        assert_eq!(config.handshake_timeout(), Duration::from_millis(500));
    }
}
