//! # SoleStream - Insole telemetry engine
//!
//! Streams live pressure telemetry from an eight-cell capacitive insole (or a
//! simulated stand-in) to any number of subscribers, and derives gait phase
//! and center of pressure from every frame.
//!
//! ## Key Features
//!
//! - **One source at a time**: simulated generator, serial port or wireless socket
//! - **Auto-fallback**: a failing hardware source degrades to simulation, the stream never stops
//! - **Best-effort fan-out**: slow or dead subscribers are pruned, others are unaffected
//! - **Status before data**: state changes reach subscribers before the frames they affect
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use solestream::{ControlCommand, Engine, EngineConfig, GaitPattern, MemoryTransports};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> solestream::Result<()> {
//! let engine = Engine::spawn(EngineConfig::default(), Arc::new(MemoryTransports::new()))?;
//!
//! let mut subscription = engine.subscribe_channel().await?;
//! engine
//!     .send_control(ControlCommand::pattern(GaitPattern::Running))
//!     .await?;
//!
//! // The first message is always the connection status
//! let status = subscription.receiver.recv().await.unwrap();
//! assert!(status.status().unwrap().simulation_mode);
//!
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`frame`]: Sensor frames and hardware record parsing
//! - [`layout`]: Fixed cell positions and ranges
//! - [`analytics`]: Force calibration, gait phase, center of pressure
//! - [`simulator`]: Simulated gait generator
//! - [`source`]: Source capability, hardware transports and discovery
//! - [`connection`]: Connection state machine
//! - [`hub`]: Subscriber set and fan-out
//! - [`scheduler`]: Per-tick acquisition
//! - [`engine`]: The actor tying it all together
//! - [`metrics`]: Engine statistics

// Modules
pub mod analytics;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod frame;
pub mod history;
pub mod hub;
pub mod layout;
pub mod message;
pub mod metrics;
pub mod scheduler;
pub mod simulator;
pub mod source;

// Re-exports for convenient access
pub use analytics::{Analytics, GaitPhase};
pub use config::{EngineConfig, SerialConfig, WirelessConfig};
pub use connection::{ConnectionMachine, ConnectionState};
pub use engine::{Engine, EngineHandle, Snapshot, Subscription};
pub use error::{ConnectError, ControlError, ReadError, Result, TelemetryError};
pub use frame::{SensorFrame, SourceTag};
pub use history::HistoryEntry;
pub use hub::{DeliveryError, Hub, Sink, SubscriberId};
pub use layout::{Point, SENSOR_COUNT, SENSOR_LAYOUT};
pub use message::{
    ConnectResponse, ControlCommand, ControlResponse, DisconnectResponse, Envelope,
    OutboundMessage, SharedEnvelope, StatusMessage, TelemetryMessage,
};
pub use metrics::EngineStats;
pub use simulator::{GaitPattern, SimulationParameters};
pub use source::{
    MemoryTransports, SerialPortInfo, SystemTransports, TransportKind, TransportProvider,
    WirelessPeer,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
