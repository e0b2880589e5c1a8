// SoleStream - Insole telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Engine actor
//!
//! The engine is a single tokio task that owns every piece of mutable state:
//! the connection state machine, the tick scheduler, the broadcast hub, the
//! history ring and the statistics. Callers talk to it through a cloneable
//! [`EngineHandle`] that sends [`Command`]s and awaits their replies.
//!
//! The task's loop waits on three things at once:
//!
//! - the tick interval (missed ticks are skipped, never burst)
//! - the command channel
//! - completion of an in-flight connect
//!
//! Because ticks and commands are handled on the same task, a command is
//! always applied fully before or after a tick. Discovery and handshake run
//! on a separate task while the state is `Connecting`; connect and disconnect
//! requests that arrive meanwhile are queued and replayed in order once the
//! connect finishes.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use solestream::{Engine, EngineConfig, SystemTransports};
//!
//! # async fn run() -> solestream::Result<()> {
//! let config = EngineConfig::default();
//! let transports = Arc::new(SystemTransports::from_config(&config));
//! let engine = Engine::spawn(config, transports)?;
//!
//! let mut subscription = engine.subscribe_channel().await?;
//! while let Some(envelope) = subscription.receiver.recv().await {
//!     println!("{}", envelope.json);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};

use crate::analytics::Analytics;
use crate::config::EngineConfig;
use crate::connection::{ConnectionMachine, ConnectionState};
use crate::error::{ConnectError, Result, TelemetryError};
use crate::frame::{SensorFrame, SourceTag};
use crate::history::{History, HistoryEntry};
use crate::hub::{Hub, Sink, SubscriberId};
use crate::message::{
    ControlCommand, Envelope, OutboundMessage, SharedEnvelope, StatusMessage, TelemetryMessage,
};
use crate::metrics::{EngineStats, SkipReason};
use crate::scheduler::{AcquiredFrame, TickOutcome, TickScheduler};
use crate::simulator::SimulationParameters;
use crate::source::{
    connect_hardware, enumerate_serial_ports, ConnectSettings, HardwareSource, SerialPortInfo,
    TransportKind, TransportProvider,
};

/// Depth of the command channel
const COMMAND_QUEUE_DEPTH: usize = 64;

/// Point-in-time view of the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Last published frame
    pub frame: Option<SensorFrame>,
    pub analytics: Option<Analytics>,
    pub connection_state: ConnectionState,
    pub status: StatusMessage,
    pub simulation: SimulationParameters,
    pub stats: EngineStats,
    pub subscribers: usize,
}

/// A subscription backed by a bounded channel
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: mpsc::Receiver<SharedEnvelope>,
}

/// Requests processed by the engine task
pub enum Command {
    Connect {
        kind: TransportKind,
        hint: Option<String>,
        reply: oneshot::Sender<Result<String>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Control {
        command: ControlCommand,
        reply: oneshot::Sender<Result<()>>,
    },
    Subscribe {
        sink: Box<dyn Sink>,
        reply: oneshot::Sender<SubscriberId>,
    },
    Unsubscribe {
        id: SubscriberId,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<Snapshot>,
    },
    History {
        limit: usize,
        reply: oneshot::Sender<Vec<HistoryEntry>>,
    },
    Shutdown,
}

struct PendingConnect {
    task: JoinHandle<std::result::Result<HardwareSource, ConnectError>>,
    reply: oneshot::Sender<Result<String>>,
}

/// The engine task state
pub struct Engine {
    config: EngineConfig,
    transports: Arc<dyn TransportProvider>,
    connection: ConnectionMachine,
    scheduler: TickScheduler,
    hub: Hub,
    history: History,
    stats: EngineStats,
    pending: Option<PendingConnect>,
    deferred: VecDeque<Command>,
}

impl Engine {
    /// Validate `config` and start the engine on the current tokio runtime
    pub fn spawn(
        config: EngineConfig,
        transports: Arc<dyn TransportProvider>,
    ) -> Result<EngineHandle> {
        config.validate()?;

        let (commands, receiver) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let handle = EngineHandle {
            commands,
            transports: Arc::clone(&transports),
            queue_depth: config.subscriber_queue_depth,
        };

        let engine = Engine {
            scheduler: TickScheduler::new(&config),
            history: History::new(config.history_capacity),
            connection: ConnectionMachine::new(),
            hub: Hub::new(),
            stats: EngineStats::new(),
            pending: None,
            deferred: VecDeque::new(),
            transports,
            config,
        };

        info!(
            "engine starting: tick {} ms, pattern {}",
            engine.config.tick_interval_ms,
            engine.scheduler.params().pattern
        );
        tokio::spawn(engine.run(receiver));
        Ok(handle)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let mut ticker = interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.on_tick().await,
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                joined = wait_connect(&mut self.pending), if self.pending.is_some() => {
                    self.finish_connect(joined);
                    self.drain_deferred();
                }
            }
        }

        if let Some(pending) = self.pending.take() {
            pending.task.abort();
        }
        info!("engine stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Connect { kind, hint, reply } => {
                if self.pending.is_some() || self.connection.state().is_transitioning() {
                    self.deferred.push_back(Command::Connect { kind, hint, reply });
                } else {
                    self.start_connect(kind, hint, reply);
                }
            }
            Command::Disconnect { reply } => {
                if self.pending.is_some() {
                    self.deferred.push_back(Command::Disconnect { reply });
                } else {
                    self.disconnect();
                    let _ = reply.send(());
                }
            }
            Command::Control { command, reply } => {
                let _ = reply.send(self.apply_control(&command));
            }
            Command::Subscribe { sink, reply } => {
                let id = self.hub.subscribe(sink);
                // Status first, so a subscriber never sees data before status
                if let Some(envelope) = encode(OutboundMessage::Status(self.connection.status())) {
                    if !self.hub.deliver_to(id, &envelope) {
                        self.stats.record_pruned(1);
                    }
                }
                let _ = reply.send(id);
            }
            Command::Unsubscribe { id, reply } => {
                let _ = reply.send(self.hub.unsubscribe(id));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::History { limit, reply } => {
                let _ = reply.send(self.history.latest(limit));
            }
            Command::Shutdown => {}
        }
    }

    fn start_connect(
        &mut self,
        kind: TransportKind,
        hint: Option<String>,
        reply: oneshot::Sender<Result<String>>,
    ) {
        if !self.connection.begin_connect(kind) {
            self.deferred.push_back(Command::Connect { kind, hint, reply });
            return;
        }

        let transports = Arc::clone(&self.transports);
        let settings = ConnectSettings::from_config(&self.config);
        let task = tokio::spawn(async move {
            connect_hardware(transports, kind, hint.as_deref(), &settings).await
        });
        self.pending = Some(PendingConnect { task, reply });
    }

    fn finish_connect(
        &mut self,
        joined: std::result::Result<std::result::Result<HardwareSource, ConnectError>, JoinError>,
    ) {
        let Some(PendingConnect { reply, .. }) = self.pending.take() else {
            return;
        };

        let result = joined.unwrap_or_else(|e| {
            Err(ConnectError::Transport {
                device: "connect task".to_string(),
                reason: e.to_string(),
            })
        });

        let outcome = match result {
            Ok(source) => {
                let device = source.label().to_string();
                if let Some(previous) = self.scheduler.attach_hardware(source) {
                    info!("released {}", previous.label());
                }
                self.connection.complete_connect(device.as_str());
                // Notify before replying so the caller's next frame follows the status
                self.publish_status(None);
                Ok(device)
            }
            Err(e) => {
                warn!("connect failed: {}", e);
                self.connection.abort_connect();
                self.stats.record_connect_failure();
                Err(TelemetryError::from(e))
            }
        };

        let _ = reply.send(outcome);
    }

    fn drain_deferred(&mut self) {
        while self.pending.is_none() {
            match self.deferred.pop_front() {
                Some(command) => self.handle(command),
                None => break,
            }
        }
    }

    fn disconnect(&mut self) {
        if !self.connection.begin_disconnect() {
            return;
        }
        if let Some(source) = self.scheduler.detach_hardware() {
            info!("released {}", source.label());
        }
        self.connection.complete_disconnect();
        self.publish_status(None);
    }

    fn apply_control(&mut self, command: &ControlCommand) -> Result<()> {
        self.connection.ensure_simulation_controls()?;
        self.scheduler.apply_control(command)?;
        Ok(())
    }

    async fn on_tick(&mut self) {
        match self.scheduler.tick(!self.hub.is_empty()).await {
            TickOutcome::Idle => self.stats.record_skip(SkipReason::Idle),
            TickOutcome::Paused => self.stats.record_skip(SkipReason::Paused),
            TickOutcome::Empty => self.stats.record_skip(SkipReason::Empty),
            TickOutcome::Failed(e) => {
                self.stats.record_skip(SkipReason::Failed);
                let reason = e.to_string();
                if self.connection.report_source_failure(&reason) {
                    self.stats.record_fallback();
                    self.publish_status(Some(reason));
                }
            }
            TickOutcome::Frame(acquired) => self.publish_frame(acquired),
        }
    }

    fn publish_frame(&mut self, acquired: AcquiredFrame) {
        let AcquiredFrame {
            frame,
            pattern,
            test_sensor,
        } = acquired;
        let analytics = Analytics::from_frame(&frame);
        let hardware = frame.source() == SourceTag::Hardware;

        let message = TelemetryMessage {
            sensors: *frame.readings(),
            timestamp: frame.timestamp(),
            pattern,
            connection: self
                .scheduler
                .hardware_kind()
                .map(|k| k.as_str().to_string()),
            simulation_mode: !hardware,
            test_mode: test_sensor.is_some(),
            test_sensor: test_sensor.map_or(-1, |s| s as i32),
            analytics: analytics.clone(),
        };

        if let Some(envelope) = encode(OutboundMessage::Telemetry(Box::new(message))) {
            let report = self.hub.publish(&envelope);
            self.stats.record_pruned(report.pruned.len());
            self.stats
                .record_frame(analytics.gait_phase, hardware, report.delivered);
        }

        self.history.push(HistoryEntry { frame, analytics });
    }

    fn publish_status(&mut self, fallback_reason: Option<String>) {
        let mut status = self.connection.status();
        status.fallback_reason = fallback_reason;

        if let Some(envelope) = encode(OutboundMessage::Status(status)) {
            let report = self.hub.publish(&envelope);
            self.stats.record_pruned(report.pruned.len());
            self.stats.record_status(report.delivered);
        }
    }

    fn snapshot(&self) -> Snapshot {
        let last = self.history.last();
        Snapshot {
            frame: last.map(|e| e.frame.clone()),
            analytics: last.map(|e| e.analytics.clone()),
            connection_state: self.connection.state().clone(),
            status: self.connection.status(),
            simulation: self.scheduler.params().clone(),
            stats: self.stats.clone(),
            subscribers: self.hub.len(),
        }
    }
}

async fn wait_connect(
    pending: &mut Option<PendingConnect>,
) -> std::result::Result<std::result::Result<HardwareSource, ConnectError>, JoinError> {
    match pending {
        Some(p) => (&mut p.task).await,
        None => std::future::pending().await,
    }
}

fn encode(message: OutboundMessage) -> Option<SharedEnvelope> {
    match Envelope::encode(message) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            error!("cannot serialize outbound message: {}", e);
            None
        }
    }
}

/// Cloneable handle to a running engine
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    transports: Arc<dyn TransportProvider>,
    queue_depth: usize,
}

impl EngineHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| TelemetryError::EngineStopped)?;
        response.await.map_err(|_| TelemetryError::EngineStopped)
    }

    /// Discover, open and switch to a hardware source
    ///
    /// Returns the device label. Subscribers have been notified of the new
    /// state by the time this returns.
    pub async fn connect(&self, kind: TransportKind, hint: Option<String>) -> Result<String> {
        self.request(|reply| Command::Connect { kind, hint, reply })
            .await?
    }

    /// Release the hardware source and resume simulation
    pub async fn disconnect(&self) -> Result<()> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    /// Enumerate serial ports without involving the engine task
    pub async fn list_serial_ports(&self) -> Result<Vec<SerialPortInfo>> {
        let ports = enumerate_serial_ports(Arc::clone(&self.transports)).await?;
        Ok(ports)
    }

    pub async fn snapshot(&self) -> Result<Snapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Register a sink; it first receives the current status
    pub async fn subscribe(&self, sink: Box<dyn Sink>) -> Result<SubscriberId> {
        self.request(|reply| Command::Subscribe { sink, reply }).await
    }

    /// Register a bounded channel as a sink
    pub async fn subscribe_channel(&self) -> Result<Subscription> {
        let (sender, receiver) = mpsc::channel(self.queue_depth);
        let id = self.subscribe(Box::new(sender)).await?;
        Ok(Subscription { id, receiver })
    }

    /// Remove a subscriber; returns whether it was registered
    pub async fn unsubscribe(&self, id: SubscriberId) -> Result<bool> {
        self.request(|reply| Command::Unsubscribe { id, reply }).await
    }

    pub async fn send_control(&self, command: ControlCommand) -> Result<()> {
        self.request(|reply| Command::Control { command, reply })
            .await?
    }

    /// Newest `limit` published frames, oldest first
    pub async fn history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        self.request(|reply| Command::History { limit, reply }).await
    }

    /// Stop the engine task
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    /// Whether the engine task is still running
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryTransports;
    use std::time::Duration;

    fn spawn() -> EngineHandle {
        let config = EngineConfig::default().with_seed(11);
        Engine::spawn(config, Arc::new(MemoryTransports::new())).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriber_gets_status_then_frames() {
        let engine = spawn();
        let mut sub = engine.subscribe_channel().await.unwrap();

        let first = sub.receiver.recv().await.unwrap();
        assert!(first.status().is_some());
        let second = sub.receiver.recv().await.unwrap();
        assert!(second.telemetry().is_some());
        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_engine_does_not_generate() {
        let engine = spawn();
        tokio::time::sleep(Duration::from_millis(500)).await;
        let snapshot = engine.snapshot().await.unwrap();
        assert!(snapshot.frame.is_none());
        assert_eq!(snapshot.stats.frames_published, 0);
        assert!(snapshot.stats.ticks_idle > 0);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = EngineConfig::default().with_tick_interval_ms(0);
        let err = Engine::spawn(config, Arc::new(MemoryTransports::new())).err();
        assert!(matches!(err, Some(TelemetryError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_engine() {
        let engine = spawn();
        engine.shutdown().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            engine.snapshot().await.err(),
            Some(TelemetryError::EngineStopped)
        );
        assert!(!engine.is_running());
    }
}
