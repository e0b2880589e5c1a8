// SoleStream - Insole telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Tick scheduler
//!
//! Owns the active [`Source`] and the [`SimulationParameters`], and performs
//! the acquisition step of one tick:
//!
//! 1. no subscribers: skip
//! 2. simulated source and paused: skip
//! 3. otherwise read from the active source
//!
//! A failed hardware read drops the hardware source on the spot, so the next
//! tick reads from the simulated generator. The simulator is kept on standby
//! while hardware is active and resumes where it stopped.

use log::info;

use crate::config::EngineConfig;
use crate::error::{ControlError, ReadError};
use crate::frame::{SensorFrame, SourceTag};
use crate::message::ControlCommand;
use crate::simulator::{GaitPattern, SimulationParameters, Simulator};
use crate::source::{HardwareSource, ReadOutcome, Source, TransportKind};

/// A frame plus the simulation state it was produced under
#[derive(Debug, Clone, PartialEq)]
pub struct AcquiredFrame {
    pub frame: SensorFrame,
    pub pattern: GaitPattern,
    pub test_sensor: Option<usize>,
}

/// What one tick produced
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Nobody is listening
    Idle,
    /// Simulation paused
    Paused,
    /// Hardware had no record ready
    Empty,
    Frame(AcquiredFrame),
    /// Hardware read failed; the simulated source is active again
    Failed(ReadError),
}

#[derive(Debug)]
pub struct TickScheduler {
    params: SimulationParameters,
    source: Source,
    /// Simulator parked while a hardware source is active
    standby: Option<Simulator>,
    sequence: u64,
    test_duration_ticks: u32,
}

impl TickScheduler {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            params: SimulationParameters::new(config.initial_pattern, config.start_running),
            source: Source::Simulated(Simulator::from_config(config)),
            standby: None,
            sequence: 0,
            test_duration_ticks: config.test_duration_ticks,
        }
    }

    pub fn params(&self) -> &SimulationParameters {
        &self.params
    }

    pub fn source_tag(&self) -> SourceTag {
        self.source.tag()
    }

    /// Kind of the active hardware source, if any
    pub fn hardware_kind(&self) -> Option<TransportKind> {
        match &self.source {
            Source::Hardware(hw) => Some(hw.kind()),
            Source::Simulated(_) => None,
        }
    }

    /// Sequence number of the last acquired frame
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Run the acquisition step of one tick
    pub async fn tick(&mut self, has_subscribers: bool) -> TickOutcome {
        if !has_subscribers {
            return TickOutcome::Idle;
        }
        if matches!(self.source, Source::Simulated(_)) && !self.params.running {
            return TickOutcome::Paused;
        }

        let pattern = self.params.pattern;
        let test_sensor = self.params.test_sensor();

        match self.source.read_frame(&mut self.params).await {
            Ok(ReadOutcome::Frame(frame)) => {
                self.sequence += 1;
                TickOutcome::Frame(AcquiredFrame {
                    frame: frame.with_sequence(self.sequence),
                    pattern,
                    test_sensor,
                })
            }
            Ok(ReadOutcome::Empty) => TickOutcome::Empty,
            Err(e) => {
                if let Some(hw) = self.detach_hardware() {
                    info!("released {} after read failure", hw.label());
                }
                TickOutcome::Failed(e)
            }
        }
    }

    /// Make `source` the active source
    ///
    /// Returns the hardware source it replaces, if any.
    pub fn attach_hardware(&mut self, source: HardwareSource) -> Option<HardwareSource> {
        match std::mem::replace(&mut self.source, Source::Hardware(source)) {
            Source::Simulated(sim) => {
                self.standby = Some(sim);
                None
            }
            Source::Hardware(previous) => Some(previous),
        }
    }

    /// Return to the simulated source, handing back the hardware source
    pub fn detach_hardware(&mut self) -> Option<HardwareSource> {
        if !matches!(self.source, Source::Hardware(_)) {
            return None;
        }
        let sim = self.standby.take()?;
        match std::mem::replace(&mut self.source, Source::Simulated(sim)) {
            Source::Hardware(hw) => Some(hw),
            Source::Simulated(_) => None,
        }
    }

    fn simulator_mut(&mut self) -> Option<&mut Simulator> {
        match &mut self.source {
            Source::Simulated(sim) => Some(sim),
            Source::Hardware(_) => self.standby.as_mut(),
        }
    }

    /// Apply a simulation control command
    ///
    /// Nothing is changed when the command is rejected.
    pub fn apply_control(&mut self, command: &ControlCommand) -> Result<(), ControlError> {
        match command {
            ControlCommand::Pattern { pattern } => {
                let pattern: GaitPattern = pattern.parse()?;
                self.params.test = None;
                self.params.pattern = pattern;
            }
            ControlCommand::Play => self.params.running = true,
            ControlCommand::Pause => self.params.running = false,
            ControlCommand::Stop => {
                self.params.cancel_test();
                self.params.running = false;
                if let Some(sim) = self.simulator_mut() {
                    sim.rewind();
                }
            }
            ControlCommand::Clear => {
                self.params.test = None;
                self.params.pattern = GaitPattern::None;
            }
            ControlCommand::TestSensor { sensor } => {
                self.params.start_test(*sensor, self.test_duration_ticks)?;
            }
        }
        info!("applied {} control", command.action());
        Ok(())
    }
}
