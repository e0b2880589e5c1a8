// SoleStream - Insole telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Simulated insole generator
//!
//! Produces frames that look like a foot walking, running or standing on the
//! insole. The load on every cell is a deterministic function of elapsed
//! simulated time and the selected [`GaitPattern`]; a small Gaussian jitter
//! (bounded to three standard deviations) emulates sensor noise. Every
//! reading is clamped to the cell's range from [`SENSOR_LAYOUT`].
//!
//! Simulated time only advances when a frame is generated, so pausing the
//! simulation freezes the gait cycle where it was.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::ControlError;
use crate::frame::{SensorFrame, SourceTag};
use crate::layout::{SENSOR_COUNT, SENSOR_LAYOUT};

/// Movement pattern driving the generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GaitPattern {
    #[default]
    Walking,
    Standing,
    Running,
    /// No load, baseline readings only
    None,
}

impl GaitPattern {
    pub const ALL: [GaitPattern; 4] = [
        GaitPattern::Walking,
        GaitPattern::Standing,
        GaitPattern::Running,
        GaitPattern::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GaitPattern::Walking => "walking",
            GaitPattern::Standing => "standing",
            GaitPattern::Running => "running",
            GaitPattern::None => "none",
        }
    }
}

impl fmt::Display for GaitPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GaitPattern {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        GaitPattern::ALL
            .into_iter()
            .find(|p| p.as_str() == lower)
            .ok_or_else(|| ControlError::InvalidControl(format!("unknown pattern: {}", s)))
    }
}

/// Active single-sensor test
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorTest {
    /// Sensor driven high
    pub sensor: usize,
    /// Frames left before the test ends
    pub remaining_ticks: u32,
    /// Pattern restored when the test ends
    pub restore: GaitPattern,
}

/// Simulation state owned by the tick scheduler
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationParameters {
    pub pattern: GaitPattern,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<SensorTest>,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self::new(GaitPattern::Walking, true)
    }
}

impl SimulationParameters {
    pub fn new(pattern: GaitPattern, running: bool) -> Self {
        Self {
            pattern,
            running,
            test: None,
        }
    }

    pub fn is_testing(&self) -> bool {
        self.test.is_some()
    }

    pub fn test_sensor(&self) -> Option<usize> {
        self.test.as_ref().map(|t| t.sensor)
    }

    /// Start driving one sensor high for `ticks` frames
    ///
    /// Restarting a test keeps the pattern saved by the first one.
    pub fn start_test(&mut self, sensor: usize, ticks: u32) -> Result<(), ControlError> {
        if sensor >= SENSOR_COUNT {
            return Err(ControlError::InvalidControl(format!(
                "sensor index {} out of range 0..{}",
                sensor, SENSOR_COUNT
            )));
        }
        let restore = self.test.as_ref().map_or(self.pattern, |t| t.restore);
        self.test = Some(SensorTest {
            sensor,
            remaining_ticks: ticks.max(1),
            restore,
        });
        self.pattern = GaitPattern::None;
        self.running = true;
        Ok(())
    }

    /// End a running test early and restore its saved pattern
    pub fn cancel_test(&mut self) {
        if let Some(test) = self.test.take() {
            self.pattern = test.restore;
        }
    }
}

/// Load profile of one cyclic gait
struct GaitProfile {
    period_s: f64,
    amplitude: f64,
    /// Fraction of the cycle during which each cell is loaded
    windows: [(f64, f64); SENSOR_COUNT],
    gains: [f64; SENSOR_COUNT],
}

const WALKING: GaitProfile = GaitProfile {
    period_s: 1.1,
    amplitude: 12.0,
    windows: [
        (0.00, 0.32),
        (0.00, 0.30),
        (0.10, 0.45),
        (0.22, 0.55),
        (0.20, 0.56),
        (0.18, 0.52),
        (0.35, 0.62),
        (0.36, 0.60),
    ],
    gains: [1.0, 0.9, 0.45, 0.8, 0.9, 0.6, 0.85, 0.6],
};

const RUNNING: GaitProfile = GaitProfile {
    period_s: 0.7,
    amplitude: 18.0,
    windows: [
        (0.00, 0.16),
        (0.00, 0.15),
        (0.04, 0.26),
        (0.06, 0.34),
        (0.05, 0.35),
        (0.05, 0.32),
        (0.20, 0.40),
        (0.22, 0.40),
    ],
    gains: [0.8, 0.7, 0.4, 1.0, 1.0, 0.7, 0.9, 0.6],
};

/// Quiet standing load per cell, above baseline
const STANDING_LOAD: [f64; SENSOR_COUNT] = [1.8, 1.8, 1.2, 1.6, 1.6, 1.6, 0.9, 0.7];

/// Medial (+1) / lateral (-1) side of each cell for postural sway
const SWAY_SIDE: [f64; SENSOR_COUNT] = [1.0, -1.0, -1.0, 1.0, 0.0, -1.0, 1.0, -1.0];

const SWAY_PERIOD_S: f64 = 4.0;
const SWAY_DEPTH: f64 = 0.1;

fn bump(phase: f64, (start, end): (f64, f64)) -> f64 {
    if phase >= start && phase < end {
        (PI * (phase - start) / (end - start)).sin()
    } else {
        0.0
    }
}

fn cyclic_load(profile: &GaitProfile, t: f64, sensor: usize) -> f64 {
    let phase = (t / profile.period_s).fract();
    profile.amplitude * profile.gains[sensor] * bump(phase, profile.windows[sensor])
}

/// Deterministic load (capacitance above baseline) of one cell at time `t`
pub fn pattern_load(pattern: GaitPattern, t: f64, sensor: usize) -> f64 {
    match pattern {
        GaitPattern::Walking => cyclic_load(&WALKING, t, sensor),
        GaitPattern::Running => cyclic_load(&RUNNING, t, sensor),
        GaitPattern::Standing => {
            let sway = (2.0 * PI * t / SWAY_PERIOD_S).sin() * SWAY_DEPTH * SWAY_SIDE[sensor];
            STANDING_LOAD[sensor] * (1.0 + sway)
        }
        GaitPattern::None => 0.0,
    }
}

/// Frame generator for the simulated source
#[derive(Debug)]
pub struct Simulator {
    tick_s: f64,
    elapsed_s: f64,
    test_level: f64,
    rng: StdRng,
}

impl Simulator {
    /// Create a generator advancing `tick_interval` per frame
    pub fn new(tick_interval: Duration, seed: Option<u64>, test_level: f64) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            tick_s: tick_interval.as_secs_f64(),
            elapsed_s: 0.0,
            test_level,
            rng,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.tick_interval(), config.seed, config.test_level)
    }

    /// Simulated seconds generated so far
    pub fn elapsed(&self) -> f64 {
        self.elapsed_s
    }

    /// Restart the gait cycle from zero
    pub fn rewind(&mut self) {
        self.elapsed_s = 0.0;
    }

    /// Generate the next frame and advance simulated time by one tick
    ///
    /// While a sensor test is active it replaces the pattern; its countdown
    /// is decremented here and the saved pattern restored when it hits zero.
    pub fn generate(&mut self, params: &mut SimulationParameters) -> SensorFrame {
        let readings = match params.test.as_mut() {
            Some(test) => {
                test.remaining_ticks = test.remaining_ticks.saturating_sub(1);
                let sensor = test.sensor;
                self.test_readings(sensor)
            }
            None => self.pattern_readings(params.pattern),
        };

        if params.test.as_ref().map_or(false, |t| t.remaining_ticks == 0) {
            params.cancel_test();
        }

        self.elapsed_s += self.tick_s;
        SensorFrame::new(readings, SourceTag::Simulated)
    }

    fn pattern_readings(&mut self, pattern: GaitPattern) -> [f64; SENSOR_COUNT] {
        let mut readings = [0.0; SENSOR_COUNT];
        for (i, spec) in SENSOR_LAYOUT.iter().enumerate() {
            let load = pattern_load(pattern, self.elapsed_s, i);
            readings[i] = spec.clamp(spec.baseline + load + self.jitter(spec.noise_std));
        }
        readings
    }

    fn test_readings(&mut self, sensor: usize) -> [f64; SENSOR_COUNT] {
        let mut readings = [0.0; SENSOR_COUNT];
        for (i, spec) in SENSOR_LAYOUT.iter().enumerate() {
            let load = if i == sensor { self.test_level } else { 0.0 };
            readings[i] = spec.clamp(spec.baseline + load + self.jitter(spec.noise_std));
        }
        readings
    }

    fn jitter(&mut self, std: f64) -> f64 {
        match Normal::new(0.0, std) {
            Ok(normal) if std > 0.0 => normal.sample(&mut self.rng).clamp(-3.0 * std, 3.0 * std),
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{Analytics, GaitPhase};
    use std::collections::HashSet;

    fn simulator() -> Simulator {
        Simulator::new(Duration::from_millis(50), Some(42), 10.0)
    }

    #[test]
    fn test_pattern_parsing() {
        assert_eq!("walking".parse::<GaitPattern>().unwrap(), GaitPattern::Walking);
        assert_eq!(" Running ".parse::<GaitPattern>().unwrap(), GaitPattern::Running);
        assert_eq!("none".parse::<GaitPattern>().unwrap(), GaitPattern::None);
        assert!(matches!(
            "skipping".parse::<GaitPattern>(),
            Err(ControlError::InvalidControl(_))
        ));
    }

    #[test]
    fn test_readings_stay_in_range() {
        let mut sim = simulator();
        for pattern in GaitPattern::ALL {
            let mut params = SimulationParameters::new(pattern, true);
            for _ in 0..200 {
                let frame = sim.generate(&mut params);
                for (value, spec) in frame.readings().iter().zip(SENSOR_LAYOUT.iter()) {
                    assert!(*value >= spec.min && *value <= spec.max);
                }
            }
        }
    }

    #[test]
    fn test_none_pattern_stays_near_baseline() {
        let mut sim = simulator();
        let mut params = SimulationParameters::new(GaitPattern::None, true);
        for _ in 0..100 {
            let frame = sim.generate(&mut params);
            for (value, spec) in frame.readings().iter().zip(SENSOR_LAYOUT.iter()) {
                assert!((value - spec.baseline).abs() <= 3.0 * spec.noise_std + 1e-9);
            }
        }
    }

    #[test]
    fn test_walking_cycles_through_phases() {
        let mut sim = simulator();
        let mut params = SimulationParameters::new(GaitPattern::Walking, true);
        let phases: HashSet<GaitPhase> = (0..44)
            .map(|_| Analytics::from_frame(&sim.generate(&mut params)).gait_phase)
            .collect();
        assert!(phases.contains(&GaitPhase::HeelStrike));
        assert!(phases.contains(&GaitPhase::Swing));
    }

    #[test]
    fn test_standing_is_stance() {
        let mut sim = simulator();
        let mut params = SimulationParameters::new(GaitPattern::Standing, true);
        for _ in 0..80 {
            let analytics = Analytics::from_frame(&sim.generate(&mut params));
            assert_eq!(analytics.gait_phase, GaitPhase::Stance);
        }
    }

    #[test]
    fn test_sensor_test_round_trip() {
        let mut sim = simulator();
        let mut params = SimulationParameters::new(GaitPattern::Running, true);
        params.start_test(3, 5).unwrap();
        assert_eq!(params.pattern, GaitPattern::None);

        for tick in 0..5 {
            assert!(params.is_testing(), "test ended early at tick {}", tick);
            let frame = sim.generate(&mut params);
            let baseline = SENSOR_LAYOUT[3].baseline;
            assert!(frame.readings()[3] > baseline + 2.0);
            for (i, value) in frame.readings().iter().enumerate() {
                if i != 3 {
                    assert!(*value < SENSOR_LAYOUT[i].baseline + 0.5);
                }
            }
        }

        assert!(!params.is_testing());
        assert_eq!(params.pattern, GaitPattern::Running);
    }

    #[test]
    fn test_sensor_test_rejects_bad_index() {
        let mut params = SimulationParameters::default();
        assert!(params.start_test(8, 10).is_err());
        assert_eq!(params.pattern, GaitPattern::Walking);
    }

    #[test]
    fn test_restarted_test_keeps_saved_pattern() {
        let mut params = SimulationParameters::new(GaitPattern::Standing, false);
        params.start_test(1, 10).unwrap();
        params.start_test(2, 10).unwrap();
        assert!(params.running);
        params.cancel_test();
        assert_eq!(params.pattern, GaitPattern::Standing);
    }

    #[test]
    fn test_elapsed_and_rewind() {
        let mut sim = simulator();
        let mut params = SimulationParameters::default();
        for _ in 0..10 {
            sim.generate(&mut params);
        }
        assert!((sim.elapsed() - 0.5).abs() < 1e-9);
        sim.rewind();
        assert_eq!(sim.elapsed(), 0.0);
    }

    #[test]
    fn test_pattern_load_is_deterministic() {
        for pattern in GaitPattern::ALL {
            for sensor in 0..SENSOR_COUNT {
                assert_eq!(
                    pattern_load(pattern, 0.37, sensor),
                    pattern_load(pattern, 0.37, sensor)
                );
            }
        }
        assert_eq!(pattern_load(GaitPattern::None, 1.0, 0), 0.0);
    }
}
