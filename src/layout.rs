// SoleStream - Insole telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Insole sensor layout
//!
//! Fixed anatomical placement of the eight capacitive cells and their
//! simulation characteristics. Coordinates are normalized to the insole
//! outline: `x` runs medial (0.0) to lateral (1.0), `y` runs heel (0.0) to
//! toe (1.0).
//!
//! ```text
//!        6   7        toes
//!      3   4   5      metatarsal heads
//!              2      lateral midfoot
//!        0   1        heel
//! ```

use serde::{Deserialize, Serialize};

/// Number of cells in one insole frame
pub const SENSOR_COUNT: usize = 8;

/// Indices of the heel cells
pub const HEEL_SENSORS: [usize; 2] = [0, 1];

/// Indices of the toe cells
pub const TOE_SENSORS: [usize; 2] = [6, 7];

/// A point on the insole plane
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Static description of one cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSpec {
    /// Short anatomical name
    pub name: &'static str,
    /// Position on the insole plane
    pub position: Point,
    /// Unloaded capacitance reading
    pub baseline: f64,
    /// Standard deviation of simulated noise
    pub noise_std: f64,
    /// Lowest reading the cell can report
    pub min: f64,
    /// Highest reading the cell can report
    pub max: f64,
}

impl SensorSpec {
    /// Clamp a reading into this cell's valid range
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

const fn cell(name: &'static str, x: f64, y: f64) -> SensorSpec {
    SensorSpec {
        name,
        position: Point::new(x, y),
        baseline: 2.0,
        noise_std: 0.05,
        min: 0.0,
        max: 40.0,
    }
}

/// The eight cells in frame order
pub const SENSOR_LAYOUT: [SensorSpec; SENSOR_COUNT] = [
    cell("heel_medial", 0.35, 0.10),
    cell("heel_lateral", 0.65, 0.10),
    cell("midfoot_lateral", 0.72, 0.42),
    cell("metatarsal_1", 0.28, 0.68),
    cell("metatarsal_3", 0.50, 0.71),
    cell("metatarsal_5", 0.74, 0.66),
    cell("hallux", 0.30, 0.90),
    cell("lesser_toes", 0.58, 0.88),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_inside_insole() {
        for spec in SENSOR_LAYOUT {
            assert!((0.0..=1.0).contains(&spec.position.x), "{}", spec.name);
            assert!((0.0..=1.0).contains(&spec.position.y), "{}", spec.name);
            assert!(spec.min <= spec.baseline && spec.baseline <= spec.max);
        }
    }

    #[test]
    fn test_heel_behind_toes() {
        for heel in HEEL_SENSORS {
            for toe in TOE_SENSORS {
                assert!(SENSOR_LAYOUT[heel].position.y < SENSOR_LAYOUT[toe].position.y);
            }
        }
    }

    #[test]
    fn test_clamp() {
        let spec = SENSOR_LAYOUT[0];
        assert_eq!(spec.clamp(-1.0), 0.0);
        assert_eq!(spec.clamp(100.0), spec.max);
        assert_eq!(spec.clamp(3.5), 3.5);
    }
}
