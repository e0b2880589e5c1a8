// SoleStream - Insole telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Analytics engine
//!
//! Pure, stateless transform from a [`SensorFrame`] to [`Analytics`]:
//!
//! 1. Linear calibration: `force = max(0, (capacitance - 2.0) * 2.5)`
//! 2. Gait phase from regional force averages (first match wins)
//! 3. Center of pressure as the force-weighted centroid of the cell layout
//!
//! # Example
//!
//! ```rust
//! use solestream::analytics::{Analytics, GaitPhase};
//!
//! let analytics = Analytics::from_forces([6.0, 6.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
//! assert_eq!(analytics.gait_phase, GaitPhase::HeelStrike);
//! assert!(analytics.center_of_pressure.is_some());
//! ```

use serde::{Deserialize, Serialize};

use crate::frame::SensorFrame;
use crate::layout::{Point, HEEL_SENSORS, SENSOR_COUNT, SENSOR_LAYOUT, TOE_SENSORS};

/// Capacitance reading at zero load
pub const CAPACITANCE_OFFSET: f64 = 2.0;

/// Force units per capacitance unit above the offset
pub const FORCE_GAIN: f64 = 2.5;

/// Heel average above which the foot is striking
pub const HEEL_STRIKE_THRESHOLD: f64 = 5.0;

/// Whole-foot average above which the foot is in stance
pub const STANCE_THRESHOLD: f64 = 3.0;

/// Toe average above which the foot is pushing off
pub const TOE_OFF_THRESHOLD: f64 = 5.0;

/// Phase of the gait cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GaitPhase {
    Swing,
    HeelStrike,
    Stance,
    ToeOff,
}

impl GaitPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            GaitPhase::Swing => "Swing",
            GaitPhase::HeelStrike => "HeelStrike",
            GaitPhase::Stance => "Stance",
            GaitPhase::ToeOff => "ToeOff",
        }
    }
}

/// Derived analytics for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    /// Calibrated force per cell
    pub forces: [f64; SENSOR_COUNT],
    pub total_force: f64,
    pub max_force: f64,
    pub average_force: f64,
    pub gait_phase: GaitPhase,
    /// `None` when nothing bears weight, which is distinct from a center at
    /// the origin
    pub center_of_pressure: Option<Point>,
}

impl Analytics {
    /// Compute analytics from raw capacitance readings
    pub fn from_frame(frame: &SensorFrame) -> Self {
        Self::from_forces(frame.readings().map(capacitance_to_force))
    }

    /// Compute analytics from already calibrated forces
    pub fn from_forces(forces: [f64; SENSOR_COUNT]) -> Self {
        let total_force: f64 = forces.iter().sum();
        let max_force = forces.iter().copied().fold(0.0, f64::max);

        Self {
            forces,
            total_force,
            max_force,
            average_force: total_force / SENSOR_COUNT as f64,
            gait_phase: classify_gait(&forces),
            center_of_pressure: center_of_pressure(&forces),
        }
    }
}

/// Fixed linear capacitance-to-force calibration
pub fn capacitance_to_force(capacitance: f64) -> f64 {
    ((capacitance - CAPACITANCE_OFFSET) * FORCE_GAIN).max(0.0)
}

fn region_average(forces: &[f64; SENSOR_COUNT], region: &[usize]) -> f64 {
    region.iter().map(|&i| forces[i]).sum::<f64>() / region.len() as f64
}

/// Classify the gait phase from calibrated forces
pub fn classify_gait(forces: &[f64; SENSOR_COUNT]) -> GaitPhase {
    let average = forces.iter().sum::<f64>() / SENSOR_COUNT as f64;

    if region_average(forces, &HEEL_SENSORS) > HEEL_STRIKE_THRESHOLD {
        GaitPhase::HeelStrike
    } else if average > STANCE_THRESHOLD {
        GaitPhase::Stance
    } else if region_average(forces, &TOE_SENSORS) > TOE_OFF_THRESHOLD {
        GaitPhase::ToeOff
    } else {
        GaitPhase::Swing
    }
}

/// Force-weighted centroid of the cell positions
///
/// Returns `None` when total force is not positive.
pub fn center_of_pressure(forces: &[f64; SENSOR_COUNT]) -> Option<Point> {
    let total: f64 = forces.iter().sum();
    if total <= 0.0 {
        return None;
    }

    let (sx, sy) = forces
        .iter()
        .zip(SENSOR_LAYOUT.iter())
        .fold((0.0, 0.0), |(sx, sy), (f, spec)| {
            (sx + f * spec.position.x, sy + f * spec.position.y)
        });

    Some(Point::new(sx / total, sy / total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::SourceTag;
    use approx::assert_relative_eq;

    #[test]
    fn test_calibration() {
        assert_eq!(capacitance_to_force(2.0), 0.0);
        assert_eq!(capacitance_to_force(0.5), 0.0);
        assert_relative_eq!(capacitance_to_force(6.0), 10.0);
    }

    #[test]
    fn test_heel_strike() {
        let forces = [6.0, 6.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        assert_eq!(classify_gait(&forces), GaitPhase::HeelStrike);
    }

    #[test]
    fn test_swing_when_unloaded() {
        assert_eq!(classify_gait(&[0.0; SENSOR_COUNT]), GaitPhase::Swing);
    }

    #[test]
    fn test_stance() {
        // Heel average 4 keeps heel strike out, overall average is 4
        assert_eq!(classify_gait(&[4.0; SENSOR_COUNT]), GaitPhase::Stance);
    }

    #[test]
    fn test_toe_off() {
        let forces = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 8.0, 8.0];
        assert_eq!(classify_gait(&forces), GaitPhase::ToeOff);
    }

    #[test]
    fn test_heel_strike_wins_over_stance() {
        let forces = [10.0, 10.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0];
        assert_eq!(classify_gait(&forces), GaitPhase::HeelStrike);
    }

    #[test]
    fn test_center_of_pressure_single_sensor() {
        let cop = center_of_pressure(&[10.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        assert_relative_eq!(cop.x, SENSOR_LAYOUT[0].position.x);
        assert_relative_eq!(cop.y, SENSOR_LAYOUT[0].position.y);
    }

    #[test]
    fn test_center_of_pressure_undefined_without_load() {
        assert_eq!(center_of_pressure(&[0.0; SENSOR_COUNT]), None);
    }

    #[test]
    fn test_center_of_pressure_between_two_sensors() {
        let mut forces = [0.0; SENSOR_COUNT];
        forces[0] = 5.0;
        forces[1] = 5.0;
        let cop = center_of_pressure(&forces).unwrap();
        let expected_x = (SENSOR_LAYOUT[0].position.x + SENSOR_LAYOUT[1].position.x) / 2.0;
        assert_relative_eq!(cop.x, expected_x);
    }

    #[test]
    fn test_from_frame() {
        let frame = SensorFrame::with_timestamp(
            [6.0, 6.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0],
            SourceTag::Hardware,
            0.0,
        );
        let analytics = Analytics::from_frame(&frame);
        assert_relative_eq!(analytics.total_force, 20.0);
        assert_relative_eq!(analytics.max_force, 10.0);
        assert_relative_eq!(analytics.average_force, 2.5);
        assert_eq!(analytics.gait_phase, GaitPhase::HeelStrike);
    }

    #[test]
    fn test_serialization_shape() {
        let analytics = Analytics::from_forces([0.0; SENSOR_COUNT]);
        let json = serde_json::to_value(&analytics).unwrap();
        assert_eq!(json["gaitPhase"], "Swing");
        assert!(json["centerOfPressure"].is_null());
        assert_eq!(json["totalForce"], 0.0);
    }
}
