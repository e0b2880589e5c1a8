// SoleStream - Insole telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sensor frame model
//!
//! A [`SensorFrame`] is one synchronized set of eight capacitance readings.
//! Readings are sanitized on construction so that every frame handed to the
//! analytics engine holds exactly eight finite, non-negative values.
//!
//! # Record Format
//!
//! Hardware sources deliver one record per line:
//!
//! ```text
//! c0,c1,c2,c3,c4,c5,c6,c7\n
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ReadError;
use crate::layout::SENSOR_COUNT;

/// Where a frame came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Simulated,
    Hardware,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Simulated => "simulated",
            SourceTag::Hardware => "hardware",
        }
    }
}

/// One set of eight capacitance readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorFrame {
    readings: [f64; SENSOR_COUNT],
    /// Seconds since the Unix epoch
    timestamp: f64,
    /// Acquisition order, assigned by the tick scheduler
    sequence: u64,
    source: SourceTag,
}

impl SensorFrame {
    /// Create a frame stamped with the current wall-clock time
    pub fn new(readings: [f64; SENSOR_COUNT], source: SourceTag) -> Self {
        Self::with_timestamp(readings, source, now_seconds())
    }

    /// Create a frame with an explicit timestamp
    ///
    /// Negative and non-finite readings are clamped to zero.
    pub fn with_timestamp(readings: [f64; SENSOR_COUNT], source: SourceTag, timestamp: f64) -> Self {
        Self {
            readings: readings.map(sanitize),
            timestamp,
            sequence: 0,
            source,
        }
    }

    /// Return the frame with its acquisition sequence number set
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn readings(&self) -> &[f64; SENSOR_COUNT] {
        &self.readings
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn source(&self) -> SourceTag {
        self.source
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Parse one hardware record into eight readings
///
/// Surrounding whitespace and a trailing carriage return are ignored. The
/// record must contain exactly eight comma-separated finite numbers.
pub fn parse_record(record: &str) -> Result<[f64; SENSOR_COUNT], ReadError> {
    let trimmed = record.trim();
    let malformed = |reason: String| ReadError::Malformed {
        record: trimmed.to_string(),
        reason,
    };

    let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();
    if fields.len() != SENSOR_COUNT {
        return Err(malformed(format!(
            "expected {} fields, got {}",
            SENSOR_COUNT,
            fields.len()
        )));
    }

    let mut readings = [0.0; SENSOR_COUNT];
    for (i, field) in fields.iter().enumerate() {
        let value: f64 = field
            .parse()
            .map_err(|_| malformed(format!("field {} is not a number: {:?}", i, field)))?;
        if !value.is_finite() {
            return Err(malformed(format!("field {} is not finite", i)));
        }
        readings[i] = value;
    }

    Ok(readings)
}
