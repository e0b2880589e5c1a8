//! Engine statistics
//!
//! Counters describing what the tick loop did: frames published, ticks
//! skipped and why, fallbacks, pruned subscribers, and the distribution of
//! gait phases seen in published frames.

use std::collections::HashMap;

use serde::Serialize;

use crate::analytics::GaitPhase;

/// Why a tick produced no frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No subscribers
    Idle,
    /// Simulation paused
    Paused,
    /// Hardware had nothing ready
    Empty,
    /// Hardware read failed
    Failed,
}

/// Engine statistics collector
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    /// Ticks processed
    pub ticks: u64,
    /// Frames published to the hub
    pub frames_published: u64,
    /// Frames that came from hardware
    pub hardware_frames: u64,
    pub ticks_idle: u64,
    pub ticks_paused: u64,
    pub ticks_empty: u64,
    /// Hardware read failures
    pub read_failures: u64,
    /// Automatic fallbacks to simulation
    pub fallbacks: u64,
    /// Status messages published
    pub status_messages: u64,
    /// Subscribers removed after a failed delivery
    pub subscribers_pruned: u64,
    /// Successful per-subscriber deliveries
    pub deliveries: u64,
    /// Connect requests that failed
    pub connect_failures: u64,
    /// Gait phase of published frames
    pub phase_distribution: HashMap<GaitPhase, u64>,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a published frame
    pub fn record_frame(&mut self, phase: GaitPhase, hardware: bool, delivered: usize) {
        self.ticks += 1;
        self.frames_published += 1;
        if hardware {
            self.hardware_frames += 1;
        }
        self.deliveries += delivered as u64;
        *self.phase_distribution.entry(phase).or_insert(0) += 1;
    }

    /// Record a tick that produced nothing
    pub fn record_skip(&mut self, reason: SkipReason) {
        self.ticks += 1;
        match reason {
            SkipReason::Idle => self.ticks_idle += 1,
            SkipReason::Paused => self.ticks_paused += 1,
            SkipReason::Empty => self.ticks_empty += 1,
            SkipReason::Failed => self.read_failures += 1,
        }
    }

    pub fn record_status(&mut self, delivered: usize) {
        self.status_messages += 1;
        self.deliveries += delivered as u64;
    }

    pub fn record_pruned(&mut self, count: usize) {
        self.subscribers_pruned += count as u64;
    }

    pub fn record_fallback(&mut self) {
        self.fallbacks += 1;
    }

    pub fn record_connect_failure(&mut self) {
        self.connect_failures += 1;
    }

    /// Ticks that published nothing
    pub fn ticks_skipped(&self) -> u64 {
        self.ticks_idle + self.ticks_paused + self.ticks_empty + self.read_failures
    }

    /// Fraction of ticks that published a frame (0.0 - 1.0)
    pub fn publish_ratio(&self) -> f64 {
        if self.ticks == 0 {
            return 0.0;
        }
        self.frames_published as f64 / self.ticks as f64
    }

    /// Most frequent gait phase so far
    pub fn most_common_phase(&self) -> Option<GaitPhase> {
        self.phase_distribution
            .iter()
            .max_by_key(|(_, count)| *count)
            .map(|(phase, _)| *phase)
    }

    /// Reset all counters
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Generate a human-readable report
    pub fn report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== SoleStream Engine Stats ===\n\n");
        report.push_str(&format!("Ticks: {}\n", self.ticks));
        report.push_str(&format!(
            "Frames published: {} ({} from hardware)\n",
            self.frames_published, self.hardware_frames
        ));
        report.push_str(&format!(
            "Ticks skipped: {} (idle {}, paused {}, empty {}, failed {})\n",
            self.ticks_skipped(),
            self.ticks_idle,
            self.ticks_paused,
            self.ticks_empty,
            self.read_failures
        ));
        report.push_str(&format!("Fallbacks: {}\n", self.fallbacks));
        report.push_str(&format!(
            "Subscribers pruned: {}\n\n",
            self.subscribers_pruned
        ));

        report.push_str("Gait phases:\n");
        let mut phases: Vec<_> = self.phase_distribution.iter().collect();
        phases.sort_by(|a, b| b.1.cmp(a.1));
        for (phase, count) in phases {
            let percent = if self.frames_published > 0 {
                (*count as f64 / self.frames_published as f64) * 100.0
            } else {
                0.0
            };
            report.push_str(&format!("  {}: {} ({:.1}%)\n", phase.as_str(), count, percent));
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_ratio() {
        let mut stats = EngineStats::new();
        stats.record_frame(GaitPhase::Stance, false, 2);
        stats.record_skip(SkipReason::Paused);
        stats.record_skip(SkipReason::Idle);
        stats.record_frame(GaitPhase::Stance, true, 2);

        assert!((stats.publish_ratio() - 0.5).abs() < 0.01);
        assert_eq!(stats.ticks_skipped(), 2);
        assert_eq!(stats.hardware_frames, 1);
        assert_eq!(stats.deliveries, 4);
    }

    #[test]
    fn test_phase_distribution() {
        let mut stats = EngineStats::new();
        stats.record_frame(GaitPhase::Swing, false, 1);
        stats.record_frame(GaitPhase::HeelStrike, false, 1);
        stats.record_frame(GaitPhase::HeelStrike, false, 1);

        assert_eq!(stats.most_common_phase(), Some(GaitPhase::HeelStrike));
    }

    #[test]
    fn test_report_generation() {
        let mut stats = EngineStats::new();
        stats.record_frame(GaitPhase::ToeOff, false, 1);
        stats.record_fallback();

        let report = stats.report();
        assert!(report.contains("Fallbacks: 1"));
        assert!(report.contains("ToeOff"));
    }

    #[test]
    fn test_empty_stats() {
        let stats = EngineStats::new();
        assert_eq!(stats.publish_ratio(), 0.0);
        assert_eq!(stats.most_common_phase(), None);
    }

    #[test]
    fn test_reset() {
        let mut stats = EngineStats::new();
        stats.record_frame(GaitPhase::Swing, false, 3);
        stats.record_pruned(1);
        stats.reset();
        assert_eq!(stats, EngineStats::default());
    }
}
