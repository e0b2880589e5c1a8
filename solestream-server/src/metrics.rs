// SoleStream Server - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics for the telemetry engine.
//!
//! Values are refreshed from an engine [`Snapshot`] on every scrape.

use lazy_static::lazy_static;
use prometheus::{register_gauge, register_gauge_vec, Encoder, Gauge, GaugeVec, TextEncoder};
use solestream::{GaitPhase, Snapshot};

lazy_static! {
    // ============================================================
    // Stream
    // ============================================================

    pub static ref FRAMES_PUBLISHED: Gauge = register_gauge!(
        "solestream_frames_published_total",
        "Frames published to subscribers"
    ).expect("register solestream_frames_published_total");

    pub static ref HARDWARE_FRAMES: Gauge = register_gauge!(
        "solestream_hardware_frames_total",
        "Published frames that came from hardware"
    ).expect("register solestream_hardware_frames_total");

    /// Skipped ticks, labeled by reason (idle, paused, empty, failed).
    pub static ref TICKS_SKIPPED: GaugeVec = register_gauge_vec!(
        "solestream_ticks_skipped_total",
        "Ticks that published no frame",
        &["reason"]
    ).expect("register solestream_ticks_skipped_total");

    /// Published frames per gait phase.
    pub static ref GAIT_PHASE_FRAMES: GaugeVec = register_gauge_vec!(
        "solestream_gait_phase_frames_total",
        "Published frames per gait phase",
        &["phase"]
    ).expect("register solestream_gait_phase_frames_total");

    /// Total force of the last published frame.
    pub static ref LAST_TOTAL_FORCE: Gauge = register_gauge!(
        "solestream_last_total_force",
        "Total calibrated force of the last frame"
    ).expect("register solestream_last_total_force");

    // ============================================================
    // Connection and subscribers
    // ============================================================

    /// 1 while a hardware source is active.
    pub static ref CONNECTED: Gauge = register_gauge!(
        "solestream_hardware_connected",
        "Hardware source active (1) or simulation (0)"
    ).expect("register solestream_hardware_connected");

    pub static ref FALLBACKS: Gauge = register_gauge!(
        "solestream_fallbacks_total",
        "Automatic fallbacks from hardware to simulation"
    ).expect("register solestream_fallbacks_total");

    pub static ref CONNECT_FAILURES: Gauge = register_gauge!(
        "solestream_connect_failures_total",
        "Connect requests that failed"
    ).expect("register solestream_connect_failures_total");

    pub static ref SUBSCRIBERS: Gauge = register_gauge!(
        "solestream_subscribers",
        "Active subscribers"
    ).expect("register solestream_subscribers");

    pub static ref SUBSCRIBERS_PRUNED: Gauge = register_gauge!(
        "solestream_subscribers_pruned_total",
        "Subscribers removed after a failed delivery"
    ).expect("register solestream_subscribers_pruned_total");
}

const PHASES: [GaitPhase; 4] = [
    GaitPhase::Swing,
    GaitPhase::HeelStrike,
    GaitPhase::Stance,
    GaitPhase::ToeOff,
];

/// Update all gauges from an engine snapshot.
pub fn update_from_snapshot(snapshot: &Snapshot) {
    let stats = &snapshot.stats;

    FRAMES_PUBLISHED.set(stats.frames_published as f64);
    HARDWARE_FRAMES.set(stats.hardware_frames as f64);
    for (reason, value) in [
        ("idle", stats.ticks_idle),
        ("paused", stats.ticks_paused),
        ("empty", stats.ticks_empty),
        ("failed", stats.read_failures),
    ] {
        TICKS_SKIPPED.with_label_values(&[reason]).set(value as f64);
    }
    for phase in PHASES {
        let count = stats.phase_distribution.get(&phase).copied().unwrap_or(0);
        GAIT_PHASE_FRAMES
            .with_label_values(&[phase.as_str()])
            .set(count as f64);
    }
    if let Some(analytics) = &snapshot.analytics {
        LAST_TOTAL_FORCE.set(analytics.total_force);
    }

    CONNECTED.set(if snapshot.connection_state.is_connected() { 1.0 } else { 0.0 });
    FALLBACKS.set(stats.fallbacks as f64);
    CONNECT_FAILURES.set(stats.connect_failures as f64);
    SUBSCRIBERS.set(snapshot.subscribers as f64);
    SUBSCRIBERS_PRUNED.set(stats.subscribers_pruned as f64);
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
