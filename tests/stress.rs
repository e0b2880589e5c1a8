//! Stress tests for SoleStream
//!
//! Run with: cargo test --release stress -- --ignored

use std::sync::Arc;
use std::time::{Duration, Instant};

use solestream::hub::Hub;
use solestream::simulator::{SimulationParameters, Simulator};
use solestream::*;
use tokio::sync::mpsc;

#[test]
#[ignore] // Run manually with --ignored
fn stress_test_analytics() {
    let mut simulator = Simulator::new(Duration::from_millis(50), Some(1), 10.0);
    let mut params = SimulationParameters::new(GaitPattern::Running, true);

    let iterations = 1_000_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let frame = simulator.generate(&mut params);
        let analytics = Analytics::from_frame(&frame);
        assert!(analytics.total_force >= 0.0);
    }

    let elapsed = start.elapsed();
    let rate = iterations as f64 / elapsed.as_secs_f64();

    println!("Generated and analyzed {} frames in {:?}", iterations, elapsed);
    println!("Rate: {:.0} frames/second", rate);

    assert!(
        rate > 100_000.0,
        "Should process at least 100k frames/s, got {:.0}",
        rate
    );
}

#[test]
#[ignore]
fn stress_test_fan_out_with_churn() {
    let envelope = Envelope::encode(OutboundMessage::Status(StatusMessage::simulated())).unwrap();
    let mut hub = Hub::new();
    let mut receivers = Vec::new();

    let iterations = 10_000;
    let start = Instant::now();

    for i in 0..iterations {
        let (tx, rx) = mpsc::channel(4);
        hub.subscribe(Box::new(tx));
        // Every third subscriber goes away right after joining
        if i % 3 != 0 {
            receivers.push(rx);
        }
        hub.publish(&envelope);
        for rx in receivers.iter_mut() {
            while rx.try_recv().is_ok() {}
        }
    }

    let elapsed = start.elapsed();
    println!("{} publishes with churn in {:?}", iterations, elapsed);
    assert_eq!(hub.len(), receivers.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn stress_test_concurrent_subscribers() {
    let mut config = EngineConfig::default().with_tick_interval_ms(5).with_seed(9);
    config.read_poll_timeout_ms = 2;
    config.subscriber_queue_depth = 1024;
    let engine = Engine::spawn(config, Arc::new(MemoryTransports::new())).unwrap();

    let mut tasks = Vec::new();
    for _ in 0..64 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            let mut sub = engine.subscribe_channel().await.unwrap();
            let mut frames = 0;
            while frames < 100 {
                let envelope = sub.receiver.recv().await.unwrap();
                if let Some(telemetry) = envelope.telemetry() {
                    assert!(telemetry.sensors.iter().all(|v| *v >= 0.0));
                    frames += 1;
                }
            }
            engine.unsubscribe(sub.id).await.unwrap();
            frames
        }));
    }

    for task in tasks {
        assert_eq!(task.await.unwrap(), 100);
    }

    let history = engine.history(1000).await.unwrap();
    let sequences: Vec<u64> = history.iter().map(|e| e.frame.sequence()).collect();
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));
    engine.shutdown().await;
}
