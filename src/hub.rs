// SoleStream - Insole telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Broadcast hub
//!
//! The [`Hub`] owns the subscriber set and fans every published envelope out
//! to all members. Delivery is per-recipient and never blocks: a sink that
//! cannot take a message right now (queue full) or at all (closed) is removed
//! while the remaining subscribers still get the message.
//!
//! Each sink receives envelopes in publish order, so a subscriber sees frames
//! in acquisition order with no duplicates.

use std::collections::HashMap;
use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::message::SharedEnvelope;

/// Opaque handle of a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Why a delivery failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The subscriber is not keeping up
    Lagging,
    /// The subscriber is gone
    Closed,
}

/// Destination of published messages
pub trait Sink: Send {
    /// Hand over one envelope without blocking
    fn deliver(&mut self, envelope: &SharedEnvelope) -> Result<(), DeliveryError>;
}

impl Sink for mpsc::Sender<SharedEnvelope> {
    fn deliver(&mut self, envelope: &SharedEnvelope) -> Result<(), DeliveryError> {
        self.try_send(envelope.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Lagging,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Outcome of one publish
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub pruned: Vec<SubscriberId>,
}

/// Subscriber set with best-effort fan-out
#[derive(Default)]
pub struct Hub {
    sinks: HashMap<SubscriberId, Box<dyn Sink>>,
    next_id: u64,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink and return its handle
    pub fn subscribe(&mut self, sink: Box<dyn Sink>) -> SubscriberId {
        self.next_id += 1;
        let id = SubscriberId(self.next_id);
        self.sinks.insert(id, sink);
        debug!("{} subscribed ({} active)", id, self.sinks.len());
        id
    }

    /// Remove a sink; unknown ids are ignored
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let removed = self.sinks.remove(&id).is_some();
        if removed {
            debug!("{} unsubscribed ({} active)", id, self.sinks.len());
        }
        removed
    }

    /// Deliver one envelope to a single subscriber, pruning it on failure
    pub fn deliver_to(&mut self, id: SubscriberId, envelope: &SharedEnvelope) -> bool {
        let result = match self.sinks.get_mut(&id) {
            Some(sink) => sink.deliver(envelope),
            None => return false,
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("pruning {}: {:?}", id, e);
                self.sinks.remove(&id);
                false
            }
        }
    }

    /// Deliver one envelope to every subscriber
    pub fn publish(&mut self, envelope: &SharedEnvelope) -> PublishReport {
        let mut report = PublishReport::default();

        for (id, sink) in self.sinks.iter_mut() {
            match sink.deliver(envelope) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("pruning {}: {:?}", id, e);
                    report.pruned.push(*id);
                }
            }
        }

        for id in &report.pruned {
            self.sinks.remove(id);
        }

        report
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.sinks.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.sinks.keys().copied().collect();
        ids.sort();
        f.debug_struct("Hub").field("subscribers", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Envelope, OutboundMessage, StatusMessage};

    struct FailingSink;

    impl Sink for FailingSink {
        fn deliver(&mut self, _envelope: &SharedEnvelope) -> Result<(), DeliveryError> {
            Err(DeliveryError::Closed)
        }
    }

    fn envelope(device: &str) -> SharedEnvelope {
        let mut status = StatusMessage::simulated();
        status.device_name = Some(device.to_string());
        Envelope::encode(OutboundMessage::Status(status)).unwrap()
    }

    #[test]
    fn test_fan_out_survives_failing_sink() {
        let mut hub = Hub::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = mpsc::channel(16);
            hub.subscribe(Box::new(tx));
            receivers.push(rx);
        }
        let bad = hub.subscribe(Box::new(FailingSink));

        let report = hub.publish(&envelope("a"));
        assert_eq!(report.delivered, 3);
        assert_eq!(report.pruned, vec![bad]);
        assert!(!hub.contains(bad));

        let report = hub.publish(&envelope("b"));
        assert_eq!(report.delivered, 3);
        assert!(report.pruned.is_empty());

        for rx in receivers.iter_mut() {
            let first = rx.try_recv().unwrap();
            let second = rx.try_recv().unwrap();
            assert_eq!(first.status().unwrap().device_name.as_deref(), Some("a"));
            assert_eq!(second.status().unwrap().device_name.as_deref(), Some("b"));
        }
    }

    #[test]
    fn test_lagging_subscriber_is_pruned() {
        let mut hub = Hub::new();
        let (tx, _rx) = mpsc::channel(1);
        let slow = hub.subscribe(Box::new(tx));

        assert_eq!(hub.publish(&envelope("1")).delivered, 1);
        let report = hub.publish(&envelope("2"));
        assert_eq!(report.pruned, vec![slow]);
        assert!(hub.is_empty());
    }

    #[test]
    fn test_closed_receiver_is_pruned() {
        let mut hub = Hub::new();
        let (tx, rx) = mpsc::channel(4);
        let id = hub.subscribe(Box::new(tx));
        drop(rx);
        assert!(!hub.deliver_to(id, &envelope("x")));
        assert!(!hub.contains(id));
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let mut hub = Hub::new();
        let (tx, _rx) = mpsc::channel(4);
        let id = hub.subscribe(Box::new(tx));
        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        assert_eq!(hub.len(), 0);
    }
}
