// SoleStream - Insole telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Bounded in-memory ring of recently published frames

use std::collections::VecDeque;

use serde::Serialize;

use crate::analytics::Analytics;
use crate::frame::SensorFrame;

/// One published frame and its analytics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub frame: SensorFrame,
    pub analytics: Analytics,
}

/// Fixed-capacity history; the oldest entry is evicted first
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Newest `limit` entries, oldest first
    pub fn latest(&self, limit: usize) -> Vec<HistoryEntry> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
