//! Transition log.
//!
//! The machine appends a timestamped record for the start transition and
//! every processed transition, giving observers an ordered, serializable
//! account of where the machine has been.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Record of a single performed transition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Debug rendering of the triggering event.
    pub event: String,
    /// Name of the source state, when it has one.
    pub source: Option<String>,
    /// Name of the entered state; `None` for stay transitions.
    pub target: Option<String>,
    /// When the transition completed.
    pub timestamp: DateTime<Utc>,
}

/// Ordered, capacity-bounded log of transition records.
///
/// When the capacity is reached the oldest record is dropped; a capacity of
/// zero disables recording entirely.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransitionLog {
    capacity: usize,
    records: Vec<TransitionRecord>,
}

impl TransitionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, record: TransitionRecord) {
        if self.capacity == 0 {
            return;
        }
        if self.records.len() == self.capacity {
            self.records.remove(0);
        }
        self.records.push(record);
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }

    pub fn records(&self) -> &[TransitionRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&TransitionRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Time between the first and last record.
    pub fn span(&self) -> Option<Duration> {
        let first = self.records.first()?;
        let last = self.records.last()?;
        Some(last.timestamp - first.timestamp)
    }
}
