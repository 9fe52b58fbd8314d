//! Bounded per-activity sample history.
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Rate samples for one activity, oldest first.
///
/// Capacity belongs to the schema rather than the history, so callers pass it
/// on every insertion. The persisted form is a plain JSON array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleHistory {
    samples: VecDeque<f64>,
}

impl SampleHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample, evicting the oldest ones once `capacity` is exceeded.
    pub fn push_bounded(&mut self, sample: f64, capacity: usize) {
        self.samples.push_back(sample);
        self.truncate_to(capacity);
    }

    /// Drop the oldest samples until at most `capacity` remain.
    pub fn truncate_to(&mut self, capacity: usize) {
        while self.samples.len() > capacity {
            self.samples.pop_front();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    #[must_use]
    pub fn newest(&self) -> Option<f64> {
        self.samples.back().copied()
    }
}

impl FromIterator<f64> for SampleHistory {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}
