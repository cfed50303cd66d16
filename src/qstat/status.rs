// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Job state vocabulary.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Lookup from a scheduler's state letter to a gauge value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusTable {
    states: BTreeMap<String, f64>,
}

impl StatusTable {
    pub fn new<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self {
            states: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Torque/PBS job states as printed in the `S` column of `qstat`.
    pub fn torque() -> Self {
        Self::new([
            ("Q", 0.0), // queued
            ("R", 1.0), // running
            ("E", 2.0), // exiting
            ("C", 3.0), // completed
            ("H", 4.0), // held
            ("W", 5.0), // waiting for start time
            ("T", 6.0), // moving
            ("S", 7.0), // suspended
        ])
    }

    pub fn lookup(&self, status: &str) -> Option<f64> {
        self.states.get(status).copied()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl Default for StatusTable {
    fn default() -> Self {
        Self::torque()
    }
}

/// Optional policy that only reports jobs that have left the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutOfQueueFilter {
    pub enabled: bool,
    /// States that still count as in the queue
    pub in_queue: BTreeSet<String>,
}

impl OutOfQueueFilter {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    /// Whether a job in `status` is skipped.
    pub fn rejects(&self, status: &str) -> bool {
        self.enabled && self.in_queue.contains(status)
    }
}

impl Default for OutOfQueueFilter {
    fn default() -> Self {
        Self {
            enabled: false,
            in_queue: ["E", "Q", "R"].into_iter().map(String::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_torque_table() {
        let table = StatusTable::torque();
        assert_eq!(table.lookup("C"), Some(3.0));
        assert_eq!(table.lookup("Q"), Some(0.0));
        assert_eq!(table.lookup("X"), None);
        assert_eq!(table.lookup("c"), None);
        assert_eq!(table.len(), 8);
    }

    #[test]
    fn test_table_from_yaml() {
        let table: StatusTable = serde_yaml::from_str("PD: 0\nR: 1\nCD: 3.5\n").unwrap();
        assert_eq!(table.lookup("CD"), Some(3.5));
        assert_eq!(table.lookup("C"), None);
    }

    #[test]
    fn test_filter_disabled_by_default() {
        let filter = OutOfQueueFilter::default();
        assert!(!filter.rejects("R"));
        assert!(!filter.rejects("C"));
    }

    #[test]
    fn test_filter_rejects_in_queue_states() {
        let filter = OutOfQueueFilter::enabled();
        for status in ["E", "Q", "R"] {
            assert!(filter.rejects(status), "{status} should be filtered");
        }
        assert!(!filter.rejects("C"));
        assert!(!filter.rejects("H"));
    }
}
