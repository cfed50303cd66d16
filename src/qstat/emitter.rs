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

//! Turns parsed records into job samples, one collection pass at a time.

use std::collections::HashSet;
use thiserror::Error;

use super::record::FieldRecord;
use super::status::{OutOfQueueFilter, StatusTable};
use crate::metrics::{JobSample, MetricSink};

/// A record whose state is not in the status table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("couldn't map job status '{status}', fields '{record}'")]
pub struct MappingWarning {
    pub status: String,
    pub record: FieldRecord,
}

/// What happened to one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Emitted(f64),
    Unmapped,
    Duplicate,
    Filtered,
}

/// Per-pass totals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmitSummary {
    pub collected: usize,
    pub duplicates: usize,
    pub filtered: usize,
    pub unmapped: Vec<MappingWarning>,
}

/// State of one collection pass. Dropped when the pass ends.
#[derive(Debug)]
pub struct CollectionPass<'a> {
    table: &'a StatusTable,
    filter: &'a OutOfQueueFilter,
    seen: HashSet<String>,
    summary: EmitSummary,
}

impl<'a> CollectionPass<'a> {
    pub fn new(table: &'a StatusTable, filter: &'a OutOfQueueFilter) -> Self {
        Self {
            table,
            filter,
            seen: HashSet::new(),
            summary: EmitSummary::default(),
        }
    }

    /// Map `record` and emit it to `sink` unless it is unmapped, already
    /// emitted this pass, or filtered out.
    pub fn process<S: MetricSink + ?Sized>(
        &mut self,
        record: FieldRecord,
        sink: &mut S,
    ) -> Disposition {
        let status = record.status();
        let Some(value) = self.table.lookup(status) else {
            let warning = MappingWarning {
                status: status.to_string(),
                record,
            };
            tracing::warn!("{}", warning);
            self.summary.unmapped.push(warning);
            return Disposition::Unmapped;
        };

        if self.seen.contains(record.job_id()) {
            tracing::debug!("Job {} already emitted in this pass", record.job_id());
            self.summary.duplicates += 1;
            return Disposition::Duplicate;
        }

        if self.filter.rejects(status) {
            tracing::trace!("Job {} still in queue ({})", record.job_id(), status);
            self.summary.filtered += 1;
            return Disposition::Filtered;
        }

        self.seen.insert(record.job_id().to_string());
        sink.emit(JobSample {
            job_id: record.job_id().to_string(),
            owner: record.owner().to_string(),
            job_name: record.job_name().to_string(),
            status: status.to_string(),
            value,
        });
        self.summary.collected += 1;
        Disposition::Emitted(value)
    }

    pub fn collected(&self) -> usize {
        self.summary.collected
    }

    pub fn finish(self) -> EmitSummary {
        tracing::info!("{} jobs collected", self.summary.collected);
        self.summary
    }
}
