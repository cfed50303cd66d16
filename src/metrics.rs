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

//! Job gauge samples and their destinations.

use std::fmt::Write as _;

/// Gauge name for per-job samples
pub const USER_JOBS_METRIC: &str = "qstat_user_jobs";

const USER_JOBS_HELP: &str = "Jobs of the monitored user, valued by scheduler state";

/// One gauge sample for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSample {
    pub job_id: String,
    pub owner: String,
    pub job_name: String,
    /// Raw state token as printed by the scheduler
    pub status: String,
    pub value: f64,
}

/// Destination for emitted samples.
pub trait MetricSink {
    fn emit(&mut self, sample: JobSample);
}

impl MetricSink for Vec<JobSample> {
    fn emit(&mut self, sample: JobSample) {
        self.push(sample);
    }
}

impl<S: MetricSink + ?Sized> MetricSink for &mut S {
    fn emit(&mut self, sample: JobSample) {
        (**self).emit(sample);
    }
}

/// In-memory gauge set rendered in the Prometheus text format.
///
/// A sample with the same label set as an existing one overwrites it.
#[derive(Debug, Clone, Default)]
pub struct GaugeRegistry {
    samples: Vec<JobSample>,
}

impl GaugeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every sample and take `samples` instead.
    pub fn replace(&mut self, samples: impl IntoIterator<Item = JobSample>) {
        self.samples.clear();
        for sample in samples {
            self.emit(sample);
        }
    }

    pub fn samples(&self) -> &[JobSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Render the text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# HELP {USER_JOBS_METRIC} {USER_JOBS_HELP}");
        let _ = writeln!(out, "# TYPE {USER_JOBS_METRIC} gauge");
        for sample in &self.samples {
            let _ = writeln!(
                out,
                "{USER_JOBS_METRIC}{{job_id=\"{}\",username=\"{}\",job_name=\"{}\",status=\"{}\"}} {}",
                escape_label_value(&sample.job_id),
                escape_label_value(&sample.owner),
                escape_label_value(&sample.job_name),
                escape_label_value(&sample.status),
                format_value(sample.value),
            );
        }
        out
    }
}

impl MetricSink for GaugeRegistry {
    fn emit(&mut self, sample: JobSample) {
        let existing = self.samples.iter_mut().find(|s| {
            s.job_id == sample.job_id
                && s.owner == sample.owner
                && s.job_name == sample.job_name
                && s.status == sample.status
        });
        match existing {
            Some(slot) => slot.value = sample.value,
            None => self.samples.push(sample),
        }
    }
}

fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else {
        value.to_string()
    }
}
