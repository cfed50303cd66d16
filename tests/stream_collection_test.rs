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

//! Collection over a live pipe, the way a session feeds the parser.

use std::time::Duration;

use qstat_exporter::collector::{collect_from_stream, PassError, PassSettings};
use qstat_exporter::metrics::{GaugeRegistry, JobSample, MetricSink};
use qstat_exporter::qstat::{
    HeaderDetection, ParseError, ParserOptions, StatusTable, DEFAULT_IDLE_TIMEOUT,
};
use qstat_exporter::ssh::pipe;

const PREAMBLE: &str = "\r\n\
hazelhen-batch.hww.hlrs.de:\r\n\
                                                                                  Req'd       Req'd       Elap\r\n\
Job ID                  Username    Queue    Jobname          SessID  NDS   TSK   Memory      Time    S   Time\r\n\
----------------------- ----------- -------- ---------------- ------ ----- ------ --------- --------- - ---------\r\n";

fn job_line(id: usize, status: &str) -> String {
    format!("{id}.hazelhen-batch  xeuspimi    single   job{id}   8006     1    --        --   01:00:00 {status}       --\r\n")
}

#[tokio::test]
async fn test_clean_empty_pass() {
    let (writer, reader) = pipe();
    drop(writer);

    let mut sink: Vec<JobSample> = Vec::new();
    let report = collect_from_stream(reader, &PassSettings::default(), &mut sink).await;

    assert!(report.is_success());
    assert_eq!(report.collected, 0);
    assert!(report.malformed.is_empty());
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_output_arriving_in_fragments() {
    let (writer, reader) = pipe();

    let producer = tokio::spawn(async move {
        // Split mid-line and mid-preamble to mimic channel data boundaries
        let mut text = PREAMBLE.to_string();
        text.push_str(&job_line(1, "C"));
        text.push_str(&job_line(2, "R"));
        text.push_str("xeuspimi@eslogin004:~>\r\n");
        for chunk in text.as_bytes().chunks(37) {
            writer.write(chunk);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    });

    let mut registry = GaugeRegistry::new();
    let report = collect_from_stream(reader, &PassSettings::default(), &mut registry).await;
    producer.await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.collected, 2);
    assert_eq!(report.malformed.len(), 1);
    let rendered = registry.render();
    assert!(rendered.contains("job_id=\"1.hazelhen-batch\""));
    assert!(rendered.contains("status=\"R\"} 1\n"));
}

#[tokio::test]
async fn test_large_output_is_consumed_while_produced() {
    const JOBS: usize = 5000;
    let (writer, reader) = pipe();

    let producer = tokio::spawn(async move {
        writer.write(PREAMBLE.as_bytes());
        for id in 0..JOBS {
            writer.write(job_line(id, "C").as_bytes());
            if id % 500 == 0 {
                tokio::task::yield_now().await;
            }
        }
    });

    let mut sink: Vec<JobSample> = Vec::new();
    let report = tokio::time::timeout(
        Duration::from_secs(10),
        collect_from_stream(reader, &PassSettings::default(), &mut sink),
    )
    .await
    .expect("collection must finish once the producer closes");
    producer.await.unwrap();

    assert_eq!(report.collected, JOBS);
    assert_eq!(sink.len(), JOBS);
}

#[tokio::test]
async fn test_unknown_status_and_duplicates() {
    let mut text = PREAMBLE.to_string();
    text.push_str(&job_line(1, "C"));
    text.push_str(&job_line(1, "C"));
    text.push_str(&job_line(2, "Z"));

    let settings = PassSettings {
        statuses: StatusTable::new([("C", 3.0)]),
        ..Default::default()
    };
    let mut sink: Vec<JobSample> = Vec::new();
    let report = collect_from_stream(text.as_bytes(), &settings, &mut sink).await;

    assert_eq!(report.collected, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.unmapped.len(), 1);
    assert_eq!(report.unmapped[0].status, "Z");
}

#[tokio::test]
async fn test_legacy_fixed_preamble() {
    let mut text = PREAMBLE.to_string();
    text.push_str(&job_line(9, "C"));

    let settings = PassSettings {
        parser: ParserOptions {
            header: HeaderDetection::FixedLines(5),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut sink: Vec<JobSample> = Vec::new();
    let report = collect_from_stream(text.as_bytes(), &settings, &mut sink).await;

    assert_eq!(report.collected, 1);
    assert_eq!(sink[0].job_name, "job9");
}

#[tokio::test]
async fn test_stalled_stream_keeps_partial_results() {
    let (writer, reader) = pipe();
    writer.write(PREAMBLE.as_bytes());
    writer.write(job_line(1, "C").as_bytes());

    let settings = PassSettings {
        parser: ParserOptions {
            idle_timeout: Some(Duration::from_millis(100)),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut sink: Vec<JobSample> = Vec::new();
    let report = collect_from_stream(reader, &settings, &mut sink).await;

    assert_eq!(report.collected, 1);
    assert!(matches!(report.error, Some(PassError::Stream(_))));
    drop(writer);
}

#[tokio::test(start_paused = true)]
async fn test_silent_open_stream_ends_with_default_settings() {
    let (writer, reader) = pipe();
    writer.write(PREAMBLE.as_bytes());
    writer.write(job_line(1, "R").as_bytes());

    let started = tokio::time::Instant::now();
    let mut sink: Vec<JobSample> = Vec::new();
    let report = collect_from_stream(reader, &PassSettings::default(), &mut sink).await;

    assert_eq!(report.collected, 1);
    assert!(matches!(
        report.error,
        Some(PassError::Stream(ParseError::Stalled(idle))) if idle == DEFAULT_IDLE_TIMEOUT
    ));
    assert!(started.elapsed() >= DEFAULT_IDLE_TIMEOUT);
    drop(writer);
}

/// A sink that only counts, to show the collector works with any sink.
struct Counter(usize);

impl MetricSink for Counter {
    fn emit(&mut self, _sample: JobSample) {
        self.0 += 1;
    }
}

#[tokio::test]
async fn test_custom_sink() {
    let mut text = PREAMBLE.to_string();
    for id in 0..3 {
        text.push_str(&job_line(id, "Q"));
    }

    let mut counter = Counter(0);
    collect_from_stream(text.as_bytes(), &PassSettings::default(), &mut counter).await;
    assert_eq!(counter.0, 3);
}
