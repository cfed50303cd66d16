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

//! Collection passes.
//!
//! A pass connects to the scheduler host, runs the status command, parses
//! its output while the command is still running, and emits one sample per
//! job. [`run_periodic`] repeats passes on an interval and publishes each
//! pass's samples into a shared [`GaugeRegistry`].

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncReadExt};
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::metrics::{GaugeRegistry, JobSample, MetricSink};
use crate::qstat::{
    CollectionPass, MappingWarning, OutOfQueueFilter, ParseError, ParseWarning, ParserOptions,
    StatusTable, TableParser,
};
use crate::ssh::{
    command, CommandError, ConnectOptions, ConnectionError, CredentialSource, PtyConfig,
    RemoteConnection, RemoteEndpoint, SessionBuffers, SessionError,
};

/// Registry shared between the collection loop and its readers
pub type SharedRegistry = Arc<RwLock<GaugeRegistry>>;

/// Where and how to run the status command.
#[derive(Debug, Clone)]
pub struct CollectTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credentials: CredentialSource,
    pub connect: ConnectOptions,
    pub pty: PtyConfig,
    pub command: String,
    /// `KEY=VALUE` entries applied before the command
    pub env: Vec<String>,
}

impl CollectTarget {
    /// The default command reports the jobs of the login user.
    pub fn default_command(username: &str) -> String {
        format!("qstat -u {username}")
    }
}

/// How output is parsed and mapped.
#[derive(Debug, Clone, Default)]
pub struct PassSettings {
    pub parser: ParserOptions,
    pub statuses: StatusTable,
    pub filter: OutOfQueueFilter,
}

/// Errors that end a pass early.
#[derive(Debug, Error)]
pub enum PassError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("remote command failed: {0}")]
    Command(#[from] CommandError),

    #[error(transparent)]
    Stream(ParseError),

    #[error("collection pass cancelled")]
    Cancelled,
}

/// Outcome of one pass.
///
/// Samples emitted before a failure stay emitted; `error` says why the pass
/// ended early.
#[derive(Debug, Default)]
pub struct PassReport {
    pub collected: usize,
    pub duplicates: usize,
    pub filtered: usize,
    pub malformed: Vec<ParseWarning>,
    pub unmapped: Vec<MappingWarning>,
    pub error: Option<PassError>,
}

impl PassReport {
    fn failed(error: PassError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn log(&self) {
        match &self.error {
            None => tracing::info!(
                collected = self.collected,
                malformed = self.malformed.len(),
                unmapped = self.unmapped.len(),
                duplicates = self.duplicates,
                filtered = self.filtered,
                "Collection pass finished"
            ),
            Some(e) => tracing::error!(collected = self.collected, "Collection pass failed: {e}"),
        }
    }
}

/// Parse a report stream and emit its jobs to `sink`.
///
/// Malformed lines are logged and skipped. Read failures and a stalled
/// stream end the pass with [`PassError::Stream`].
pub async fn collect_from_stream<R, S>(reader: R, settings: &PassSettings, sink: &mut S) -> PassReport
where
    R: AsyncBufRead + Unpin,
    S: MetricSink + ?Sized,
{
    let mut parser = TableParser::new(reader, settings.parser.clone());
    let mut pass = CollectionPass::new(&settings.statuses, &settings.filter);
    let mut malformed = Vec::new();
    let mut error = None;

    while let Some(item) = parser.next_record().await {
        match item {
            Ok(record) => {
                pass.process(record, sink);
            }
            Err(ParseError::Malformed(warning)) => {
                tracing::warn!("qstat line parse failed: {warning}");
                malformed.push(warning);
            }
            Err(e) => {
                error = Some(PassError::Stream(e));
            }
        }
    }

    let summary = pass.finish();
    PassReport {
        collected: summary.collected,
        duplicates: summary.duplicates,
        filtered: summary.filtered,
        malformed,
        unmapped: summary.unmapped,
        error,
    }
}

/// Run one full pass against `target`.
///
/// Connection and session failures produce an empty report carrying the
/// error. A command failure keeps whatever was parsed before it.
pub async fn run_pass<S>(
    target: &CollectTarget,
    settings: &PassSettings,
    sink: &mut S,
    cancel: &CancellationToken,
) -> PassReport
where
    S: MetricSink + ?Sized,
{
    tracing::debug!("Collecting with '{}' on {}", target.command, target.host);

    let connection = tokio::select! {
        _ = cancel.cancelled() => Err(PassError::Cancelled),
        result = connect(target) => result.map_err(PassError::from),
    };

    let report = match connection {
        Ok(connection) => {
            let report = run_on_connection(&connection, target, settings, sink, cancel).await;
            if let Err(e) = connection.disconnect().await {
                tracing::debug!("Disconnect from {} failed: {e}", target.host);
            }
            report
        }
        Err(e) => PassReport::failed(e),
    };

    report.log();
    report
}

async fn connect(target: &CollectTarget) -> Result<RemoteConnection, ConnectionError> {
    let auth = target
        .credentials
        .resolve()
        .await
        .map_err(|source| ConnectionError::Credentials {
            user: target.username.clone(),
            source,
        })?;
    let endpoint = RemoteEndpoint::new(&target.host, target.port, &target.username, auth);
    RemoteConnection::connect(endpoint, &target.connect).await
}

async fn run_on_connection<S>(
    connection: &RemoteConnection,
    target: &CollectTarget,
    settings: &PassSettings,
    sink: &mut S,
    cancel: &CancellationToken,
) -> PassReport
where
    S: MetricSink + ?Sized,
{
    let session_cancel = cancel.child_token();
    let opened = tokio::select! {
        _ = cancel.cancelled() => Err(PassError::Cancelled),
        result = connection.open_session(
            SessionBuffers::default(),
            &target.pty,
            session_cancel.clone(),
        ) => result.map_err(PassError::from),
    };
    let mut session = match opened {
        Ok(session) => session,
        Err(e) => return PassReport::failed(e),
    };
    let (Some(stdout), Some(mut stderr)) = (session.take_stdout(), session.take_stderr()) else {
        return PassReport::failed(PassError::Session(SessionError::Closed));
    };

    // Runner and parser run side by side so the command never waits on a
    // full buffer and the parser never waits on a finished command.
    let runner = async {
        let result = command::run(&mut session, &target.command, &target.env).await;
        if result.is_err() {
            session_cancel.cancel();
        }
        result
    };
    let parser = async {
        let report = collect_from_stream(stdout, settings, sink).await;
        if report.error.is_some() {
            session_cancel.cancel();
        }
        report
    };
    let errors = async {
        let mut buf = Vec::new();
        if let Err(e) = stderr.read_to_end(&mut buf).await {
            tracing::debug!("Reading remote stderr failed: {e}");
        }
        String::from_utf8_lossy(&buf).into_owned()
    };
    let (run_result, mut report, stderr_text) = tokio::join!(runner, parser, errors);

    session.close().await;

    if cancel.is_cancelled() {
        report.error = Some(PassError::Cancelled);
    } else if report.error.is_none() {
        match run_result {
            Ok(exit) => tracing::debug!(
                "'{}' exited with {} ({} env entries applied)",
                target.command,
                exit.exit_status,
                exit.env_applied
            ),
            Err(e) => {
                if !stderr_text.trim().is_empty() {
                    tracing::warn!("{} stderr: {}", target.command, stderr_text.trim());
                }
                report.error = Some(PassError::Command(e));
            }
        }
    }

    report
}

/// Run a pass every `interval` until `cancel` fires.
///
/// Each pass replaces the registry contents with its own samples. A failed
/// pass publishes what it collected before failing. `on_pass` observes every
/// report together with the updated registry.
pub async fn run_periodic<F>(
    target: &CollectTarget,
    settings: &PassSettings,
    registry: SharedRegistry,
    interval: Duration,
    cancel: CancellationToken,
    mut on_pass: F,
) where
    F: FnMut(&PassReport, &GaugeRegistry),
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Collector stopped");
                break;
            }
            _ = ticker.tick() => {
                let mut samples: Vec<JobSample> = Vec::new();
                let report = run_pass(target, settings, &mut samples, &cancel).await;
                if matches!(report.error, Some(PassError::Cancelled)) {
                    tracing::info!("Collector stopped during a pass");
                    break;
                }

                let mut registry = registry.write().await;
                registry.replace(samples);
                on_pass(&report, &registry);
            }
        }
    }
}
