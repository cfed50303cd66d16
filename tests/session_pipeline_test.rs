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

//! Sessions and full passes against an in-process SSH server.
//!
//! The server plays a scheduler login node: it accepts any password, records
//! environment and exec requests, and answers `exec` with a canned report.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use russh::keys::{Algorithm, PrivateKey};
use russh::server::{self, Auth, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec, Pty};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use qstat_exporter::collector::{run_pass, CollectTarget, PassError, PassSettings};
use qstat_exporter::metrics::{JobSample, MetricSink};
use qstat_exporter::qstat::{ParseError, ParserOptions};
use qstat_exporter::ssh::{
    command, CommandError, ConnectOptions, CredentialSource, HostKeyPolicy, PtyConfig,
    RemoteConnection, RemoteEndpoint, SessionBuffers, SessionError,
};

const USER: &str = "xeuspimi";

const REPORT: &str = "\r\n\
hazelhen-batch.hww.hlrs.de:\r\n\
                                                                                  Req'd       Req'd       Elap\r\n\
Job ID                  Username    Queue    Jobname          SessID  NDS   TSK   Memory      Time    S   Time\r\n\
----------------------- ----------- -------- ---------------- ------ ----- ------ --------- --------- - ---------\r\n\
2483314.hazelhen-batch  xeuspimi    single   euxduwkde4         8006     1    --        --   01:00:00 C       --\r\n\
2483315.hazelhen-batch  xeuspimi    multi    euxduwkde5         8007     4    --        --   02:00:00 R  00:10:00\r\n\
xeuspimi@eslogin004:~>\r\n";

#[derive(Debug, Clone, Copy)]
enum PtyReply {
    Grant,
    Reject,
    /// Never answer the pty request
    Ignore,
}

#[derive(Debug, Clone, Copy)]
enum CommandOutcome {
    /// Send the report, then the exit status, then close the channel
    Exit(u32),
    /// Send the report and keep the channel open
    Hang,
}

#[derive(Clone)]
struct FakeScheduler {
    pty: PtyReply,
    outcome: CommandOutcome,
    env: Arc<Mutex<Vec<(String, String)>>>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl FakeScheduler {
    fn new(pty: PtyReply, outcome: CommandOutcome) -> Self {
        Self {
            pty,
            outcome,
            env: Arc::default(),
            commands: Arc::default(),
        }
    }

    fn env(&self) -> Vec<(String, String)> {
        self.env.lock().unwrap().clone()
    }

    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

impl server::Handler for FakeScheduler {
    type Error = russh::Error;

    async fn auth_password(&mut self, _user: &str, _password: &str) -> Result<Auth, Self::Error> {
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    #[allow(clippy::too_many_arguments)]
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        _term: &str,
        _col_width: u32,
        _row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        match self.pty {
            PtyReply::Grant => {
                let _ = session.channel_success(channel);
            }
            PtyReply::Reject => {
                let _ = session.channel_failure(channel);
            }
            PtyReply::Ignore => {}
        }
        Ok(())
    }

    async fn env_request(
        &mut self,
        _channel: ChannelId,
        variable_name: &str,
        variable_value: &str,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.env
            .lock()
            .unwrap()
            .push((variable_name.to_string(), variable_value.to_string()));
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.commands
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(data).into_owned());
        let _ = session.channel_success(channel);

        let handle = session.handle();
        let outcome = self.outcome;
        tokio::spawn(async move {
            let _ = handle
                .data(channel, CryptoVec::from_slice(REPORT.as_bytes()))
                .await;
            if let CommandOutcome::Exit(status) = outcome {
                let _ = handle.exit_status_request(channel, status).await;
                let _ = handle.eof(channel).await;
                let _ = handle.close(channel).await;
            }
        });
        Ok(())
    }
}

/// Serve `scheduler` on an ephemeral local port.
async fn start_server(scheduler: FakeScheduler) -> u16 {
    let key = PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519).unwrap();
    let config = Arc::new(server::Config {
        keys: vec![key],
        auth_rejection_time: Duration::from_millis(10),
        auth_rejection_time_initial: Some(Duration::ZERO),
        ..Default::default()
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let config = config.clone();
            let handler = scheduler.clone();
            tokio::spawn(async move {
                if let Ok(session) = server::run_stream(config, socket, handler).await {
                    let _ = session.await;
                }
            });
        }
    });
    port
}

fn connect_options() -> ConnectOptions {
    ConnectOptions {
        timeout: Duration::from_secs(5),
        host_key_policy: HostKeyPolicy::insecure(),
        keepalive_interval: None,
    }
}

fn target(port: u16) -> CollectTarget {
    CollectTarget {
        host: "127.0.0.1".to_string(),
        port,
        username: USER.to_string(),
        credentials: CredentialSource::password("secret"),
        connect: connect_options(),
        pty: PtyConfig::default(),
        command: CollectTarget::default_command(USER),
        env: Vec::new(),
    }
}

async fn collect(
    target: &CollectTarget,
    settings: &PassSettings,
    cancel: &CancellationToken,
) -> (qstat_exporter::PassReport, Vec<JobSample>) {
    let mut sink: Vec<JobSample> = Vec::new();
    let report = tokio::time::timeout(
        Duration::from_secs(10),
        run_pass(target, settings, &mut sink, cancel),
    )
    .await
    .expect("pass must finish");
    (report, sink)
}

#[tokio::test]
async fn test_command_runs_on_session() {
    let scheduler = FakeScheduler::new(PtyReply::Grant, CommandOutcome::Exit(0));
    let port = start_server(scheduler.clone()).await;

    let auth = CredentialSource::password("secret").resolve().await.unwrap();
    let endpoint = RemoteEndpoint::new("127.0.0.1", port, USER, auth);
    let connection = RemoteConnection::connect(endpoint, &connect_options())
        .await
        .unwrap();
    let mut session = connection
        .open_session(
            SessionBuffers::default(),
            &PtyConfig::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let mut stdout = session.take_stdout().unwrap();

    let env = vec!["LANG=C".to_string()];
    let read_output = async {
        let mut output = String::new();
        stdout.read_to_string(&mut output).await.unwrap();
        output
    };
    let (exit, output) = tokio::join!(
        command::run(&mut session, "qstat -u xeuspimi", &env),
        read_output
    );

    let exit = exit.unwrap();
    assert_eq!(exit.exit_status, 0);
    assert_eq!(exit.env_applied, 1);
    assert_eq!(output, REPORT);
    assert_eq!(scheduler.commands(), ["qstat -u xeuspimi"]);

    session.close().await;
    connection.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_only_well_formed_env_entries_reach_server() {
    let scheduler = FakeScheduler::new(PtyReply::Grant, CommandOutcome::Exit(0));
    let port = start_server(scheduler.clone()).await;
    let mut target = target(port);
    target.env = vec!["A=1".to_string(), "B=2=3".to_string(), "NOEQUALS".to_string()];

    let (report, sink) = collect(&target, &PassSettings::default(), &CancellationToken::new()).await;

    assert!(report.is_success(), "error: {:?}", report.error);
    assert_eq!(report.collected, 2);
    assert_eq!(report.malformed.len(), 1);
    assert_eq!(sink[0].job_id, "2483314.hazelhen-batch");
    assert_eq!(sink[1].value, 1.0);
    assert_eq!(scheduler.env(), [("A".to_string(), "1".to_string())]);
}

#[tokio::test]
async fn test_rejected_pty_fails_pass() {
    let scheduler = FakeScheduler::new(PtyReply::Reject, CommandOutcome::Exit(0));
    let port = start_server(scheduler.clone()).await;

    let (report, sink) = collect(&target(port), &PassSettings::default(), &CancellationToken::new()).await;

    assert!(matches!(
        report.error,
        Some(PassError::Session(SessionError::PtyRejected))
    ));
    assert_eq!(report.collected, 0);
    assert!(sink.is_empty());
    assert!(scheduler.commands().is_empty());
}

#[tokio::test]
async fn test_pty_can_be_disabled() {
    let scheduler = FakeScheduler::new(PtyReply::Reject, CommandOutcome::Exit(0));
    let port = start_server(scheduler).await;
    let mut target = target(port);
    target.pty.enabled = false;

    let (report, _) = collect(&target, &PassSettings::default(), &CancellationToken::new()).await;

    assert!(report.is_success(), "error: {:?}", report.error);
    assert_eq!(report.collected, 2);
}

#[tokio::test]
async fn test_nonzero_exit_keeps_partial_results() {
    let scheduler = FakeScheduler::new(PtyReply::Grant, CommandOutcome::Exit(2));
    let port = start_server(scheduler).await;

    let (report, sink) = collect(&target(port), &PassSettings::default(), &CancellationToken::new()).await;

    assert!(matches!(
        report.error,
        Some(PassError::Command(CommandError::ExitStatus(2)))
    ));
    assert_eq!(report.collected, 2);
    assert_eq!(sink.len(), 2);
}

#[tokio::test]
async fn test_stalled_command_ends_pass() {
    let scheduler = FakeScheduler::new(PtyReply::Grant, CommandOutcome::Hang);
    let port = start_server(scheduler).await;
    let settings = PassSettings {
        parser: ParserOptions {
            idle_timeout: Some(Duration::from_millis(300)),
            ..Default::default()
        },
        ..Default::default()
    };

    let (report, sink) = collect(&target(port), &settings, &CancellationToken::new()).await;

    assert!(matches!(
        report.error,
        Some(PassError::Stream(ParseError::Stalled(_)))
    ));
    assert_eq!(sink.len(), 2);
}

/// Cancels the pass as soon as the first job is emitted.
struct CancelOnFirstSample {
    samples: Vec<JobSample>,
    cancel: CancellationToken,
}

impl MetricSink for CancelOnFirstSample {
    fn emit(&mut self, sample: JobSample) {
        self.samples.push(sample);
        self.cancel.cancel();
    }
}

#[tokio::test]
async fn test_cancel_during_running_command() {
    let scheduler = FakeScheduler::new(PtyReply::Grant, CommandOutcome::Hang);
    let port = start_server(scheduler).await;
    let cancel = CancellationToken::new();
    let mut sink = CancelOnFirstSample {
        samples: Vec::new(),
        cancel: cancel.clone(),
    };

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        run_pass(&target(port), &PassSettings::default(), &mut sink, &cancel),
    )
    .await
    .expect("cancellation must end the pass");

    assert!(matches!(report.error, Some(PassError::Cancelled)));
    assert!(!sink.samples.is_empty());
}

#[tokio::test]
async fn test_cancel_while_pty_request_unanswered() {
    let scheduler = FakeScheduler::new(PtyReply::Ignore, CommandOutcome::Exit(0));
    let port = start_server(scheduler.clone()).await;
    let cancel = CancellationToken::new();

    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        stopper.cancel();
    });

    let (report, sink) = collect(&target(port), &PassSettings::default(), &cancel).await;

    assert!(matches!(report.error, Some(PassError::Cancelled)));
    assert!(sink.is_empty());
    assert!(scheduler.commands().is_empty());
}
