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

//! Remote execution sessions.
//!
//! Opening a session allocates a channel, optionally requests a pty, and
//! starts the channel task. A russh [`Channel`] cannot be shared, so that one
//! task owns it and multiplexes every stream direction in a single
//! `select!` loop:
//!
//! - stdin source → remote stdin, sent once the exec request is accepted
//! - remote stdout → stdout pipe
//! - remote stderr (extended data type 1) → stderr pipe
//!
//! Environment and exec requests from the foreground reach the task through a
//! bounded request queue. The task's result is the command's exit report, so
//! the foreground waits on it instead of guessing when output is complete.

use bytes::Bytes;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::connection::RemoteConnection;
use super::error::{CommandError, SessionError};
use super::pipe::{pipe, PipeReader, PipeWriter};
use super::terminal_modes::{configure_terminal_modes, PtyConfig};

/// Capacity of the foreground → channel task request queue
const SESSION_REQUEST_QUEUE_SIZE: usize = 16;

/// Extended data type code for stderr (RFC 4254 section 5.2)
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// Which buffers a session is bound to.
#[derive(Debug, Clone)]
pub struct SessionBuffers {
    /// Bytes to feed to the remote command's stdin
    pub stdin: Option<Bytes>,
    pub capture_stdout: bool,
    pub capture_stderr: bool,
}

impl Default for SessionBuffers {
    fn default() -> Self {
        Self {
            stdin: None,
            capture_stdout: true,
            capture_stderr: true,
        }
    }
}

/// What the channel task observed when the channel ended.
#[derive(Debug, Default)]
pub struct ChannelExit {
    pub exit_status: Option<u32>,
    pub exit_signal: Option<String>,
    pub cancelled: bool,
}

enum SessionRequest {
    SetEnv {
        name: String,
        value: String,
        reply: oneshot::Sender<Result<(), russh::Error>>,
    },
    Exec {
        command: String,
        reply: oneshot::Sender<Result<(), CommandError>>,
    },
}

/// A session channel with its background channel task.
///
/// Dropping the session cancels the task, which closes the channel and ends
/// both output pipes.
pub struct RemoteSession {
    requests: mpsc::Sender<SessionRequest>,
    task: Option<JoinHandle<ChannelExit>>,
    cancel: CancellationToken,
    stdout: Option<PipeReader>,
    stderr: Option<PipeReader>,
}

impl RemoteConnection {
    /// Open a session channel bound to `buffers`.
    ///
    /// `cancel` is observed by the channel task for the lifetime of the
    /// session; cancelling it closes the channel.
    pub async fn open_session(
        &self,
        buffers: SessionBuffers,
        pty: &PtyConfig,
        cancel: CancellationToken,
    ) -> Result<RemoteSession, SessionError> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(SessionError::Open)?;

        if pty.enabled {
            if let Err(e) = request_pty(&mut channel, pty).await {
                if let Err(close_err) = channel.close().await {
                    tracing::debug!("Closing channel after pty failure: {close_err}");
                }
                return Err(e);
            }
        }

        Ok(RemoteSession::spawn(channel, buffers, cancel))
    }
}

async fn request_pty(channel: &mut Channel<Msg>, pty: &PtyConfig) -> Result<(), SessionError> {
    let terminal_modes = configure_terminal_modes();
    channel
        .request_pty(
            true,
            &pty.term_type,
            pty.width,
            pty.height,
            0, // pixel width (0 means undefined)
            0, // pixel height (0 means undefined)
            &terminal_modes,
        )
        .await
        .map_err(SessionError::Pty)?;

    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => {
                tracing::trace!("pty granted ({}x{})", pty.width, pty.height);
                return Ok(());
            }
            Some(ChannelMsg::Failure) => return Err(SessionError::PtyRejected),
            Some(ChannelMsg::Close) | None => return Err(SessionError::Closed),
            Some(other) => tracing::trace!("Ignoring {:?} while waiting for pty reply", other),
        }
    }
}

impl RemoteSession {
    fn spawn(channel: Channel<Msg>, buffers: SessionBuffers, cancel: CancellationToken) -> Self {
        let (requests_tx, requests_rx) = mpsc::channel(SESSION_REQUEST_QUEUE_SIZE);

        let (stdout_writer, stdout) = split_pipe(buffers.capture_stdout);
        let (stderr_writer, stderr) = split_pipe(buffers.capture_stderr);

        let task = tokio::spawn(drive_channel(
            channel,
            requests_rx,
            buffers.stdin,
            stdout_writer,
            stderr_writer,
            cancel.clone(),
        ));

        Self {
            requests: requests_tx,
            task: Some(task),
            cancel,
            stdout,
            stderr,
        }
    }

    /// Take the stdout reader. Reads block until output arrives and end once
    /// the remote side closes its stdout or the session closes.
    pub fn take_stdout(&mut self) -> Option<PipeReader> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<PipeReader> {
        self.stderr.take()
    }

    /// Send an environment request. The server may silently ignore it
    /// (`AcceptEnv` in sshd_config).
    pub async fn set_env(&self, name: &str, value: &str) -> Result<(), CommandError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(SessionRequest::SetEnv {
                name: name.to_string(),
                value: value.to_string(),
                reply,
            })
            .await
            .map_err(|_| CommandError::SessionClosed)?;
        response
            .await
            .map_err(|_| CommandError::SessionClosed)?
            .map_err(CommandError::Transport)
    }

    /// Start `command` as the session's sole command and wait for the server
    /// to accept it.
    pub async fn exec(&self, command: &str) -> Result<(), CommandError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(SessionRequest::Exec {
                command: command.to_string(),
                reply,
            })
            .await
            .map_err(|_| CommandError::SessionClosed)?;
        response.await.map_err(|_| CommandError::SessionClosed)?
    }

    /// Wait for the channel task to finish and return what it observed.
    pub async fn wait(&mut self) -> Result<ChannelExit, CommandError> {
        let task = self.task.take().ok_or(CommandError::SessionClosed)?;
        match task.await {
            Ok(exit) => Ok(exit),
            Err(e) => {
                tracing::error!("Session channel task failed: {e}");
                Err(CommandError::SessionClosed)
            }
        }
    }

    /// Close the channel and wait for the channel task to wind down.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        // The channel task notices and closes the channel.
        if self.task.is_some() {
            self.cancel.cancel();
        }
    }
}

fn split_pipe(enabled: bool) -> (Option<PipeWriter>, Option<PipeReader>) {
    if enabled {
        let (writer, reader) = pipe();
        (Some(writer), Some(reader))
    } else {
        (None, None)
    }
}

async fn drive_channel(
    mut channel: Channel<Msg>,
    mut requests: mpsc::Receiver<SessionRequest>,
    stdin: Option<Bytes>,
    mut stdout: Option<PipeWriter>,
    mut stderr: Option<PipeWriter>,
    cancel: CancellationToken,
) -> ChannelExit {
    let mut exit = ChannelExit::default();
    let mut stdin = stdin;
    let mut pending_exec: Option<oneshot::Sender<Result<(), CommandError>>> = None;
    let mut requests_open = true;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::debug!("Session cancelled, closing channel");
                if let Err(e) = channel.close().await {
                    tracing::debug!("Channel close after cancellation: {e}");
                }
                exit.cancelled = true;
                break;
            }

            request = requests.recv(), if requests_open => {
                match request {
                    Some(SessionRequest::SetEnv { name, value, reply }) => {
                        let result = channel.set_env(false, name.as_str(), value.as_str()).await;
                        let _ = reply.send(result);
                    }
                    Some(SessionRequest::Exec { command, reply }) => {
                        tracing::debug!("Executing remote command: {}", command);
                        match channel.exec(true, command.as_str()).await {
                            Ok(()) => pending_exec = Some(reply),
                            Err(e) => {
                                let _ = reply.send(Err(CommandError::Transport(e)));
                            }
                        }
                    }
                    None => requests_open = false,
                }
            }

            msg = channel.wait() => {
                let Some(msg) = msg else {
                    break;
                };
                match msg {
                    ChannelMsg::Data { ref data } => {
                        if let Some(writer) = &stdout {
                            if !writer.write(data) {
                                tracing::trace!("stdout reader dropped, discarding output");
                                stdout = None;
                            }
                        }
                    }
                    ChannelMsg::ExtendedData { ref data, ext } => {
                        if ext == SSH_EXTENDED_DATA_STDERR {
                            if let Some(writer) = &stderr {
                                if !writer.write(data) {
                                    stderr = None;
                                }
                            }
                        }
                    }
                    ChannelMsg::Success => {
                        if let Some(reply) = pending_exec.take() {
                            let _ = reply.send(Ok(()));
                            if let Some(input) = stdin.take() {
                                if let Err(e) = send_stdin(&channel, &input).await {
                                    tracing::warn!("Failed to write command stdin: {e}");
                                }
                            }
                        }
                    }
                    ChannelMsg::Failure => {
                        if let Some(reply) = pending_exec.take() {
                            let _ = reply.send(Err(CommandError::ExecRejected));
                            break;
                        }
                    }
                    // The exit status may arrive before the last data
                    // message, so it never ends the loop by itself.
                    ChannelMsg::ExitStatus { exit_status } => {
                        exit.exit_status = Some(exit_status);
                    }
                    ChannelMsg::ExitSignal { signal_name, .. } => {
                        exit.exit_signal = Some(format!("{signal_name:?}"));
                    }
                    ChannelMsg::Eof => {
                        stdout = None;
                        stderr = None;
                    }
                    ChannelMsg::Close => break,
                    _ => {}
                }
            }
        }
    }

    if let Some(reply) = pending_exec.take() {
        let _ = reply.send(Err(if exit.cancelled {
            CommandError::Cancelled
        } else {
            CommandError::SessionClosed
        }));
    }

    exit
}

async fn send_stdin(channel: &Channel<Msg>, input: &[u8]) -> Result<(), russh::Error> {
    channel.data(input).await?;
    channel.eof().await
}
