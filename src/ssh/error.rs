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

//! Error types for the SSH layer.
//!
//! Each stage of a remote invocation has its own error type so callers can
//! tell which stage failed:
//!
//! - [`CredentialError`]: the authentication material could not be produced
//! - [`ConnectionError`]: dialing, host key verification or authentication failed
//! - [`SessionError`]: the session channel or its pty could not be allocated
//! - [`CommandError`]: the remote command failed or the transport broke mid-command

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to produce an authentication method from local material.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("cannot load private key {}: {source}", path.display())]
    KeyFile {
        path: PathBuf,
        #[source]
        source: russh::keys::Error,
    },

    #[error("SSH_AUTH_SOCK is not set; no SSH agent is available")]
    AgentSocketUnset,

    #[error("cannot connect to SSH agent at {}: {source}", path.display())]
    AgentUnreachable {
        path: PathBuf,
        #[source]
        source: russh::keys::Error,
    },

    #[error("SSH agent request failed: {0}")]
    AgentRequest(#[source] russh::keys::Error),

    #[error("SSH agent holds no identities")]
    AgentNoIdentities,
}

/// Failure to establish an authenticated connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("invalid address {host}:{port}: {source}")]
    AddressInvalid {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("connection to {host}:{port} timed out after {secs}s")]
    Timeout { host: String, port: u16, secs: u64 },

    #[error("no usable credentials for {user}: {source}")]
    Credentials {
        user: String,
        #[source]
        source: CredentialError,
    },

    #[error("host key for {host}:{port} was rejected by the host key policy")]
    HostKeyRejected { host: String, port: u16 },

    #[error("server rejected {method} authentication for {user}")]
    AuthRejected { user: String, method: &'static str },

    #[error("SSH transport error: {0}")]
    Ssh(#[from] russh::Error),
}

/// Failure to allocate a remote execution session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("server refused to open a session channel: {0}")]
    Open(#[source] russh::Error),

    #[error("server rejected the pty request")]
    PtyRejected,

    #[error("pty request failed: {0}")]
    Pty(#[source] russh::Error),

    #[error("session channel closed before the server answered")]
    Closed,
}

/// Terminal failure of a remote command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("remote command exited with status {0}")]
    ExitStatus(u32),

    #[error("remote command terminated by signal {0}")]
    Signal(String),

    #[error("remote command ended without reporting an exit status")]
    NoExitStatus,

    #[error("server rejected the exec request")]
    ExecRejected,

    #[error("session is no longer running")]
    SessionClosed,

    #[error("session was cancelled")]
    Cancelled,

    #[error("SSH transport error: {0}")]
    Transport(#[from] russh::Error),
}
