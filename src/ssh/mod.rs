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

//! Remote command execution over SSH.

pub mod auth;
pub mod command;
pub mod connection;
pub mod error;
pub mod known_hosts;
pub mod pipe;
pub mod session;
pub mod terminal_modes;

pub use auth::{AuthMethod, CredentialSource};
pub use command::{parse_env_entry, run, CommandExit};
pub use connection::{
    ConnectOptions, RemoteConnection, RemoteEndpoint, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_KEEPALIVE_INTERVAL,
};
pub use error::{CommandError, ConnectionError, CredentialError, SessionError};
pub use known_hosts::{HostKeyPolicy, StrictHostKeyChecking};
pub use pipe::{pipe, PipeReader, PipeWriter};
pub use session::{ChannelExit, RemoteSession, SessionBuffers};
pub use terminal_modes::PtyConfig;
