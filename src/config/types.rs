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

//! Configuration type definitions.

use serde::{Deserialize, Serialize};

use crate::qstat::{OutOfQueueFilter, ParserOptions, StatusTable};
use crate::ssh::{PtyConfig, StrictHostKeyChecking};

/// Default SSH port
pub const DEFAULT_PORT: u16 = 22;

/// Default seconds between collection passes in watch mode
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Default dial + handshake + authentication bound
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default seconds between SSH keepalive messages
pub const DEFAULT_KEEPALIVE_INTERVAL_SECS: u64 = 60;

/// Main configuration structure.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Scheduler login host
    pub host: Option<String>,
    pub port: u16,
    /// Login user; falls back to the local user
    pub user: Option<String>,
    pub auth: AuthConfig,
    pub host_key: HostKeyConfig,
    /// Connect timeout in seconds
    pub connect_timeout: u64,
    /// SSH keepalive interval in seconds. 0 disables keepalives.
    pub keepalive_interval: u64,
    /// Status command; defaults to `qstat -u <user>`
    pub command: Option<String>,
    /// `KEY=VALUE` entries sent before the command
    pub env: Vec<String>,
    pub pty: PtyConfig,
    pub parser: ParserOptions,
    /// State letter to gauge value
    pub statuses: StatusTable,
    pub filter: OutOfQueueFilter,
    /// Seconds between passes in watch mode
    pub interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            user: None,
            auth: AuthConfig::default(),
            host_key: HostKeyConfig::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL_SECS,
            command: None,
            env: Vec::new(),
            pty: PtyConfig::default(),
            parser: ParserOptions::default(),
            statuses: StatusTable::default(),
            filter: OutOfQueueFilter::default(),
            interval: DEFAULT_INTERVAL_SECS,
        }
    }
}

/// Authentication strategy.
///
/// String values support `$VAR` / `${VAR}` expansion, and paths support `~`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AuthConfig {
    /// Password from the file, `--password` or `QSTAT_EXPORTER_PASSWORD`
    Password {
        #[serde(default)]
        password: Option<String>,
    },
    KeyFile {
        path: String,
        #[serde(default)]
        passphrase: Option<String>,
    },
    #[default]
    Agent,
}

/// Host key verification settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct HostKeyConfig {
    pub checking: StrictHostKeyChecking,
    /// Defaults to `~/.ssh/known_hosts`
    pub known_hosts: Option<String>,
}
