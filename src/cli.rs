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

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{AuthConfig, Config};
use crate::ssh::StrictHostKeyChecking;

/// Environment variable read for `--password`
pub const PASSWORD_ENV: &str = "QSTAT_EXPORTER_PASSWORD";

#[derive(Parser, Debug)]
#[command(
    name = "qstat-exporter",
    version,
    about = "Collect batch-scheduler job states over SSH as gauge metrics",
    long_about = "qstat-exporter runs the scheduler status command (qstat -u <user> by default) on a\nlogin host over SSH, parses the job table and prints one gauge sample per job in the\nPrometheus text exposition format.\nAuthentication uses an SSH agent, a private key file or a password.",
    after_help = "EXAMPLES:\n  One pass with the agent:         qstat-exporter -H login01 -u alice collect\n  One pass with a key file:        qstat-exporter -H login01 -i ~/.ssh/id_ed25519 collect\n  Poll every 30 seconds:           qstat-exporter --config site.yaml watch --interval 30\n  Password from the environment:   QSTAT_EXPORTER_PASSWORD=... qstat-exporter --auth password collect"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        long,
        help = "Configuration file path\nWithout this flag: ./qstat-exporter.yaml, then the user config directory"
    )]
    pub config: Option<PathBuf>,

    #[arg(short = 'H', long, help = "Scheduler login host")]
    pub host: Option<String>,

    #[arg(short = 'p', long, help = "SSH port [default: 22]")]
    pub port: Option<u16>,

    #[arg(short = 'u', long, help = "Login user (also the user whose jobs are listed)")]
    pub user: Option<String>,

    #[arg(
        short = 'i',
        long,
        help = "SSH private key file path (selects key file authentication)"
    )]
    pub identity: Option<PathBuf>,

    #[arg(
        long,
        value_enum,
        help = "Authentication method, overriding the config file"
    )]
    pub auth: Option<AuthKind>,

    #[arg(
        long,
        env = PASSWORD_ENV,
        hide_env_values = true,
        help = "Password for password authentication"
    )]
    pub password: Option<String>,

    #[arg(
        long,
        help = "Host key checking mode (yes/no/accept-new) [default: yes]\n  yes        - Strict checking against known_hosts\n  accept-new - Accept new hosts, reject changed keys\n  no         - Accept all host keys (insecure, testing only)"
    )]
    pub strict_host_key_checking: Option<StrictHostKeyChecking>,

    #[arg(long, help = "Connect timeout in seconds [default: 10]")]
    pub timeout: Option<u64>,

    #[arg(
        short = 'v',
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    #[command(
        about = "Run one collection pass and print the samples",
        long_about = "Runs the status command once and prints the samples in the text exposition format.\n\nExit codes: 0 (pass succeeded), 1 (pass failed)"
    )]
    Collect,

    #[command(
        about = "Collect repeatedly until interrupted",
        long_about = "Runs a collection pass every interval and prints the current samples after each pass.\nStops cleanly on Ctrl-C."
    )]
    Watch {
        #[arg(long, help = "Seconds between passes [default: 60]")]
        interval: Option<u64>,
    },
}

/// Authentication method selectable on the command line
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    Agent,
    KeyFile,
    Password,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply_to(&self, config: &mut Config) -> Result<()> {
        if let Some(host) = &self.host {
            config.host = Some(host.clone());
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(user) = &self.user {
            config.user = Some(user.clone());
        }
        if let Some(mode) = self.strict_host_key_checking {
            config.host_key.checking = mode;
        }
        if let Some(timeout) = self.timeout {
            config.connect_timeout = timeout;
        }
        if let Commands::Watch {
            interval: Some(interval),
        } = self.command
        {
            config.interval = interval;
        }

        let identity = self
            .identity
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());
        let auth = match (self.auth, identity) {
            (Some(AuthKind::KeyFile) | None, Some(path)) => Some(AuthConfig::KeyFile {
                path,
                passphrase: None,
            }),
            (Some(AuthKind::KeyFile), None) => match &config.auth {
                AuthConfig::KeyFile { .. } => None,
                _ => bail!("--auth key-file needs --identity or a key path in the config file"),
            },
            (Some(_), Some(_)) => bail!("--identity only applies to key file authentication"),
            (Some(AuthKind::Agent), None) => Some(AuthConfig::Agent),
            (Some(AuthKind::Password), None) => match &config.auth {
                AuthConfig::Password { .. } => None,
                _ => Some(AuthConfig::Password { password: None }),
            },
            (None, None) => None,
        };
        if let Some(auth) = auth {
            config.auth = auth;
        }
        Ok(())
    }
}
