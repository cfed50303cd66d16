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

//! Turning configuration into collection inputs.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;

use crate::collector::{CollectTarget, PassSettings};
use crate::ssh::{ConnectOptions, CredentialSource, HostKeyPolicy};
use crate::utils::sanitize::{validate_command, validate_hostname, validate_username};

use super::types::{AuthConfig, Config};
use super::utils::{expand_env_vars, expand_tilde, get_current_username};

impl Config {
    /// Login user: the configured one, else the local user.
    pub fn username(&self) -> Result<String> {
        let username = self
            .user
            .as_deref()
            .map(expand_env_vars)
            .or_else(get_current_username)
            .context("No username configured and none could be derived from the environment. Set 'user' in the config file or pass --user.")?;
        validate_username(&username)?;
        Ok(username)
    }

    /// Build the credential source.
    ///
    /// `password_override` (from the command line or environment) wins over
    /// a password in the file.
    pub fn credential_source(&self, password_override: Option<&str>) -> Result<CredentialSource> {
        match &self.auth {
            AuthConfig::Password { password } => {
                let password = password_override
                    .map(str::to_string)
                    .or_else(|| password.as_deref().map(expand_env_vars))
                    .context("Password authentication selected but no password given. Set QSTAT_EXPORTER_PASSWORD or pass --password.")?;
                Ok(CredentialSource::password(&password))
            }
            AuthConfig::KeyFile { path, passphrase } => {
                let path = expand_tilde(Path::new(&expand_env_vars(path)));
                let passphrase = passphrase.as_deref().map(expand_env_vars);
                Ok(CredentialSource::key_file(path, passphrase.as_deref()))
            }
            AuthConfig::Agent => Ok(CredentialSource::agent()),
        }
    }

    pub fn host_key_policy(&self) -> HostKeyPolicy {
        let known_hosts = self
            .host_key
            .known_hosts
            .as_deref()
            .map(|p| expand_tilde(Path::new(&expand_env_vars(p))));
        HostKeyPolicy::new(self.host_key.checking, known_hosts)
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            timeout: Duration::from_secs(self.connect_timeout),
            host_key_policy: self.host_key_policy(),
            keepalive_interval: (self.keepalive_interval > 0)
                .then(|| Duration::from_secs(self.keepalive_interval)),
        }
    }

    /// Everything a pass needs to reach the scheduler host.
    pub fn collect_target(&self, password_override: Option<&str>) -> Result<CollectTarget> {
        let host = self
            .host
            .as_deref()
            .map(expand_env_vars)
            .filter(|h| !h.is_empty())
            .context("No host configured. Set 'host' in the config file or pass --host.")?;
        validate_hostname(&host)?;
        let username = self.username()?;
        let command = self
            .command
            .clone()
            .unwrap_or_else(|| CollectTarget::default_command(&username));
        validate_command(&command)?;

        Ok(CollectTarget {
            host,
            port: self.port,
            credentials: self.credential_source(password_override)?,
            connect: self.connect_options(),
            pty: self.pty.clone(),
            command,
            env: self.env.clone(),
            username,
        })
    }

    pub fn pass_settings(&self) -> PassSettings {
        PassSettings {
            parser: self.parser.clone(),
            statuses: self.statuses.clone(),
            filter: self.filter.clone(),
        }
    }

    /// Pause between passes in watch mode, at least one second.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval.max(1))
    }
}
