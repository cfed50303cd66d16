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

//! Host key verification policy.

use directories::BaseDirs;
use russh::keys::PublicKey;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Get the default known_hosts file path
pub fn get_default_known_hosts_path() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().join(".ssh").join("known_hosts"))
}

/// Mode for host key checking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrictHostKeyChecking {
    /// Only accept hosts already present in known_hosts
    #[default]
    Yes,
    /// Accept and record unknown hosts; reject changed keys (TOFU)
    AcceptNew,
    /// Accept any host key. Insecure, opt-in only.
    No,
}

impl FromStr for StrictHostKeyChecking {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yes" | "true" | "strict" => Ok(Self::Yes),
            "accept-new" | "tofu" => Ok(Self::AcceptNew),
            "no" | "false" | "insecure" => Ok(Self::No),
            other => Err(format!(
                "unknown host key checking mode '{other}' (expected yes, accept-new or no)"
            )),
        }
    }
}

/// Resolved host key policy: the mode plus the known_hosts file it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostKeyPolicy {
    pub mode: StrictHostKeyChecking,
    pub known_hosts: Option<PathBuf>,
}

impl HostKeyPolicy {
    pub fn new(mode: StrictHostKeyChecking, known_hosts: Option<PathBuf>) -> Self {
        Self {
            mode,
            known_hosts: known_hosts.or_else(get_default_known_hosts_path),
        }
    }

    pub fn insecure() -> Self {
        Self {
            mode: StrictHostKeyChecking::No,
            known_hosts: None,
        }
    }

    /// Decide whether `key` presented by `host:port` is trusted.
    ///
    /// Verification errors (unreadable file, changed key) are logged and
    /// count as rejection.
    pub fn verify(&self, host: &str, port: u16, key: &PublicKey) -> bool {
        if self.mode == StrictHostKeyChecking::No {
            tracing::warn!(
                "Host key verification disabled; accepting key for {}:{} without checking",
                host,
                port
            );
            return true;
        }

        let Some(path) = self.known_hosts.as_deref() else {
            tracing::error!("Could not determine known_hosts path; rejecting {}:{}", host, port);
            return false;
        };

        match check_known_host(path, host, port, key) {
            Ok(true) => {
                tracing::debug!("Host key for {}:{} matches {:?}", host, port, path);
                true
            }
            Ok(false) if self.mode == StrictHostKeyChecking::AcceptNew => {
                learn_known_host(path, host, port, key)
            }
            Ok(false) => {
                tracing::error!(
                    "Host key for {}:{} is not in {:?} (strict mode)",
                    host,
                    port,
                    path
                );
                false
            }
            Err(e) => {
                tracing::error!("Host key verification for {}:{} failed: {}", host, port, e);
                false
            }
        }
    }
}

impl Default for HostKeyPolicy {
    fn default() -> Self {
        Self::new(StrictHostKeyChecking::default(), None)
    }
}

fn check_known_host(
    path: &Path,
    host: &str,
    port: u16,
    key: &PublicKey,
) -> Result<bool, russh::keys::Error> {
    if !path.exists() {
        return Ok(false);
    }
    russh::keys::check_known_hosts_path(host, port, key, path)
}

fn learn_known_host(path: &Path, host: &str, port: u16, key: &PublicKey) -> bool {
    if let Some(dir) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::error!("Cannot create {:?} to record host key: {}", dir, e);
            return false;
        }
    }
    match russh::keys::known_hosts::learn_known_hosts_path(host, port, key, path) {
        Ok(()) => {
            tracing::info!("Added host key for {}:{} to {:?}", host, port, path);
            true
        }
        Err(e) => {
            tracing::error!("Failed to record host key for {}:{}: {}", host, port, e);
            false
        }
    }
}
