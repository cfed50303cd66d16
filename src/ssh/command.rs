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

//! Running one command on an open session.

use super::error::CommandError;
use super::session::{ChannelExit, RemoteSession};

/// Successful termination of a remote command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandExit {
    pub exit_status: u32,
    /// Environment entries sent to the server. The server may still have
    /// ignored them.
    pub env_applied: usize,
}

/// Split a `KEY=VALUE` entry.
///
/// Returns `None` unless the entry contains exactly one `=` and a non-empty key.
pub fn parse_env_entry(entry: &str) -> Option<(&str, &str)> {
    let mut parts = entry.split('=');
    let key = parts.next()?;
    let value = parts.next()?;
    if parts.next().is_some() || key.is_empty() {
        return None;
    }
    Some((key, value))
}

/// Apply `env`, execute `command_line` and block until it terminates.
///
/// Malformed environment entries are skipped. A zero exit status is the only
/// success; everything else surfaces as a [`CommandError`].
pub async fn run(
    session: &mut RemoteSession,
    command_line: &str,
    env: &[String],
) -> Result<CommandExit, CommandError> {
    let mut env_applied = 0;
    for entry in env {
        match parse_env_entry(entry) {
            Some((key, value)) => {
                session.set_env(key, value).await?;
                env_applied += 1;
            }
            None => tracing::debug!("Skipping malformed environment entry {:?}", entry),
        }
    }

    session.exec(command_line).await?;
    let exit = session.wait().await?;
    classify_exit(exit).map(|exit_status| CommandExit {
        exit_status,
        env_applied,
    })
}

fn classify_exit(exit: ChannelExit) -> Result<u32, CommandError> {
    if exit.cancelled {
        return Err(CommandError::Cancelled);
    }
    if let Some(signal) = exit.exit_signal {
        return Err(CommandError::Signal(signal));
    }
    match exit.exit_status {
        Some(0) => Ok(0),
        Some(code) => Err(CommandError::ExitStatus(code)),
        None => Err(CommandError::NoExitStatus),
    }
}
