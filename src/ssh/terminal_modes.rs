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

//! Pty parameters for non-interactive command sessions

use russh::Pty;
use serde::{Deserialize, Serialize};

/// Nominal line speed reported to the remote pty
pub const PTY_BAUD_RATE: u32 = 14400;

/// Pty request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PtyConfig {
    /// Request a pty at all. Some schedulers only print their report
    /// framing when attached to a terminal.
    pub enabled: bool,
    pub term_type: String,
    pub width: u32,
    pub height: u32,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            term_type: "xterm".to_string(),
            width: 80,
            height: 40,
        }
    }
}

/// Terminal modes for a pty that only carries one command's output.
///
/// Echo is disabled so that nothing written to stdin shows up in the
/// captured output.
pub fn configure_terminal_modes() -> Vec<(Pty, u32)> {
    vec![
        (Pty::ECHO, 0),
        (Pty::TTY_OP_ISPEED, PTY_BAUD_RATE),
        (Pty::TTY_OP_OSPEED, PTY_BAUD_RATE),
    ]
}
