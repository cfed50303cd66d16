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

//! Validation of values that end up in a remote command line or a dial.

use anyhow::{bail, Result};

/// Longest status command accepted
const MAX_COMMAND_LENGTH: usize = 16384;

/// DNS name length limit
const MAX_HOSTNAME_LENGTH: usize = 253;

/// Typical Unix login name limit
const MAX_USERNAME_LENGTH: usize = 32;

/// Check a configured status command.
///
/// Shell syntax is allowed since operators may wrap `qstat` in a pipeline;
/// only values the remote shell cannot take are rejected.
pub fn validate_command(command: &str) -> Result<()> {
    if command.trim().is_empty() {
        bail!("Empty status command not allowed");
    }
    if command.len() > MAX_COMMAND_LENGTH {
        bail!(
            "Status command too long: {} bytes (max: {} bytes)",
            command.len(),
            MAX_COMMAND_LENGTH
        );
    }
    if command.contains('\0') {
        bail!("Status command contains null bytes");
    }
    Ok(())
}

/// Check a host name or address literal.
pub fn validate_hostname(hostname: &str) -> Result<()> {
    if hostname.trim().is_empty() {
        bail!("Empty hostname not allowed");
    }
    if hostname.len() > MAX_HOSTNAME_LENGTH {
        bail!(
            "Hostname too long: {} bytes (max: {} bytes)",
            hostname.len(),
            MAX_HOSTNAME_LENGTH
        );
    }

    if let Some(inner) = hostname.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        if !inner.chars().all(|c| c.is_ascii_hexdigit() || c == ':') {
            bail!("Invalid IPv6 address format: {}", hostname);
        }
        return Ok(());
    }

    let valid = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':');
    if !hostname.chars().all(valid) {
        bail!("Invalid characters in hostname: {}", hostname);
    }
    if hostname.contains("..") {
        bail!("Double dots not allowed in hostname");
    }
    if hostname
        .split('.')
        .any(|segment| segment.starts_with('-') || segment.ends_with('-'))
    {
        bail!("Hostname segments cannot start or end with hyphen");
    }
    Ok(())
}

/// Check a login name.
///
/// The name is interpolated into the default `qstat -u <user>` command, so
/// anything beyond the portable Unix character set is refused.
pub fn validate_username(username: &str) -> Result<()> {
    if username.trim().is_empty() {
        bail!("Empty username not allowed");
    }
    if username.len() > MAX_USERNAME_LENGTH {
        bail!(
            "Username too long: {} bytes (max: {} bytes)",
            username.len(),
            MAX_USERNAME_LENGTH
        );
    }
    let valid = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.');
    if !username.chars().all(valid) {
        bail!("Invalid characters in username: {}", username);
    }
    if username
        .chars()
        .next()
        .is_some_and(|c| !c.is_ascii_alphabetic() && c != '_')
    {
        bail!("Username must start with letter or underscore");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_validation() {
        assert!(validate_command("qstat -u alice").is_ok());
        assert!(validate_command("qstat -u alice | tail -n +3").is_ok());
        assert!(validate_command("   ").is_err());
        assert!(validate_command("qstat\0").is_err());
        assert!(validate_command(&"x".repeat(MAX_COMMAND_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_hostname_validation() {
        assert!(validate_hostname("hazelhen-batch.hww.hlrs.de").is_ok());
        assert!(validate_hostname("192.168.1.1").is_ok());
        assert!(validate_hostname("[::1]").is_ok());
        assert!(validate_hostname("").is_err());
        assert!(validate_hostname("host;rm").is_err());
        assert!(validate_hostname("a..b").is_err());
        assert!(validate_hostname("-bad.example").is_err());
        assert!(validate_hostname("[zz::1]").is_err());
    }

    #[test]
    fn test_username_validation() {
        assert!(validate_username("xeuspimi").is_ok());
        assert!(validate_username("_svc.user-1").is_ok());
        assert!(validate_username("1user").is_err());
        assert!(validate_username("alice; reboot").is_err());
        assert!(validate_username("$(id)").is_err());
        assert!(validate_username(&"a".repeat(33)).is_err());
    }
}
