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

//! Credential provider and SSH authentication.
//!
//! A [`CredentialSource`] describes where the authentication material lives
//! (a password, a private key file or a running SSH agent). Resolving it
//! produces an [`AuthMethod`] that the connection layer hands to the server.
//! Resolution reads local files or talks to the agent socket; it never
//! contacts the remote host.

use russh::client::{Handle, Handler};
use russh::keys::agent::client::AgentClient;
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg, PublicKey};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::UnixStream;
use zeroize::Zeroizing;

use super::error::{ConnectionError, CredentialError};

/// Environment variable holding the agent socket path.
pub const SSH_AUTH_SOCK: &str = "SSH_AUTH_SOCK";

/// Where authentication material comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Password(Zeroizing<String>),
    KeyFile {
        path: PathBuf,
        passphrase: Option<Zeroizing<String>>,
    },
    Agent,
}

impl CredentialSource {
    pub fn password(password: &str) -> Self {
        Self::Password(Zeroizing::new(password.to_string()))
    }

    pub fn key_file<P: AsRef<Path>>(path: P, passphrase: Option<&str>) -> Self {
        Self::KeyFile {
            path: path.as_ref().to_path_buf(),
            passphrase: passphrase.map(|p| Zeroizing::new(p.to_string())),
        }
    }

    pub fn agent() -> Self {
        Self::Agent
    }

    /// Short name of the strategy, used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Password(_) => "password",
            Self::KeyFile { .. } => "publickey",
            Self::Agent => "agent",
        }
    }

    /// Produce an authentication method, or `None` when the backing material
    /// cannot be read or parsed. The cause is logged.
    pub async fn provide(&self) -> Option<AuthMethod> {
        match self.resolve().await {
            Ok(method) => Some(method),
            Err(e) => {
                tracing::warn!(strategy = self.kind(), "Credential unavailable: {e}");
                None
            }
        }
    }

    /// Produce an authentication method, keeping the failure cause.
    pub async fn resolve(&self) -> Result<AuthMethod, CredentialError> {
        match self {
            Self::Password(password) => Ok(AuthMethod::Password(password.clone())),
            Self::KeyFile { path, passphrase } => {
                let key = russh::keys::load_secret_key(path, passphrase.as_ref().map(|p| p.as_str()))
                    .map_err(|source| CredentialError::KeyFile {
                        path: path.clone(),
                        source,
                    })?;
                tracing::debug!("Loaded private key from {:?}", path);
                Ok(AuthMethod::PrivateKey(Arc::new(key)))
            }
            Self::Agent => {
                let socket = std::env::var_os(SSH_AUTH_SOCK)
                    .filter(|s| !s.is_empty())
                    .map(PathBuf::from)
                    .ok_or(CredentialError::AgentSocketUnset)?;
                let mut agent = AgentClient::connect_uds(&socket).await.map_err(|source| {
                    CredentialError::AgentUnreachable {
                        path: socket.clone(),
                        source,
                    }
                })?;
                let identities = agent
                    .request_identities()
                    .await
                    .map_err(CredentialError::AgentRequest)?;
                if identities.is_empty() {
                    return Err(CredentialError::AgentNoIdentities);
                }
                tracing::debug!("SSH agent offers {} identities", identities.len());
                Ok(AuthMethod::Agent { agent, identities })
            }
        }
    }
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(<redacted>)"),
            Self::KeyFile { path, passphrase } => f
                .debug_struct("KeyFile")
                .field("path", path)
                .field("passphrase", &passphrase.as_ref().map(|_| "<redacted>"))
                .finish(),
            Self::Agent => f.write_str("Agent"),
        }
    }
}

/// A ready-to-use authentication method.
pub enum AuthMethod {
    Password(Zeroizing<String>),
    PrivateKey(Arc<PrivateKey>),
    Agent {
        agent: AgentClient<UnixStream>,
        identities: Vec<PublicKey>,
    },
}

impl AuthMethod {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Password(_) => "password",
            Self::PrivateKey(_) => "publickey",
            Self::Agent { .. } => "agent",
        }
    }
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(<redacted>)"),
            Self::PrivateKey(key) => f
                .debug_tuple("PrivateKey")
                .field(&key.algorithm().as_str())
                .finish(),
            Self::Agent { identities, .. } => f
                .debug_struct("Agent")
                .field("identities", &identities.len())
                .finish(),
        }
    }
}

/// Authenticate an established handle with the given method.
pub(super) async fn authenticate<H>(
    handle: &mut Handle<H>,
    username: &str,
    auth: AuthMethod,
) -> Result<(), ConnectionError>
where
    H: Handler<Error = russh::Error>,
{
    let method = auth.kind();
    let rejected = || ConnectionError::AuthRejected {
        user: username.to_string(),
        method,
    };

    match auth {
        AuthMethod::Password(password) => {
            let result = handle.authenticate_password(username, &*password).await?;
            if !result.success() {
                return Err(rejected());
            }
        }
        AuthMethod::PrivateKey(key) => {
            let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
            let result = handle
                .authenticate_publickey(username, PrivateKeyWithHashAlg::new(key, hash_alg))
                .await?;
            if !result.success() {
                return Err(rejected());
            }
        }
        AuthMethod::Agent {
            mut agent,
            identities,
        } => {
            let mut authenticated = false;
            for identity in identities {
                let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
                match handle
                    .authenticate_publickey_with(username, identity, hash_alg, &mut agent)
                    .await
                {
                    Ok(result) if result.success() => {
                        authenticated = true;
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::debug!("Agent identity failed to sign: {e}");
                    }
                }
            }
            if !authenticated {
                return Err(rejected());
            }
        }
    }

    tracing::debug!("Authenticated {} via {}", username, method);
    Ok(())
}
