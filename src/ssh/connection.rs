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

//! SSH connection establishment.
//!
//! This module handles address resolution, the bounded-time dial and
//! handshake, host key verification and authentication.

use russh::client::{Config, Handle, Handler};
use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use super::auth::{authenticate, AuthMethod};
use super::error::ConnectionError;
use super::known_hosts::HostKeyPolicy;

/// Default bound on dial + handshake + authentication
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between SSH keepalive messages
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);

/// Where to connect and how to authenticate.
///
/// Consumed by a single connection attempt.
#[derive(Debug)]
pub struct RemoteEndpoint {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: AuthMethod,
}

impl RemoteEndpoint {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>, auth: AuthMethod) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            auth,
        }
    }
}

/// Transport-level options for [`RemoteConnection::connect`].
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub timeout: Duration,
    pub host_key_policy: HostKeyPolicy,
    /// SSH keepalive interval. `None` disables keepalives.
    pub keepalive_interval: Option<Duration>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CONNECT_TIMEOUT,
            host_key_policy: HostKeyPolicy::default(),
            keepalive_interval: Some(DEFAULT_KEEPALIVE_INTERVAL),
        }
    }
}

/// An authenticated SSH connection.
///
/// Not pooled: the caller tears it down with [`disconnect`](Self::disconnect).
pub struct RemoteConnection {
    pub(super) handle: Handle<ClientHandler>,
    username: String,
    address: SocketAddr,
}

impl RemoteConnection {
    /// Dial `endpoint`, verify its host key and authenticate.
    ///
    /// The whole sequence is bounded by `options.timeout`.
    pub async fn connect(
        endpoint: RemoteEndpoint,
        options: &ConnectOptions,
    ) -> Result<Self, ConnectionError> {
        let host = endpoint.host.clone();
        let port = endpoint.port;
        let secs = options.timeout.as_secs();

        tracing::debug!("Connecting to {}:{} as {}", host, port, endpoint.username);
        match tokio::time::timeout(options.timeout, Self::establish(endpoint, options)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout { host, port, secs }),
        }
    }

    async fn establish(
        endpoint: RemoteEndpoint,
        options: &ConnectOptions,
    ) -> Result<Self, ConnectionError> {
        let RemoteEndpoint {
            host,
            port,
            username,
            auth,
        } = endpoint;

        let socket_addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), port))
            .await
            .map_err(|source| ConnectionError::AddressInvalid {
                host: host.clone(),
                port,
                source,
            })?
            .collect();

        let config = Arc::new(Config {
            keepalive_interval: options.keepalive_interval,
            ..Default::default()
        });

        // Try each resolved address until one completes the handshake
        let mut connect_res: Result<(SocketAddr, Handle<ClientHandler>), ConnectionError> =
            Err(ConnectionError::AddressInvalid {
                host: host.clone(),
                port,
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "could not resolve to any addresses",
                ),
            });
        for socket_addr in socket_addrs {
            let handler = ClientHandler::new(host.clone(), port, options.host_key_policy.clone());
            match russh::client::connect(config.clone(), socket_addr, handler).await {
                Ok(h) => {
                    connect_res = Ok((socket_addr, h));
                    break;
                }
                Err(russh::Error::UnknownKey) => {
                    return Err(ConnectionError::HostKeyRejected { host, port });
                }
                Err(e) => {
                    tracing::debug!("Connection attempt to {} failed: {}", socket_addr, e);
                    connect_res = Err(ConnectionError::Ssh(e));
                }
            }
        }
        let (address, mut handle) = connect_res?;

        authenticate(&mut handle, &username, auth).await?;
        tracing::info!("Connected to {}:{} ({}) as {}", host, port, address, username);

        Ok(Self {
            handle,
            username,
            address,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Disconnect from the remote host.
    pub async fn disconnect(&self) -> Result<(), ConnectionError> {
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await
            .map_err(ConnectionError::Ssh)
    }
}

impl Debug for RemoteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConnection")
            .field("username", &self.username)
            .field("address", &self.address)
            .field("handle", &"Handle<ClientHandler>")
            .finish()
    }
}

/// SSH client handler for server key verification.
#[derive(Debug, Clone)]
pub struct ClientHandler {
    hostname: String,
    port: u16,
    policy: HostKeyPolicy,
}

impl ClientHandler {
    pub fn new(hostname: String, port: u16, policy: HostKeyPolicy) -> Self {
        Self {
            hostname,
            port,
            policy,
        }
    }
}

impl Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(self
            .policy
            .verify(&self.hostname, self.port, server_public_key))
    }
}
