/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Broker configuration loaded from XDG-compliant locations.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::common::RelayError;

/// Port of the broker's fixed local endpoint.
pub const DEFAULT_PORT: u16 = 12000;

/// Configuration for the broker and its actor clients.
///
/// # Example Configuration File
///
/// ```toml
/// [listener]
/// address = "127.0.0.1:12000"
///
/// [limits]
/// max_connections = 100
/// max_record_size = 1048576  # 1 MiB
/// outbound_buffer = 256
///
/// [timeouts]
/// read_timeout_ms = 0          # 0 disables the read timeout
/// handshake_timeout_ms = 5000
///
/// [shutdown]
/// drain_timeout_ms = 5000
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Listening endpoint.
    pub listener: ListenerConfig,
    /// Connection and record limits.
    pub limits: LimitsConfig,
    /// Timeouts.
    pub timeouts: TimeoutsConfig,
    /// Graceful shutdown.
    pub shutdown: ShutdownConfig,
}

/// Listening endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Address the broker binds.
    pub address: SocketAddr,
}

/// Limits applied per broker and per connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum concurrent connections; extra connections are closed on accept.
    pub max_connections: usize,

    /// Maximum size in bytes of a single record, delimiter excluded.
    pub max_record_size: usize,

    /// Records queued per connection before deliveries to it start failing.
    pub outbound_buffer: usize,
}

/// Timeouts, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Idle read timeout for a connection; `0` waits indefinitely.
    #[serde(rename = "read_timeout_ms")]
    pub read: u64,

    /// How long a client waits for its registration to be acknowledged.
    #[serde(rename = "handshake_timeout_ms")]
    pub handshake: u64,
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Maximum time in milliseconds `stop()` waits for connection workers to unwind.
    #[serde(rename = "drain_timeout_ms")]
    pub drain_timeout: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_record_size: 1_048_576, // 1 MiB
            outbound_buffer: 256,
        }
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            read: 0,
            handshake: 5_000,
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { drain_timeout: 5_000 }
    }
}

impl BrokerConfig {
    /// Load configuration from `$XDG_CONFIG_HOME/homelink/broker.toml`.
    ///
    /// Falls back to the defaults when no file exists or when the file cannot be
    /// read or parsed; failures are logged.
    #[must_use]
    pub fn load() -> Self {
        let xdg_dirs = match xdg::BaseDirectories::with_prefix("homelink") {
            Ok(dirs) => dirs,
            Err(e) => {
                warn!("Failed to initialize XDG directories for broker config: {}", e);
                return Self::default();
            }
        };

        xdg_dirs.find_config_file("broker.toml").map_or_else(
            || {
                info!("No broker configuration file found, using defaults");
                Self::default()
            },
            |path| match Self::from_file(&path) {
                Ok(config) => {
                    info!("Loaded broker configuration from: {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("{}; using defaults", e);
                    Self::default()
                }
            },
        )
    }

    /// Load configuration from an explicit file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path).map_err(|e| RelayError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        toml::from_str(&config_str).map_err(|e| RelayError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Returns a copy listening on `address`.
    #[must_use]
    pub fn with_address(mut self, address: SocketAddr) -> Self {
        self.listener.address = address;
        self
    }

    /// Idle read timeout, if enabled.
    #[must_use]
    pub const fn read_timeout(&self) -> Option<Duration> {
        if self.timeouts.read == 0 {
            None
        } else {
            Some(Duration::from_millis(self.timeouts.read))
        }
    }

    /// Registration acknowledgement timeout.
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.handshake)
    }

    /// Maximum time to wait for workers during shutdown.
    #[must_use]
    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown.drain_timeout)
    }
}
