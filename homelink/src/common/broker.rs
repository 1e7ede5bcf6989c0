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

//! The broker service: owns the listener, the registration table and the
//! lifecycle that ties them together.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

use crate::common::listener::{accept_loop, ConnectionContext};
use crate::common::{BrokerConfig, Registry, RelayError, RelayStats, Router};
use crate::message::ActorId;

/// Lifecycle state of a [`Broker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BrokerState {
    /// Not listening.
    #[default]
    Stopped,
    /// Binding the endpoint.
    Starting,
    /// Accepting connections and routing envelopes.
    Running,
    /// Closing the listener and draining connection workers.
    Stopping,
}

impl fmt::Display for BrokerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

struct RunningBroker {
    local_addr: SocketAddr,
    cancel_token: CancellationToken,
    tracker: TaskTracker,
    accept: JoinHandle<()>,
}

/// Message broker accepting actor connections on a TCP endpoint.
///
/// `start` and `stop` may be called repeatedly; a stopped broker can be started
/// again on the same endpoint. Registrations never survive a stop.
///
/// # Example
///
/// ```no_run
/// # async fn run() -> Result<(), homelink::prelude::RelayError> {
/// use homelink::prelude::*;
///
/// let broker = Broker::new(BrokerConfig::default());
/// let address = broker.start().await?;
/// println!("listening on {address}");
/// broker.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct Broker {
    config: Arc<BrokerConfig>,
    registry: Arc<Registry>,
    stats: Arc<RelayStats>,
    state: RwLock<BrokerState>,
    lifecycle: Mutex<Option<RunningBroker>>,
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("address", &self.config.listener.address)
            .field("state", &self.state())
            .field("registered", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Broker {
    /// Creates a stopped broker.
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(Registry::new()),
            stats: Arc::new(RelayStats::new()),
            state: RwLock::new(BrokerState::Stopped),
            lifecycle: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> BrokerState {
        *self.state.read()
    }

    /// Counters shared by every connection worker.
    #[must_use]
    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Configuration the broker was created with.
    #[must_use]
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Bound address while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.lifecycle.lock().await.as_ref().map(|running| running.local_addr)
    }

    /// Currently registered actors, sorted.
    #[must_use]
    pub fn registered_actors(&self) -> Vec<ActorId> {
        self.registry.actor_ids()
    }

    /// Whether `actor_id` currently has a live registration.
    #[must_use]
    pub fn is_registered(&self, actor_id: &str) -> bool {
        self.registry.contains(actor_id)
    }

    /// Binds the endpoint and starts accepting connections.
    ///
    /// Returns the bound address; starting a running broker returns the address
    /// it is already bound to.
    ///
    /// # Errors
    ///
    /// [`RelayError::ServiceFault`] when the endpoint cannot be bound. The broker
    /// is left stopped.
    #[instrument(skip(self), fields(address = %self.config.listener.address), level = "debug")]
    pub async fn start(&self) -> Result<SocketAddr, RelayError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if let Some(running) = lifecycle.as_ref() {
            debug!(address = %running.local_addr, "Broker already running");
            return Ok(running.local_addr);
        }

        self.set_state(BrokerState::Starting);
        let address = self.config.listener.address;
        let bound = match TcpListener::bind(address).await {
            Ok(listener) => listener.local_addr().map(|local| (listener, local)),
            Err(e) => Err(e),
        };
        let (listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(source) => {
                self.set_state(BrokerState::Stopped);
                let fault = RelayError::ServiceFault { address, source };
                error!("{}", fault);
                return Err(fault);
            }
        };

        let cancel_token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let ctx = ConnectionContext {
            registry: self.registry.clone(),
            router: Router::new(self.registry.clone(), self.stats.clone()),
            stats: self.stats.clone(),
            config: self.config.clone(),
        };
        let accept = tokio::spawn(accept_loop(listener, ctx, cancel_token.clone(), tracker.clone()));

        *lifecycle = Some(RunningBroker {
            local_addr,
            cancel_token,
            tracker,
            accept,
        });
        self.set_state(BrokerState::Running);
        info!(address = %local_addr, "Broker started");
        Ok(local_addr)
    }

    /// Stops accepting connections, closes every connection and clears the
    /// registration table.
    ///
    /// Idempotent. Waits at most the configured drain timeout for connection
    /// workers to finish.
    #[instrument(skip(self), level = "debug")]
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(running) = lifecycle.take() else {
            return;
        };

        self.set_state(BrokerState::Stopping);
        info!(address = %running.local_addr, "Broker stopping");

        running.cancel_token.cancel();
        if let Err(e) = running.accept.await {
            error!("Broker accept loop failed: {}", e);
        }

        running.tracker.close();
        let drain_timeout = self.config.drain_timeout();
        if tokio::time::timeout(drain_timeout, running.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                remaining = running.tracker.len(),
                "Connection workers did not finish within {:?}", drain_timeout
            );
        }

        let cleared = self.registry.clear();
        self.set_state(BrokerState::Stopped);
        info!(cleared, "Broker stopped");
    }

    fn set_state(&self, state: BrokerState) {
        *self.state.write() = state;
        debug!(%state, "Broker state changed");
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        if let Some(running) = self.lifecycle.get_mut() {
            running.cancel_token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> BrokerConfig {
        BrokerConfig::default().with_address("127.0.0.1:0".parse().unwrap())
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let broker = Broker::new(local_config());
        assert_eq!(broker.state(), BrokerState::Stopped);
        assert!(broker.local_addr().await.is_none());

        let address = broker.start().await.unwrap();
        assert_eq!(broker.state(), BrokerState::Running);
        assert_eq!(broker.start().await.unwrap(), address);
        assert_eq!(broker.local_addr().await, Some(address));

        broker.stop().await;
        assert_eq!(broker.state(), BrokerState::Stopped);
        broker.stop().await;
        assert_eq!(broker.state(), BrokerState::Stopped);
    }

    #[tokio::test]
    async fn bind_failure_is_a_service_fault() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = occupied.local_addr().unwrap();

        let broker = Broker::new(BrokerConfig::default().with_address(address));
        let err = broker.start().await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(broker.state(), BrokerState::Stopped);
    }
}
