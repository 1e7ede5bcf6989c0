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


// --- Public Re-exports ---
pub use agent::Agent;
pub use broker::{Broker, BrokerState};
pub use bus::{BusEndpoint, InProcessBus};
pub use client::{ClientOptions, RelayClient};
pub use config::BrokerConfig;
pub use error::{DecodeError, InvalidEnvelope, RelayError};
pub use framing::LineFramer;
pub use registry::{Binding, ConnectionId, OutboundSender, Registry};
pub use router::{Delivery, Router};
pub use stats::RelayStats;

// --- Submodules ---

/// Defines the [`Agent`] sending facade.
mod agent;
/// Defines the [`Broker`] service and its lifecycle.
mod broker;
/// Defines the [`InProcessBus`] transport.
mod bus;
/// Defines the TCP [`RelayClient`].
mod client;
/// Defines broker configuration.
pub mod config;
/// Defines the error taxonomy.
mod error;
/// Defines line-feed record framing.
mod framing;
mod listener;
/// Defines the registration table.
mod registry;
/// Defines the routing policy.
mod router;
mod stats;
