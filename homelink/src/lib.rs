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


#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # HomeLink
//!
//! A lightweight message-routing fabric for the SecureHome actors: houses, the
//! monitoring center and the threat simulator exchange typed, addressed
//! envelopes without knowing where the others live.
//!
//! ## Key Concepts
//!
//! - **Broker (`Broker`)**: accepts TCP connections, binds each to an actor
//!   identity through a `REGISTER|<id>` handshake and forwards envelopes.
//! - **Envelope (`Envelope`)**: sender, recipient, kind and opaque payload,
//!   encoded as one JSON object per line.
//! - **Routing**: a recipient of `*` reaches every registered actor except the
//!   sender; any other recipient reaches exactly that actor, or nobody.
//! - **Transports (`MessageBus`)**: `RelayClient` talks to a broker over TCP,
//!   `InProcessBus` applies the same policy inside one process.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use homelink::prelude::*;
//!
//! # async fn run() -> Result<(), RelayError> {
//! let broker = Broker::new(BrokerConfig::default());
//! let address = broker.start().await?;
//!
//! let center = RelayClient::connect(address, ActorId::new("monitoring_center")?, ClientOptions::default()).await?;
//! center.on_receive_fn(|envelope| println!("{}: {}", envelope.kind(), envelope.message()));
//!
//! let house = Agent::new(RelayClient::connect(address, ActorId::new("house001")?, ClientOptions::default()).await?);
//! house.send_message(MessageType::Threat, "window broken", Some("monitoring_center")).await?;
//! # Ok(())
//! # }
//! ```

/// Broker, transports, configuration and errors.
pub(crate) mod common;

/// Envelopes, identities, addressing and the handshake.
pub(crate) mod message;

/// Traits at the transport seam.
pub(crate) mod traits;

/// Configuration types for the broker.
pub mod config {
    pub use crate::common::config::{
        BrokerConfig, LimitsConfig, ListenerConfig, ShutdownConfig, TimeoutsConfig, DEFAULT_PORT,
    };
}

/// A prelude module for conveniently importing the most commonly used items.
///
/// # Re-exports
///
/// ## External Crates
/// *   [`async_trait::async_trait`](https://docs.rs/async-trait/latest/async_trait/attr.async_trait.html): needed to implement [`MessageBus`](crate::traits::MessageBus).
///
/// ## Core Types
/// *   [`crate::common::Broker`] and [`crate::common::BrokerState`]: the broker service.
/// *   [`crate::common::RelayClient`]: TCP transport for actors.
/// *   [`crate::common::InProcessBus`]: transport for actors sharing one process.
/// *   [`crate::common::Agent`]: sending facade over any transport.
/// *   [`crate::message::Envelope`] and [`crate::message::MessageType`]: the message model.
/// *   [`crate::common::RelayError`]: the error taxonomy.
pub mod prelude {
    pub use async_trait::async_trait;

    pub use crate::common::{
        Agent, Broker, BrokerConfig, BrokerState, BusEndpoint, ClientOptions, DecodeError,
        Delivery, InProcessBus, InvalidEnvelope, LineFramer, RelayClient, RelayError, RelayStats,
    };
    pub use crate::message::{
        ActorId, Envelope, Handshake, MessageType, Route, UnknownKind, BROADCAST,
        REGISTERED_PREFIX, REGISTER_PREFIX,
    };
    pub use crate::traits::{EnvelopeHandler, MessageBus};
}
