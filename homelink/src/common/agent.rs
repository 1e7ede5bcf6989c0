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

use tracing::{debug, info};

use crate::common::RelayError;
use crate::message::{ActorId, Envelope, MessageType, BROADCAST};
use crate::traits::{EnvelopeHandler, MessageBus};

/// An actor's sending side over any [`MessageBus`].
///
/// Stamps its own identity as the sender of every message it builds.
///
/// ```no_run
/// # async fn run() -> Result<(), homelink::prelude::RelayError> {
/// use homelink::prelude::*;
///
/// let bus = InProcessBus::new();
/// let house = Agent::new(bus.connect(ActorId::new("house001")?));
/// house.send_message(MessageType::Hello, "online", None).await?;
/// house.send_message(MessageType::Threat, "door forced", Some("monitoring_center")).await?;
/// house.stop().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Agent<B: MessageBus> {
    bus: B,
}

impl<B: MessageBus> Agent<B> {
    /// Wraps a connected bus endpoint.
    pub fn new(bus: B) -> Self {
        info!(actor_id = %bus.actor_id(), "Agent started");
        Self { bus }
    }

    /// Identity used as the sender.
    pub fn actor_id(&self) -> &ActorId {
        self.bus.actor_id()
    }

    /// The underlying transport.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Sends `message` of `kind` to `recipient`, or to every other actor when `None`.
    ///
    /// A blank `recipient` is rejected with [`RelayError::InvalidEnvelope`].
    pub async fn send_message(
        &self,
        kind: MessageType,
        message: impl Into<String>,
        recipient: Option<&str>,
    ) -> Result<(), RelayError> {
        let recipient = recipient.unwrap_or(BROADCAST);
        let envelope = Envelope::new(self.actor_id().as_str(), kind, message, recipient)?;
        debug!(actor_id = %self.actor_id(), kind = %envelope.kind(), recipient, "Sending message");
        self.bus.send(envelope).await
    }

    /// Sends a pre-built envelope unchanged.
    pub async fn send_envelope(&self, envelope: Envelope) -> Result<(), RelayError> {
        debug!(actor_id = %self.actor_id(), kind = %envelope.kind(), "Sending envelope");
        self.bus.send(envelope).await
    }

    /// Attaches a handler for incoming envelopes.
    pub fn on_receive(&self, handler: EnvelopeHandler) {
        self.bus.on_receive(handler);
    }

    /// Disconnects from the bus.
    pub async fn stop(&self) -> Result<(), RelayError> {
        self.bus.disconnect().await?;
        info!(actor_id = %self.actor_id(), "Agent stopped");
        Ok(())
    }
}
