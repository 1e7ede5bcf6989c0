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

use std::sync::Arc;

use async_trait::async_trait;

use crate::common::RelayError;
use crate::message::{ActorId, Envelope};

/// Callback invoked with each envelope delivered to an actor.
pub type EnvelopeHandler = Arc<dyn Fn(Envelope) + Send + Sync>;

/// Send/receive contract shared by the TCP client and the in-process bus.
///
/// Delivery is best-effort and at most once. Handlers must not block; a
/// handler that panics is reported and does not affect other handlers.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Identity this endpoint is registered under.
    fn actor_id(&self) -> &ActorId;

    /// Hands `envelope` to the transport.
    ///
    /// # Errors
    ///
    /// [`RelayError::NotConnected`] after `disconnect`, or a transport failure.
    async fn send(&self, envelope: Envelope) -> Result<(), RelayError>;

    /// Attaches a handler for envelopes addressed to this actor.
    fn on_receive(&self, handler: EnvelopeHandler);

    /// Unregisters and releases the transport. Calling it again is a no-op.
    async fn disconnect(&self) -> Result<(), RelayError>;

    /// Attaches a closure as a handler.
    fn on_receive_fn<F>(&self, handler: F)
    where
        F: Fn(Envelope) + Send + Sync + 'static,
        Self: Sized,
    {
        self.on_receive(Arc::new(handler));
    }
}
