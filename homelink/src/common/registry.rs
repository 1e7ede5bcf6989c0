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

//! The registration table: which actor is reachable through which connection.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::message::{ActorId, Route};

/// Broker-assigned identifier of an accepted connection.
pub type ConnectionId = u64;

/// Queue of encoded records waiting to be written to one connection.
pub type OutboundSender = mpsc::Sender<Arc<str>>;

/// A live registration.
#[derive(Debug, Clone)]
pub struct Binding {
    /// Connection that registered the actor.
    pub connection: ConnectionId,
    /// Output channel of that connection.
    pub outbound: OutboundSender,
}

/// Registration table owned by the broker.
///
/// Every operation holds the lock for a single map access only; routing works on
/// a snapshot so no lock is held while records are queued.
#[derive(Debug, Default)]
pub struct Registry {
    bindings: RwLock<HashMap<ActorId, Binding>>,
}

impl Registry {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `actor_id`, replacing any existing binding (last write wins).
    ///
    /// Returns the connection that previously held the id, if any.
    pub fn bind(&self, actor_id: ActorId, binding: Binding) -> Option<ConnectionId> {
        self.bindings
            .write()
            .insert(actor_id, binding)
            .map(|previous| previous.connection)
    }

    /// Removes `actor_id` if it is still bound to `connection`.
    ///
    /// A connection that was displaced by a newer registration of the same id
    /// cannot remove the newer binding.
    pub fn release(&self, actor_id: &ActorId, connection: ConnectionId) -> bool {
        let mut bindings = self.bindings.write();
        match bindings.get(actor_id) {
            Some(binding) if binding.connection == connection => {
                bindings.remove(actor_id);
                true
            }
            _ => false,
        }
    }

    /// Whether `actor_id` is currently registered.
    #[must_use]
    pub fn contains(&self, actor_id: &str) -> bool {
        self.bindings.read().contains_key(actor_id)
    }

    /// Number of registered actors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    /// Whether no actor is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }

    /// Registered identities, sorted.
    #[must_use]
    pub fn actor_ids(&self) -> Vec<ActorId> {
        let mut ids: Vec<_> = self.bindings.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drops every binding and returns how many there were.
    pub fn clear(&self) -> usize {
        let mut bindings = self.bindings.write();
        let count = bindings.len();
        bindings.clear();
        count
    }

    /// Snapshot of the output channels selected by `route`.
    ///
    /// `None` means a unicast recipient is not registered.
    #[must_use]
    pub fn targets(&self, route: &Route<'_>) -> Option<Vec<(ActorId, OutboundSender)>> {
        let bindings = self.bindings.read();
        route.select(&*bindings).map(|selected| {
            selected
                .into_iter()
                .map(|(actor_id, binding)| (actor_id.clone(), binding.outbound.clone()))
                .collect()
        })
    }
}
