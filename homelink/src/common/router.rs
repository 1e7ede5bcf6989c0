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

//! Routing policy: broadcast fan-out or single-recipient delivery.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tracing::{trace, warn};

use crate::common::{Registry, RelayError, RelayStats};
use crate::message::Envelope;

/// Outcome of routing one envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Recipients whose queue accepted the envelope.
    pub delivered: usize,
    /// Recipients whose queue was full or closed.
    pub failed: usize,
}

/// Forwards envelopes to the output channels selected from the registration table.
#[derive(Debug, Clone)]
pub struct Router {
    registry: Arc<Registry>,
    stats: Arc<RelayStats>,
}

impl Router {
    /// Creates a router over `registry`.
    #[must_use]
    pub fn new(registry: Arc<Registry>, stats: Arc<RelayStats>) -> Self {
        Self { registry, stats }
    }

    /// Routes `envelope` to its recipients.
    ///
    /// The envelope is serialized once and queued to each recipient without
    /// waiting; a failure to reach one recipient is logged and counted but does
    /// not stop delivery to the others.
    ///
    /// # Errors
    ///
    /// [`RelayError::UnknownRecipient`] when a unicast recipient is not
    /// registered; the envelope is dropped.
    pub fn route(&self, envelope: &Envelope) -> Result<Delivery, RelayError> {
        RelayStats::bump(&self.stats.envelopes_routed);

        let Some(targets) = self.registry.targets(&envelope.route()) else {
            RelayStats::bump(&self.stats.unknown_recipients);
            warn!(
                sender = envelope.sender_id(),
                recipient = envelope.recipient_id(),
                kind = %envelope.kind(),
                "Recipient not found, dropping envelope"
            );
            return Err(RelayError::UnknownRecipient(envelope.recipient_id().to_string()));
        };

        let mut record = envelope.encode()?;
        record.push('\n');
        let record: Arc<str> = Arc::from(record);

        let mut delivery = Delivery::default();
        for (actor_id, outbound) in targets {
            match outbound.try_send(Arc::clone(&record)) {
                Ok(()) => delivery.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(recipient = %actor_id, "Outbound queue full, dropping envelope");
                    delivery.failed += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    warn!(recipient = %actor_id, "Recipient connection closed, dropping envelope");
                    delivery.failed += 1;
                }
            }
        }

        RelayStats::add(&self.stats.deliveries, delivery.delivered);
        RelayStats::add(&self.stats.delivery_failures, delivery.failed);
        trace!(
            sender = envelope.sender_id(),
            kind = %envelope.kind(),
            delivered = delivery.delivered,
            failed = delivery.failed,
            "Envelope routed"
        );
        Ok(delivery)
    }
}
