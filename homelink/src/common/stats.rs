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

use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters shared by the broker's workers and the in-process bus.
#[derive(Debug, Default)]
pub struct RelayStats {
    /// Total connections accepted.
    pub connections_accepted: AtomicUsize,
    /// Currently active connections.
    pub connections_active: AtomicUsize,
    /// Connections closed on accept because the limit was reached.
    pub connections_rejected: AtomicUsize,
    /// Non-empty records read from connections.
    pub records_received: AtomicUsize,
    /// Successful registrations.
    pub registrations: AtomicUsize,
    /// Envelopes handed to the router.
    pub envelopes_routed: AtomicUsize,
    /// Envelopes queued for a recipient.
    pub deliveries: AtomicUsize,
    /// Per-recipient delivery failures (queue full or closed).
    pub delivery_failures: AtomicUsize,
    /// Records that failed to decode.
    pub decode_errors: AtomicUsize,
    /// Envelopes dropped because the recipient was not registered.
    pub unknown_recipients: AtomicUsize,
    /// Connection faults.
    pub connection_faults: AtomicUsize,
}

impl RelayStats {
    /// Create new statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of connections accepted.
    #[must_use]
    pub fn connections_accepted(&self) -> usize {
        self.connections_accepted.load(Ordering::Relaxed)
    }

    /// Get the number of active connections.
    #[must_use]
    pub fn connections_active(&self) -> usize {
        self.connections_active.load(Ordering::Relaxed)
    }

    /// Get the number of rejected connections.
    #[must_use]
    pub fn connections_rejected(&self) -> usize {
        self.connections_rejected.load(Ordering::Relaxed)
    }

    /// Get the number of records received.
    #[must_use]
    pub fn records_received(&self) -> usize {
        self.records_received.load(Ordering::Relaxed)
    }

    /// Get the number of registrations.
    #[must_use]
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::Relaxed)
    }

    /// Get the number of envelopes routed.
    #[must_use]
    pub fn envelopes_routed(&self) -> usize {
        self.envelopes_routed.load(Ordering::Relaxed)
    }

    /// Get the number of deliveries.
    #[must_use]
    pub fn deliveries(&self) -> usize {
        self.deliveries.load(Ordering::Relaxed)
    }

    /// Get the number of delivery failures.
    #[must_use]
    pub fn delivery_failures(&self) -> usize {
        self.delivery_failures.load(Ordering::Relaxed)
    }

    /// Get the number of decode errors.
    #[must_use]
    pub fn decode_errors(&self) -> usize {
        self.decode_errors.load(Ordering::Relaxed)
    }

    /// Get the number of envelopes addressed to unregistered recipients.
    #[must_use]
    pub fn unknown_recipients(&self) -> usize {
        self.unknown_recipients.load(Ordering::Relaxed)
    }

    /// Get the number of connection faults.
    #[must_use]
    pub fn connection_faults(&self) -> usize {
        self.connection_faults.load(Ordering::Relaxed)
    }

    pub(crate) fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn drop_one(counter: &AtomicUsize) {
        counter.fetch_sub(1, Ordering::Relaxed);
    }
}
