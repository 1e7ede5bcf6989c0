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

//! In-process transport with the broker's addressing policy and no sockets.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::common::{RelayError, RelayStats};
use crate::message::{ActorId, Envelope};
use crate::traits::{EnvelopeHandler, MessageBus};

/// Shared subscriber registry for actors living in one process.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct InProcessBus {
    subscribers: Arc<Mutex<HashMap<ActorId, Vec<EnvelopeHandler>>>>,
    stats: Arc<RelayStats>,
}

impl std::fmt::Debug for InProcessBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessBus")
            .field("registered", &self.subscribers.lock().len())
            .finish_non_exhaustive()
    }
}

impl InProcessBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for this bus.
    #[must_use]
    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Adds `handler` to the handlers of `actor_id`, registering the actor if needed.
    pub fn register(&self, actor_id: ActorId, handler: EnvelopeHandler) {
        self.subscribers.lock().entry(actor_id.clone()).or_default().push(handler);
        RelayStats::bump(&self.stats.registrations);
        debug!(actor_id = %actor_id, "Handler registered on in-process bus");
    }

    /// Removes `actor_id` and all of its handlers. Returns whether it was registered.
    pub fn stop(&self, actor_id: &str) -> bool {
        let removed = self.subscribers.lock().remove(actor_id).is_some();
        if removed {
            info!(actor_id, "Actor removed from in-process bus");
        }
        removed
    }

    /// Whether `actor_id` is registered.
    #[must_use]
    pub fn is_registered(&self, actor_id: &str) -> bool {
        self.subscribers.lock().contains_key(actor_id)
    }

    /// Dispatches `envelope` to every matching handler and returns without
    /// waiting for them.
    ///
    /// Each handler runs as its own Tokio task, so this must be called from
    /// within a runtime. Returns the number of handlers dispatched.
    ///
    /// # Errors
    ///
    /// [`RelayError::UnknownRecipient`] when a unicast recipient is not
    /// registered; nothing is dispatched.
    ///
    /// [`RelayError::NoRuntime`] when called outside a Tokio runtime.
    pub fn send(&self, envelope: Envelope) -> Result<usize, RelayError> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(sender = envelope.sender_id(), "Cannot dispatch envelope outside a Tokio runtime");
            return Err(RelayError::NoRuntime);
        };
        RelayStats::bump(&self.stats.envelopes_routed);

        let selected: Option<Vec<(ActorId, EnvelopeHandler)>> = {
            let subscribers = self.subscribers.lock();
            envelope.route().select(&*subscribers).map(|selected| {
                selected
                    .into_iter()
                    .flat_map(|(actor_id, handlers)| {
                        handlers.iter().map(move |handler| (actor_id.clone(), Arc::clone(handler)))
                    })
                    .collect()
            })
        };

        let Some(handlers) = selected else {
            RelayStats::bump(&self.stats.unknown_recipients);
            warn!(
                sender = envelope.sender_id(),
                recipient = envelope.recipient_id(),
                kind = %envelope.kind(),
                "Recipient not found, dropping envelope"
            );
            return Err(RelayError::UnknownRecipient(envelope.recipient_id().to_string()));
        };

        let dispatched = handlers.len();
        for (actor_id, handler) in handlers {
            let envelope = envelope.clone();
            runtime.spawn(async move {
                if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| handler(envelope))) {
                    error!(
                        actor_id = %actor_id,
                        "Envelope handler panicked: {}",
                        describe_panic(panic.as_ref())
                    );
                }
            });
        }

        RelayStats::add(&self.stats.deliveries, dispatched);
        trace!(sender = envelope.sender_id(), kind = %envelope.kind(), dispatched, "Envelope dispatched");
        Ok(dispatched)
    }

    /// Registers `actor_id` without handlers and returns an endpoint for it.
    #[must_use]
    pub fn connect(&self, actor_id: ActorId) -> BusEndpoint {
        self.subscribers.lock().entry(actor_id.clone()).or_default();
        info!(actor_id = %actor_id, "Actor connected to in-process bus");
        BusEndpoint {
            bus: self.clone(),
            actor_id,
            connected: AtomicBool::new(true),
        }
    }
}

/// One actor's view of an [`InProcessBus`].
#[derive(Debug)]
pub struct BusEndpoint {
    bus: InProcessBus,
    actor_id: ActorId,
    connected: AtomicBool,
}

#[async_trait]
impl MessageBus for BusEndpoint {
    fn actor_id(&self) -> &ActorId {
        &self.actor_id
    }

    async fn send(&self, envelope: Envelope) -> Result<(), RelayError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(RelayError::NotConnected);
        }
        match self.bus.send(envelope) {
            // Already logged by the bus; unknown recipients are not an error for the sender.
            Ok(_) | Err(RelayError::UnknownRecipient(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn on_receive(&self, handler: EnvelopeHandler) {
        self.bus.register(self.actor_id.clone(), handler);
    }

    async fn disconnect(&self) -> Result<(), RelayError> {
        if self.connected.swap(false, Ordering::AcqRel) {
            self.bus.stop(self.actor_id.as_str());
        }
        Ok(())
    }
}

pub(crate) fn describe_panic(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use tokio::sync::mpsc;

    fn id(value: &str) -> ActorId {
        ActorId::new(value).unwrap()
    }

    fn forward(tx: mpsc::UnboundedSender<Envelope>) -> EnvelopeHandler {
        Arc::new(move |envelope| {
            let _ = tx.send(envelope);
        })
    }

    #[tokio::test]
    async fn unknown_recipient_is_a_reported_no_op() {
        let bus = InProcessBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.register(id("house001"), forward(tx));

        let envelope = MessageType::Threat.envelope_to("house001", "", "house404").unwrap();
        assert!(matches!(bus.send(envelope), Err(RelayError::UnknownRecipient(_))));
        assert_eq!(bus.stats().unknown_recipients(), 1);
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stop_removes_every_handler() {
        let bus = InProcessBus::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        bus.register(id("house001"), forward(tx.clone()));
        bus.register(id("house001"), forward(tx));

        assert!(bus.stop("house001"));
        assert!(!bus.is_registered("house001"));
        assert!(!bus.stop("house001"));
    }

    #[tokio::test]
    async fn broadcast_reaches_every_handler_but_the_sender() {
        let bus = InProcessBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (own_tx, mut own_rx) = mpsc::unbounded_channel();
        bus.register(id("house001"), forward(own_tx));
        bus.register(id("house002"), forward(tx.clone()));
        bus.register(id("monitoring_center"), forward(tx.clone()));
        bus.register(id("monitoring_center"), forward(tx));

        let dispatched = bus
            .send(MessageType::ThreatEnvironment.envelope("house001", "storm").unwrap())
            .unwrap();
        assert_eq!(dispatched, 3);

        for _ in 0..3 {
            assert_eq!(rx.recv().await.unwrap().sender_id(), "house001");
        }
        tokio::task::yield_now().await;
        assert!(own_rx.try_recv().is_err());
    }

    // Plain `#[tokio::test]`: the handler panic is expected and caught by the bus.
    #[tokio::test]
    async fn panicking_handlers_do_not_stop_dispatch() {
        use std::sync::atomic::AtomicUsize;
        use std::time::Duration;

        let bus = InProcessBus::new();
        let delivered = Arc::new(AtomicUsize::new(0));
        bus.register(id("monitoring_center"), Arc::new(|_: Envelope| panic!("handler failure")));
        let counter = Arc::clone(&delivered);
        bus.register(
            id("monitoring_center"),
            Arc::new(move |_: Envelope| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let send = |n: usize| {
            bus.send(
                MessageType::HouseSecurityStatus
                    .envelope_to("house001", n.to_string(), "monitoring_center")
                    .unwrap(),
            )
        };
        for n in 0..5 {
            assert_eq!(send(n).unwrap(), 2);
        }
        let reached = |expected: usize| {
            let delivered = Arc::clone(&delivered);
            tokio::time::timeout(Duration::from_secs(2), async move {
                while delivered.load(Ordering::SeqCst) < expected {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
        };
        reached(5).await.expect("counting handler missed envelopes");

        assert_eq!(send(5).unwrap(), 2);
        reached(6).await.expect("dispatch stopped after a handler panic");
        assert!(bus.is_registered("monitoring_center"));
        assert_eq!(bus.stats().deliveries(), 12);
    }

    #[test]
    fn sending_outside_a_runtime_is_an_error() {
        let bus = InProcessBus::new();
        bus.register(id("monitoring_center"), Arc::new(|_: Envelope| {}));

        let envelope = MessageType::Threat.envelope_to("house001", "", "monitoring_center").unwrap();
        assert!(matches!(bus.send(envelope), Err(RelayError::NoRuntime)));
        assert_eq!(bus.stats().deliveries(), 0);
    }

    #[test]
    fn panic_payloads_are_described() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(describe_panic(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(describe_panic(payload.as_ref()), "bang");
    }
}
