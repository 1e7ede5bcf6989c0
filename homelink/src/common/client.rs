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

//! TCP transport used by actors to reach the broker.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::common::bus::describe_panic;
use crate::common::{BrokerConfig, LineFramer, RelayError};
use crate::message::{ActorId, Envelope, Handshake};
use crate::traits::{EnvelopeHandler, MessageBus};

/// Client-side connection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// How long to wait for the registration acknowledgement.
    pub handshake_timeout: Duration,
    /// Largest record accepted from the broker.
    pub max_record_size: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from(&BrokerConfig::default())
    }
}

impl From<&BrokerConfig> for ClientOptions {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            handshake_timeout: config.handshake_timeout(),
            max_record_size: config.limits.max_record_size,
        }
    }
}

type Handlers = Arc<RwLock<Vec<EnvelopeHandler>>>;

/// A registered connection to the broker.
///
/// Envelopes received from the broker are handed to every attached handler in
/// arrival order on the client's reader task. Envelopes arriving while no
/// handler is attached are dropped.
pub struct RelayClient {
    actor_id: ActorId,
    writer: Mutex<Option<OwnedWriteHalf>>,
    handlers: Handlers,
    cancel_token: CancellationToken,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("actor_id", &self.actor_id)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl RelayClient {
    /// Connects to the broker at `address` and registers as `actor_id`.
    ///
    /// Returns once the broker has acknowledged the registration.
    ///
    /// # Errors
    ///
    /// * [`RelayError::ConnectionFault`] if the broker cannot be reached.
    /// * [`RelayError::HandshakeTimeout`] if no acknowledgement arrives in time.
    /// * [`RelayError::HandshakeRejected`] if the broker closes the connection or
    ///   acknowledges a different identity.
    pub async fn connect(
        address: impl ToSocketAddrs,
        actor_id: ActorId,
        options: ClientOptions,
    ) -> Result<Self, RelayError> {
        let stream = TcpStream::connect(address).await?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }
        let (mut reader, mut writer) = stream.into_split();
        writer.write_all(Handshake::request(&actor_id).as_bytes()).await?;

        let mut framer = LineFramer::new(options.max_record_size);
        let backlog = match tokio::time::timeout(
            options.handshake_timeout,
            await_ack(&mut framer, &mut reader, &actor_id),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(RelayError::HandshakeTimeout),
        };
        info!(actor_id = %actor_id, "Registered with broker");

        let handlers: Handlers = Arc::default();
        let cancel_token = CancellationToken::new();
        let reader_task = tokio::spawn(read_loop(
            reader,
            framer,
            backlog,
            handlers.clone(),
            cancel_token.clone(),
            actor_id.clone(),
        ));

        Ok(Self {
            actor_id,
            writer: Mutex::new(Some(writer)),
            handlers,
            cancel_token,
            reader: parking_lot::Mutex::new(Some(reader_task)),
        })
    }

    /// Whether the connection to the broker is still open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.cancel_token.is_cancelled()
    }
}

#[async_trait]
impl MessageBus for RelayClient {
    fn actor_id(&self) -> &ActorId {
        &self.actor_id
    }

    async fn send(&self, envelope: Envelope) -> Result<(), RelayError> {
        let mut record = envelope.encode()?;
        record.push('\n');

        let mut writer = self.writer.lock().await;
        let stream = match &mut *writer {
            Some(stream) if self.is_connected() => stream,
            _ => return Err(RelayError::NotConnected),
        };
        stream.write_all(record.as_bytes()).await?;
        trace!(actor_id = %self.actor_id, kind = %envelope.kind(), "Envelope sent");
        Ok(())
    }

    fn on_receive(&self, handler: EnvelopeHandler) {
        self.handlers.write().push(handler);
    }

    async fn disconnect(&self) -> Result<(), RelayError> {
        self.cancel_token.cancel();

        let writer = self.writer.lock().await.take();
        if let Some(mut stream) = writer {
            if let Err(e) = stream.shutdown().await {
                debug!(actor_id = %self.actor_id, "Failed to shut down connection: {}", e);
            }
            info!(actor_id = %self.actor_id, "Disconnected from broker");
        }

        let reader = self.reader.lock().take();
        if let Some(task) = reader {
            if let Err(e) = task.await {
                error!(actor_id = %self.actor_id, "Reader task failed: {}", e);
            }
        }
        Ok(())
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Reads until the acknowledgement for `actor_id` arrives.
///
/// Envelope records that precede it are returned for later dispatch.
async fn await_ack(
    framer: &mut LineFramer,
    reader: &mut OwnedReadHalf,
    actor_id: &ActorId,
) -> Result<Vec<String>, RelayError> {
    let mut backlog = Vec::new();
    loop {
        let Some(records) = framer.read_records(reader).await? else {
            return Err(RelayError::HandshakeRejected(
                "connection closed before acknowledgement".to_string(),
            ));
        };
        let mut records = records.into_iter();
        while let Some(record) = records.next() {
            match Handshake::parse_ack(&record) {
                Some(acked) if acked == actor_id.as_str() => {
                    backlog.extend(records);
                    return Ok(backlog);
                }
                Some(_) => return Err(RelayError::HandshakeRejected(record.clone())),
                None => backlog.push(record),
            }
        }
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    mut framer: LineFramer,
    backlog: Vec<String>,
    handlers: Handlers,
    cancel_token: CancellationToken,
    actor_id: ActorId,
) {
    for record in backlog {
        dispatch(&handlers, &actor_id, &record);
    }

    loop {
        tokio::select! {
            biased;

            () = cancel_token.cancelled() => break,

            read_result = framer.read_records(&mut reader) => {
                match read_result {
                    Ok(Some(records)) => {
                        for record in records {
                            dispatch(&handlers, &actor_id, &record);
                        }
                    }
                    Ok(None) => {
                        info!(actor_id = %actor_id, "Broker closed the connection");
                        break;
                    }
                    Err(e) => {
                        warn!(actor_id = %actor_id, "Connection to broker failed: {}", e);
                        break;
                    }
                }
            }
        }
    }

    cancel_token.cancel();
}

fn dispatch(handlers: &Handlers, actor_id: &ActorId, record: &str) {
    let envelope = match Envelope::decode(record.as_bytes()) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(actor_id = %actor_id, "Discarding malformed record from broker: {}", e);
            return;
        }
    };

    let handlers = handlers.read().clone();
    if handlers.is_empty() {
        warn!(
            actor_id = %actor_id,
            kind = %envelope.kind(),
            "No handler attached, dropping envelope"
        );
        return;
    }

    for handler in handlers {
        let envelope = envelope.clone();
        if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| handler(envelope))) {
            error!(
                actor_id = %actor_id,
                "Envelope handler panicked: {}",
                describe_panic(panic.as_ref())
            );
        }
    }
}
