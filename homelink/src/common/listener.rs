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

//! TCP accept loop and per-connection workers.
//!
//! Each accepted connection gets a reader task that frames records, performs
//! the registration handshake and hands envelopes to the [`Router`], plus a
//! writer task that drains the connection's outbound queue. Faults on one
//! connection end that connection only.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

use crate::common::{
    Binding, BrokerConfig, ConnectionId, LineFramer, Registry, RelayError, RelayStats, Router,
};
use crate::message::{ActorId, Envelope, Handshake};

/// Shared state handed to every connection worker.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionContext {
    pub(crate) registry: Arc<Registry>,
    pub(crate) router: Router,
    pub(crate) stats: Arc<RelayStats>,
    pub(crate) config: Arc<BrokerConfig>,
}

/// Per-connection session state owned by the reader.
struct Session {
    id: ConnectionId,
    peer: SocketAddr,
    actor_id: Option<ActorId>,
    outbound: mpsc::Sender<Arc<str>>,
}

/// Accepts connections until `cancel_token` fires, then drops the listener.
pub(crate) async fn accept_loop(
    listener: TcpListener,
    ctx: ConnectionContext,
    cancel_token: CancellationToken,
    tracker: TaskTracker,
) {
    let connection_semaphore = Arc::new(Semaphore::new(ctx.config.limits.max_connections));
    let mut next_id: ConnectionId = 0;

    loop {
        tokio::select! {
            biased;

            () = cancel_token.cancelled() => {
                info!("Broker listener received shutdown signal");
                break;
            }

            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer)) => {
                        let Ok(permit) = connection_semaphore.clone().try_acquire_owned() else {
                            warn!(%peer, "Maximum concurrent connections reached, rejecting connection");
                            RelayStats::bump(&ctx.stats.connections_rejected);
                            drop(stream);
                            continue;
                        };

                        next_id += 1;
                        let conn_id = next_id;
                        RelayStats::bump(&ctx.stats.connections_accepted);
                        RelayStats::bump(&ctx.stats.connections_active);
                        trace!(connection = conn_id, %peer, "Accepted connection");

                        let ctx = ctx.clone();
                        let cancel_token = cancel_token.child_token();
                        tracker.spawn(async move {
                            handle_connection(stream, peer, conn_id, ctx.clone(), cancel_token).await;
                            RelayStats::drop_one(&ctx.stats.connections_active);
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        RelayStats::bump(&ctx.stats.connection_faults);
                    }
                }
            }
        }
    }

    debug!("Broker listener closed");
}

/// Serves one connection until the peer leaves, a fault occurs or the broker stops.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    conn_id: ConnectionId,
    ctx: ConnectionContext,
    cancel_token: CancellationToken,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(connection = conn_id, "Failed to set TCP_NODELAY: {}", e);
    }
    let (mut reader, writer) = stream.into_split();
    let (outbound, queue) = mpsc::channel(ctx.config.limits.outbound_buffer.max(1));
    let writer_task = tokio::spawn(write_loop(writer, queue, cancel_token.clone(), conn_id));

    let mut framer = LineFramer::new(ctx.config.limits.max_record_size);
    let mut session = Session {
        id: conn_id,
        peer,
        actor_id: None,
        outbound,
    };
    let read_timeout = ctx.config.read_timeout();

    debug!(connection = conn_id, %peer, "Connection handler started");

    loop {
        tokio::select! {
            biased;

            () = cancel_token.cancelled() => {
                trace!(connection = conn_id, "Connection received shutdown signal");
                break;
            }

            read_result = next_records(&mut framer, &mut reader, read_timeout) => {
                match read_result {
                    Ok(Some(records)) => {
                        for record in records {
                            handle_record(&ctx, &mut session, &record);
                        }
                    }
                    Ok(None) => {
                        debug!(connection = conn_id, "Connection closed by peer");
                        break;
                    }
                    Err(e) => {
                        warn!(connection = conn_id, %peer, "Closing connection: {}", e);
                        RelayStats::bump(&ctx.stats.connection_faults);
                        break;
                    }
                }
            }
        }
    }

    if let Some(actor_id) = session.actor_id.take() {
        if ctx.registry.release(&actor_id, conn_id) {
            info!(actor_id = %actor_id, connection = conn_id, "Actor unregistered");
        }
    }
    drop(session);

    cancel_token.cancel();
    if let Err(e) = writer_task.await {
        error!(connection = conn_id, "Writer task failed: {}", e);
    }

    debug!(connection = conn_id, "Connection handler finished");
}

/// Reads the next batch of records, honouring the optional idle timeout.
async fn next_records(
    framer: &mut LineFramer,
    reader: &mut OwnedReadHalf,
    read_timeout: Option<Duration>,
) -> Result<Option<Vec<String>>, RelayError> {
    match read_timeout {
        None => framer.read_records(reader).await,
        Some(limit) => match tokio::time::timeout(limit, framer.read_records(reader)).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::ConnectionFault(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("no data received for {limit:?}"),
            ))),
        },
    }
}

fn handle_record(ctx: &ConnectionContext, session: &mut Session, record: &str) {
    RelayStats::bump(&ctx.stats.records_received);

    if let Some(request) = Handshake::parse_request(record) {
        match request {
            Ok(actor_id) => register(ctx, session, actor_id),
            Err(e) => warn!(connection = session.id, peer = %session.peer, "Rejected registration: {}", e),
        }
        return;
    }

    let Some(actor_id) = &session.actor_id else {
        warn!(
            connection = session.id,
            peer = %session.peer,
            "Dropping record from unregistered connection"
        );
        return;
    };

    let envelope = match Envelope::decode(record.as_bytes()) {
        Ok(envelope) => envelope,
        Err(e) => {
            RelayStats::bump(&ctx.stats.decode_errors);
            warn!(actor_id = %actor_id, "Discarding malformed record: {}", e);
            return;
        }
    };

    if envelope.sender_id() != actor_id.as_str() {
        debug!(
            actor_id = %actor_id,
            sender = envelope.sender_id(),
            "Envelope sender differs from the registered identity"
        );
    }

    match ctx.router.route(&envelope) {
        Ok(_) | Err(RelayError::UnknownRecipient(_)) => {}
        Err(e) => warn!(actor_id = %actor_id, "Failed to route envelope: {}", e),
    }
}

fn register(ctx: &ConnectionContext, session: &mut Session, actor_id: ActorId) {
    if let Some(previous) = session.actor_id.take() {
        if previous != actor_id && ctx.registry.release(&previous, session.id) {
            debug!(actor_id = %previous, connection = session.id, "Released previous identity");
        }
    }

    // The acknowledgement must precede any envelope routed to the new binding.
    if let Err(e) = session.outbound.try_send(Arc::from(Handshake::ack(&actor_id))) {
        warn!(actor_id = %actor_id, "Failed to queue registration acknowledgement: {}", e);
    }

    let binding = Binding {
        connection: session.id,
        outbound: session.outbound.clone(),
    };
    if let Some(replaced) = ctx.registry.bind(actor_id.clone(), binding) {
        if replaced != session.id {
            info!(actor_id = %actor_id, replaced, connection = session.id, "Registration replaced an existing connection");
        }
    }
    RelayStats::bump(&ctx.stats.registrations);
    info!(actor_id = %actor_id, connection = session.id, peer = %session.peer, "Actor registered");
    session.actor_id = Some(actor_id);
}

/// Writes queued records in order until the queue closes or the connection is cancelled.
async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut queue: mpsc::Receiver<Arc<str>>,
    cancel_token: CancellationToken,
    conn_id: ConnectionId,
) {
    loop {
        tokio::select! {
            biased;

            () = cancel_token.cancelled() => break,

            next = queue.recv() => {
                let Some(record) = next else { break };
                // A peer that stops reading must not hold the connection open past a stop.
                tokio::select! {
                    biased;

                    () = cancel_token.cancelled() => {
                        trace!(connection = conn_id, "Abandoning pending write on shutdown");
                        break;
                    }

                    written = writer.write_all(record.as_bytes()) => {
                        if let Err(e) = written {
                            warn!(connection = conn_id, "Failed to write to connection: {}", e);
                            cancel_token.cancel();
                            break;
                        }
                    }
                }
            }
        }
    }

    if let Err(e) = writer.shutdown().await {
        trace!(connection = conn_id, "Failed to shut down write half: {}", e);
    }
}
