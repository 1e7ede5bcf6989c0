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


#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Once;
use std::time::Duration;

use homelink::prelude::*;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// How long a test waits for a record it expects.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a test listens to conclude that nothing arrives.
pub const SILENCE: Duration = Duration::from_millis(200);

// Ensures tracing initialization happens only once across all tests.
static INIT: Once = Once::new();

/// Initializes the global tracing subscriber for tests, logging to `logs/`.
pub fn initialize_tracing() {
    INIT.call_once(|| {
        std::fs::create_dir_all("logs").expect("could not create logs dir");

        let file_appender = RollingFileAppender::new(Rotation::NEVER, "logs", "homelink_tests.txt");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Leak the guard so the non-blocking writer is not dropped before process exit
        Box::leak(Box::new(guard));

        let filter = EnvFilter::new("debug")
            .add_directive("homelink=trace".parse().unwrap())
            .add_directive("broker_tests=trace".parse().unwrap())
            .add_directive("client_tests=trace".parse().unwrap())
            .add_directive("bus_tests=trace".parse().unwrap());

        let subscriber = FmtSubscriber::builder()
            .with_span_events(FmtSpan::NONE)
            .with_max_level(Level::TRACE)
            .compact()
            .with_line_number(true)
            .with_target(true)
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .with_ansi(false)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("setting default subscriber failed");
    });
}

/// Configuration bound to an ephemeral loopback port.
pub fn local_config() -> BrokerConfig {
    BrokerConfig::default().with_address("127.0.0.1:0".parse().unwrap())
}

/// Starts a broker on an ephemeral port.
pub async fn start_broker() -> anyhow::Result<(Broker, SocketAddr)> {
    initialize_tracing();
    let broker = Broker::new(local_config());
    let address = broker.start().await?;
    Ok((broker, address))
}

/// Polls `condition` until it holds or the receive timeout elapses.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + RECEIVE_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// An actor speaking the wire protocol directly over a socket.
pub struct RawActor {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl RawActor {
    /// Opens a connection without registering.
    pub async fn connect(address: SocketAddr) -> anyhow::Result<Self> {
        let (reader, writer) = TcpStream::connect(address).await?.into_split();
        Ok(Self {
            lines: BufReader::new(reader).lines(),
            writer,
        })
    }

    /// Opens a connection and completes the registration handshake.
    pub async fn register(address: SocketAddr, actor_id: &str) -> anyhow::Result<Self> {
        let mut actor = Self::connect(address).await?;
        actor.send_raw(format!("REGISTER|{actor_id}\n").as_bytes()).await?;
        let ack = actor.next_line().await?;
        anyhow::ensure!(ack == format!("REGISTERED|{actor_id}"), "unexpected ack: {ack}");
        Ok(actor)
    }

    /// Writes raw bytes.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        self.writer.write_all(bytes).await?;
        Ok(())
    }

    /// Writes one envelope record.
    pub async fn send(&mut self, envelope: &Envelope) -> anyhow::Result<()> {
        let record = format!("{}\n", envelope.encode()?);
        self.send_raw(record.as_bytes()).await
    }

    /// Reads the next line, failing after the receive timeout or on EOF.
    pub async fn next_line(&mut self) -> anyhow::Result<String> {
        match tokio::time::timeout(RECEIVE_TIMEOUT, self.lines.next_line()).await {
            Ok(Ok(Some(line))) => Ok(line),
            Ok(Ok(None)) => anyhow::bail!("connection closed"),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => anyhow::bail!("no record within {RECEIVE_TIMEOUT:?}"),
        }
    }

    /// Reads and decodes the next envelope.
    pub async fn next_envelope(&mut self) -> anyhow::Result<Envelope> {
        let line = self.next_line().await?;
        Ok(Envelope::decode(line.as_bytes())?)
    }

    /// Returns `true` when nothing arrives for a short while.
    pub async fn is_silent(&mut self) -> bool {
        matches!(
            tokio::time::timeout(SILENCE, self.lines.next_line()).await,
            Err(_)
        )
    }

    /// Returns `true` when the broker closed the connection.
    pub async fn is_closed(&mut self) -> bool {
        matches!(
            tokio::time::timeout(RECEIVE_TIMEOUT, self.lines.next_line()).await,
            Ok(Ok(None) | Err(_))
        )
    }
}
