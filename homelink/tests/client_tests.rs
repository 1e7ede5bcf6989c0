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
use std::sync::Arc;
use std::time::Duration;

use homelink::prelude::*;
use homelink_test::prelude::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::setup::*;

mod setup;

fn id(value: &str) -> ActorId {
    ActorId::new(value).expect("valid actor id")
}

async fn client(address: std::net::SocketAddr, actor_id: &str) -> anyhow::Result<(RelayClient, mpsc::UnboundedReceiver<Envelope>)> {
    let client = RelayClient::connect(address, id(actor_id), ClientOptions::default()).await?;
    let (tx, rx) = mpsc::unbounded_channel();
    client.on_receive_fn(move |envelope| {
        let _ = tx.send(envelope);
    });
    Ok((client, rx))
}

async fn receive(rx: &mut mpsc::UnboundedReceiver<Envelope>) -> anyhow::Result<Envelope> {
    tokio::time::timeout(RECEIVE_TIMEOUT, rx.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("handler channel closed"))
}

#[homelink_test]
async fn agents_exchange_messages_through_the_broker() -> anyhow::Result<()> {
    let (broker, address) = start_broker().await?;
    let (house, mut house_rx) = client(address, "house001").await?;
    let (center, mut center_rx) = client(address, "monitoring_center").await?;
    let house = Agent::new(house);
    let center = Agent::new(center);
    assert!(broker.is_registered("house001") && broker.is_registered("monitoring_center"));

    house
        .send_message(MessageType::Threat, "smoke in kitchen", Some("monitoring_center"))
        .await?;
    let threat = receive(&mut center_rx).await?;
    assert_eq!(threat.sender_id(), "house001");
    assert_eq!(threat.kind(), &MessageType::Threat);

    center
        .send_envelope(MessageType::ThreatReceived.envelope_to("monitoring_center", "ack", "house001")?)
        .await?;
    assert_eq!(receive(&mut house_rx).await?.kind(), &MessageType::ThreatReceived);

    center.send_message(MessageType::TimeSync, "12:00", None).await?;
    let sync = receive(&mut house_rx).await?;
    assert!(sync.is_broadcast());
    assert!(tokio::time::timeout(SILENCE, center_rx.recv()).await.is_err());

    house.stop().await?;
    center.stop().await?;
    broker.stop().await;
    Ok(())
}

#[homelink_test]
async fn disconnect_is_idempotent_and_unregisters() -> anyhow::Result<()> {
    let (broker, address) = start_broker().await?;
    let (house, _rx) = client(address, "house001").await?;
    assert!(house.is_connected());

    house.disconnect().await?;
    house.disconnect().await?;
    assert!(!house.is_connected());
    assert!(matches!(
        house.send(MessageType::Hello.envelope("house001", "")?).await,
        Err(RelayError::NotConnected)
    ));
    assert!(eventually(|| !broker.is_registered("house001")).await);

    broker.stop().await;
    Ok(())
}

#[homelink_test]
async fn broker_shutdown_is_observed_by_clients() -> anyhow::Result<()> {
    let (broker, address) = start_broker().await?;
    let (house, _rx) = client(address, "house001").await?;

    broker.stop().await;
    assert!(eventually(|| !house.is_connected()).await);
    assert!(matches!(
        house.send(MessageType::GoodBye.envelope("house001", "")?).await,
        Err(RelayError::NotConnected)
    ));
    Ok(())
}

#[homelink_test]
async fn unreachable_broker_is_a_connection_fault() -> anyhow::Result<()> {
    initialize_tracing();
    let address = std::net::TcpListener::bind("127.0.0.1:0")?.local_addr()?;
    let result = RelayClient::connect(address, id("house001"), ClientOptions::default()).await;
    assert!(matches!(result, Err(RelayError::ConnectionFault(_))));
    Ok(())
}

#[homelink_test]
async fn missing_acknowledgement_times_out() -> anyhow::Result<()> {
    initialize_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;
    let silent = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await?;
        let mut buffer = [0_u8; 64];
        let read = stream.read(&mut buffer).await?;
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok::<_, std::io::Error>(read)
    });

    let options = ClientOptions {
        handshake_timeout: Duration::from_millis(100),
        ..ClientOptions::default()
    };
    let result = RelayClient::connect(address, id("house001"), options).await;
    assert!(matches!(result, Err(RelayError::HandshakeTimeout)));
    assert_eq!(silent.await??, "REGISTER|house001\n".len());
    Ok(())
}

#[homelink_test]
async fn acknowledgement_for_another_identity_is_rejected() -> anyhow::Result<()> {
    initialize_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;
    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let _ = stream.write_all(b"REGISTERED|house002\n").await;
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    });

    let result = RelayClient::connect(address, id("house001"), ClientOptions::default()).await;
    assert!(matches!(result, Err(RelayError::HandshakeRejected(record)) if record == "REGISTERED|house002"));
    Ok(())
}

// Uses a plain tokio runtime: the panicking handler would otherwise be reported
// as a test failure by the panic watch.
#[tokio::test]
async fn panicking_handler_does_not_stop_delivery() -> anyhow::Result<()> {
    let (broker, address) = start_broker().await?;
    let center = RelayClient::connect(address, id("monitoring_center"), ClientOptions::default()).await?;
    let calls = Arc::new(AtomicUsize::new(0));
    center.on_receive_fn(|_| panic!("handler failure"));
    let counter = calls.clone();
    center.on_receive_fn(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let house = Agent::new(RelayClient::connect(address, id("house001"), ClientOptions::default()).await?);
    for _ in 0..3 {
        house.send_message(MessageType::Threat, "", Some("monitoring_center")).await?;
    }

    assert!(eventually(|| calls.load(Ordering::SeqCst) == 3).await);
    assert!(center.is_connected());

    broker.stop().await;
    Ok(())
}
