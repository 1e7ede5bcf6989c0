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


//! `homelink-broker`: runs the message broker until interrupted.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use homelink::prelude::*;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Message broker for the SecureHome actors.
#[derive(Debug, Parser)]
#[command(name = "homelink-broker", version, about)]
struct Args {
    /// Configuration file (defaults to $XDG_CONFIG_HOME/homelink/broker.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration.
    #[arg(short, long)]
    address: Option<SocketAddr>,

    /// Also write daily-rotated logs to this directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = init_tracing(args.log_dir.as_deref());

    let mut config = match &args.config {
        Some(path) => BrokerConfig::from_file(path)?,
        None => BrokerConfig::load(),
    };
    if let Some(address) = args.address {
        config = config.with_address(address);
    }

    let broker = Broker::new(config);
    let address = broker
        .start()
        .await
        .context("broker failed to start")?;
    info!(%address, "Broker ready, press Ctrl-C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }

    broker.stop().await;
    let stats = broker.stats();
    info!(
        connections = stats.connections_accepted(),
        envelopes = stats.envelopes_routed(),
        deliveries = stats.deliveries(),
        "Broker exited"
    );
    Ok(())
}

fn init_tracing(log_dir: Option<&std::path::Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter).with(fmt::layer());

    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "homelink-broker.log");
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}
