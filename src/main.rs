// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use std::env;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use unitflow::backends::local::LocalEngineFactory;
use unitflow::bus::{LocalBus, StaticRegistry};
use unitflow::config::load_and_validate_config;
use unitflow::runtime::UnitController;
use unitflow::traits::{BusClient, BusMessage};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Host one unit on an in-process bus.
///
/// Request envelopes are read from stdin, one JSON object per line, and every
/// message published on the unit's reply topic is printed to stdout. The unit
/// shuts down once stdin is closed and all received requests are handled.
#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <unit-config.yaml|unit-config.toml>", args[0]);
        eprintln!(
            "Example: echo '{{\"request_id\":\"1\",\"work_id\":\"kws\",\"action\":\"setup\",\"data\":{{\"model\":\"echo\"}}}}' | {} configs/kws.yaml",
            args[0]
        );
        std::process::exit(1);
    }

    let config = load_and_validate_config(&args[1])
        .with_context(|| format!("load unit config {}", args[1]))?;
    let control_topic = config.control_topic().to_string();

    let bus = Arc::new(LocalBus::new());
    let registry = Arc::new(StaticRegistry::new());
    bus.subscribe(
        &config.reply_topic,
        Arc::new(|msg: BusMessage| println!("{}", String::from_utf8_lossy(&msg.payload))),
    )?;

    let controller = Arc::new(UnitController::new(
        config,
        bus.clone(),
        registry,
        Arc::new(LocalEngineFactory),
    ));
    let control_loop = controller.listen()?;
    let subscription = control_loop.subscription();
    let serve = tokio::spawn(control_loop.run());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        bus.publish(&control_topic, line.as_bytes().to_vec())?;
    }

    bus.unsubscribe(subscription);
    serve.await.context("control loop")?;
    controller.shutdown().await;
    Ok(())
}
