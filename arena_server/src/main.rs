//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p arena_server -- [--config arena.json] [--addr 127.0.0.1:40000]
//!                                [--tick-hz 60] [--latency-ms 0]
//!
//! The server accepts up to `max_players` sessions into a single room, runs
//! the fixed-tick simulation and replicates state to every session.
//!
//! Console commands:
//!   status          - Show room status
//!   latency <ms>    - Set simulated outbound latency (0 disables)
//!   quit            - Shutdown server

use std::env;
use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::Context;
use arena_server::GameServer;
use arena_shared::config::ArenaConfig;
use tokio::sync::mpsc;
use tracing::{info, warn};

fn parse_args() -> anyhow::Result<ArenaConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => ArenaConfig::from_json_file(Path::new(&args[i + 1]))?,
        _ => ArenaConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().context("--tick-hz")?;
                i += 2;
            }
            "--latency-ms" if i + 1 < args.len() => {
                cfg.simulated_latency_ms = args[i + 1].parse().context("--latency-ms")?;
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(
        addr = %cfg.server_addr,
        tick_hz = cfg.tick_hz,
        max_players = cfg.max_players,
        "Starting server"
    );

    let server = GameServer::new(cfg).await.context("create server")?;
    let local = server.local_addr()?;
    info!(%local, "Server listening");

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Server ready. Type 'status' for info, 'latency <ms>' to simulate lag, 'quit' to exit.");
    println!();

    loop {
        tokio::select! {
            accepted = server.accept_one() => match accepted {
                Ok(peer) => info!(%peer, "New connection"),
                Err(e) => warn!(error = %e, "Accept failed"),
            },
            Some(line) = console_rx.recv() => {
                if matches!(line.as_str(), "quit" | "exit") {
                    break;
                }
                match server.exec_console(&line).await {
                    Ok(output) => {
                        for line in output {
                            println!("{line}");
                        }
                    }
                    Err(e) => println!("Error: {e:#}"),
                }
            }
        }
    }

    info!("Server shutting down");
    server.shutdown("server shutting down").await
}
