//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p arena_client -- [--addr 127.0.0.1:40000] [--config arena.json] [--frame-ms 16]
//!
//! The client joins the room, walks its fighter back and forth with scripted
//! input, and logs animation changes for every entity it sees.
//!
//! Console commands:
//!   status - Show predicted, authoritative and remote positions
//!   quit   - Leave the room and exit

use std::collections::HashMap;
use std::env;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use arena_client::{
    animation::{AnimationDriver, CharacterProfile, CharacterView, ClipSpec},
    client::GameClient,
    input::ScriptedInput,
};
use arena_shared::{config::ArenaConfig, error::RoomError, net::SessionId};
use tokio::{sync::mpsc, time::Instant};
use tracing::info;

struct Args {
    cfg: ArenaConfig,
    frame: Duration,
}

fn parse_args() -> anyhow::Result<Args> {
    let argv: Vec<String> = env::args().collect();
    let mut cfg = match argv.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < argv.len() => ArenaConfig::from_json_file(Path::new(&argv[i + 1]))?,
        _ => ArenaConfig::default(),
    };
    let mut frame = Duration::from_millis(16);

    let mut i = 1;
    while i < argv.len() {
        match argv[i].as_str() {
            "--addr" if i + 1 < argv.len() => {
                cfg.server_addr = argv[i + 1].clone();
                i += 2;
            }
            "--frame-ms" if i + 1 < argv.len() => {
                let ms: u64 = argv[i + 1].parse().context("parse --frame-ms")?;
                frame = Duration::from_millis(ms.max(1));
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(Args { cfg, frame })
}

/// Stand-in renderer that logs what a sprite would do.
struct LogView {
    session_id: SessionId,
}

impl CharacterView for LogView {
    fn play(&mut self, clip: &ClipSpec) {
        info!(
            session = %self.session_id,
            clip = %clip.key,
            frames = clip.frame_count(),
            fps = clip.frame_rate,
            "Play clip"
        );
    }

    fn set_facing(&mut self, left: bool) {
        info!(session = %self.session_id, facing_left = left, "Face");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let Args { cfg, frame } = parse_args()?;
    info!(server = %cfg.server_addr, "Starting client");

    let mut client = match GameClient::connect(&cfg).await {
        Ok(client) => client,
        Err(e) => {
            if let Some(RoomError::RoomFull { limit }) = e.downcast_ref::<RoomError>() {
                println!("Room is full ({limit} players). Try again later.");
                return Ok(());
            }
            return Err(e.context("connect"));
        }
    };

    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);
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

    println!("Joined as {} (slot {}). Type 'status' for info, 'quit' to exit.", client.session_id, client.slot);

    let profile = Arc::new(CharacterProfile::jin());
    let mut drivers: HashMap<SessionId, AnimationDriver<LogView>> = HashMap::new();
    let mut input = ScriptedInput::patrol(90);
    let mut interval = tokio::time::interval(frame);
    let mut last = Instant::now();

    loop {
        tokio::select! {
            now = interval.tick() => {
                client.frame(now - last, &mut input).await?;
                last = now;

                let entities = client.world.entities();
                drivers.retain(|id, _| entities.iter().any(|e| e.session_id == *id));
                for e in entities {
                    drivers
                        .entry(e.session_id)
                        .or_insert_with(|| {
                            AnimationDriver::new(profile.clone(), LogView { session_id: e.session_id })
                        })
                        .sync(e.state, e.facing_left);
                }

                if !client.is_connected() {
                    let reason = client.world.disconnect_reason().unwrap_or("connection lost");
                    println!("Disconnected from server: {reason}");
                    return Ok(());
                }
            }
            Some(line) = console_rx.recv() => {
                if matches!(line.as_str(), "quit" | "exit") {
                    break;
                }
                for out in client.exec_console(&line) {
                    println!("{out}");
                }
            }
        }
    }

    client.disconnect().await
}
