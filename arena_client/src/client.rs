//! Client implementation.
//!
//! The client maintains:
//! - One ordered TCP stream to the server (handshake, input, replication)
//! - A reader task that forwards decoded messages into a channel
//! - A [`LocalWorld`] driven by the render loop's frame delta

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use arena_shared::{
    config::ArenaConfig,
    error::RoomError,
    net::{FrameReader, FrameWriter, NetMsg, ReliableConn, SessionId, PROTOCOL_VERSION},
};
use tokio::{
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
    sync::mpsc::{self, error::TryRecvError},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{input::InputSource, world::LocalWorld};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Client connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// Admitted and exchanging messages.
    Playing,
    /// The server closed the session or the stream dropped.
    Disconnected,
}

/// High-level game client.
pub struct GameClient {
    pub session_id: SessionId,
    pub slot: usize,
    pub state: ClientState,
    pub world: LocalWorld,

    server: SocketAddr,
    writer: FrameWriter<OwnedWriteHalf>,
    inbound: mpsc::UnboundedReceiver<NetMsg>,
    reader_task: JoinHandle<()>,
}

impl GameClient {
    /// Connects and performs the handshake.
    ///
    /// A full room surfaces as [`RoomError::RoomFull`] inside the returned
    /// error, recoverable with `downcast_ref`.
    pub async fn connect(cfg: &ArenaConfig) -> anyhow::Result<Self> {
        let server: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        info!(server = %server, "Connecting to server");

        let mut conn = ReliableConn::connect(server).await?;
        conn.send(&NetMsg::Hello {
            protocol: PROTOCOL_VERSION,
        })
        .await?;

        let reply = tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.recv())
            .await
            .context("handshake timed out")??;
        let (session_id, slot) = match reply {
            NetMsg::Welcome { session_id, slot } => (session_id, slot),
            NetMsg::RoomFull { limit } => return Err(RoomError::RoomFull { limit }.into()),
            NetMsg::Disconnect { reason } => anyhow::bail!("server refused connection: {reason}"),
            other => anyhow::bail!("expected Welcome, got {}", other.kind()),
        };
        info!(session = %session_id, slot, "Joined room");

        let (reader, writer) = conn.into_split();
        let (tx, inbound) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(read_loop(reader, tx));

        Ok(Self {
            session_id,
            slot,
            state: ClientState::Playing,
            world: LocalWorld::new(session_id, cfg),
            server,
            writer,
            inbound,
            reader_task,
        })
    }

    /// Runs one render frame: buffers what arrived, runs due ticks, and
    /// sends the commands they produced.
    pub async fn frame(&mut self, delta: Duration, input: &mut dyn InputSource) -> anyhow::Result<()> {
        if self.state == ClientState::Disconnected {
            return Ok(());
        }
        self.pump();

        let commands = self.world.frame(delta, input);
        if self.world.disconnect_reason().is_some() {
            self.state = ClientState::Disconnected;
        }
        if self.state == ClientState::Disconnected {
            return Ok(());
        }

        for cmd in commands {
            if let Err(e) = self.writer.send(&NetMsg::Input(cmd.into())).await {
                warn!(error = %e, "Send failed");
                self.state = ClientState::Disconnected;
                break;
            }
        }
        Ok(())
    }

    fn pump(&mut self) {
        loop {
            match self.inbound.try_recv() {
                Ok(msg) => self.world.buffer(msg),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.state != ClientState::Disconnected {
                        info!(session = %self.session_id, "Connection to server lost");
                    }
                    self.state = ClientState::Disconnected;
                    break;
                }
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ClientState::Playing
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server
    }

    /// Executes a console command.
    pub fn exec_console(&self, line: &str) -> Vec<String> {
        match line.trim() {
            "" => Vec::new(),
            "status" => {
                let mut out = vec![
                    format!("State: {:?}", self.state),
                    format!("Session: {} (slot {})", self.session_id, self.slot),
                    format!("Server: {}", self.server_addr()),
                ];
                if let Some(p) = self.world.predictor() {
                    let pos = p.position();
                    out.push(format!(
                        "Local: ({:.1}, {:.1}) tick {} {:?}",
                        pos.x,
                        pos.y,
                        p.current_tick(),
                        p.movement_state()
                    ));
                    if let Some(auth) = p.authoritative_marker() {
                        out.push(format!(
                            "Authoritative: ({:.1}, {:.1}), {} unacknowledged",
                            auth.x,
                            auth.y,
                            p.unacknowledged()
                        ));
                    }
                }
                for (id, e) in self.world.remotes().iter() {
                    out.push(format!(
                        "Remote {}: ({:.1}, {:.1}) {:?}",
                        id, e.rendered.x, e.rendered.y, e.state
                    ));
                }
                out
            }
            other => vec![format!("Unknown command: {other}")],
        }
    }

    /// Leaves the room voluntarily.
    pub async fn disconnect(mut self) -> anyhow::Result<()> {
        let result = async {
            self.writer
                .send(&NetMsg::Disconnect {
                    reason: "client quit".into(),
                })
                .await?;
            self.writer.shutdown().await
        }
        .await;
        self.reader_task.abort();
        info!(session = %self.session_id, "Disconnected");
        result
    }
}

async fn read_loop(mut reader: FrameReader<OwnedReadHalf>, tx: mpsc::UnboundedSender<NetMsg>) {
    loop {
        let frame = match reader.recv_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Read failed");
                break;
            }
        };
        match arena_shared::net::decode_from_bytes(&frame) {
            Ok(msg) => {
                if tx.send(msg).is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "Dropping malformed frame"),
        }
    }
}
