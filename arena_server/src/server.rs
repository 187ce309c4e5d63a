//! Server runtime.
//!
//! Task layout:
//! - one room task owning the `Room`; it alone mutates world state;
//! - per connection, a reader task turning frames into room commands and a
//!   writer task draining that session's outbound queue.
//!
//! The room task handles commands between ticks, never during one, so joins
//! and leaves cannot interleave with a running simulation step.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use anyhow::{bail, Context};
use arena_shared::{
    config::{ArenaConfig, MAX_SIMULATED_LATENCY_MS},
    error::RoomError,
    net::{
        decode_from_bytes, FrameReader, FrameWriter, InputPayload, NetMsg, ReliableConn,
        ReliableListener, SessionId, PROTOCOL_VERSION,
    },
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    latency::LatencySimulation,
    replicator::SessionSink,
    room::{Room, RoomPhase},
};

/// How long a fresh connection may take to say hello.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

const ROOM_QUEUE_DEPTH: usize = 1024;

/// A message waiting in a session's outbound queue.
#[derive(Debug)]
pub struct Outbound {
    pub due: Instant,
    pub msg: NetMsg,
}

/// Room-side handle to a connection's writer task.
struct ConnectionSink {
    tx: mpsc::UnboundedSender<Outbound>,
    latency: LatencySimulation,
}

impl SessionSink for ConnectionSink {
    fn deliver(&mut self, msg: NetMsg) -> anyhow::Result<()> {
        let due = self.latency.due_at(Instant::now());
        self.tx
            .send(Outbound { due, msg })
            .map_err(|_| anyhow::anyhow!("connection writer closed"))
    }
}

/// Why a session left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    /// Client said goodbye.
    Consented,
    /// Transport closed or failed.
    ConnectionLost,
}

/// Requests serialized into the room task.
pub enum RoomCommand {
    Join {
        session_id: SessionId,
        sink: Box<dyn SessionSink>,
        reply: oneshot::Sender<Result<usize, RoomError>>,
    },
    Leave {
        session_id: SessionId,
        reason: LeaveReason,
    },
    Input {
        session_id: SessionId,
        payload: InputPayload,
    },
    Status {
        reply: oneshot::Sender<Vec<String>>,
    },
    Shutdown {
        reason: String,
    },
}

/// Cloneable sender side of a room task.
#[derive(Clone)]
pub struct RoomHandle {
    tx: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub async fn join(
        &self,
        session_id: SessionId,
        sink: Box<dyn SessionSink>,
    ) -> Result<usize, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RoomCommand::Join {
                session_id,
                sink,
                reply,
            })
            .await
            .map_err(|_| RoomError::Disposed)?;
        rx.await.map_err(|_| RoomError::Disposed)?
    }

    pub async fn leave(&self, session_id: SessionId, reason: LeaveReason) {
        let _ = self
            .tx
            .send(RoomCommand::Leave { session_id, reason })
            .await;
    }

    /// Returns false once the room task is gone.
    pub async fn input(&self, session_id: SessionId, payload: InputPayload) -> bool {
        self.tx
            .send(RoomCommand::Input {
                session_id,
                payload,
            })
            .await
            .is_ok()
    }

    pub async fn status(&self) -> Vec<String> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(RoomCommand::Status { reply }).await.is_err() {
            return vec!["Room disposed".to_string()];
        }
        rx.await.unwrap_or_else(|_| vec!["Room disposed".to_string()])
    }

    pub async fn shutdown(&self, reason: &str) {
        let _ = self
            .tx
            .send(RoomCommand::Shutdown {
                reason: reason.to_string(),
            })
            .await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the room task has exited.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Spawns the task that owns `room`.
pub fn spawn_room(room: Room) -> (RoomHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(ROOM_QUEUE_DEPTH);
    let task = tokio::spawn(run_room(room, rx));
    (RoomHandle { tx }, task)
}

/// Room task body: ticks on a timer, applies commands in between.
pub async fn run_room(mut room: Room, mut rx: mpsc::Receiver<RoomCommand>) {
    let mut interval = time::interval(room.fixed_step());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(cmd) => apply_command(&mut room, cmd),
                None => room.dispose("server shutting down"),
            },
            _ = interval.tick() => {
                let now = Instant::now();
                // A fatal error has already disposed the room and been logged.
                let _ = room.advance(now - last);
                last = now;
            }
        }

        if room.phase() == RoomPhase::Disposed {
            break;
        }
    }
    info!(ticks = room.tick(), "Room task finished");
}

fn apply_command(room: &mut Room, cmd: RoomCommand) {
    match cmd {
        RoomCommand::Join {
            session_id,
            sink,
            reply,
        } => {
            let result = room.join(session_id, sink);
            if let Err(e) = &result {
                info!(session_id = %session_id, error = %e, "Join rejected");
            }
            let _ = reply.send(result);
        }
        RoomCommand::Leave { session_id, reason } => {
            if reason == LeaveReason::ConnectionLost {
                let lost = RoomError::ConnectionLost(session_id);
                debug!(error = %lost, "Treating as leave");
            }
            room.leave(session_id);
        }
        RoomCommand::Input {
            session_id,
            payload,
        } => match room.on_input(session_id, payload) {
            Ok(()) => {}
            Err(e @ RoomError::MalformedCommand(_)) => {
                warn!(session_id = %session_id, error = %e, "Dropping input");
            }
            Err(e) => {
                debug!(session_id = %session_id, error = %e, "Dropping input");
            }
        },
        RoomCommand::Status { reply } => {
            let _ = reply.send(room.status_lines());
        }
        RoomCommand::Shutdown { reason } => room.dispose(&reason),
    }
}

/// Game server: listener plus one room.
pub struct GameServer {
    pub cfg: ArenaConfig,
    listener: ReliableListener,
    room: RoomHandle,
    room_task: JoinHandle<()>,
    latency: LatencySimulation,
}

impl GameServer {
    /// Binds the listener and starts the room task.
    pub async fn new(cfg: ArenaConfig) -> anyhow::Result<Self> {
        cfg.validate()?;
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let listener = ReliableListener::bind(addr).await?;
        Ok(Self::with_listener(cfg, listener))
    }

    fn with_listener(cfg: ArenaConfig, listener: ReliableListener) -> Self {
        let latency = LatencySimulation::new();
        if cfg.simulated_latency_ms > 0 {
            latency.start(Duration::from_millis(cfg.simulated_latency_ms));
        }
        let (room, room_task) = spawn_room(Room::new(&cfg));
        Self {
            cfg,
            listener,
            room,
            room_task,
            latency,
        }
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn room(&self) -> RoomHandle {
        self.room.clone()
    }

    pub fn latency(&self) -> &LatencySimulation {
        &self.latency
    }

    /// Accepts one connection and hands it to its own task.
    pub async fn accept_one(&self) -> anyhow::Result<SocketAddr> {
        let (conn, peer) = self.listener.accept().await?;
        let room = self.room.clone();
        let latency = self.latency.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(conn, room, latency).await {
                warn!(%peer, error = %e, "Connection ended with error");
            }
        });
        Ok(peer)
    }

    /// Accepts connections until the room is gone.
    pub async fn run(&self) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                _ = self.room.closed() => break,
                accepted = self.accept_one() => match accepted {
                    Ok(peer) => debug!(%peer, "Accepted connection"),
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
            }
        }
        debug!("Room closed, no longer accepting");
        Ok(())
    }

    /// Executes a console command.
    pub async fn exec_console(&self, line: &str) -> anyhow::Result<Vec<String>> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&cmd) = tokens.first() else {
            return Ok(Vec::new());
        };

        match cmd {
            "status" => {
                let mut out = self.room.status().await;
                out.push(format!("Listening on: {}", self.local_addr()?));
                out.push(format!(
                    "Simulated latency: {} ms",
                    self.latency.current().as_millis()
                ));
                Ok(out)
            }
            "latency" => match tokens.get(1) {
                None => Ok(vec![format!(
                    "Simulated latency: {} ms",
                    self.latency.current().as_millis()
                )]),
                Some(arg) => {
                    let ms: u64 = arg.parse().context("latency expects milliseconds")?;
                    if ms > MAX_SIMULATED_LATENCY_MS {
                        return Ok(vec![format!(
                            "Simulated latency is capped at {MAX_SIMULATED_LATENCY_MS} ms"
                        )]);
                    }
                    if ms == 0 {
                        self.latency.stop();
                    } else {
                        self.latency.start(Duration::from_millis(ms));
                    }
                    Ok(vec![format!("Simulated latency set to {ms} ms")])
                }
            },
            other => Ok(vec![format!("Unknown command '{other}'")]),
        }
    }

    /// Disposes the room and waits for its task.
    pub async fn shutdown(self, reason: &str) -> anyhow::Result<()> {
        self.room.shutdown(reason).await;
        self.room_task.await.context("room task")?;
        Ok(())
    }
}

async fn handle_connection(
    mut conn: ReliableConn,
    room: RoomHandle,
    latency: LatencySimulation,
) -> anyhow::Result<()> {
    let peer = conn.peer_addr();
    let hello = time::timeout(HANDSHAKE_TIMEOUT, conn.recv())
        .await
        .context("handshake timed out")??;
    match hello {
        NetMsg::Hello { protocol } if protocol == PROTOCOL_VERSION => {}
        NetMsg::Hello { protocol } => {
            conn.send(&NetMsg::Disconnect {
                reason: format!("protocol {protocol} unsupported, expected {PROTOCOL_VERSION}"),
            })
            .await?;
            bail!("client protocol {protocol} unsupported");
        }
        other => bail!("unexpected handshake msg: {}", other.kind()),
    }

    let session_id = SessionId::new_unique();
    let (tx, rx) = mpsc::unbounded_channel();
    let (mut reader, mut writer) = conn.into_split();

    match room
        .join(session_id, Box::new(ConnectionSink { tx, latency }))
        .await
    {
        Ok(_) => {}
        Err(RoomError::RoomFull { limit }) => {
            info!(%peer, limit, "Room is full, rejecting connection");
            writer.send(&NetMsg::RoomFull { limit }).await?;
            let _ = writer.shutdown().await;
            return Ok(());
        }
        Err(e) => {
            writer
                .send(&NetMsg::Disconnect {
                    reason: e.to_string(),
                })
                .await?;
            let _ = writer.shutdown().await;
            return Ok(());
        }
    }

    let writer_task = tokio::spawn(write_loop(writer, rx));
    let reason = read_loop(&mut reader, session_id, &room).await;
    room.leave(session_id, reason).await;
    info!(session_id = %session_id, ?reason, "Connection closed");

    writer_task.await.context("writer task")?
}

async fn read_loop<R: AsyncRead + Unpin>(
    reader: &mut FrameReader<R>,
    session_id: SessionId,
    room: &RoomHandle,
) -> LeaveReason {
    loop {
        match reader.recv_frame().await {
            Ok(Some(frame)) => match decode_from_bytes(&frame) {
                Ok(NetMsg::Input(payload)) => {
                    if !room.input(session_id, payload).await {
                        return LeaveReason::ConnectionLost;
                    }
                }
                Ok(NetMsg::Disconnect { .. }) => return LeaveReason::Consented,
                Ok(other) => {
                    debug!(session_id = %session_id, kind = other.kind(), "Unexpected client message");
                }
                Err(e) => {
                    let malformed = RoomError::MalformedCommand(format!("{e:#}"));
                    warn!(session_id = %session_id, error = %malformed, "Dropping frame");
                }
            },
            Ok(None) => return LeaveReason::ConnectionLost,
            Err(e) => {
                debug!(session_id = %session_id, error = %e, "Read failed");
                return LeaveReason::ConnectionLost;
            }
        }
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: FrameWriter<W>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) -> anyhow::Result<()> {
    while let Some(out) = rx.recv().await {
        if out.due > Instant::now() {
            time::sleep_until(out.due).await;
        }
        let closing = matches!(out.msg, NetMsg::Disconnect { .. });
        writer.send(&out.msg).await?;
        if closing {
            break;
        }
    }
    let _ = writer.shutdown().await;
    Ok(())
}

/// Helper for tests: bind to an ephemeral localhost port.
pub async fn bind_ephemeral(cfg: ArenaConfig) -> anyhow::Result<(GameServer, ArenaConfig)> {
    cfg.validate()?;
    let listener =
        ReliableListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)).await?;
    let mut cfg = cfg;
    cfg.server_addr = listener.local_addr()?.to_string();
    Ok((GameServer::with_listener(cfg.clone(), listener), cfg))
}
