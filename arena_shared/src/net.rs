//! Networking primitives.
//!
//! Goals:
//! - One ordered, reliable channel per participant (TCP, length-prefixed frames).
//! - A closed message enum covering handshake, input and replication.
//! - Keep serialization explicit and versionable.
//!
//! A frame whose body fails to decode does not poison the stream: the length
//! prefix still marks the next boundary, so callers can drop it and go on.

use std::{
    fmt, io,
    net::SocketAddr,
    sync::atomic::{AtomicU32, Ordering},
};

use anyhow::{ensure, Context};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};

use crate::movement::MovementState;

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest frame body accepted from a peer.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

static NEXT_SESSION_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies one connected participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u32);

impl SessionId {
    pub fn new_unique() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Input as it travels on the wire.
///
/// Every field is optional at decode time; a missing `tick` is rejected
/// when converting into an `InputCommand`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct InputPayload {
    #[serde(default)]
    pub left: bool,
    #[serde(default)]
    pub right: bool,
    #[serde(default)]
    pub up: bool,
    #[serde(default)]
    pub down: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick: Option<u32>,
}

/// High-level message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum NetMsg {
    // ─── Connection handshake ───
    Hello {
        protocol: u32,
    },
    Welcome {
        session_id: SessionId,
        /// Join slot, which also picks the spawn point.
        slot: usize,
    },
    /// Join rejected; the server closes the connection afterwards.
    RoomFull {
        limit: usize,
    },

    // ─── Gameplay ───
    /// Client -> server: directional input for one client tick.
    Input(InputPayload),

    // ─── Replication ───
    EntityAdded(EntityAdded),
    EntityRemoved {
        session_id: SessionId,
    },
    /// Continuous channel: position after a tick that mutated the entity.
    PositionUpdate(PositionUpdate),
    /// Discrete channel: movement state edge.
    StateChange {
        session_id: SessionId,
        state: MovementState,
    },
    /// Discrete channel: facing edge.
    FlipChange {
        session_id: SessionId,
        is_facing_left: bool,
    },

    // ─── Disconnect ───
    Disconnect {
        reason: String,
    },
}

impl NetMsg {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            NetMsg::Hello { .. } => "hello",
            NetMsg::Welcome { .. } => "welcome",
            NetMsg::RoomFull { .. } => "room_full",
            NetMsg::Input(_) => "input",
            NetMsg::EntityAdded(_) => "entity_added",
            NetMsg::EntityRemoved { .. } => "entity_removed",
            NetMsg::PositionUpdate(_) => "position_update",
            NetMsg::StateChange { .. } => "state_change",
            NetMsg::FlipChange { .. } => "flip_change",
            NetMsg::Disconnect { .. } => "disconnect",
        }
    }
}

/// A new entity entered the room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EntityAdded {
    pub session_id: SessionId,
    pub x: f32,
    pub y: f32,
    pub is_facing_left: bool,
}

/// Authoritative position of one entity after a tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PositionUpdate {
    pub session_id: SessionId,
    pub x: f32,
    pub y: f32,
    /// Client tick of the last command applied.
    pub tick: u32,
}

/// Reads length-prefixed frames.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Reads one raw frame body. `Ok(None)` means the peer closed the stream
    /// at a frame boundary.
    pub async fn recv_frame(&mut self) -> anyhow::Result<Option<Bytes>> {
        let mut len_buf = [0u8; 4];
        match self.inner.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e).context("tcp read len"),
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        ensure!(len <= MAX_FRAME_LEN, "frame of {len} bytes exceeds limit");

        let mut payload = BytesMut::zeroed(len);
        self.inner
            .read_exact(&mut payload)
            .await
            .context("tcp read payload")?;
        Ok(Some(payload.freeze()))
    }

    /// Reads and decodes one message. A closed stream is an error here.
    pub async fn recv(&mut self) -> anyhow::Result<NetMsg> {
        let frame = self.recv_frame().await?.context("connection closed")?;
        decode_from_bytes(&frame)
    }
}

/// Writes length-prefixed frames.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn send(&mut self, msg: &NetMsg) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(msg).context("serialize msg")?;
        self.send_raw(&payload).await
    }

    pub async fn send_raw(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        let mut buf = BytesMut::with_capacity(4 + payload.len());
        buf.put_u32(payload.len() as u32);
        buf.extend_from_slice(payload);
        self.inner.write_all(&buf).await.context("tcp write")?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.inner.shutdown().await.context("tcp shutdown")
    }
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
    peer: SocketAddr,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> anyhow::Result<Self> {
        let peer = stream.peer_addr().context("peer addr")?;
        stream.set_nodelay(true).context("set nodelay")?;
        let (r, w) = stream.into_split();
        Ok(Self {
            reader: FrameReader::new(r),
            writer: FrameWriter::new(w),
            peer,
        })
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        Self::new(stream)
    }

    pub async fn send(&mut self, msg: &NetMsg) -> anyhow::Result<()> {
        self.writer.send(msg).await
    }

    pub async fn recv(&mut self) -> anyhow::Result<NetMsg> {
        self.reader.recv().await
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Splits into independently owned halves for reader/writer tasks.
    pub fn into_split(self) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
        (self.reader, self.writer)
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        Ok((ReliableConn::new(stream)?, addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Convenience codec helpers.
pub fn encode_to_bytes(msg: &NetMsg) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize")?;
    Ok(Bytes::from(payload))
}

pub fn decode_from_bytes(b: &[u8]) -> anyhow::Result<NetMsg> {
    serde_json::from_slice(b).context("deserialize")
}
