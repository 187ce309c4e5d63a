//! Shared helpers for the socket-level tests.

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use arena_client::{input::InputSource, GameClient};
use arena_server::server::{bind_ephemeral, RoomHandle};
use arena_shared::{
    config::ArenaConfig,
    net::{FrameReader, FrameWriter, NetMsg, ReliableConn, SessionId, PROTOCOL_VERSION},
};
use tokio::{
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
    task::JoinHandle,
};

/// Exactly one 60 Hz step, so each `frame` runs a single local tick.
pub const ONE_TICK: Duration = Duration::from_nanos(16_666_667);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// A server accepting on an ephemeral localhost port.
pub struct TestServer {
    pub cfg: ArenaConfig,
    pub room: RoomHandle,
    accept_task: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    pub async fn spawn(cfg: ArenaConfig) -> anyhow::Result<Self> {
        let (server, cfg) = bind_ephemeral(cfg).await?;
        let room = server.room();
        let accept_task = tokio::spawn(async move { server.run().await });
        Ok(Self {
            cfg,
            room,
            accept_task,
        })
    }

    pub async fn connect(&self) -> anyhow::Result<GameClient> {
        GameClient::connect(&self.cfg).await
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        self.cfg.server_addr.parse().context("parse server_addr")
    }

    /// Disposes the room and waits for the accept loop to notice.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.room.shutdown("test finished").await;
        tokio::time::timeout(Duration::from_secs(5), self.accept_task)
            .await
            .context("accept loop kept running after shutdown")???;
        Ok(())
    }
}

/// A session speaking the wire protocol directly, without a `GameClient`.
pub struct RawSession {
    pub session_id: SessionId,
    pub slot: usize,
    pub reader: FrameReader<OwnedReadHalf>,
    pub writer: FrameWriter<OwnedWriteHalf>,
}

impl RawSession {
    pub async fn join(addr: SocketAddr) -> anyhow::Result<Self> {
        let mut conn = ReliableConn::connect(addr).await?;
        conn.send(&NetMsg::Hello {
            protocol: PROTOCOL_VERSION,
        })
        .await?;
        let (session_id, slot) = match conn.recv().await? {
            NetMsg::Welcome { session_id, slot } => (session_id, slot),
            other => anyhow::bail!("expected Welcome, got {other:?}"),
        };
        let (reader, writer) = conn.into_split();
        Ok(Self {
            session_id,
            slot,
            reader,
            writer,
        })
    }

    /// Reads until a message matches, returning every message seen.
    pub async fn recv_until<F>(&mut self, timeout: Duration, mut done: F) -> anyhow::Result<Vec<NetMsg>>
    where
        F: FnMut(&NetMsg) -> bool,
    {
        let mut seen = Vec::new();
        let outcome = tokio::time::timeout(timeout, async {
            loop {
                let msg = self.reader.recv().await?;
                let stop = done(&msg);
                seen.push(msg);
                if stop {
                    return anyhow::Ok(());
                }
            }
        })
        .await;
        outcome.with_context(|| format!("no matching message within {timeout:?}, saw {seen:?}"))??;
        Ok(seen)
    }
}

/// Runs one-tick frames on `client` until `done` holds or `timeout` passes.
pub async fn pump_until<F>(
    client: &mut GameClient,
    input: &mut dyn InputSource,
    timeout: Duration,
    mut done: F,
) -> anyhow::Result<()>
where
    F: FnMut(&GameClient) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        client.frame(ONE_TICK, input).await?;
        if done(client) {
            return Ok(());
        }
        anyhow::ensure!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within {timeout:?}"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
