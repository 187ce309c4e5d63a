use std::time::Duration;

use anyhow::Context;
use arena_client::input::InputState;
use arena_server::server::bind_ephemeral;
use arena_shared::config::ArenaConfig;
use arena_tests::{init_tracing, pump_until};

fn tick_from_status(lines: &[String]) -> Option<u64> {
    lines
        .iter()
        .find_map(|l| l.strip_prefix("Tick: "))
        .and_then(|t| t.parse().ok())
}

/// Smoke test: an empty room keeps ticking and shuts down cleanly.
#[tokio::test]
async fn empty_room_ticks_and_shuts_down() -> anyhow::Result<()> {
    init_tracing();
    let (server, _cfg) = bind_ephemeral(ArenaConfig::default()).await?;

    tokio::time::sleep(Duration::from_millis(100)).await;
    let status = server.room().status().await;
    assert!(tick_from_status(&status).is_some_and(|t| t > 0), "{status:?}");

    let room = server.room();
    server.shutdown("smoke test over").await?;
    assert!(room.is_closed());
    Ok(())
}

/// Smoke test: the latency console command delays but does not break a session.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn simulated_latency_via_console() -> anyhow::Result<()> {
    init_tracing();
    let (server, cfg) = bind_ephemeral(ArenaConfig::default()).await?;

    let out = server.exec_console("latency 18446744073709551615").await?;
    assert_eq!(out, vec!["Simulated latency is capped at 5000 ms".to_string()]);
    assert!(!server.latency().is_active());

    let out = server.exec_console("latency 40").await?;
    assert_eq!(out, vec!["Simulated latency set to 40 ms".to_string()]);
    assert_eq!(server.latency().current(), Duration::from_millis(40));

    let (client, accepted) = tokio::join!(
        arena_client::GameClient::connect(&cfg),
        server.accept_one()
    );
    accepted?;
    let mut client = client?;

    let mut idle = || InputState::IDLE;
    pump_until(&mut client, &mut idle, Duration::from_secs(5), |c| {
        c.world.predictor().is_some()
    })
    .await?;

    server.exec_console("latency 0").await?;
    assert!(!server.latency().is_active());

    server.shutdown("smoke test over").await?;
    Ok(())
}

/// Smoke test: the accept loop returns on its own once the room is disposed.
#[tokio::test]
async fn accept_loop_stops_with_the_room() -> anyhow::Result<()> {
    init_tracing();
    let (server, _cfg) = bind_ephemeral(ArenaConfig::default()).await?;
    let room = server.room();
    let accept = tokio::spawn(async move { server.run().await });

    room.shutdown("smoke test over").await;
    tokio::time::timeout(Duration::from_secs(5), accept)
        .await
        .context("accept loop still running")???;
    assert!(room.is_closed());
    Ok(())
}
