//! Full socket-based integration tests for client ↔ server communication.

use sim_client::WorldClient;
use sim_shared::{
    body::BodyKind,
    math::Vec3,
    protocol::{encode_command, Bodies, ClientCommand, EntityId, ServerEvent},
};
use sim_tests::{body, spawn_server, WAIT};

fn is_lifecycle(event: &ServerEvent) -> bool {
    !matches!(event, ServerEvent::WorldState { .. })
}

async fn created_id(client: &mut WorldClient) -> anyhow::Result<EntityId> {
    match client.recv_until(WAIT, is_lifecycle).await? {
        ServerEvent::BodyCreated { id, .. } => Ok(id),
        other => anyhow::bail!("expected bodyCreated, got {other:?}"),
    }
}

/// Reads `count` snapshots and returns the body table of the last one.
async fn last_snapshot_after(client: &mut WorldClient, count: usize) -> anyhow::Result<Bodies> {
    let mut last = Bodies::new();
    for _ in 0..count {
        if let ServerEvent::WorldState { bodies } = client
            .recv_until(WAIT, |e| matches!(e, ServerEvent::WorldState { .. }))
            .await?
        {
            last = bodies;
        }
    }
    Ok(last)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn initial_state_is_first_frame() -> anyhow::Result<()> {
    let server = spawn_server().await?;
    let mut client = WorldClient::connect(&server.ws_url()).await?;

    let first = client.recv_timeout(WAIT).await?;
    match first {
        Some(ServerEvent::InitialState { bodies }) => assert!(bodies.is_empty()),
        other => panic!("expected initialState, got {other:?}"),
    }
    assert!(client.mirror.is_synced());

    // Snapshots keep flowing afterwards.
    client
        .recv_until(WAIT, |e| matches!(e, ServerEvent::WorldState { .. }))
        .await?;

    client.close().await?;
    server.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn root_path_also_upgrades() -> anyhow::Result<()> {
    let server = spawn_server().await?;
    let url = format!("ws://{}/", server.local_addr());
    let mut client = WorldClient::connect(&url).await?;
    assert!(matches!(
        client.recv_timeout(WAIT).await?,
        Some(ServerEvent::InitialState { .. })
    ));
    server.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn creation_is_broadcast_to_every_session() -> anyhow::Result<()> {
    let server = spawn_server().await?;
    let mut alice = WorldClient::connect(&server.ws_url()).await?;
    let mut bob = WorldClient::connect(&server.ws_url()).await?;
    alice.recv_timeout(WAIT).await?;
    bob.recv_timeout(WAIT).await?;

    alice
        .create_body(body(BodyKind::Sphere, Vec3::new(0.0, 5.0, 0.0)))
        .await?;

    let seen_by_alice = created_id(&mut alice).await?;
    let seen_by_bob = created_id(&mut bob).await?;
    assert_eq!(seen_by_alice, seen_by_bob);
    assert_ne!(seen_by_alice, EntityId::GROUND);

    // The next snapshot carries the body too.
    let state = bob
        .recv_until(WAIT, |e| matches!(e, ServerEvent::WorldState { .. }))
        .await?;
    let ServerEvent::WorldState { bodies } = state else {
        unreachable!()
    };
    assert_eq!(bodies[&seen_by_alice].kind, BodyKind::Sphere);

    server.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_creates_get_distinct_ids() -> anyhow::Result<()> {
    let server = spawn_server().await?;
    let mut a = WorldClient::connect(&server.ws_url()).await?;
    let mut b = WorldClient::connect(&server.ws_url()).await?;
    a.recv_timeout(WAIT).await?;
    b.recv_timeout(WAIT).await?;

    a.create_body(body(BodyKind::Box, Vec3::new(-2.0, 4.0, 0.0))).await?;
    b.create_body(body(BodyKind::Box, Vec3::new(2.0, 4.0, 0.0))).await?;

    let first = created_id(&mut a).await?;
    let second = created_id(&mut a).await?;
    assert_ne!(first, second);

    server.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn late_joiner_receives_existing_bodies() -> anyhow::Result<()> {
    let server = spawn_server().await?;
    let mut early = WorldClient::connect(&server.ws_url()).await?;
    early.recv_timeout(WAIT).await?;
    early
        .create_body(body(BodyKind::Cylinder, Vec3::new(0.0, 3.0, 0.0)))
        .await?;
    let id = created_id(&mut early).await?;

    let mut late = WorldClient::connect(&server.ws_url()).await?;
    match late.recv_timeout(WAIT).await? {
        Some(ServerEvent::InitialState { bodies }) => {
            assert_eq!(bodies.len(), 1);
            assert_eq!(bodies[&id].kind, BodyKind::Cylinder);
        }
        other => panic!("expected initialState, got {other:?}"),
    }

    server.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn removal_and_unknown_ids() -> anyhow::Result<()> {
    let server = spawn_server().await?;
    let mut client = WorldClient::connect(&server.ws_url()).await?;
    client.recv_timeout(WAIT).await?;

    client
        .create_body(body(BodyKind::Box, Vec3::new(0.0, 2.0, 0.0)))
        .await?;
    let id = created_id(&mut client).await?;

    // Unknown id and the ground are ignored without an event.
    client.remove_body(EntityId(9_999)).await?;
    client.remove_body(EntityId::GROUND).await?;
    client.remove_body(id).await?;

    match client.recv_until(WAIT, is_lifecycle).await? {
        ServerEvent::BodyRemoved { id: removed } => assert_eq!(removed, id),
        other => panic!("expected bodyRemoved, got {other:?}"),
    }
    assert!(client.mirror.get(id).is_none());

    server.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reset_clears_world_and_ids_keep_growing() -> anyhow::Result<()> {
    let server = spawn_server().await?;
    let mut client = WorldClient::connect(&server.ws_url()).await?;
    client.recv_timeout(WAIT).await?;

    for x in [-1.0, 1.0] {
        client
            .create_body(body(BodyKind::Sphere, Vec3::new(x, 2.0, 0.0)))
            .await?;
    }
    created_id(&mut client).await?;
    let before = created_id(&mut client).await?;

    client.reset_world().await?;
    assert!(matches!(
        client.recv_until(WAIT, is_lifecycle).await?,
        ServerEvent::WorldReset
    ));
    let state = client
        .recv_until(WAIT, |e| matches!(e, ServerEvent::WorldState { .. }))
        .await?;
    assert!(matches!(state, ServerEvent::WorldState { bodies } if bodies.is_empty()));

    client
        .create_body(body(BodyKind::Sphere, Vec3::new(0.0, 2.0, 0.0)))
        .await?;
    let after = created_id(&mut client).await?;
    assert!(after > before);

    server.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pause_freezes_bodies_and_resume_continues() -> anyhow::Result<()> {
    let server = spawn_server().await?;
    let mut client = WorldClient::connect(&server.ws_url()).await?;
    client.recv_timeout(WAIT).await?;

    client
        .create_body(body(BodyKind::Box, Vec3::new(0.0, 20.0, 0.0)))
        .await?;
    let id = created_id(&mut client).await?;

    client.pause().await?;
    assert!(matches!(
        client.recv_until(WAIT, is_lifecycle).await?,
        ServerEvent::Pause
    ));
    assert!(client.mirror.is_paused());

    // Snapshots keep coming while paused, with frozen poses.
    let mut heights = Vec::new();
    for _ in 0..3 {
        let state = client
            .recv_until(WAIT, |e| matches!(e, ServerEvent::WorldState { .. }))
            .await?;
        if let ServerEvent::WorldState { bodies } = state {
            heights.push(bodies[&id].position[1]);
        }
    }
    assert!(heights.windows(2).all(|w| w[0] == w[1]), "{heights:?}");

    client.resume().await?;
    assert!(matches!(
        client.recv_until(WAIT, is_lifecycle).await?,
        ServerEvent::Resume
    ));
    let bodies = last_snapshot_after(&mut client, 30).await?;
    assert!(bodies[&id].position[1] < heights[0]);

    server.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_commands_keep_the_connection() -> anyhow::Result<()> {
    let server = spawn_server().await?;
    let mut client = WorldClient::connect(&server.ws_url()).await?;
    client.recv_timeout(WAIT).await?;

    client.send_raw("not json".to_string()).await?;
    client.send_raw(r#"{"type":"explode"}"#.to_string()).await?;
    client
        .send_raw(
            r#"{"type":"createBody","bodyData":{"type":"box","mass":-1,"position":{"x":0,"y":1,"z":0}}}"#
                .to_string(),
        )
        .await?;

    // Still connected, and the invalid body produced nothing.
    let valid = ClientCommand::CreateBody {
        body: body(BodyKind::Box, Vec3::new(0.0, 1.0, 0.0)),
    };
    client.send_raw(encode_command(&valid)).await?;
    let id = created_id(&mut client).await?;
    assert_eq!(id, EntityId(1));

    server.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bodies_fall_and_come_to_rest_on_the_ground() -> anyhow::Result<()> {
    let server = spawn_server().await?;
    let mut client = WorldClient::connect(&server.ws_url()).await?;
    client.recv_timeout(WAIT).await?;

    client
        .create_body(body(BodyKind::Sphere, Vec3::new(0.0, 3.0, 0.0)))
        .await?;
    let id = created_id(&mut client).await?;

    let bodies = last_snapshot_after(&mut client, 120).await?;
    let y = bodies[&id].position[1];
    assert!(y < 3.0, "body should have fallen, y = {y}");
    assert!(y > 0.0, "ground should stop the body, y = {y}");

    server.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn extreme_bodies_are_rejected_and_the_world_keeps_ticking() -> anyhow::Result<()> {
    let server = spawn_server().await?;
    let mut client = WorldClient::connect(&server.ws_url()).await?;
    client.recv_timeout(WAIT).await?;

    for extreme in [
        r#"{"type":"createBody","bodyData":{"type":"sphere","mass":1,"position":{"x":0,"y":5,"z":0},"scale":1e30}}"#,
        r#"{"type":"createBody","bodyData":{"type":"box","mass":1e-40,"position":{"x":0,"y":5,"z":0}}}"#,
    ] {
        client.send_raw(extreme.to_string()).await?;
    }
    client
        .create_body(body(BodyKind::Sphere, Vec3::new(0.0, 50.0, 0.0)))
        .await?;
    let id = created_id(&mut client).await?;
    assert_eq!(id, EntityId(1));

    let bodies = last_snapshot_after(&mut client, 30).await?;
    assert_eq!(bodies.len(), 1);
    assert!(bodies[&id].position[1] < 50.0);

    server.shutdown().await
}
