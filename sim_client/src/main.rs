//! Standalone observer binary.
//!
//! Usage:
//!   cargo run -p sim_client -- [--url ws://127.0.0.1:3000/ws] [--spawn 10]
//!       [--reset] [--ticks 120]
//!
//! Connects, optionally resets the world and drops a handful of random bodies
//! into it, then logs every received event. Without `--ticks` it runs until
//! the server closes the connection or Ctrl-C.

use std::env;

use anyhow::Context;
use rand::Rng;
use sim_client::WorldClient;
use sim_shared::{
    body::{BodyKind, BodySpec, Scale, ShapeParams},
    math::{Quat, Vec3},
    protocol::ServerEvent,
};
use tracing::{info, warn};

struct Args {
    url: String,
    spawn: usize,
    reset: bool,
    ticks: Option<u64>,
}

fn parse_args() -> Args {
    let mut out = Args {
        url: "ws://127.0.0.1:3000/ws".to_string(),
        spawn: 0,
        reset: false,
        ticks: None,
    };
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--url" if i + 1 < args.len() => {
                out.url = args[i + 1].clone();
                i += 2;
            }
            "--spawn" if i + 1 < args.len() => {
                out.spawn = args[i + 1].parse().unwrap_or(0);
                i += 2;
            }
            "--ticks" if i + 1 < args.len() => {
                out.ticks = args[i + 1].parse().ok();
                i += 2;
            }
            "--reset" => {
                out.reset = true;
                i += 1;
            }
            _ => i += 1,
        }
    }
    out
}

/// A random dynamic body somewhere above the origin.
fn random_body(rng: &mut impl Rng) -> anyhow::Result<BodySpec> {
    let kind = match rng.gen_range(0..3) {
        0 => BodyKind::Box,
        1 => BodyKind::Sphere,
        _ => BodyKind::Cylinder,
    };
    let position = Vec3::new(
        rng.gen_range(-5.0..5.0),
        rng.gen_range(5.0..15.0),
        rng.gen_range(-5.0..5.0),
    );
    let scale = Scale::Uniform(rng.gen_range(0.3..1.2));
    let spec = BodySpec::new(
        kind,
        rng.gen_range(0.5..5.0),
        position,
        Quat::IDENTITY,
        ShapeParams::from_scale(kind, scale),
    )?;
    Ok(spec)
}

fn describe(event: &ServerEvent) {
    match event {
        ServerEvent::InitialState { bodies } => info!(bodies = bodies.len(), "initialState"),
        ServerEvent::WorldState { .. } => {}
        ServerEvent::BodyCreated { id, kind, position, .. } => {
            info!(%id, ?kind, ?position, "bodyCreated")
        }
        ServerEvent::BodyRemoved { id } => info!(%id, "bodyRemoved"),
        other => info!(event = other.name(), "Lifecycle event"),
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

    let args = parse_args();
    info!(url = %args.url, spawn = args.spawn, "Starting client");

    let mut client = WorldClient::connect(&args.url).await.context("connect")?;

    if args.reset {
        client.reset_world().await?;
    }
    let mut rng = rand::thread_rng();
    for _ in 0..args.spawn {
        let body = random_body(&mut rng)?;
        client.create_body(body).await?;
    }

    let mut snapshots = 0u64;
    loop {
        tokio::select! {
            event = client.recv() => match event? {
                Some(event) => {
                    describe(&event);
                    if matches!(event, ServerEvent::WorldState { .. }) {
                        snapshots += 1;
                        if snapshots % 60 == 0 {
                            info!(
                                snapshots,
                                bodies = client.mirror.bodies().len(),
                                paused = client.mirror.is_paused(),
                                "Mirror"
                            );
                        }
                        if args.ticks.is_some_and(|n| snapshots >= n) {
                            break;
                        }
                    }
                }
                None => {
                    warn!("Server closed the connection");
                    return Ok(());
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    client.close().await
}
