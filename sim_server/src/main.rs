//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p sim_server -- [--config server.json] [--addr 0.0.0.0:3000]
//!       [--tick-hz 60] [--max-sub-steps 3] [--gravity 0,-50,0] [--no-ground]
//!
//! Serves `GET /status` and a WebSocket endpoint on `/` and `/ws`. Command
//! line flags override values from the config file. Stop with Ctrl-C.

use std::env;

use anyhow::Context;
use sim_server::SimServer;
use sim_shared::{config::ServerConfig, math::Vec3};
use tracing::{info, warn};

fn parse_gravity(s: &str) -> Option<Vec3> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse().ok())
        .collect::<Option<_>>()?;
    match parts.as_slice() {
        [x, y, z] => Some(Vec3::new(*x, *y, *z)),
        _ => None,
    }
}

fn parse_args() -> anyhow::Result<ServerConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args.get(i + 1).context("--config needs a path")?;
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read config {path}"))?;
            ServerConfig::from_json_str(&text).with_context(|| format!("parse config {path}"))?
        }
        None => ServerConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.listen_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().unwrap_or(cfg.tick_hz);
                i += 2;
            }
            "--max-sub-steps" if i + 1 < args.len() => {
                cfg.max_sub_steps = args[i + 1].parse().unwrap_or(cfg.max_sub_steps);
                i += 2;
            }
            "--gravity" if i + 1 < args.len() => {
                match parse_gravity(&args[i + 1]) {
                    Some(g) => cfg.gravity = g,
                    None => warn!(value = %args[i + 1], "Ignoring malformed --gravity"),
                }
                i += 2;
            }
            "--no-ground" => {
                cfg.ground_plane = false;
                i += 1;
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
        addr = %cfg.listen_addr,
        tick_hz = cfg.tick_hz,
        max_sub_steps = cfg.max_sub_steps,
        gravity = ?cfg.gravity,
        ground = cfg.ground_plane,
        "Starting server"
    );

    let server = SimServer::bind(cfg).await.context("start server")?;
    info!(local = %server.local_addr(), "Physics server running");

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("Shutdown requested");
    server.shutdown().await
}
