//! Server assembly.
//!
//! Wires the physics backend, world actor and transport together. Shutdown
//! stops the world actor (and with it the tick timer) before the listener is
//! closed, so no tick runs against a half-closed transport.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::Context;
use chrono::Utc;
use sim_shared::config::ServerConfig;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tracing::info;

use crate::{
    physics::PhysicsConfig,
    rapier::RapierPhysics,
    replication::{WorldActor, WorldHandle},
    transport::{self, TransportState},
    world::World,
};

/// A running simulation server.
pub struct SimServer {
    cfg: ServerConfig,
    local: SocketAddr,
    world: WorldHandle,
    actor: JoinHandle<()>,
    http: JoinHandle<std::io::Result<()>>,
    stop_http: oneshot::Sender<()>,
}

impl SimServer {
    /// Builds the world, binds the listener and starts serving.
    pub async fn bind(cfg: ServerConfig) -> anyhow::Result<Self> {
        cfg.validate().context("invalid config")?;
        let addr: SocketAddr = cfg.listen_addr.parse().context("parse listen_addr")?;
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        let local = listener.local_addr().context("local_addr")?;

        let mut world = World::new(
            RapierPhysics::new(PhysicsConfig::from(&cfg)),
            cfg.fixed_step(),
            cfg.max_sub_steps,
        );
        if cfg.ground_plane {
            world = world.with_ground();
        }
        let (actor, handle) = WorldActor::new(world, cfg.command_queue);
        let actor = tokio::spawn(actor.run());

        let app = transport::router(TransportState {
            world: handle.clone(),
            session_queue: cfg.session_queue,
            started_at: Utc::now(),
        });
        let (stop_http, stopped) = oneshot::channel::<()>();
        let http = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                let _ = stopped.await;
            })
            .await
        });

        info!(%local, tick_hz = cfg.tick_hz, "Simulation server listening");
        Ok(Self {
            cfg,
            local,
            world: handle,
            actor,
            http,
            stop_http,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// WebSocket URL clients should connect to.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.local)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.cfg
    }

    /// Handle for in-process subscribers and status queries.
    pub fn handle(&self) -> &WorldHandle {
        &self.world
    }

    /// Stops the tick loop first, then the listener.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.world.shutdown().await;
        self.actor.await.context("world actor panicked")?;
        // Send fails only if the server task already exited.
        let _ = self.stop_http.send(());
        self.http
            .await
            .context("http task panicked")?
            .context("http server")?;
        info!("Simulation server stopped");
        Ok(())
    }
}

/// Helper for tests: bind to an ephemeral localhost port.
pub async fn bind_ephemeral(cfg: ServerConfig) -> anyhow::Result<SimServer> {
    let cfg = ServerConfig {
        listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).to_string(),
        ..cfg
    };
    SimServer::bind(cfg).await
}
