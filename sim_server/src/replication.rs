//! Replication loop.
//!
//! A single actor owns the world and the session table. Connection tasks and
//! the tick timer reach it only through its inbox, so every mutation is
//! serialized: a command is either fully applied before a tick or after it.
//!
//! Per tick the actor advances the clock, takes one snapshot, encodes it once
//! and queues the identical frame for every session.

use std::{net::SocketAddr, time::Instant};

use anyhow::Context;
use serde::Serialize;
use sim_shared::protocol::{ClientCommand, ServerEvent};
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

use crate::{
    handler,
    physics::PhysicsBackend,
    session::{Frame, SessionId, SessionManager},
    world::World,
};

/// Work items for the world actor.
#[derive(Debug)]
pub enum WorldMsg {
    Join {
        peer: Option<SocketAddr>,
        outbox: mpsc::Sender<Frame>,
        reply: oneshot::Sender<SessionId>,
    },
    Leave(SessionId),
    Command(SessionId, ClientCommand),
    Shutdown,
}

/// Point-in-time summary published after every tick and command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorldStatus {
    pub tick: u64,
    pub entities: usize,
    pub sessions: usize,
    pub paused: bool,
}

/// Cloneable entry point to the world actor.
#[derive(Debug, Clone)]
pub struct WorldHandle {
    tx: mpsc::Sender<WorldMsg>,
    status: watch::Receiver<WorldStatus>,
}

impl WorldHandle {
    /// Registers a subscriber. Its first frame is `initialState`, followed by
    /// every event produced after the join, in order.
    pub async fn join(
        &self,
        peer: Option<SocketAddr>,
        outbox: mpsc::Sender<Frame>,
    ) -> anyhow::Result<SessionId> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WorldMsg::Join {
                peer,
                outbox,
                reply,
            })
            .await
            .context("world actor stopped")?;
        rx.await.context("world actor dropped join")
    }

    /// Fire-and-forget: no acknowledgment, no retry.
    pub async fn submit(&self, session: SessionId, command: ClientCommand) -> anyhow::Result<()> {
        self.tx
            .send(WorldMsg::Command(session, command))
            .await
            .context("world actor stopped")
    }

    pub async fn leave(&self, session: SessionId) {
        // Nothing to clean up if the actor is already gone.
        let _ = self.tx.send(WorldMsg::Leave(session)).await;
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(WorldMsg::Shutdown).await;
    }

    pub fn status(&self) -> WorldStatus {
        self.status.borrow().clone()
    }
}

pub struct WorldActor<P: PhysicsBackend> {
    world: World<P>,
    sessions: SessionManager,
    inbox: mpsc::Receiver<WorldMsg>,
    status: watch::Sender<WorldStatus>,
    tick: u64,
}

impl<P: PhysicsBackend> WorldActor<P> {
    pub fn new(world: World<P>, queue: usize) -> (Self, WorldHandle) {
        let (tx, inbox) = mpsc::channel(queue.max(1));
        let (status, status_rx) = watch::channel(WorldStatus::default());
        let actor = Self {
            world,
            sessions: SessionManager::default(),
            inbox,
            status,
            tick: 0,
        };
        (
            actor,
            WorldHandle {
                tx,
                status: status_rx,
            },
        )
    }

    /// Runs until `Shutdown` arrives or every handle is dropped. The timer
    /// stops with the loop; a tick is never left half-applied.
    pub async fn run(mut self) {
        let period = self.world.clock().tick_interval();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(?period, "World actor started");

        loop {
            tokio::select! {
                biased;
                _ = ticker.tick() => self.step(Instant::now()),
                msg = self.inbox.recv() => match msg {
                    Some(WorldMsg::Shutdown) | None => break,
                    Some(msg) => self.handle(msg, Instant::now()),
                },
            }
        }
        info!(tick = self.tick, sessions = self.sessions.len(), "World actor stopped");
    }

    /// Runs `ticks` ticks back to back, draining the inbox before each one.
    pub async fn run_for_ticks(&mut self, ticks: u32) {
        let period = self.world.clock().tick_interval();
        for _ in 0..ticks {
            self.drain_inbox();
            tokio::time::sleep(period).await;
            self.step(Instant::now());
        }
        self.drain_inbox();
    }

    fn drain_inbox(&mut self) {
        while let Ok(msg) = self.inbox.try_recv() {
            self.handle(msg, Instant::now());
        }
    }

    fn handle(&mut self, msg: WorldMsg, now: Instant) {
        match msg {
            WorldMsg::Join {
                peer,
                outbox,
                reply,
            } => match handler::initial_state(&self.world) {
                Ok(initial) => {
                    let id = self.sessions.connect(outbox, peer, now, initial);
                    if reply.send(id).is_err() {
                        self.sessions.disconnect(id);
                    }
                }
                Err(e) => warn!(peer = ?peer, error = %e, "Could not build initial state"),
            },
            WorldMsg::Leave(id) => {
                self.sessions.disconnect(id);
            }
            WorldMsg::Command(from, command) => {
                handler::handle_command(&mut self.world, &mut self.sessions, from, command, now);
            }
            WorldMsg::Shutdown => {}
        }
        self.publish_status();
    }

    /// One tick: advance, snapshot, broadcast. A physics fault skips the
    /// broadcast and leaves the last good poses in place. Bodies evicted for
    /// non-finite poses are announced before the snapshot.
    pub fn step(&mut self, now: Instant) {
        self.tick += 1;
        match self.world.tick(now) {
            Ok(tick) => {
                if tick.steps > 1 {
                    debug!(tick = self.tick, steps = tick.steps, "Caught up with sub-steps");
                }
                for id in tick.evicted {
                    handler::broadcast(&mut self.sessions, &ServerEvent::BodyRemoved { id });
                }
                let bodies = self.world.snapshot();
                handler::broadcast(&mut self.sessions, &ServerEvent::WorldState { bodies });
            }
            Err(e) => warn!(tick = self.tick, error = %e, "Physics step failed, tick skipped"),
        }
        self.publish_status();
    }

    fn publish_status(&self) {
        let status = WorldStatus {
            tick: self.tick,
            entities: self.world.registry().len(),
            sessions: self.sessions.len(),
            paused: self.world.is_paused(),
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    pub fn world(&self) -> &World<P> {
        &self.world
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }
}
