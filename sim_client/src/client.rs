//! Client implementation.
//!
//! An observer holds one WebSocket to the server. It sends fire-and-forget
//! commands and reads the event stream: `initialState` first, then
//! `worldState` snapshots interleaved with lifecycle events.

use std::time::Duration;

use anyhow::Context;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use sim_shared::{
    body::BodySpec,
    protocol::{decode_event, encode_command, ClientCommand, EntityId, ServerEvent},
};
use tokio::{net::TcpStream, time};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::mirror::WorldMirror;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// High-level observer client.
pub struct WorldClient {
    sink: SplitSink<Socket, Message>,
    stream: SplitStream<Socket>,
    /// Local copy of the world, updated by every received event.
    pub mirror: WorldMirror,
}

impl WorldClient {
    /// Connects to `url`, e.g. `ws://127.0.0.1:3000/ws`.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let (socket, _response) = connect_async(url)
            .await
            .with_context(|| format!("connect {url}"))?;
        info!(%url, "Connected to server");
        let (sink, stream) = socket.split();
        Ok(Self {
            sink,
            stream,
            mirror: WorldMirror::default(),
        })
    }

    pub async fn send(&mut self, command: &ClientCommand) -> anyhow::Result<()> {
        self.send_raw(encode_command(command)).await
    }

    /// Sends an arbitrary text frame. Lets tests feed the server hand-written or
    /// malformed input.
    pub async fn send_raw(&mut self, text: String) -> anyhow::Result<()> {
        self.sink
            .send(Message::Text(text))
            .await
            .context("ws send")
    }

    pub async fn create_body(&mut self, body: BodySpec) -> anyhow::Result<()> {
        self.send(&ClientCommand::CreateBody { body }).await
    }

    pub async fn remove_body(&mut self, id: EntityId) -> anyhow::Result<()> {
        self.send(&ClientCommand::RemoveBody { id }).await
    }

    pub async fn reset_world(&mut self) -> anyhow::Result<()> {
        self.send(&ClientCommand::ResetWorld).await
    }

    pub async fn pause(&mut self) -> anyhow::Result<()> {
        self.send(&ClientCommand::Pause).await
    }

    pub async fn resume(&mut self) -> anyhow::Result<()> {
        self.send(&ClientCommand::Resume).await
    }

    /// Waits for the next event and applies it to the mirror. Returns `None`
    /// once the server closes the connection.
    pub async fn recv(&mut self) -> anyhow::Result<Option<ServerEvent>> {
        while let Some(msg) = self.stream.next().await {
            match msg.context("ws recv")? {
                Message::Text(text) => {
                    let event = decode_event(&text).context("decode event")?;
                    self.mirror.apply(&event);
                    return Ok(Some(event));
                }
                Message::Close(frame) => {
                    debug!(?frame, "Server closed connection");
                    return Ok(None);
                }
                _ => {}
            }
        }
        Ok(None)
    }

    /// Like [`recv`](Self::recv) but gives up after `timeout`.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> anyhow::Result<Option<ServerEvent>> {
        match time::timeout(timeout, self.recv()).await {
            Ok(result) => result,
            Err(_) => Ok(None),
        }
    }

    /// Reads events until one satisfies `pred`, returning it.
    pub async fn recv_until<F>(
        &mut self,
        timeout: Duration,
        mut pred: F,
    ) -> anyhow::Result<ServerEvent>
    where
        F: FnMut(&ServerEvent) -> bool,
    {
        let deadline = time::Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(time::Instant::now());
            match time::timeout(left, self.recv()).await {
                Ok(Ok(Some(event))) if pred(&event) => return Ok(event),
                Ok(Ok(Some(_))) => continue,
                Ok(Ok(None)) => anyhow::bail!("connection closed"),
                Ok(Err(e)) => return Err(e),
                Err(_) => anyhow::bail!("timed out after {timeout:?}"),
            }
        }
    }

    pub async fn close(mut self) -> anyhow::Result<()> {
        self.sink.close().await.context("ws close")
    }
}
