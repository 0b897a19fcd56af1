//! Shared helpers for the socket-level test suites.

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use sim_server::{server::bind_ephemeral, SimServer};
use sim_shared::prelude::*;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

/// Generous bound for anything that should arrive within a few ticks.
pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Starts a server on an ephemeral localhost port with default settings.
pub async fn spawn_server() -> anyhow::Result<SimServer> {
    init_tracing();
    bind_ephemeral(ServerConfig::default()).await
}

/// Minimal HTTP/1.1 request. Returns the status code, the raw header block
/// and the body.
pub async fn http_request(
    addr: SocketAddr,
    method: &str,
    path: &str,
) -> anyhow::Result<(u16, String, String)> {
    let mut stream = TcpStream::connect(addr).await.context("connect")?;
    let request = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut raw = Vec::new();
    tokio::time::timeout(WAIT, stream.read_to_end(&mut raw))
        .await
        .context("http response timed out")??;
    let raw = String::from_utf8(raw).context("response is not UTF-8")?;

    let (head, body) = raw
        .split_once("\r\n\r\n")
        .context("response without header terminator")?;
    let code = head
        .split_whitespace()
        .nth(1)
        .context("missing status code")?
        .parse()
        .context("bad status code")?;
    Ok((code, head.to_string(), body.to_string()))
}

/// Dynamic unit-scale body of `kind` at `position`.
pub fn body(kind: BodyKind, position: Vec3) -> BodySpec {
    BodySpec::new(
        kind,
        1.0,
        position,
        Quat::IDENTITY,
        ShapeParams::from_scale(kind, Scale::Uniform(0.5)),
    )
    .expect("test body is valid")
}
