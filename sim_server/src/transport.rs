//! HTTP and WebSocket transport.
//!
//! `GET /status` is a liveness probe. Every other interaction happens over a
//! WebSocket (`/` or `/ws`) carrying JSON text frames. Each connection gets a
//! reader loop that decodes commands and a writer task that drains the
//! session's outbox; neither ever touches world state directly.

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    handler,
    replication::WorldHandle,
    session::{Frame, SessionId},
};

/// Shared by all request handlers.
#[derive(Clone)]
pub struct TransportState {
    pub world: WorldHandle,
    pub session_queue: usize,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    status: &'static str,
    tick: u64,
    entities: usize,
    sessions: usize,
    paused: bool,
    started_at: DateTime<Utc>,
}

pub fn router(state: TransportState) -> Router {
    Router::new()
        .route("/status", get(status).options(preflight))
        .route("/", get(upgrade))
        .route("/ws", get(upgrade))
        .with_state(state)
}

const CORS: [(header::HeaderName, HeaderValue); 3] = [
    (
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    ),
    (
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, OPTIONS"),
    ),
    (
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    ),
];

async fn status(State(state): State<TransportState>) -> Response {
    let world = state.world.status();
    let body = StatusBody {
        status: "running",
        tick: world.tick,
        entities: world.entities,
        sessions: world.sessions,
        paused: world.paused,
        started_at: state.started_at,
    };
    (CORS, Json(body)).into_response()
}

async fn preflight() -> Response {
    (StatusCode::NO_CONTENT, CORS).into_response()
}

async fn upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<TransportState>,
) -> Response {
    ws.on_upgrade(move |socket| serve_session(socket, peer, state))
}

async fn serve_session(socket: WebSocket, peer: SocketAddr, state: TransportState) {
    let (outbox, mut frames) = mpsc::channel::<Frame>(state.session_queue);
    let session = match state.world.join(Some(peer), outbox).await {
        Ok(id) => id,
        Err(e) => {
            warn!(%peer, error = %e, "Rejecting connection");
            return;
        }
    };
    let (mut sink, mut stream) = socket.split();

    // Ends when the outbox closes (session evicted or world stopped) or the
    // socket refuses a write.
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if let Err(e) = sink.send(Message::Text(frame.to_string())).await {
                debug!(error = %e, "Socket write failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => submit(&state, session, &text).await,
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => submit(&state, session, text).await,
                    Err(_) => warn!(session = ?session, "Dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(session = ?session, error = %e, "Socket read failed");
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    state.world.leave(session).await;
    writer.abort();
    info!(session = ?session, %peer, "Connection closed");
}

async fn submit(state: &TransportState, session: SessionId, text: &str) {
    if let Some(command) = handler::decode(session, text) {
        if let Err(e) = state.world.submit(session, command).await {
            debug!(session = ?session, error = %e, "Command not delivered");
        }
    }
}
