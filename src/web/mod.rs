use std::{
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{
    net::TcpListener,
    sync::Notify,
    time::{interval, MissedTickBehavior},
};
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    StreamExt,
};
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    host,
    network::{server::Inbound, ServerLink, SessionId, SessionManager, SharedSessions, SocketClaim},
    scheduler::Game,
};

/// Snapshot of the tick loop, refreshed after every tick.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub tick_count: u64,
    pub entity_count: usize,
    pub average_tick_us: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    #[serde(flatten)]
    status: ServerStatus,
    session_count: usize,
    started_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    session_id: SessionId,
}

#[derive(Deserialize)]
struct GameQuery {
    session: SessionId,
}

#[derive(Clone)]
struct AppState {
    sessions: SharedSessions,
    link: ServerLink,
    status: Arc<Mutex<ServerStatus>>,
    started_at: DateTime<Utc>,
}

pub async fn run(config: Config) -> Result<()> {
    let sessions = SessionManager::shared_from_config(&config.server);
    let (game, link) = host::server_game(&config, sessions.clone())
        .context("failed to build server game")?;

    let status = Arc::new(Mutex::new(ServerStatus::default()));
    let shutdown = Arc::new(Notify::new());
    let ticks = tokio::spawn(drive_ticks(
        game,
        config.server.tick_interval_ms(),
        status.clone(),
        shutdown.clone(),
    ));

    let state = AppState {
        sessions,
        link,
        status,
        started_at: Utc::now(),
    };
    let router = Router::new()
        .route("/api/session", get(assign_session))
        .route("/api/status", get(server_status))
        .route("/game", get(game_socket))
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid address {}:{}", config.server.host, config.server.port))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, tick_rate_hz = config.server.tick_rate_hz, "jumpstorm server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;
    ticks.abort();
    Ok(())
}

/// Advances the game on a fixed interval. The clock is virtual: every tick moves it by
/// exactly one nominal interval, however late the timer fired.
async fn drive_ticks(
    mut game: Game,
    tick_ms: f64,
    status: Arc<Mutex<ServerStatus>>,
    shutdown: Arc<Notify>,
) {
    let mut timer = interval(Duration::from_secs_f64(tick_ms / 1000.0));
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut clock = 0.0;
    game.start(clock);
    loop {
        timer.tick().await;
        clock += tick_ms;
        match game.advance(clock) {
            Ok(_) => {
                let mut status = status.lock().unwrap_or_else(PoisonError::into_inner);
                status.tick_count = game.tick_count();
                status.entity_count = game.world().entity_count();
                status.average_tick_us = game
                    .average_tick_time()
                    .map(|average| average.as_micros() as u64);
            }
            Err(err) => {
                error!(tick = game.tick_count(), error = %err, "tick failed, shutting down");
                game.stop();
                shutdown.notify_one();
                return;
            }
        }
    }
}

async fn shutdown_signal(tick_failed: Arc<Notify>) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("ctrl-c received"),
        _ = tick_failed.notified() => {}
    }
    info!("shutting down");
}

async fn assign_session(State(state): State<AppState>) -> Response {
    match SessionManager::lock(&state.sessions).create_session() {
        Some(session_id) => {
            info!(session = %session_id, "session assigned");
            Json(SessionResponse { session_id }).into_response()
        }
        None => {
            warn!("session requested while server is full");
            (StatusCode::SERVICE_UNAVAILABLE, "server is full").into_response()
        }
    }
}

async fn server_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state
        .status
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    Json(StatusResponse {
        status,
        session_count: SessionManager::lock(&state.sessions).len(),
        started_at: state.started_at,
    })
}

async fn game_socket(
    ws: WebSocketUpgrade,
    Query(query): Query<GameQuery>,
    State(state): State<AppState>,
) -> Response {
    match SessionManager::lock(&state.sessions).claim_socket(&query.session) {
        SocketClaim::Claimed => {}
        SocketClaim::Unknown => {
            debug!(session = %query.session, "upgrade for unknown session rejected");
            return (StatusCode::UNAUTHORIZED, "unknown session").into_response();
        }
        SocketClaim::AlreadyClaimed => {
            warn!(session = %query.session, "second socket for session rejected");
            return (StatusCode::CONFLICT, "session already has a socket").into_response();
        }
    }
    ws.on_upgrade(move |socket| relay(socket, query.session, state.link))
}

/// Forwards socket frames into the tick and the tick's frames back out, until either side closes.
async fn relay(mut socket: WebSocket, session_id: SessionId, link: ServerLink) {
    // Subscribe first so the join snapshot cannot be missed.
    let mut outbound = BroadcastStream::new(link.subscribe());
    if link.inbound.send(Inbound::Connected(session_id.clone())).is_err() {
        warn!(session = %session_id, "tick loop is gone, closing socket");
        return;
    }

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    if link.inbound.send(Inbound::Frame(session_id.clone(), text)).is_err() {
                        break;
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(session = %session_id, error = %err, "socket error");
                    break;
                }
            },
            frame = outbound.next() => match frame {
                Some(Ok(frame)) if frame.is_for(&session_id) => {
                    if socket.send(WsMessage::Text(frame.frame)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    warn!(session = %session_id, skipped, "socket fell behind, frames lost");
                }
                None => break,
            },
        }
    }

    let _ = link.inbound.send(Inbound::Disconnected(session_id));
}
