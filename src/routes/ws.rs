//! WebSocket handler: one task per connection.
//!
//! DESIGN
//! ======
//! On upgrade, generates a client ID and enters a `select!` loop:
//! - Incoming client messages → decode → rate limit → validate → apply
//! - Outbound queue (broadcasts from other connections) → write to socket
//!
//! Handler functions never touch other sockets. Fan-out goes through the
//! registry's per-connection queues, so the only socket a task writes is
//! its own.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → queue size announcement + every cell → register → broadcast count
//! 2. Client sends pixels → accepted ones are applied and broadcast
//! 3. Receive error, malformed message, close or eviction → unregister → broadcast count
//!
//! After `join` the registry holds the only sender for the connection's
//! queue. Eviction by the broadcast hub drops it, so the queue drains and
//! then reports closed.
//!
//! A decode failure ends the connection just like a transport failure; the
//! two are kept apart only in the logs.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::message::{Outbound, Pixel, ServerMessage};
use crate::services::broadcast;
use crate::services::registry::ClientTx;
use crate::state::AppState;

// =============================================================================
// ERRORS
// =============================================================================

/// Why a connection left the `Active` state.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),
    #[error("malformed message: {0}")]
    Protocol(#[from] serde_json::Error),
    #[error("closed by peer")]
    Closed,
    #[error("evicted after outbound queue overflow")]
    Evicted,
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();

    // Per-connection queue for broadcasts and the initial sync.
    let (client_tx, mut client_rx) = mpsc::channel::<Outbound>(state.config.client_channel_capacity);

    join(&state, client_id, client_tx).await;
    info!(%client_id, clients = state.registry.len(), "ws: client connected");

    let reason = loop {
        tokio::select! {
            msg = socket.recv() => {
                let pixel = match decode_inbound(msg) {
                    Ok(Some(pixel)) => pixel,
                    Ok(None) => continue,
                    Err(e) => break e,
                };
                for reply in process_update(&state, client_id, pixel).await {
                    if let Err(e) = send_message(&mut socket, &reply).await {
                        warn!(%client_id, error = %e, "ws: reply not delivered");
                    }
                }
            }
            outbound = client_rx.recv() => {
                let Some(outbound) = outbound else {
                    break ConnectionError::Evicted;
                };
                if let Err(e) = send_outbound(&mut socket, &outbound).await {
                    warn!(%client_id, error = %e, "ws: outbound write failed");
                }
            }
        }
    };

    match &reason {
        ConnectionError::Closed => info!(%client_id, "ws: client closed connection"),
        ConnectionError::Transport(e) => warn!(%client_id, error = %e, "ws: transport error"),
        ConnectionError::Protocol(e) => warn!(%client_id, error = %e, "ws: malformed message; closing"),
        ConnectionError::Evicted => warn!(%client_id, "ws: evicted for falling behind; closing"),
    }

    leave(&state, client_id);
    info!(%client_id, clients = state.registry.len(), "ws: client disconnected");
}

/// `Connecting → Active`: queue the initial sync, register, announce the
/// new count.
///
/// The sync is queued and the connection registered inside one grid read
/// section. No mutation can run between the two, so the size announcement
/// is always the first thing in the queue and every later mutation is
/// broadcast behind the snapshot.
async fn join(state: &AppState, client_id: Uuid, client_tx: ClientTx) {
    let size = ServerMessage::size(state.grid.width(), state.grid.height());
    let queued = state
        .grid
        .full_snapshot_then(|pixels| {
            let sync: Arc<[ServerMessage]> = std::iter::once(size)
                .chain(pixels.into_iter().map(ServerMessage::from))
                .collect();
            let queued = client_tx.try_send(Outbound::Batch(sync));
            state.registry.register(client_id, client_tx);
            queued
        })
        .await;
    if let Err(e) = queued {
        warn!(%client_id, error = %e, "ws: initial sync not queued");
    }

    broadcast::broadcast_client_count(&state.registry);
}

/// `Active → Closed`: drop the registration and rate-limit record together,
/// then tell everyone else.
fn leave(state: &AppState, client_id: Uuid) {
    state.registry.unregister(client_id);
    if !state.registry.is_empty() {
        broadcast::broadcast_client_count(&state.registry);
    }
}

// =============================================================================
// INBOUND
// =============================================================================

/// Decode one received item. `Ok(None)` means "nothing to do" (ping/pong).
fn decode_inbound(msg: Option<Result<Message, axum::Error>>) -> Result<Option<Pixel>, ConnectionError> {
    let Some(msg) = msg else {
        return Err(ConnectionError::Closed);
    };
    match msg? {
        Message::Text(text) => Ok(Some(serde_json::from_str(text.as_str())?)),
        Message::Binary(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Message::Close(_) => Err(ConnectionError::Closed),
        Message::Ping(_) | Message::Pong(_) => Ok(None),
    }
}

/// Run one decoded pixel through rate limiting, validation, mutation and
/// broadcast. Returns messages for the sender only.
async fn process_update(state: &AppState, client_id: Uuid, pixel: Pixel) -> Vec<ServerMessage> {
    if !state.rate_limiter.accept(client_id) {
        debug!(%client_id, "ws: update rate limited");
        return Vec::new();
    }

    let placement = match state.grid.validate(pixel.x, pixel.y, &pixel.color) {
        Ok(p) => p,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid update");
            return Vec::new();
        }
    };

    let mut replies = Vec::new();
    if state.grid.palette().is_secret(&pixel.color) {
        info!(%client_id, color = %pixel.color, "ws: secret color placed");
        replies.push(ServerMessage::flag(state.config.flag_message.clone()));
    }

    let applied = broadcast::apply_pixel(state, placement).await;
    info!(%client_id, color = %applied.color, x = applied.x, y = applied.y, "ws: pixel placed");

    replies
}

// =============================================================================
// HELPERS
// =============================================================================

#[derive(Debug, thiserror::Error)]
enum SendError {
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("socket: {0}")]
    Socket(#[from] axum::Error),
}

async fn send_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<(), SendError> {
    let json = msg.to_json()?;
    socket.send(Message::Text(json.into())).await?;
    Ok(())
}

async fn send_outbound(socket: &mut WebSocket, outbound: &Outbound) -> Result<(), SendError> {
    for msg in outbound.messages() {
        send_message(socket, msg).await?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
