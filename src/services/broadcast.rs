//! Broadcast hub: fan-out to every registered connection.
//!
//! DESIGN
//! ======
//! Delivery enqueues onto each connection's bounded outbound channel with
//! `try_send`; the connection task owns the socket and does the write. The
//! remaining connections always get the message.
//!
//! A closed channel is skipped; its own task unregisters it. A full channel
//! means the client has fallen behind and would never see the message, so
//! it is evicted from the registry. That drops the last sender, the
//! connection task drains what is queued and closes, and the client
//! reconnects to a fresh full sync.
//!
//! ORDERING
//! ========
//! `apply_pixel` and `import_and_resync` deliver while the grid write lock is
//! held, so no two mutations' broadcasts interleave and every connection
//! queues updates in grid-mutation order. Enqueueing never awaits, so a slow
//! client cannot hold the grid lock open.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::message::{Outbound, Pixel, ServerMessage};
use crate::services::grid::{Grid, Placement, ReplaceSummary};
use crate::services::palette::Palette;
use crate::services::registry::{ClientTx, Registry};
use crate::state::AppState;

// =============================================================================
// DELIVERY
// =============================================================================

/// Enqueue `outbound` for every current member. Returns how many accepted it.
pub fn deliver(registry: &Registry, outbound: &Outbound) -> usize {
    deliver_to(registry, registry.senders(), outbound)
}

fn deliver_to(registry: &Registry, targets: Vec<(Uuid, ClientTx)>, outbound: &Outbound) -> usize {
    let mut delivered = 0;
    for (client_id, tx) in targets {
        match tx.try_send(outbound.clone()) {
            Ok(()) => delivered += 1,
            Err(TrySendError::Full(_)) => {
                warn!(%client_id, "broadcast: outbound queue full; evicting client");
                registry.unregister(client_id);
            }
            Err(TrySendError::Closed(_)) => {
                debug!(%client_id, "broadcast: outbound queue closed; message dropped");
            }
        }
    }
    delivered
}

// =============================================================================
// PIXELS
// =============================================================================

/// Apply a validated placement and broadcast it inside one write section.
pub async fn apply_pixel(state: &AppState, placement: Placement) -> Pixel {
    let pixel = Pixel {
        x: i64::from(placement.x()),
        y: i64::from(placement.y()),
        color: state.grid.palette().name(placement.color()).to_owned(),
    };
    let registry = &state.registry;
    state
        .grid
        .set_then(placement, |_| broadcast_pixel(registry, &pixel))
        .await;
    pixel
}

/// Deliver one pixel message to every connection.
pub fn broadcast_pixel(registry: &Registry, pixel: &Pixel) -> usize {
    deliver(registry, &Outbound::Message(ServerMessage::from(pixel.clone())))
}

// =============================================================================
// CLIENT COUNT
// =============================================================================

/// Send the current connection count to every connection. The count and the
/// target list come from the same registry view.
pub fn broadcast_client_count(registry: &Registry) -> usize {
    let targets = registry.senders();
    let outbound = Outbound::Message(ServerMessage::count(targets.len()));
    deliver_to(registry, targets, &outbound)
}

// =============================================================================
// FULL SYNC
// =============================================================================

/// Every cell of `grid` as one outbound batch.
#[must_use]
pub fn snapshot_batch(grid: &Grid, palette: &Palette) -> Outbound {
    let messages: Arc<[ServerMessage]> = grid
        .pixels(palette)
        .into_iter()
        .map(ServerMessage::from)
        .collect();
    Outbound::Batch(messages)
}

/// Replace the whole grid, then resend the complete grid to every
/// connection before any other mutation can run.
pub async fn import_and_resync(state: &AppState, entries: &BTreeMap<String, String>) -> (ReplaceSummary, usize) {
    let registry = &state.registry;
    let palette = state.grid.palette();
    state
        .grid
        .replace_all_then(entries, |grid| deliver(registry, &snapshot_batch(grid, palette)))
        .await
}

#[cfg(test)]
#[path = "broadcast_test.rs"]
mod tests;
