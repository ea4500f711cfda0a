//! Wire messages for the real-time channel and the snapshot file format.
//!
//! DESIGN
//! ======
//! Every server message is a flat JSON object with no envelope. The shapes
//! are fixed by the browser client:
//! - pixel: `{x, y, color}`
//! - size announcement: `{x, y}`
//! - client count: `{type: 1, count}`
//! - flag: `{type: "flag", message}`
//!
//! The size announcement is a pixel without `color`; clients tell them apart
//! by the missing field. Messages are queued per connection as `Outbound`
//! values and serialized by the owning connection task.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Discriminant carried by client-count messages.
pub const COUNT_MESSAGE_TYPE: u8 = 1;

/// Discriminant carried by flag messages.
pub const FLAG_MESSAGE_TYPE: &str = "flag";

// =============================================================================
// PIXEL
// =============================================================================

/// One cell placement. Inbound from clients, outbound as broadcasts and as
/// the per-cell messages of a full sync.
///
/// Coordinates are signed so negative values decode and fail validation
/// instead of failing the whole message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pixel {
    pub x: i64,
    pub y: i64,
    pub color: String,
}

// =============================================================================
// SERVER MESSAGES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GridSize {
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientCount {
    #[serde(rename = "type")]
    kind: u8,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagNotice {
    #[serde(rename = "type")]
    kind: &'static str,
    pub message: String,
}

/// Any message the server writes to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Pixel(Pixel),
    Size(GridSize),
    Count(ClientCount),
    Flag(FlagNotice),
}

impl ServerMessage {
    #[must_use]
    pub fn size(width: u16, height: u16) -> Self {
        Self::Size(GridSize { x: i64::from(width), y: i64::from(height) })
    }

    #[must_use]
    pub fn count(count: usize) -> Self {
        Self::Count(ClientCount { kind: COUNT_MESSAGE_TYPE, count })
    }

    #[must_use]
    pub fn flag(message: impl Into<String>) -> Self {
        Self::Flag(FlagNotice { kind: FLAG_MESSAGE_TYPE, message: message.into() })
    }

    /// Serialize to the JSON text written on the socket.
    ///
    /// # Errors
    ///
    /// Returns a serialization error (not expected for these shapes).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<Pixel> for ServerMessage {
    fn from(pixel: Pixel) -> Self {
        Self::Pixel(pixel)
    }
}

// =============================================================================
// OUTBOUND QUEUE ITEM
// =============================================================================

/// Unit queued on a connection's outbound channel.
///
/// `Batch` carries a whole sync (size announcement and/or every cell) as one
/// queue slot so it cannot be interleaved with, or starve, other deliveries.
#[derive(Debug, Clone)]
pub enum Outbound {
    Message(ServerMessage),
    Batch(Arc<[ServerMessage]>),
}

impl Outbound {
    /// Iterate the messages in write order.
    pub fn messages(&self) -> impl Iterator<Item = &ServerMessage> {
        match self {
            Self::Message(msg) => std::slice::from_ref(msg).iter(),
            Self::Batch(batch) => batch.iter(),
        }
    }
}

// =============================================================================
// GRID STATE DOCUMENT
// =============================================================================

/// Sparse grid document used both by snapshot files and the admin import
/// body: `{"grid": {"x,y": color, ...}, "timestamp": "..."}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridState {
    pub grid: BTreeMap<String, String>,
    #[serde(default)]
    pub timestamp: String,
}

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;
