//! Admin import route.
//!
//! `POST <admin path>` replaces the whole canvas from a JSON document of the
//! same shape the persistence task writes, then resends the full grid to
//! every connection. The request must carry the shared secret in
//! `X-Admin-Password`.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::message::GridState;
use crate::services::broadcast;
use crate::state::AppState;

pub const ADMIN_PASSWORD_HEADER: &str = "x-admin-password";

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("missing or wrong admin password")]
    Unauthorized,
    #[error("invalid body: {0}")]
    InvalidBody(#[from] serde_json::Error),
}

pub(crate) fn import_error_to_response(err: &ImportError) -> (StatusCode, &'static str) {
    match err {
        ImportError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
        ImportError::InvalidBody(_) => (StatusCode::BAD_REQUEST, "Invalid request body"),
    }
}

/// `POST <admin path>`: replace the grid and resync every connection.
pub async fn import_grid(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    match import(&state, &headers, &body).await {
        Ok(()) => (StatusCode::OK, "Grid state imported successfully"),
        Err(e) => {
            warn!(error = %e, "admin: import rejected");
            import_error_to_response(&e)
        }
    }
}

async fn import(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<(), ImportError> {
    let provided = headers.get(ADMIN_PASSWORD_HEADER).map(|v| v.as_bytes());
    if !authorized(state.config.admin_password.as_deref(), provided) {
        return Err(ImportError::Unauthorized);
    }

    let doc: GridState = serde_json::from_slice(body)?;
    let (summary, delivered) = broadcast::import_and_resync(state, &doc.grid).await;
    info!(
        applied = summary.applied,
        skipped = summary.skipped,
        clients = delivered,
        timestamp = %doc.timestamp,
        "admin: grid imported"
    );
    Ok(())
}

/// Exact match against the configured secret. Both sides are hashed first so
/// the comparison length does not depend on the secret. No configured
/// secret rejects everything.
fn authorized(expected: Option<&str>, provided: Option<&[u8]>) -> bool {
    let (Some(expected), Some(provided)) = (expected, provided) else {
        return false;
    };
    Sha256::digest(expected.as_bytes()) == Sha256::digest(provided)
}

#[cfg(test)]
#[path = "admin_test.rs"]
mod tests;
