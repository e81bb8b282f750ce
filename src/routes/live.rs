//! Live surface — publication status changes and viewer snapshots.
//!
//! These are the two synchronous request/response operations of the sync
//! subsystem; everything else flows over the websocket gateway.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::routes::auth::AuthUser;
use crate::services::live::{BoardSnapshot, LiveError};
use crate::services::store::PublicationStatus;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SetStatusBody {
    pub status: PublicationStatus,
}

/// `PUT /api/boards/{id}/status` — set Draft/Live and broadcast the change.
pub async fn set_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(board_id): Path<Uuid>,
    Json(body): Json<SetStatusBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    state
        .live
        .set_status(board_id, body.status, auth.user.id)
        .await
        .map_err(live_error_to_status)?;

    Ok(Json(serde_json::json!({ "ok": true, "status": body.status })))
}

/// `GET /api/boards/{id}/snapshot` — point-in-time state of a Live board.
///
/// Responds 404 whether the board is missing, the caller lacks access, or
/// the board is Draft; the cases are deliberately indistinguishable.
pub async fn snapshot(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(board_id): Path<Uuid>,
) -> Result<Json<BoardSnapshot>, StatusCode> {
    let snapshot = state
        .live
        .snapshot(board_id, auth.user.id)
        .await
        .map_err(live_error_to_status)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(snapshot))
}

pub(crate) fn live_error_to_status(err: LiveError) -> StatusCode {
    match err {
        LiveError::AccessDenied | LiveError::NotFound(_) => StatusCode::NOT_FOUND,
        LiveError::Unauthorized => StatusCode::FORBIDDEN,
        LiveError::Store(_) | LiveError::Access(_) => {
            tracing::error!(error = %err, "live operation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
