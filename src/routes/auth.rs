//! Auth routes — session issuance, current-user lookup, WS tickets.
//!
//! Identity here is deliberately minimal: `POST /api/auth/sessions` maps a
//! display name to a stable user row and returns a bearer token. Everything
//! downstream (access checks, gateway tickets) only needs the user id.

use axum::extract::{FromRef, State};
use axum::http::{StatusCode, header};
use axum::response::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::services::session;
use crate::state::AppState;

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Authenticated user extracted from the `Authorization: Bearer` header.
/// Use as a handler parameter to require authentication.
pub struct AuthUser {
    pub user: session::SessionUser,
    pub token: String,
}

impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .unwrap_or_default();
        if token.is_empty() {
            return Err(StatusCode::UNAUTHORIZED);
        }

        let app_state = AppState::from_ref(state);
        let user = session::validate_session(&app_state.pool, token)
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::UNAUTHORIZED)?;

        Ok(Self { user, token: token.to_owned() })
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Deserialize)]
pub struct CreateSessionBody {
    pub name: String,
}

/// `POST /api/auth/sessions` — ensure the named user exists and issue a
/// bearer token for it.
pub async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let user_id = ensure_user_logged(&state, name).await?;
    let token = session::create_session(&state.pool, user_id)
        .await
        .map_err(internal)?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "token": token, "user_id": user_id })),
    ))
}

/// `GET /api/auth/me` — return current user.
pub async fn me(auth: AuthUser) -> Json<session::SessionUser> {
    Json(auth.user)
}

/// `POST /api/auth/logout` — delete the presented session.
pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> StatusCode {
    let _ = session::delete_session(&state.pool, &auth.token).await;
    StatusCode::NO_CONTENT
}

/// `POST /api/auth/ws-ticket` — create a one-time WS upgrade ticket.
pub async fn ws_ticket(State(state): State<AppState>, auth: AuthUser) -> Result<Json<serde_json::Value>, StatusCode> {
    let ticket = session::create_ws_ticket(&state.pool, auth.user.id)
        .await
        .map_err(internal)?;
    Ok(Json(serde_json::json!({ "ticket": ticket })))
}

async fn ensure_user_logged(state: &AppState, name: &str) -> Result<Uuid, StatusCode> {
    session::ensure_user(&state.pool, name).await.map_err(internal)
}

fn internal(e: sqlx::Error) -> StatusCode {
    tracing::error!(error = %e, "auth database operation failed");
    StatusCode::INTERNAL_SERVER_ERROR
}
