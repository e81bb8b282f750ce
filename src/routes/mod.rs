//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the editor REST surface, the synchronous live surface (status +
//! snapshot), and the websocket gateway under a single Axum router.

pub mod auth;
pub mod boards;
pub mod live;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/auth/sessions", post(auth::create_session))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/ws-ticket", post(auth::ws_ticket))
        .route(
            "/api/workspaces",
            get(boards::list_workspaces).post(boards::create_workspace),
        )
        .route(
            "/api/workspaces/{id}/pieces",
            get(boards::list_piece_definitions).post(boards::create_piece_definition),
        )
        .route(
            "/api/workspaces/{id}/boards",
            get(boards::list_boards).post(boards::create_board),
        )
        .route(
            "/api/boards/{id}",
            get(boards::get_board)
                .put(boards::update_board)
                .delete(boards::delete_board),
        )
        .route("/api/boards/{id}/status", put(live::set_status))
        .route("/api/boards/{id}/snapshot", get(live::snapshot))
        .route("/api/boards/{id}/pieces", post(boards::add_piece))
        .route(
            "/api/boards/{id}/pieces/{piece_instance_id}/position",
            put(boards::move_piece),
        )
        .route(
            "/api/boards/{id}/pieces/{piece_instance_id}",
            axum::routing::delete(boards::remove_piece),
        )
        .route("/api/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
