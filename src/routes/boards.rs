//! Editor surface — workspace, piece definition, board, and piece routes.
//!
//! DESIGN
//! ======
//! Every mutation persists through the board store first, then spawns the
//! matching live notification. The spawn boundary is what keeps broadcast
//! strictly secondary: by the time a notify task runs, the mutation has
//! already committed, and a broadcast failure can only ever be logged.
//!
//! Board lookups for non-owners answer 404, never 403, so callers cannot
//! probe which board ids exist.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::routes::auth::AuthUser;
use crate::services::store::{Board, BoardView, PieceInstance, PiecePlacement, PublicationStatus};
use crate::state::AppState;

// =============================================================================
// WORKSPACES
// =============================================================================

#[derive(Deserialize)]
pub struct CreateWorkspaceBody {
    pub name: String,
}

/// `POST /api/workspaces` — create a workspace owned by the caller.
pub async fn create_workspace(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateWorkspaceBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO workspaces (id, name, owner_id) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(&body.name)
        .bind(auth.user.id)
        .execute(&state.pool)
        .await
        .map_err(internal)?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": id, "name": body.name, "owner_id": auth.user.id })),
    ))
}

/// `GET /api/workspaces` — list workspaces owned by the caller.
pub async fn list_workspaces(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<serde_json::Value>>, StatusCode> {
    let rows = sqlx::query_as::<_, (Uuid, String)>(
        "SELECT id, name FROM workspaces WHERE owner_id = $1 ORDER BY created_at DESC",
    )
    .bind(auth.user.id)
    .fetch_all(&state.pool)
    .await
    .map_err(internal)?;

    Ok(Json(
        rows.into_iter()
            .map(|(id, name)| serde_json::json!({ "id": id, "name": name }))
            .collect(),
    ))
}

// =============================================================================
// PIECE DEFINITIONS
// =============================================================================

#[derive(Deserialize)]
pub struct CreatePieceDefinitionBody {
    pub name: String,
    pub image_url: Option<String>,
    #[serde(default = "default_piece_size")]
    pub size: i32,
    pub category: Option<String>,
}

fn default_piece_size() -> i32 {
    1
}

/// `POST /api/workspaces/{id}/pieces` — register a piece definition.
pub async fn create_piece_definition(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(workspace_id): Path<Uuid>,
    Json(body): Json<CreatePieceDefinitionBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    ensure_workspace_access(&state, workspace_id, auth.user.id).await?;

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO piece_definitions (id, workspace_id, name, image_url, size, category)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(id)
    .bind(workspace_id)
    .bind(&body.name)
    .bind(&body.image_url)
    .bind(body.size)
    .bind(&body.category)
    .execute(&state.pool)
    .await
    .map_err(internal)?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": id,
            "workspace_id": workspace_id,
            "name": body.name,
            "image_url": body.image_url,
            "size": body.size,
            "category": body.category,
        })),
    ))
}

/// `GET /api/workspaces/{id}/pieces` — list piece definitions.
pub async fn list_piece_definitions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(workspace_id): Path<Uuid>,
) -> Result<Json<Vec<serde_json::Value>>, StatusCode> {
    ensure_workspace_access(&state, workspace_id, auth.user.id).await?;

    let rows = sqlx::query_as::<_, (Uuid, String, Option<String>, i32, Option<String>)>(
        "SELECT id, name, image_url, size, category FROM piece_definitions
         WHERE workspace_id = $1 ORDER BY name",
    )
    .bind(workspace_id)
    .fetch_all(&state.pool)
    .await
    .map_err(internal)?;

    Ok(Json(
        rows.into_iter()
            .map(|(id, name, image_url, size, category)| {
                serde_json::json!({
                    "id": id,
                    "name": name,
                    "image_url": image_url,
                    "size": size,
                    "category": category,
                })
            })
            .collect(),
    ))
}

// =============================================================================
// BOARDS
// =============================================================================

#[derive(Deserialize)]
pub struct CreateBoardBody {
    pub name: String,
    pub rows: i32,
    pub cols: i32,
    #[serde(default = "default_grid_color")]
    pub grid_color: String,
    #[serde(default = "default_grid_opacity")]
    pub grid_opacity: f64,
    pub background_url: Option<String>,
}

fn default_grid_color() -> String {
    "#000000".into()
}

fn default_grid_opacity() -> f64 {
    0.3
}

/// `POST /api/workspaces/{id}/boards` — create a Draft board.
pub async fn create_board(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(workspace_id): Path<Uuid>,
    Json(body): Json<CreateBoardBody>,
) -> Result<(StatusCode, Json<BoardView>), StatusCode> {
    ensure_workspace_access(&state, workspace_id, auth.user.id).await?;

    let now = OffsetDateTime::now_utc();
    let board = Board {
        id: Uuid::new_v4(),
        workspace_id,
        name: body.name,
        rows: body.rows,
        cols: body.cols,
        grid_color: body.grid_color,
        grid_opacity: body.grid_opacity,
        background_url: body.background_url,
        status: PublicationStatus::Draft,
        created_at: now,
        updated_at: now,
    };
    state.store.create(&board).await.map_err(internal_store)?;

    Ok((StatusCode::CREATED, Json(board.view())))
}

/// `GET /api/workspaces/{id}/boards` — list boards in a workspace.
pub async fn list_boards(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(workspace_id): Path<Uuid>,
) -> Result<Json<Vec<BoardView>>, StatusCode> {
    ensure_workspace_access(&state, workspace_id, auth.user.id).await?;

    let boards = state
        .store
        .list_by_workspace(workspace_id)
        .await
        .map_err(internal_store)?;
    Ok(Json(boards.iter().map(Board::view).collect()))
}

#[derive(Debug, serde::Serialize)]
pub struct BoardResponse {
    #[serde(flatten)]
    pub board: BoardView,
    pub pieces: Vec<PieceInstance>,
}

/// `GET /api/boards/{id}` — fetch one board with pieces (editor view; works
/// in any publication status, unlike the viewer snapshot).
pub async fn get_board(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(board_id): Path<Uuid>,
) -> Result<Json<BoardResponse>, StatusCode> {
    ensure_board_access(&state, board_id, auth.user.id).await?;

    let loaded = state
        .store
        .load_with_pieces(board_id)
        .await
        .map_err(internal_store)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(BoardResponse { board: loaded.board.view(), pieces: loaded.pieces }))
}

#[derive(Deserialize)]
pub struct UpdateBoardBody {
    pub name: String,
    pub rows: i32,
    pub cols: i32,
    pub grid_color: String,
    pub grid_opacity: f64,
    pub background_url: Option<String>,
    /// Wholesale replacement: the board ends up with exactly these pieces.
    #[serde(default)]
    pub pieces: Vec<PiecePlacement>,
}

/// `PUT /api/boards/{id}` — full board update, pieces replaced wholesale.
/// Publication status is not touched here; it only changes through the
/// status endpoint so every transition flows through the state machine.
pub async fn update_board(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(board_id): Path<Uuid>,
    Json(body): Json<UpdateBoardBody>,
) -> Result<Json<BoardResponse>, StatusCode> {
    let mut board = ensure_board_access(&state, board_id, auth.user.id).await?;

    board.name = body.name;
    board.rows = body.rows;
    board.cols = body.cols;
    board.grid_color = body.grid_color;
    board.grid_opacity = body.grid_opacity;
    board.background_url = body.background_url;

    state.store.save(&board).await.map_err(internal_store)?;
    let pieces = state
        .store
        .replace_pieces(board_id, &body.pieces)
        .await
        .map_err(internal_store)?;

    let live = state.live.clone();
    tokio::spawn(async move {
        live.notify_board_updated(board_id).await;
    });

    Ok(Json(BoardResponse { board: board.view(), pieces }))
}

/// `DELETE /api/boards/{id}` — delete a board and its pieces.
pub async fn delete_board(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(board_id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    ensure_board_access(&state, board_id, auth.user.id).await?;
    state.store.delete(board_id).await.map_err(internal_store)?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// PIECES
// =============================================================================

/// `POST /api/boards/{id}/pieces` — place a piece on the board.
pub async fn add_piece(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(board_id): Path<Uuid>,
    Json(body): Json<PiecePlacement>,
) -> Result<(StatusCode, Json<PieceInstance>), StatusCode> {
    ensure_board_access(&state, board_id, auth.user.id).await?;

    let piece = state
        .store
        .insert_piece(board_id, &body)
        .await
        .map_err(internal_store)?;

    let live = state.live.clone();
    let piece_instance_id = piece.id;
    tokio::spawn(async move {
        live.notify_piece_added(board_id, piece_instance_id).await;
    });

    Ok((StatusCode::CREATED, Json(piece)))
}

#[derive(Deserialize)]
pub struct MovePieceBody {
    pub x: i32,
    pub y: i32,
}

/// `PUT /api/boards/{id}/pieces/{piece_instance_id}/position` — move a piece.
pub async fn move_piece(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((board_id, piece_instance_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<MovePieceBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    ensure_board_access(&state, board_id, auth.user.id).await?;

    let (x, y) = (body.x, body.y);
    let moved = state
        .store
        .update_piece_position(board_id, piece_instance_id, x, y)
        .await
        .map_err(internal_store)?;
    if !moved {
        return Err(StatusCode::NOT_FOUND);
    }

    let live = state.live.clone();
    tokio::spawn(async move {
        live.notify_piece_moved(board_id, piece_instance_id, x, y).await;
    });

    Ok(Json(serde_json::json!({ "ok": true, "x": x, "y": y })))
}

/// `DELETE /api/boards/{id}/pieces/{piece_instance_id}` — remove a piece.
pub async fn remove_piece(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((board_id, piece_instance_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, StatusCode> {
    ensure_board_access(&state, board_id, auth.user.id).await?;

    let removed = state
        .store
        .delete_piece(board_id, piece_instance_id)
        .await
        .map_err(internal_store)?;
    if !removed {
        return Err(StatusCode::NOT_FOUND);
    }

    let live = state.live.clone();
    tokio::spawn(async move {
        live.notify_piece_removed(board_id, piece_instance_id).await;
    });

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// HELPERS
// =============================================================================

/// Load a board and require workspace access, answering 404 on both a
/// missing board and a denied caller.
async fn ensure_board_access(state: &AppState, board_id: Uuid, user_id: Uuid) -> Result<Board, StatusCode> {
    let board = state
        .store
        .load(board_id)
        .await
        .map_err(internal_store)?
        .ok_or(StatusCode::NOT_FOUND)?;

    if !state
        .access
        .can_access(board.workspace_id, user_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "access check failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
    {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(board)
}

async fn ensure_workspace_access(state: &AppState, workspace_id: Uuid, user_id: Uuid) -> Result<(), StatusCode> {
    let allowed = state
        .access
        .can_access(workspace_id, user_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "access check failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    if !allowed {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(())
}

fn internal(e: sqlx::Error) -> StatusCode {
    tracing::error!(error = %e, "board database operation failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

fn internal_store(e: crate::services::store::StoreError) -> StatusCode {
    match e {
        crate::services::store::StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        crate::services::store::StoreError::Database(_) => {
            tracing::error!(error = %e, "board store operation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
#[path = "boards_test.rs"]
mod tests;
