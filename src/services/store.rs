//! Board store — durable state for boards and their placed pieces.
//!
//! DESIGN
//! ======
//! The store owns the authoritative board state, including the publication
//! flag. It sits behind a trait so the live-sync layer can be exercised
//! against an in-memory implementation in tests; production uses Postgres.
//!
//! Piece instances are replaced wholesale on a full board update (no
//! per-field patch at this layer) but stay individually addressable for
//! movement and add/remove.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// TYPES
// =============================================================================

/// Publication flag on a board. `Draft` boards are invisible to viewers:
/// nothing is broadcast and snapshots are withheld.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationStatus {
    #[default]
    Draft,
    Live,
}

impl PublicationStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Live => "live",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "draft" => Some(Self::Draft),
            "live" => Some(Self::Live),
            _ => None,
        }
    }
}

/// A board row. Mutated only by the owning editor; the publication status
/// additionally changes through the live service's status operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Board {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub rows: i32,
    pub cols: i32,
    pub grid_color: String,
    pub grid_opacity: f64,
    pub background_url: Option<String>,
    pub status: PublicationStatus,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Board {
    /// Serializable shape with millisecond timestamps.
    #[must_use]
    pub fn view(&self) -> BoardView {
        BoardView {
            id: self.id,
            workspace_id: self.workspace_id,
            name: self.name.clone(),
            rows: self.rows,
            cols: self.cols,
            grid_color: self.grid_color.clone(),
            grid_opacity: self.grid_opacity,
            background_url: self.background_url.clone(),
            status: self.status,
            created_at: to_ms(self.created_at),
            updated_at: to_ms(self.updated_at),
        }
    }
}

/// Board as it appears in API responses and snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardView {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub rows: i32,
    pub cols: i32,
    pub grid_color: String,
    pub grid_opacity: f64,
    pub background_url: Option<String>,
    pub status: PublicationStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A piece definition placed on a board at integer grid coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceInstance {
    pub id: Uuid,
    pub board_id: Uuid,
    pub piece_id: Uuid,
    pub x: i32,
    pub y: i32,
}

/// Placement request for wholesale replacement or a single add.
#[derive(Debug, Clone, Deserialize)]
pub struct PiecePlacement {
    pub piece_id: Uuid,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone)]
pub struct BoardWithPieces {
    pub board: Board,
    pub pieces: Vec<PieceInstance>,
}

fn to_ms(at: OffsetDateTime) -> i64 {
    i64::try_from(at.unix_timestamp_nanos() / 1_000_000).unwrap_or(0)
}

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("board not found: {0}")]
    NotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =============================================================================
// TRAIT
// =============================================================================

/// Durable CRUD for boards and piece instances.
#[async_trait]
pub trait BoardStore: Send + Sync {
    async fn load(&self, board_id: Uuid) -> Result<Option<Board>, StoreError>;

    async fn load_with_pieces(&self, board_id: Uuid) -> Result<Option<BoardWithPieces>, StoreError>;

    /// Persist board-level fields, including publication status.
    async fn save(&self, board: &Board) -> Result<(), StoreError>;

    async fn create(&self, board: &Board) -> Result<(), StoreError>;

    async fn delete(&self, board_id: Uuid) -> Result<bool, StoreError>;

    async fn list_by_workspace(&self, workspace_id: Uuid) -> Result<Vec<Board>, StoreError>;

    /// Drop every piece on the board and insert the given placements.
    async fn replace_pieces(
        &self,
        board_id: Uuid,
        placements: &[PiecePlacement],
    ) -> Result<Vec<PieceInstance>, StoreError>;

    async fn insert_piece(&self, board_id: Uuid, placement: &PiecePlacement) -> Result<PieceInstance, StoreError>;

    async fn get_piece(&self, board_id: Uuid, piece_instance_id: Uuid) -> Result<Option<PieceInstance>, StoreError>;

    /// Returns `false` if the instance no longer exists.
    async fn update_piece_position(
        &self,
        board_id: Uuid,
        piece_instance_id: Uuid,
        x: i32,
        y: i32,
    ) -> Result<bool, StoreError>;

    /// Returns `false` if the instance no longer exists.
    async fn delete_piece(&self, board_id: Uuid, piece_instance_id: Uuid) -> Result<bool, StoreError>;
}

// =============================================================================
// POSTGRES IMPLEMENTATION
// =============================================================================

pub struct PgBoardStore {
    pool: PgPool,
}

impl PgBoardStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type BoardRow = (
    Uuid,
    Uuid,
    String,
    i32,
    i32,
    String,
    f64,
    Option<String>,
    String,
    OffsetDateTime,
    OffsetDateTime,
);

const BOARD_COLUMNS: &str =
    "id, workspace_id, name, rows, cols, grid_color, grid_opacity, background_url, status, created_at, updated_at";

fn board_from_row(row: BoardRow) -> Board {
    let (id, workspace_id, name, rows, cols, grid_color, grid_opacity, background_url, status, created_at, updated_at) =
        row;
    Board {
        id,
        workspace_id,
        name,
        rows,
        cols,
        grid_color,
        grid_opacity,
        background_url,
        // A CHECK constraint restricts the column to known values.
        status: PublicationStatus::parse(&status).unwrap_or_default(),
        created_at,
        updated_at,
    }
}

#[async_trait]
impl BoardStore for PgBoardStore {
    async fn load(&self, board_id: Uuid) -> Result<Option<Board>, StoreError> {
        let row = sqlx::query_as::<_, BoardRow>(&format!("SELECT {BOARD_COLUMNS} FROM boards WHERE id = $1"))
            .bind(board_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(board_from_row))
    }

    async fn load_with_pieces(&self, board_id: Uuid) -> Result<Option<BoardWithPieces>, StoreError> {
        let Some(board) = self.load(board_id).await? else {
            return Ok(None);
        };

        let pieces = sqlx::query_as::<_, (Uuid, Uuid, Uuid, i32, i32)>(
            "SELECT id, board_id, piece_id, x, y FROM board_pieces WHERE board_id = $1 ORDER BY id",
        )
        .bind(board_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(id, board_id, piece_id, x, y)| PieceInstance { id, board_id, piece_id, x, y })
        .collect();

        Ok(Some(BoardWithPieces { board, pieces }))
    }

    async fn save(&self, board: &Board) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE boards
             SET name = $2, rows = $3, cols = $4, grid_color = $5, grid_opacity = $6,
                 background_url = $7, status = $8, updated_at = now()
             WHERE id = $1",
        )
        .bind(board.id)
        .bind(&board.name)
        .bind(board.rows)
        .bind(board.cols)
        .bind(&board.grid_color)
        .bind(board.grid_opacity)
        .bind(&board.background_url)
        .bind(board.status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(board.id));
        }
        Ok(())
    }

    async fn create(&self, board: &Board) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO boards (id, workspace_id, name, rows, cols, grid_color, grid_opacity, background_url, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(board.id)
        .bind(board.workspace_id)
        .bind(&board.name)
        .bind(board.rows)
        .bind(board.cols)
        .bind(&board.grid_color)
        .bind(board.grid_opacity)
        .bind(&board.background_url)
        .bind(board.status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, board_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM boards WHERE id = $1")
            .bind(board_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_by_workspace(&self, workspace_id: Uuid) -> Result<Vec<Board>, StoreError> {
        let rows = sqlx::query_as::<_, BoardRow>(&format!(
            "SELECT {BOARD_COLUMNS} FROM boards WHERE workspace_id = $1 ORDER BY created_at DESC"
        ))
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(board_from_row).collect())
    }

    async fn replace_pieces(
        &self,
        board_id: Uuid,
        placements: &[PiecePlacement],
    ) -> Result<Vec<PieceInstance>, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM board_pieces WHERE board_id = $1")
            .bind(board_id)
            .execute(&mut *tx)
            .await?;

        let mut inserted = Vec::with_capacity(placements.len());
        for placement in placements {
            let piece = PieceInstance {
                id: Uuid::new_v4(),
                board_id,
                piece_id: placement.piece_id,
                x: placement.x,
                y: placement.y,
            };
            sqlx::query("INSERT INTO board_pieces (id, board_id, piece_id, x, y) VALUES ($1, $2, $3, $4, $5)")
                .bind(piece.id)
                .bind(piece.board_id)
                .bind(piece.piece_id)
                .bind(piece.x)
                .bind(piece.y)
                .execute(&mut *tx)
                .await?;
            inserted.push(piece);
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn insert_piece(&self, board_id: Uuid, placement: &PiecePlacement) -> Result<PieceInstance, StoreError> {
        let piece = PieceInstance {
            id: Uuid::new_v4(),
            board_id,
            piece_id: placement.piece_id,
            x: placement.x,
            y: placement.y,
        };
        sqlx::query("INSERT INTO board_pieces (id, board_id, piece_id, x, y) VALUES ($1, $2, $3, $4, $5)")
            .bind(piece.id)
            .bind(piece.board_id)
            .bind(piece.piece_id)
            .bind(piece.x)
            .bind(piece.y)
            .execute(&self.pool)
            .await?;
        Ok(piece)
    }

    async fn get_piece(&self, board_id: Uuid, piece_instance_id: Uuid) -> Result<Option<PieceInstance>, StoreError> {
        let row = sqlx::query_as::<_, (Uuid, Uuid, Uuid, i32, i32)>(
            "SELECT id, board_id, piece_id, x, y FROM board_pieces WHERE id = $1 AND board_id = $2",
        )
        .bind(piece_instance_id)
        .bind(board_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, board_id, piece_id, x, y)| PieceInstance { id, board_id, piece_id, x, y }))
    }

    async fn update_piece_position(
        &self,
        board_id: Uuid,
        piece_instance_id: Uuid,
        x: i32,
        y: i32,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE board_pieces SET x = $3, y = $4 WHERE id = $1 AND board_id = $2")
            .bind(piece_instance_id)
            .bind(board_id)
            .bind(x)
            .bind(y)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_piece(&self, board_id: Uuid, piece_instance_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM board_pieces WHERE id = $1 AND board_id = $2")
            .bind(piece_instance_id)
            .bind(board_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// TESTS
// =============================================================================
