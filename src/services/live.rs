//! Live board service — publication gating, throttled fan-out, snapshots.
//!
//! DESIGN
//! ======
//! Orchestrates every live-sync concern: each notify operation re-reads the
//! board, gates on its publication status, applies the movement throttle
//! where it applies, builds the event, and hands it to the group registry.
//! A board's current status is the single authority for delivery — Draft
//! boards broadcast nothing, whatever the event type.
//!
//! ERROR HANDLING
//! ==============
//! Notify operations are invoked by the mutation path after the write has
//! committed, so they log failures and return nothing: a broadcast problem
//! must never unwind the mutation that produced the state change. The
//! status transition and snapshot operations are caller-facing and return
//! typed errors instead.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::event::{BoardEvent, now_ms};
use crate::registry::GroupRegistry;
use crate::services::access::{AccessError, AccessVerifier};
use crate::services::store::{Board, BoardStore, BoardView, PieceInstance, PublicationStatus, StoreError};
use crate::throttle::MoveThrottle;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    /// Caller may not view the board, or it does not exist. The two cases
    /// are indistinguishable on purpose: a denied caller must not learn
    /// whether the board exists.
    #[error("board not found or access denied")]
    AccessDenied,
    /// Editor-only operation attempted by a caller without edit rights.
    #[error("not authorized to edit this board")]
    Unauthorized,
    #[error("board not found: {0}")]
    NotFound(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Access(#[from] AccessError),
}

/// Point-in-time read of a Live board for late-joining viewers.
///
/// Carries no ordering guarantee relative to in-flight broadcasts: an event
/// for a change older than the snapshot may still arrive afterwards.
/// Clients must apply incoming events as last-write-wins overwrites per
/// field/piece, not as deltas, to stay convergent.
#[derive(Debug, Clone, Serialize)]
pub struct BoardSnapshot {
    pub board: BoardView,
    pub pieces: Vec<PieceInstance>,
    pub captured_at: i64,
}

// =============================================================================
// SERVICE
// =============================================================================

pub struct LiveBoardService {
    store: Arc<dyn BoardStore>,
    access: Arc<dyn AccessVerifier>,
    registry: Arc<GroupRegistry>,
    throttle: MoveThrottle,
}

impl LiveBoardService {
    #[must_use]
    pub fn new(
        store: Arc<dyn BoardStore>,
        access: Arc<dyn AccessVerifier>,
        registry: Arc<GroupRegistry>,
        throttle: MoveThrottle,
    ) -> Self {
        Self { store, access, registry, throttle }
    }

    // =========================================================================
    // BROADCASTS (fire-and-forget)
    // =========================================================================

    /// Broadcast current board-level fields to the board's group.
    pub async fn notify_board_updated(&self, board_id: Uuid) {
        let Some(board) = self.load_live(board_id, "board update").await else {
            return;
        };

        let event = BoardEvent::BoardUpdated {
            board_id,
            name: board.name,
            rows: board.rows,
            cols: board.cols,
            grid_color: board.grid_color,
            grid_opacity: board.grid_opacity,
            background_url: board.background_url,
            ts: now_ms(),
        };
        let delivered = self.registry.deliver(board_id, &event);
        info!(%board_id, delivered, "broadcast board update");
    }

    /// Broadcast a piece movement, subject to the per-board throttle.
    /// Rejected movements are dropped silently, never queued.
    pub async fn notify_piece_moved(&self, board_id: Uuid, piece_instance_id: Uuid, x: i32, y: i32) {
        if self.load_live(board_id, "piece move").await.is_none() {
            return;
        }

        if !self.throttle.should_admit(board_id) {
            debug!(%board_id, %piece_instance_id, "movement broadcast throttled");
            return;
        }

        let event = BoardEvent::PieceMoved { board_id, piece_instance_id, x, y, ts: now_ms() };
        let delivered = self.registry.deliver(board_id, &event);
        info!(%board_id, %piece_instance_id, x, y, delivered, "broadcast piece move");
    }

    /// Broadcast a piece addition. Structural changes are not throttled.
    pub async fn notify_piece_added(&self, board_id: Uuid, piece_instance_id: Uuid) {
        if self.load_live(board_id, "piece add").await.is_none() {
            return;
        }

        let piece = match self.store.get_piece(board_id, piece_instance_id).await {
            Ok(Some(piece)) => piece,
            Ok(None) => {
                warn!(%board_id, %piece_instance_id, "piece instance gone before add broadcast");
                return;
            }
            Err(e) => {
                warn!(error = %e, %board_id, %piece_instance_id, "piece lookup failed during broadcast");
                return;
            }
        };

        let event = BoardEvent::PieceAdded {
            board_id,
            piece_instance_id: piece.id,
            piece_id: piece.piece_id,
            x: piece.x,
            y: piece.y,
            ts: now_ms(),
        };
        let delivered = self.registry.deliver(board_id, &event);
        info!(%board_id, %piece_instance_id, delivered, "broadcast piece add");
    }

    /// Broadcast a piece removal. Structural changes are not throttled.
    pub async fn notify_piece_removed(&self, board_id: Uuid, piece_instance_id: Uuid) {
        if self.load_live(board_id, "piece remove").await.is_none() {
            return;
        }

        let event = BoardEvent::PieceRemoved { board_id, piece_instance_id, ts: now_ms() };
        let delivered = self.registry.deliver(board_id, &event);
        info!(%board_id, %piece_instance_id, delivered, "broadcast piece remove");
    }

    // =========================================================================
    // PUBLICATION STATE MACHINE
    // =========================================================================

    /// Change a board's publication status and broadcast the transition.
    ///
    /// The `board:status` event goes out unconditionally — including
    /// transitions into `Live` and transitions that leave the status
    /// unchanged — so already-subscribed viewers always learn the current
    /// state. Viewers seeing a transition to `Live` should fetch a
    /// snapshot, since they may have joined before any state existed.
    ///
    /// # Errors
    ///
    /// `NotFound` if the board does not exist, `Unauthorized` if the caller
    /// may not edit it, `Store` on persistence failure.
    pub async fn set_status(
        &self,
        board_id: Uuid,
        status: PublicationStatus,
        caller: Uuid,
    ) -> Result<(), LiveError> {
        let Some(mut board) = self.store.load(board_id).await? else {
            return Err(LiveError::NotFound(board_id));
        };
        if !self.access.can_access(board.workspace_id, caller).await? {
            return Err(LiveError::Unauthorized);
        }

        board.status = status;
        self.store.save(&board).await?;

        let event = BoardEvent::StatusChanged { board_id, status, ts: now_ms() };
        let delivered = self.registry.deliver(board_id, &event);
        info!(%board_id, status = status.as_str(), delivered, "publication status changed");
        Ok(())
    }

    // =========================================================================
    // SNAPSHOT
    // =========================================================================

    /// Full current state of a Live board for viewer catch-up.
    ///
    /// Returns `None` when the board is absent, the caller lacks access, or
    /// the board is Draft — the three cases are indistinguishable, mirroring
    /// the broadcast gate: a viewer never learns board contents while Draft.
    ///
    /// # Errors
    ///
    /// Only on store/verifier failure; authorization outcomes are `None`.
    pub async fn snapshot(&self, board_id: Uuid, caller: Uuid) -> Result<Option<BoardSnapshot>, LiveError> {
        let Some(loaded) = self.store.load_with_pieces(board_id).await? else {
            return Ok(None);
        };
        if !self.access.can_access(loaded.board.workspace_id, caller).await? {
            return Ok(None);
        }
        if loaded.board.status != PublicationStatus::Live {
            debug!(%board_id, "snapshot withheld for draft board");
            return Ok(None);
        }

        Ok(Some(BoardSnapshot {
            board: loaded.board.view(),
            pieces: loaded.pieces,
            captured_at: now_ms(),
        }))
    }

    // =========================================================================
    // VIEW AUTHORIZATION (gateway join)
    // =========================================================================

    /// Authorize a caller to subscribe to a board's group. Absent boards and
    /// denied callers both fail with `AccessDenied`. Draft boards may be
    /// joined: the viewer simply receives nothing until the board goes Live.
    ///
    /// # Errors
    ///
    /// `AccessDenied`, or `Store`/`Access` on collaborator failure.
    pub async fn authorize_view(&self, board_id: Uuid, caller: Uuid) -> Result<(), LiveError> {
        let Some(board) = self.store.load(board_id).await? else {
            return Err(LiveError::AccessDenied);
        };
        if !self.access.can_access(board.workspace_id, caller).await? {
            return Err(LiveError::AccessDenied);
        }
        Ok(())
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    /// Load a board for broadcasting; `None` (with a log line) when the
    /// board is missing, not Live, or the store failed.
    async fn load_live(&self, board_id: Uuid, what: &'static str) -> Option<Board> {
        match self.store.load(board_id).await {
            Ok(Some(board)) if board.status == PublicationStatus::Live => Some(board),
            Ok(Some(_)) => {
                debug!(%board_id, what, "skipping broadcast for draft board");
                None
            }
            Ok(None) => {
                warn!(%board_id, what, "broadcast requested for missing board");
                None
            }
            Err(e) => {
                warn!(error = %e, %board_id, what, "board load failed during broadcast");
                None
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "live_test.rs"]
mod tests;
