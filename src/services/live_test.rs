use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;

use super::*;
use crate::registry::CONNECTION_CHANNEL_CAPACITY;
use crate::state::test_helpers::{AllowList, MemoryBoardStore, sample_board};

struct Fixture {
    store: Arc<MemoryBoardStore>,
    access: Arc<AllowList>,
    registry: Arc<GroupRegistry>,
    service: LiveBoardService,
}

fn fixture() -> Fixture {
    fixture_with(AllowList::allow_all(), MoveThrottle::with_window(Duration::from_millis(100)))
}

fn fixture_with(access: AllowList, throttle: MoveThrottle) -> Fixture {
    let store = Arc::new(MemoryBoardStore::new());
    let access = Arc::new(access);
    let registry = Arc::new(GroupRegistry::new());
    let service = LiveBoardService::new(store.clone(), access.clone(), registry.clone(), throttle);
    Fixture { store, access, registry, service }
}

impl Fixture {
    fn seed(&self, status: PublicationStatus) -> Board {
        let board = sample_board(Uuid::new_v4(), status);
        self.store.seed_board(board.clone());
        board
    }

    /// Register a connection and join it to the board's group.
    fn viewer(&self, board_id: Uuid) -> mpsc::Receiver<BoardEvent> {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(CONNECTION_CHANNEL_CAPACITY);
        self.registry.register(conn_id, tx);
        assert!(self.registry.join(board_id, conn_id));
        rx
    }
}

fn assert_empty(rx: &mut mpsc::Receiver<BoardEvent>) {
    assert!(rx.try_recv().is_err(), "expected no delivery");
}

// =============================================================================
// DRAFT SUPPRESSION
// =============================================================================

#[tokio::test]
async fn draft_board_broadcasts_nothing() {
    let fx = fixture();
    let board = fx.seed(PublicationStatus::Draft);
    let piece = fx.store.seed_piece(board.id, Uuid::new_v4(), 1, 1);
    let mut rx = fx.viewer(board.id);

    fx.service.notify_board_updated(board.id).await;
    fx.service.notify_piece_moved(board.id, piece.id, 2, 2).await;
    fx.service.notify_piece_added(board.id, piece.id).await;
    fx.service.notify_piece_removed(board.id, piece.id).await;

    assert_empty(&mut rx);
}

#[tokio::test]
async fn draft_snapshot_is_absent_even_with_access() {
    let fx = fixture();
    let board = fx.seed(PublicationStatus::Draft);

    let snapshot = fx.service.snapshot(board.id, Uuid::new_v4()).await.unwrap();
    assert!(snapshot.is_none());
}

#[tokio::test]
async fn missing_board_notify_is_a_noop() {
    let fx = fixture();
    // Nothing seeded; nothing to assert beyond "does not panic or deliver".
    fx.service.notify_board_updated(Uuid::new_v4()).await;
    fx.service.notify_piece_moved(Uuid::new_v4(), Uuid::new_v4(), 0, 0).await;
}

// =============================================================================
// LIVE DELIVERY
// =============================================================================

#[tokio::test]
async fn live_board_update_delivers_current_fields() {
    let fx = fixture();
    let mut board = fx.seed(PublicationStatus::Live);
    board.name = "Skirmish at the Gate".into();
    board.rows = 20;
    board.cols = 30;
    board.background_url = Some("https://img.example/field.png".into());
    fx.store.seed_board(board.clone());
    let mut rx = fx.viewer(board.id);

    fx.service.notify_board_updated(board.id).await;

    match rx.try_recv().unwrap() {
        BoardEvent::BoardUpdated { board_id, name, rows, cols, grid_color, grid_opacity, background_url, ts } => {
            assert_eq!(board_id, board.id);
            assert_eq!(name, "Skirmish at the Gate");
            assert_eq!(rows, 20);
            assert_eq!(cols, 30);
            assert_eq!(grid_color, board.grid_color);
            assert!((grid_opacity - board.grid_opacity).abs() < f64::EPSILON);
            assert_eq!(background_url.as_deref(), Some("https://img.example/field.png"));
            assert!(ts > 0);
        }
        other => panic!("expected BoardUpdated, got {other:?}"),
    }
    assert_empty(&mut rx);
}

#[tokio::test]
async fn piece_added_delivers_definition_and_position() {
    let fx = fixture();
    let board = fx.seed(PublicationStatus::Live);
    let definition_id = Uuid::new_v4();
    let piece = fx.store.seed_piece(board.id, definition_id, 5, 7);
    let mut rx = fx.viewer(board.id);

    fx.service.notify_piece_added(board.id, piece.id).await;

    match rx.try_recv().unwrap() {
        BoardEvent::PieceAdded { board_id, piece_instance_id, piece_id, x, y, .. } => {
            assert_eq!(board_id, board.id);
            assert_eq!(piece_instance_id, piece.id);
            assert_eq!(piece_id, definition_id);
            assert_eq!((x, y), (5, 7));
        }
        other => panic!("expected PieceAdded, got {other:?}"),
    }
}

#[tokio::test]
async fn piece_added_for_vanished_instance_is_a_noop() {
    let fx = fixture();
    let board = fx.seed(PublicationStatus::Live);
    let mut rx = fx.viewer(board.id);

    fx.service.notify_piece_added(board.id, Uuid::new_v4()).await;
    assert_empty(&mut rx);
}

#[tokio::test]
async fn piece_removed_delivers_instance_id() {
    let fx = fixture();
    let board = fx.seed(PublicationStatus::Live);
    let gone = Uuid::new_v4();
    let mut rx = fx.viewer(board.id);

    fx.service.notify_piece_removed(board.id, gone).await;

    match rx.try_recv().unwrap() {
        BoardEvent::PieceRemoved { board_id, piece_instance_id, .. } => {
            assert_eq!(board_id, board.id);
            assert_eq!(piece_instance_id, gone);
        }
        other => panic!("expected PieceRemoved, got {other:?}"),
    }
}

#[tokio::test]
async fn full_viewer_channel_does_not_fail_the_broadcast() {
    let fx = fixture();
    let board = fx.seed(PublicationStatus::Live);

    // Stuck viewer: single-slot channel, already full.
    let stuck = Uuid::new_v4();
    let (stuck_tx, _stuck_rx) = mpsc::channel(1);
    stuck_tx
        .try_send(BoardEvent::PieceRemoved { board_id: board.id, piece_instance_id: Uuid::new_v4(), ts: 0 })
        .unwrap();
    fx.registry.register(stuck, stuck_tx);
    fx.registry.join(board.id, stuck);

    let mut healthy = fx.viewer(board.id);

    fx.service.notify_board_updated(board.id).await;
    assert!(matches!(healthy.try_recv().unwrap(), BoardEvent::BoardUpdated { .. }));
}

// =============================================================================
// MOVEMENT THROTTLING
// =============================================================================

#[tokio::test]
async fn rapid_moves_within_one_window_deliver_exactly_one_event() {
    let fx = fixture();
    let board = fx.seed(PublicationStatus::Live);
    let piece_id = Uuid::new_v4();
    let mut rx = fx.viewer(board.id);

    // Leading edge: the first call is admitted and broadcast immediately;
    // the two that follow inside the window are dropped, not queued.
    fx.service.notify_piece_moved(board.id, piece_id, 1, 1).await;
    fx.service.notify_piece_moved(board.id, piece_id, 2, 2).await;
    fx.service.notify_piece_moved(board.id, piece_id, 3, 3).await;

    match rx.try_recv().unwrap() {
        BoardEvent::PieceMoved { x, y, .. } => assert_eq!((x, y), (1, 1)),
        other => panic!("expected PieceMoved, got {other:?}"),
    }
    assert_empty(&mut rx);
}

#[tokio::test]
async fn move_after_window_elapses_delivers_again() {
    let fx = fixture_with(AllowList::allow_all(), MoveThrottle::with_window(Duration::from_millis(10)));
    let board = fx.seed(PublicationStatus::Live);
    let piece_id = Uuid::new_v4();
    let mut rx = fx.viewer(board.id);

    fx.service.notify_piece_moved(board.id, piece_id, 0, 0).await;
    sleep(Duration::from_millis(30)).await;
    fx.service.notify_piece_moved(board.id, piece_id, 4, 4).await;

    assert!(matches!(rx.try_recv().unwrap(), BoardEvent::PieceMoved { x: 0, y: 0, .. }));
    assert!(matches!(rx.try_recv().unwrap(), BoardEvent::PieceMoved { x: 4, y: 4, .. }));
}

#[tokio::test]
async fn boards_are_throttled_independently() {
    let fx = fixture();
    let board_a = fx.seed(PublicationStatus::Live);
    let board_b = fx.seed(PublicationStatus::Live);
    let mut rx_a = fx.viewer(board_a.id);
    let mut rx_b = fx.viewer(board_b.id);

    fx.service.notify_piece_moved(board_a.id, Uuid::new_v4(), 1, 0).await;
    // Board B's first move is admitted even though A just consumed its slot.
    fx.service.notify_piece_moved(board_b.id, Uuid::new_v4(), 2, 0).await;

    assert!(matches!(rx_a.try_recv().unwrap(), BoardEvent::PieceMoved { x: 1, .. }));
    assert!(matches!(rx_b.try_recv().unwrap(), BoardEvent::PieceMoved { x: 2, .. }));
}

#[tokio::test]
async fn draft_moves_do_not_consume_the_throttle_window() {
    let fx = fixture();
    let mut board = fx.seed(PublicationStatus::Draft);
    let piece_id = Uuid::new_v4();
    let mut rx = fx.viewer(board.id);

    // Rejected at the publication gate, before the throttle is consulted.
    fx.service.notify_piece_moved(board.id, piece_id, 1, 1).await;
    assert_empty(&mut rx);

    board.status = PublicationStatus::Live;
    fx.store.seed_board(board.clone());

    // The first Live move must still hit the leading edge.
    fx.service.notify_piece_moved(board.id, piece_id, 2, 2).await;
    assert!(matches!(rx.try_recv().unwrap(), BoardEvent::PieceMoved { x: 2, y: 2, .. }));
}

// =============================================================================
// PUBLICATION STATE MACHINE
// =============================================================================

#[tokio::test]
async fn set_status_persists_and_broadcasts() {
    let fx = fixture();
    let board = fx.seed(PublicationStatus::Draft);
    let mut rx = fx.viewer(board.id);

    fx.service
        .set_status(board.id, PublicationStatus::Live, Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(fx.store.board(board.id).unwrap().status, PublicationStatus::Live);
    match rx.try_recv().unwrap() {
        BoardEvent::StatusChanged { board_id, status, .. } => {
            assert_eq!(board_id, board.id);
            assert_eq!(status, PublicationStatus::Live);
        }
        other => panic!("expected StatusChanged, got {other:?}"),
    }
}

#[tokio::test]
async fn unchanged_status_transition_still_broadcasts() {
    let fx = fixture();
    let board = fx.seed(PublicationStatus::Live);
    let owner = Uuid::new_v4();
    let mut rx = fx.viewer(board.id);

    fx.service.set_status(board.id, PublicationStatus::Live, owner).await.unwrap();
    fx.service.set_status(board.id, PublicationStatus::Live, owner).await.unwrap();

    assert!(matches!(rx.try_recv().unwrap(), BoardEvent::StatusChanged { .. }));
    assert!(matches!(rx.try_recv().unwrap(), BoardEvent::StatusChanged { .. }));
    assert_empty(&mut rx);
}

#[tokio::test]
async fn transition_to_draft_is_broadcast_too() {
    let fx = fixture();
    let board = fx.seed(PublicationStatus::Live);
    let mut rx = fx.viewer(board.id);

    fx.service
        .set_status(board.id, PublicationStatus::Draft, Uuid::new_v4())
        .await
        .unwrap();

    assert!(matches!(
        rx.try_recv().unwrap(),
        BoardEvent::StatusChanged { status: PublicationStatus::Draft, .. }
    ));
}

#[tokio::test]
async fn set_status_rejects_non_editor() {
    let fx = fixture_with(AllowList::denying(), MoveThrottle::new());
    let board = fx.seed(PublicationStatus::Draft);
    let mut rx = fx.viewer(board.id);

    let result = fx
        .service
        .set_status(board.id, PublicationStatus::Live, Uuid::new_v4())
        .await;

    assert!(matches!(result, Err(LiveError::Unauthorized)));
    assert_eq!(fx.store.board(board.id).unwrap().status, PublicationStatus::Draft);
    assert_empty(&mut rx);
}

#[tokio::test]
async fn set_status_on_missing_board_is_not_found() {
    let fx = fixture();
    let result = fx
        .service
        .set_status(Uuid::new_v4(), PublicationStatus::Live, Uuid::new_v4())
        .await;
    assert!(matches!(result, Err(LiveError::NotFound(_))));
}

// =============================================================================
// SNAPSHOT
// =============================================================================

#[tokio::test]
async fn snapshot_of_live_board_carries_pieces_and_timestamp() {
    let fx = fixture();
    let board = fx.seed(PublicationStatus::Live);
    let piece = fx.store.seed_piece(board.id, Uuid::new_v4(), 3, 4);

    let snapshot = fx
        .service
        .snapshot(board.id, Uuid::new_v4())
        .await
        .unwrap()
        .expect("live board should snapshot");

    assert_eq!(snapshot.board.id, board.id);
    assert_eq!(snapshot.board.status, PublicationStatus::Live);
    assert_eq!(snapshot.pieces, vec![piece]);
    assert!(snapshot.captured_at > 0);
}

#[tokio::test]
async fn snapshot_denied_and_missing_are_indistinguishable() {
    let fx = fixture_with(AllowList::denying(), MoveThrottle::new());
    let board = fx.seed(PublicationStatus::Live);

    let denied = fx.service.snapshot(board.id, Uuid::new_v4()).await.unwrap();
    let missing = fx.service.snapshot(Uuid::new_v4(), Uuid::new_v4()).await.unwrap();

    assert!(denied.is_none());
    assert!(missing.is_none());
}

// =============================================================================
// VIEW AUTHORIZATION
// =============================================================================

#[tokio::test]
async fn authorize_view_requires_workspace_access() {
    let viewer = Uuid::new_v4();
    let fx = fixture_with(AllowList::denying(), MoveThrottle::new());
    let board = fx.seed(PublicationStatus::Live);

    assert!(matches!(
        fx.service.authorize_view(board.id, viewer).await,
        Err(LiveError::AccessDenied)
    ));

    fx.access.grant(board.workspace_id, viewer);
    fx.service.authorize_view(board.id, viewer).await.unwrap();
}

#[tokio::test]
async fn authorize_view_hides_missing_boards() {
    let fx = fixture();
    assert!(matches!(
        fx.service.authorize_view(Uuid::new_v4(), Uuid::new_v4()).await,
        Err(LiveError::AccessDenied)
    ));
}

#[tokio::test]
async fn draft_boards_may_be_joined() {
    let fx = fixture();
    let board = fx.seed(PublicationStatus::Draft);
    fx.service.authorize_view(board.id, Uuid::new_v4()).await.unwrap();
}

// =============================================================================
// END TO END
// =============================================================================

#[tokio::test]
async fn viewer_catchup_scenario() {
    let fx = fixture();
    let owner = Uuid::new_v4();
    let viewer_id = Uuid::new_v4();
    let board = fx.seed(PublicationStatus::Draft);
    let piece = fx.store.seed_piece(board.id, Uuid::new_v4(), 0, 0);

    // Viewer joins while the board is still Draft.
    fx.service.authorize_view(board.id, viewer_id).await.unwrap();
    let mut rx = fx.viewer(board.id);

    // Draft: snapshot absent.
    assert!(fx.service.snapshot(board.id, viewer_id).await.unwrap().is_none());

    // Owner publishes; the already-subscribed viewer hears about it.
    fx.service.set_status(board.id, PublicationStatus::Live, owner).await.unwrap();
    assert!(matches!(
        rx.try_recv().unwrap(),
        BoardEvent::StatusChanged { status: PublicationStatus::Live, .. }
    ));

    // Viewer fetches the baseline.
    let snapshot = fx.service.snapshot(board.id, viewer_id).await.unwrap().unwrap();
    assert_eq!(snapshot.pieces.len(), 1);

    // Owner moves a piece; the viewer sees the live event.
    fx.service.notify_piece_moved(board.id, piece.id, 3, 4).await;
    match rx.try_recv().unwrap() {
        BoardEvent::PieceMoved { piece_instance_id, x, y, .. } => {
            assert_eq!(piece_instance_id, piece.id);
            assert_eq!((x, y), (3, 4));
        }
        other => panic!("expected PieceMoved, got {other:?}"),
    }
}
