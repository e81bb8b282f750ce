use super::*;
use crate::event::now_ms;

fn move_event(board_id: Uuid) -> BoardEvent {
    BoardEvent::PieceMoved {
        board_id,
        piece_instance_id: Uuid::new_v4(),
        x: 1,
        y: 2,
        ts: now_ms(),
    }
}

fn connect(registry: &GroupRegistry) -> (Uuid, mpsc::Receiver<BoardEvent>) {
    let conn_id = Uuid::new_v4();
    let (tx, rx) = mpsc::channel(CONNECTION_CHANNEL_CAPACITY);
    registry.register(conn_id, tx);
    (conn_id, rx)
}

#[tokio::test]
async fn deliver_reaches_joined_connection() {
    let registry = GroupRegistry::new();
    let board_id = Uuid::new_v4();
    let (conn_id, mut rx) = connect(&registry);

    assert!(registry.join(board_id, conn_id));
    let event = move_event(board_id);
    assert_eq!(registry.deliver(board_id, &event), 1);
    assert_eq!(rx.recv().await.unwrap(), event);
}

#[tokio::test]
async fn deliver_to_empty_group_is_a_noop() {
    let registry = GroupRegistry::new();
    assert_eq!(registry.deliver(Uuid::new_v4(), &move_event(Uuid::new_v4())), 0);
}

#[tokio::test]
async fn join_requires_registered_connection() {
    let registry = GroupRegistry::new();
    let board_id = Uuid::new_v4();

    assert!(!registry.join(board_id, Uuid::new_v4()));
    assert_eq!(registry.group_len(board_id), 0);
}

#[tokio::test]
async fn leave_stops_delivery_and_is_idempotent() {
    let registry = GroupRegistry::new();
    let board_id = Uuid::new_v4();
    let (conn_id, mut rx) = connect(&registry);
    registry.join(board_id, conn_id);

    registry.leave(board_id, conn_id);
    registry.leave(board_id, conn_id);

    assert_eq!(registry.deliver(board_id, &move_event(board_id)), 0);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn leave_of_non_member_is_harmless() {
    let registry = GroupRegistry::new();
    let board_id = Uuid::new_v4();
    let (member, _rx) = connect(&registry);
    let (stranger, _rx2) = connect(&registry);
    registry.join(board_id, member);

    registry.leave(board_id, stranger);
    assert_eq!(registry.group_len(board_id), 1);
}

#[tokio::test]
async fn disconnect_removes_from_all_groups() {
    let registry = GroupRegistry::new();
    let board_a = Uuid::new_v4();
    let board_b = Uuid::new_v4();
    let (conn_id, mut rx) = connect(&registry);
    registry.join(board_a, conn_id);
    registry.join(board_b, conn_id);

    registry.disconnect(conn_id);

    assert_eq!(registry.deliver(board_a, &move_event(board_a)), 0);
    assert_eq!(registry.deliver(board_b, &move_event(board_b)), 0);
    assert!(rx.try_recv().is_err());
    assert_eq!(registry.group_len(board_a), 0);
    assert_eq!(registry.group_len(board_b), 0);
}

#[tokio::test]
async fn slow_connection_does_not_block_other_members() {
    let registry = GroupRegistry::new();
    let board_id = Uuid::new_v4();

    // A stuck viewer with a single-slot channel that is already full.
    let stuck = Uuid::new_v4();
    let (stuck_tx, _stuck_rx) = mpsc::channel(1);
    stuck_tx.try_send(move_event(board_id)).unwrap();
    registry.register(stuck, stuck_tx);
    registry.join(board_id, stuck);

    let (healthy, mut rx) = connect(&registry);
    registry.join(board_id, healthy);

    let event = move_event(board_id);
    // Only the healthy connection receives; the stuck one is skipped.
    assert_eq!(registry.deliver(board_id, &event), 1);
    assert_eq!(rx.recv().await.unwrap(), event);
}

#[tokio::test]
async fn delivery_skips_closed_channels() {
    let registry = GroupRegistry::new();
    let board_id = Uuid::new_v4();
    let (gone, rx_gone) = connect(&registry);
    registry.join(board_id, gone);
    drop(rx_gone);

    let (alive, mut rx) = connect(&registry);
    registry.join(board_id, alive);

    assert_eq!(registry.deliver(board_id, &move_event(board_id)), 1);
    assert!(rx.recv().await.is_some());
}

#[tokio::test]
async fn two_groups_fan_out_independently() {
    let registry = GroupRegistry::new();
    let board_a = Uuid::new_v4();
    let board_b = Uuid::new_v4();
    let (conn_a, mut rx_a) = connect(&registry);
    let (conn_b, mut rx_b) = connect(&registry);
    registry.join(board_a, conn_a);
    registry.join(board_b, conn_b);

    let event_a = move_event(board_a);
    registry.deliver(board_a, &event_a);

    assert_eq!(rx_a.recv().await.unwrap(), event_a);
    assert!(rx_b.try_recv().is_err());
}
