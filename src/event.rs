//! Live board events — the closed set of messages fanned out to viewers.
//!
//! DESIGN
//! ======
//! Every broadcast is one of five variants, tagged with an `event` name on
//! the wire. Consumers match exhaustively; there is no string-keyed dispatch.
//! Events are transient: built at broadcast time, never stored. Timestamps
//! are milliseconds since Unix epoch.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::store::PublicationStatus;

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

/// One board-scoped broadcast. The `event` tag is the wire name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum BoardEvent {
    /// Board-level fields changed (name, grid, background).
    #[serde(rename = "board:updated")]
    BoardUpdated {
        board_id: Uuid,
        name: String,
        rows: i32,
        cols: i32,
        grid_color: String,
        grid_opacity: f64,
        background_url: Option<String>,
        ts: i64,
    },
    /// A piece instance moved to a new grid cell.
    #[serde(rename = "piece:moved")]
    PieceMoved { board_id: Uuid, piece_instance_id: Uuid, x: i32, y: i32, ts: i64 },
    /// A piece instance was placed on the board.
    #[serde(rename = "piece:added")]
    PieceAdded { board_id: Uuid, piece_instance_id: Uuid, piece_id: Uuid, x: i32, y: i32, ts: i64 },
    /// A piece instance was removed from the board.
    #[serde(rename = "piece:removed")]
    PieceRemoved { board_id: Uuid, piece_instance_id: Uuid, ts: i64 },
    /// The board's publication status changed. Broadcast on every
    /// transition, including into an unchanged status.
    #[serde(rename = "board:status")]
    StatusChanged { board_id: Uuid, status: PublicationStatus, ts: i64 },
}

impl BoardEvent {
    /// Wire name of this event, matching the serde tag.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BoardUpdated { .. } => "board:updated",
            Self::PieceMoved { .. } => "piece:moved",
            Self::PieceAdded { .. } => "piece:added",
            Self::PieceRemoved { .. } => "piece:removed",
            Self::StatusChanged { .. } => "board:status",
        }
    }

    /// The board this event is scoped to.
    #[must_use]
    pub fn board_id(&self) -> Uuid {
        match self {
            Self::BoardUpdated { board_id, .. }
            | Self::PieceMoved { board_id, .. }
            | Self::PieceAdded { board_id, .. }
            | Self::PieceRemoved { board_id, .. }
            | Self::StatusChanged { board_id, .. } => *board_id,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ms_is_positive() {
        assert!(now_ms() > 0);
    }

    #[test]
    fn kind_matches_wire_tag() {
        let event = BoardEvent::PieceMoved {
            board_id: Uuid::new_v4(),
            piece_instance_id: Uuid::new_v4(),
            x: 3,
            y: 4,
            ts: now_ms(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json.get("event").and_then(|v| v.as_str()), Some(event.kind()));
        assert_eq!(json.get("x").and_then(serde_json::Value::as_i64), Some(3));
        assert_eq!(json.get("y").and_then(serde_json::Value::as_i64), Some(4));
    }

    #[test]
    fn status_serializes_lowercase() {
        let event = BoardEvent::StatusChanged {
            board_id: Uuid::new_v4(),
            status: PublicationStatus::Live,
            ts: 1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json.get("event").and_then(|v| v.as_str()), Some("board:status"));
        assert_eq!(json.get("status").and_then(|v| v.as_str()), Some("live"));
    }

    #[test]
    fn json_round_trip() {
        let board_id = Uuid::new_v4();
        let original = BoardEvent::BoardUpdated {
            board_id,
            name: "War Room".into(),
            rows: 12,
            cols: 18,
            grid_color: "#222222".into(),
            grid_opacity: 0.4,
            background_url: Some("https://img.example/bg.png".into()),
            ts: now_ms(),
        };
        let json = serde_json::to_string(&original).expect("serialize");
        let restored: BoardEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored, original);
        assert_eq!(restored.board_id(), board_id);
    }
}
