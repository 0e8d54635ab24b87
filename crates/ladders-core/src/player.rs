//! Player state.
//!
//! A player's `position` is written only by the turn state machine in
//! [`crate::game`]; everything else reads it.

use crate::board::{Position, START_POSITION};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a connected participant
pub type ParticipantId = Uuid;

/// Seat index (0-3)
pub type Seat = u8;

/// Player color for UI rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerColor {
    Red,
    Blue,
    Green,
    Yellow,
}

impl PlayerColor {
    /// Get color for a seat
    pub fn for_seat(seat: Seat) -> Self {
        match seat % 4 {
            0 => PlayerColor::Red,
            1 => PlayerColor::Blue,
            2 => PlayerColor::Green,
            _ => PlayerColor::Yellow,
        }
    }

    /// Get hex color code for rendering
    pub fn hex_code(&self) -> u32 {
        match self {
            PlayerColor::Red => 0xE74C3C,
            PlayerColor::Blue => 0x3498DB,
            PlayerColor::Green => 0x2ECC71,
            PlayerColor::Yellow => 0xF1C40F,
        }
    }
}

/// Connection status of a seated player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerStatus {
    Active,
    Disconnected,
}

/// A seated player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub participant_id: ParticipantId,
    /// Display name supplied by the roster
    pub name: String,
    /// Seat order, turns go in ascending order
    pub order: Seat,
    pub color: PlayerColor,
    /// 0 = not started, otherwise 1..=N
    pub position: Position,
    pub status: PlayerStatus,
}

impl Player {
    /// Create a new player at the start position
    pub fn new(participant_id: ParticipantId, name: String, order: Seat) -> Self {
        Self {
            participant_id,
            name,
            order,
            color: PlayerColor::for_seat(order),
            position: START_POSITION,
            status: PlayerStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PlayerStatus::Active
    }

    /// Whether the token has entered the board
    pub fn has_started(&self) -> bool {
        self.position != START_POSITION
    }
}
