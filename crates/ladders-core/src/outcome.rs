//! Results produced by the turn state machine.
//!
//! These are what the session layer inspects to decide what to announce:
//! the `(from, landed, final_position)` triple feeds the movement planner.

use crate::board::{CellKind, Position};
use crate::player::ParticipantId;
use serde::{Deserialize, Serialize};

/// The result of an accepted move request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub participant_id: ParticipantId,
    pub dice_value: u8,
    /// Position before the move
    pub from: Position,
    /// Cell the dice count reached (equal to `from` on overshoot)
    pub landed: Position,
    /// Position after resolving any transport
    pub final_position: Position,
    /// Kind of transport resolved on `landed`, if any
    pub transport: Option<CellKind>,
    /// The roll would have gone past the last cell, so the token stayed put
    pub overshoot: bool,
    /// The player rolled a six and keeps the turn
    pub extra_turn: bool,
    /// Set when this move won the game
    pub winner_id: Option<ParticipantId>,
    /// Who acts next (None once the game is finished)
    pub next_participant_id: Option<ParticipantId>,
}

impl MoveOutcome {
    /// Whether the token changed cells
    pub fn moved(&self) -> bool {
        self.from != self.final_position
    }

    pub fn is_winning(&self) -> bool {
        self.winner_id.is_some()
    }
}

/// The result of one countdown tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tick {
    /// No game in progress, nothing counted
    Idle,
    /// The active player still has time
    Counting { remaining: u32 },
    /// The active player ran out of time and was passed over
    TimedOut {
        skipped: ParticipantId,
        next: ParticipantId,
    },
}
