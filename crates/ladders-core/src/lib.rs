//! Ladders - a multiplayer snakes-and-ladders game engine
//!
//! This crate provides the core game logic for Ladders, including:
//! - Board model with ladders and snakes, validated at load time
//! - Player state
//! - Turn state machine with turn order, countdown and win detection
//! - Movement planning for step-by-step token animation
//!
//! # Architecture
//!
//! The engine is pure logic with no I/O. The server crate owns one
//! `GameState` per session and drives it from a single task.
//!
//! # Modules
//!
//! - [`board`]: Cells, transports and board definitions
//! - [`player`]: Player state and colors
//! - [`game`]: Turn state machine
//! - [`movement`]: Display step planning and pacing
//! - [`outcome`]: Results of moves and ticks

pub mod board;
pub mod game;
pub mod movement;
pub mod outcome;
pub mod player;

// Re-export commonly used types
pub use board::{
    Board, BoardDefinition, BoardError, Cell, CellKind, Position, TransportDefinition,
    START_POSITION,
};
pub use game::{roll_dice, GameError, GamePhase, GameState, TurnState, TURN_SECONDS};
pub use movement::{plan, MovementPlan, Pacing, Step, StepKind};
pub use outcome::{MoveOutcome, Tick};
pub use player::{ParticipantId, Player, PlayerColor, PlayerStatus, Seat};
