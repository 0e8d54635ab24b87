//! Core turn state machine.
//!
//! `GameState` owns the canonical `TurnState` of one session: roster, whose
//! turn it is, the last dice value, the countdown and the winner. It performs
//! no I/O; the session layer drives it with moves and one-second ticks.

use crate::board::{Board, Position};
use crate::outcome::{MoveOutcome, Tick};
use crate::player::{ParticipantId, Player, PlayerStatus};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Seconds a player has to act before the turn passes
pub const TURN_SECONDS: u32 = 30;

/// Faces on the die
pub const DICE_SIDES: u8 = 6;

/// Rolling this value grants another turn
pub const EXTRA_TURN_ROLL: u8 = 6;

/// Fewest players needed to start
pub const MIN_PLAYERS: usize = 2;

/// Most players in one session
pub const MAX_PLAYERS: usize = 4;

/// Game phase. Transitions only go forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    /// Roster forming
    Waiting,
    /// Turns advancing
    Playing,
    /// Terminal
    Finished,
}

/// Errors that can occur when driving the state machine
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum GameError {
    #[error("Need 2-4 distinct active players, got {count}")]
    InvalidRoster { count: usize },

    #[error("Not your turn")]
    NotYourTurn,

    #[error("Invalid move: {0}")]
    InvalidMove(String),

    #[error("No active players remain")]
    EmptyRoster,

    #[error("Game has not started")]
    NotStarted,

    #[error("Game already started")]
    AlreadyStarted,

    #[error("Game is over")]
    GameOver,

    #[error("Unknown participant")]
    UnknownParticipant,
}

/// Observable per-session state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnState {
    /// Players in seat order
    pub players: Vec<Player>,
    pub active_participant_id: Option<ParticipantId>,
    /// Last dice value of the current turn
    pub dice_value: Option<u8>,
    /// Seconds left for the active player
    pub countdown: u32,
    pub phase: GamePhase,
    pub winner_id: Option<ParticipantId>,
}

impl TurnState {
    fn new() -> Self {
        Self {
            players: Vec::new(),
            active_participant_id: None,
            dice_value: None,
            countdown: TURN_SECONDS,
            phase: GamePhase::Waiting,
            winner_id: None,
        }
    }
}

/// Roll one die
pub fn roll_dice<R: Rng>(rng: &mut R) -> u8 {
    rng.gen_range(1..=DICE_SIDES)
}

/// The authoritative game of one session
#[derive(Debug, Clone)]
pub struct GameState {
    board: Arc<Board>,
    state: TurnState,
    turn_seconds: u32,
}

impl GameState {
    /// Create a game waiting for its roster
    pub fn new(board: Arc<Board>) -> Self {
        Self::with_turn_seconds(board, TURN_SECONDS)
    }

    /// Create a game with a custom turn length
    pub fn with_turn_seconds(board: Arc<Board>, turn_seconds: u32) -> Self {
        assert!(turn_seconds > 0, "Turn length must be positive");
        let mut state = TurnState::new();
        state.countdown = turn_seconds;
        Self {
            board,
            state,
            turn_seconds,
        }
    }

    pub fn board(&self) -> &Arc<Board> {
        &self.board
    }

    /// Snapshot of the observable state
    pub fn state(&self) -> &TurnState {
        &self.state
    }

    pub fn phase(&self) -> GamePhase {
        self.state.phase
    }

    pub fn active_participant(&self) -> Option<ParticipantId> {
        self.state.active_participant_id
    }

    pub fn countdown(&self) -> u32 {
        self.state.countdown
    }

    pub fn players(&self) -> &[Player] {
        &self.state.players
    }

    pub fn player(&self, id: ParticipantId) -> Option<&Player> {
        self.state.players.iter().find(|p| p.participant_id == id)
    }

    fn player_mut(&mut self, id: ParticipantId) -> Option<&mut Player> {
        self.state.players.iter_mut().find(|p| p.participant_id == id)
    }

    pub fn winner(&self) -> Option<ParticipantId> {
        self.state.winner_id
    }

    /// Check if the game is finished
    pub fn is_finished(&self) -> bool {
        self.state.phase == GamePhase::Finished
    }

    /// Begin play with the given roster
    pub fn start(&mut self, mut players: Vec<Player>) -> Result<ParticipantId, GameError> {
        if self.state.phase != GamePhase::Waiting {
            return Err(GameError::AlreadyStarted);
        }

        let active = players.iter().filter(|p| p.is_active()).count();
        let distinct: HashSet<ParticipantId> = players.iter().map(|p| p.participant_id).collect();
        if active < MIN_PLAYERS || players.len() > MAX_PLAYERS || distinct.len() != players.len() {
            return Err(GameError::InvalidRoster { count: active });
        }

        players.sort_by_key(|p| p.order);
        let first = players
            .iter()
            .find(|p| p.is_active())
            .map(|p| p.participant_id)
            .ok_or(GameError::InvalidRoster { count: 0 })?;

        self.state.players = players;
        self.state.active_participant_id = Some(first);
        self.state.dice_value = None;
        self.state.countdown = self.turn_seconds;
        self.state.phase = GamePhase::Playing;

        self.check_invariants();
        Ok(first)
    }

    /// Pass the turn to the next active player in seat order
    pub fn advance_turn(&mut self) -> Result<ParticipantId, GameError> {
        match self.state.phase {
            GamePhase::Waiting => return Err(GameError::NotStarted),
            GamePhase::Finished => return Err(GameError::GameOver),
            GamePhase::Playing => {}
        }

        let count = self.state.players.len();
        let current = self
            .state
            .active_participant_id
            .and_then(|id| self.state.players.iter().position(|p| p.participant_id == id));
        // Without a current seat, search from the first seat
        let start = current.unwrap_or(count - 1);

        let next = (1..=count)
            .map(|offset| &self.state.players[(start + offset) % count])
            .find(|p| p.is_active())
            .map(|p| p.participant_id);

        let Some(next) = next else {
            // Nobody left to play; the session has to be torn down
            self.state.phase = GamePhase::Finished;
            self.state.active_participant_id = None;
            self.state.dice_value = None;
            return Err(GameError::EmptyRoster);
        };

        self.state.active_participant_id = Some(next);
        self.state.dice_value = None;
        self.state.countdown = self.turn_seconds;

        self.check_invariants();
        Ok(next)
    }

    /// Move the active player's token by `dice_value` cells
    pub fn apply_move(
        &mut self,
        participant_id: ParticipantId,
        dice_value: u8,
    ) -> Result<MoveOutcome, GameError> {
        match self.state.phase {
            GamePhase::Waiting => return Err(GameError::NotStarted),
            GamePhase::Finished => return Err(GameError::GameOver),
            GamePhase::Playing => {}
        }

        let from = self
            .player(participant_id)
            .map(|p| p.position)
            .ok_or(GameError::UnknownParticipant)?;

        if self.state.active_participant_id != Some(participant_id) {
            return Err(GameError::NotYourTurn);
        }

        // The server rolls 1..=6; the machine itself accepts any positive count
        if dice_value == 0 {
            return Err(GameError::InvalidMove("dice value must be positive".to_string()));
        }

        let size = self.board.size();
        let tentative = from + Position::from(dice_value);
        let overshoot = tentative > size;

        let (landed, final_position, transport) = if overshoot {
            (from, from, None)
        } else {
            match self.board.transport_at(tentative) {
                Some(destination) => (
                    tentative,
                    destination,
                    self.board.cell(tentative).map(|c| c.kind),
                ),
                None => (tentative, tentative, None),
            }
        };

        self.state.dice_value = Some(dice_value);
        if let Some(player) = self.player_mut(participant_id) {
            player.position = final_position;
        }

        let mut outcome = MoveOutcome {
            participant_id,
            dice_value,
            from,
            landed,
            final_position,
            transport,
            overshoot,
            extra_turn: false,
            winner_id: None,
            next_participant_id: None,
        };

        if self.board.is_goal(final_position) {
            self.finish(participant_id);
            outcome.winner_id = Some(participant_id);
        } else if dice_value == EXTRA_TURN_ROLL {
            self.state.countdown = self.turn_seconds;
            outcome.extra_turn = true;
            outcome.next_participant_id = Some(participant_id);
        } else {
            outcome.next_participant_id = Some(self.advance_turn()?);
        }

        self.check_invariants();
        Ok(outcome)
    }

    /// Count down one second; at zero the active player is passed over
    pub fn tick(&mut self) -> Result<Tick, GameError> {
        if self.state.phase != GamePhase::Playing {
            return Ok(Tick::Idle);
        }

        self.state.countdown = self.state.countdown.saturating_sub(1);
        if self.state.countdown > 0 {
            return Ok(Tick::Counting {
                remaining: self.state.countdown,
            });
        }

        let Some(skipped) = self.state.active_participant_id else {
            return Ok(Tick::Idle);
        };
        let next = self.advance_turn()?;
        Ok(Tick::TimedOut { skipped, next })
    }

    /// Mark a seated player as connected or disconnected.
    ///
    /// Returns the new active player when the change moved the turn.
    pub fn set_player_status(
        &mut self,
        participant_id: ParticipantId,
        status: PlayerStatus,
    ) -> Result<Option<ParticipantId>, GameError> {
        let player = self
            .player_mut(participant_id)
            .ok_or(GameError::UnknownParticipant)?;
        player.status = status;

        let was_active = self.state.active_participant_id == Some(participant_id);
        if self.state.phase == GamePhase::Playing
            && status == PlayerStatus::Disconnected
            && was_active
        {
            return self.advance_turn().map(Some);
        }

        Ok(None)
    }

    fn finish(&mut self, winner: ParticipantId) {
        assert!(
            self.state.winner_id.is_none(),
            "winner may only be decided once"
        );
        self.state.phase = GamePhase::Finished;
        self.state.winner_id = Some(winner);
    }

    fn check_invariants(&self) {
        if self.state.phase == GamePhase::Playing {
            let active = self
                .state
                .active_participant_id
                .and_then(|id| self.player(id));
            assert!(
                active.is_some_and(|p| p.is_active()),
                "active participant must be a connected player while playing"
            );
            assert!(
                self.state.winner_id.is_none(),
                "a game with a winner cannot still be playing"
            );
        }
        if self.state.winner_id.is_some() {
            assert_eq!(self.state.phase, GamePhase::Finished);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{BoardDefinition, TransportDefinition};
    use uuid::Uuid;

    fn roster(n: usize) -> Vec<Player> {
        (0..n)
            .map(|i| Player::new(Uuid::new_v4(), format!("Player {}", i + 1), i as u8))
            .collect()
    }

    fn started(n: usize) -> (GameState, Vec<ParticipantId>) {
        let players = roster(n);
        let ids = players.iter().map(|p| p.participant_id).collect();
        let mut game = GameState::new(Arc::new(Board::standard()));
        game.start(players).unwrap();
        (game, ids)
    }

    fn place(game: &mut GameState, id: ParticipantId, position: Position) {
        game.player_mut(id).unwrap().position = position;
    }

    #[test]
    fn test_new_game_is_waiting() {
        let game = GameState::new(Arc::new(Board::standard()));
        assert_eq!(game.phase(), GamePhase::Waiting);
        assert!(game.active_participant().is_none());
        assert_eq!(game.countdown(), TURN_SECONDS);
    }

    #[test]
    fn test_start_requires_two_players() {
        let mut game = GameState::new(Arc::new(Board::standard()));
        assert_eq!(
            game.start(roster(1)),
            Err(GameError::InvalidRoster { count: 1 })
        );
        assert_eq!(game.phase(), GamePhase::Waiting);
    }

    #[test]
    fn test_start_rejects_five_players() {
        let mut game = GameState::new(Arc::new(Board::standard()));
        assert!(matches!(
            game.start(roster(5)),
            Err(GameError::InvalidRoster { .. })
        ));
    }

    #[test]
    fn test_start_counts_only_active_players() {
        let mut players = roster(2);
        players[1].status = PlayerStatus::Disconnected;
        let mut game = GameState::new(Arc::new(Board::standard()));
        assert_eq!(game.start(players), Err(GameError::InvalidRoster { count: 1 }));
    }

    #[test]
    fn test_start_sets_first_seat_active() {
        let mut players = roster(3);
        players.reverse();
        let first = players[2].participant_id;

        let mut game = GameState::new(Arc::new(Board::standard()));
        assert_eq!(game.start(players), Ok(first));
        assert_eq!(game.phase(), GamePhase::Playing);
        assert_eq!(game.active_participant(), Some(first));
        assert_eq!(game.countdown(), TURN_SECONDS);
        assert_eq!(game.players()[0].order, 0);
    }

    #[test]
    fn test_start_twice_fails() {
        let (mut game, _) = started(2);
        assert_eq!(game.start(roster(2)), Err(GameError::AlreadyStarted));
    }

    #[test]
    fn test_advance_turn_wraps() {
        let (mut game, ids) = started(3);
        assert_eq!(game.advance_turn(), Ok(ids[1]));
        assert_eq!(game.advance_turn(), Ok(ids[2]));
        assert_eq!(game.advance_turn(), Ok(ids[0]));
    }

    #[test]
    fn test_advance_turn_skips_disconnected() {
        let (mut game, ids) = started(3);
        game.set_player_status(ids[1], PlayerStatus::Disconnected)
            .unwrap();
        assert_eq!(game.advance_turn(), Ok(ids[2]));
        assert_eq!(game.advance_turn(), Ok(ids[0]));
    }

    #[test]
    fn test_advance_turn_resets_countdown_and_dice() {
        let (mut game, ids) = started(2);
        game.tick().unwrap();
        game.tick().unwrap();
        assert_eq!(game.countdown(), TURN_SECONDS - 2);

        game.apply_move(ids[0], 6).unwrap();
        assert_eq!(game.state().dice_value, Some(6));

        game.advance_turn().unwrap();
        assert_eq!(game.countdown(), TURN_SECONDS);
        assert_eq!(game.state().dice_value, None);
    }

    #[test]
    fn test_advance_turn_before_start() {
        let mut game = GameState::new(Arc::new(Board::standard()));
        assert_eq!(game.advance_turn(), Err(GameError::NotStarted));
    }

    #[test]
    fn test_move_out_of_turn_rejected() {
        let (mut game, ids) = started(2);
        let before = game.state().clone();
        assert_eq!(game.apply_move(ids[1], 3), Err(GameError::NotYourTurn));
        assert_eq!(game.state(), &before);
    }

    #[test]
    fn test_move_from_stranger_rejected() {
        let (mut game, _) = started(2);
        assert_eq!(
            game.apply_move(Uuid::new_v4(), 3),
            Err(GameError::UnknownParticipant)
        );
    }

    #[test]
    fn test_invalid_dice_rejected() {
        let (mut game, ids) = started(2);
        assert!(matches!(
            game.apply_move(ids[0], 0),
            Err(GameError::InvalidMove(_))
        ));
        assert_eq!(game.active_participant(), Some(ids[0]));
        assert_eq!(game.state().dice_value, None);
    }

    #[test]
    fn test_plain_move_advances_turn() {
        let (mut game, ids) = started(2);
        let outcome = game.apply_move(ids[0], 4).unwrap();

        assert_eq!(outcome.from, 0);
        assert_eq!(outcome.landed, 4);
        assert_eq!(outcome.final_position, 4);
        assert!(!outcome.extra_turn);
        assert_eq!(outcome.next_participant_id, Some(ids[1]));
        assert_eq!(game.player(ids[0]).unwrap().position, 4);
        assert_eq!(game.active_participant(), Some(ids[1]));
    }

    #[test]
    fn test_six_grants_extra_turn() {
        let (mut game, ids) = started(2);
        game.tick().unwrap();
        let outcome = game.apply_move(ids[0], 6).unwrap();

        assert!(outcome.extra_turn);
        assert_eq!(outcome.next_participant_id, Some(ids[0]));
        assert_eq!(game.active_participant(), Some(ids[0]));
        assert_eq!(game.countdown(), TURN_SECONDS);
    }

    #[test]
    fn test_ladder_is_resolved_once() {
        let (mut game, ids) = started(2);
        place(&mut game, ids[0], 10);

        let outcome = game.apply_move(ids[0], 4).unwrap();
        assert_eq!(outcome.from, 10);
        assert_eq!(outcome.landed, 14);
        assert_eq!(outcome.final_position, 30);
        assert_eq!(outcome.transport, Some(crate::board::CellKind::TransportUp));
    }

    #[test]
    fn test_snake_moves_back() {
        let (mut game, ids) = started(2);
        place(&mut game, ids[0], 15);
        let outcome = game.apply_move(ids[0], 2).unwrap();
        assert_eq!(outcome.landed, 17);
        assert_eq!(outcome.final_position, 7);
        assert_eq!(
            outcome.transport,
            Some(crate::board::CellKind::TransportDown)
        );
    }

    #[test]
    fn test_overshoot_keeps_position_and_consumes_turn() {
        let (mut game, ids) = started(2);
        place(&mut game, ids[0], 98);

        let outcome = game.apply_move(ids[0], 5).unwrap();
        assert!(outcome.overshoot);
        assert!(!outcome.moved());
        assert_eq!(outcome.landed, 98);
        assert_eq!(game.player(ids[0]).unwrap().position, 98);
        assert_eq!(game.active_participant(), Some(ids[1]));
    }

    #[test]
    fn test_overshoot_with_six_keeps_turn() {
        let (mut game, ids) = started(2);
        place(&mut game, ids[0], 96);

        let outcome = game.apply_move(ids[0], 6).unwrap();
        assert!(outcome.overshoot);
        assert!(outcome.extra_turn);
        assert_eq!(game.player(ids[0]).unwrap().position, 96);
        assert_eq!(game.active_participant(), Some(ids[0]));
    }

    #[test]
    fn test_exact_landing_wins() {
        let (mut game, ids) = started(2);
        place(&mut game, ids[0], 98);

        let outcome = game.apply_move(ids[0], 2).unwrap();
        assert_eq!(outcome.winner_id, Some(ids[0]));
        assert_eq!(outcome.next_participant_id, None);
        assert!(game.is_finished());
        assert_eq!(game.winner(), Some(ids[0]));
        assert_eq!(game.advance_turn(), Err(GameError::GameOver));
        assert_eq!(game.apply_move(ids[1], 1), Err(GameError::GameOver));
    }

    #[test]
    fn test_ladder_onto_goal_wins() {
        let board = Board::from_definition(&BoardDefinition {
            size: 20,
            transports: vec![TransportDefinition { from: 15, to: 20 }],
        })
        .unwrap();
        let players = roster(2);
        let a = players[0].participant_id;
        let mut game = GameState::new(Arc::new(board));
        game.start(players).unwrap();
        place(&mut game, a, 12);

        let outcome = game.apply_move(a, 3).unwrap();
        assert_eq!(outcome.final_position, 20);
        assert_eq!(game.winner(), Some(a));
    }

    #[test]
    fn test_six_on_winning_move_does_not_grant_extra_turn() {
        let (mut game, ids) = started(2);
        place(&mut game, ids[0], 94);
        let outcome = game.apply_move(ids[0], 6).unwrap();
        assert!(!outcome.extra_turn);
        assert!(outcome.is_winning());
    }

    #[test]
    fn test_tick_times_out_active_player() {
        let board = Arc::new(Board::standard());
        let players = roster(2);
        let ids: Vec<_> = players.iter().map(|p| p.participant_id).collect();
        let mut game = GameState::with_turn_seconds(board, 3);
        game.start(players).unwrap();

        assert_eq!(game.tick(), Ok(Tick::Counting { remaining: 2 }));
        assert_eq!(game.tick(), Ok(Tick::Counting { remaining: 1 }));
        assert_eq!(
            game.tick(),
            Ok(Tick::TimedOut {
                skipped: ids[0],
                next: ids[1]
            })
        );
        assert_eq!(game.countdown(), 3);
        assert_eq!(game.state().dice_value, None);
    }

    #[test]
    fn test_tick_idle_when_not_playing() {
        let mut game = GameState::new(Arc::new(Board::standard()));
        assert_eq!(game.tick(), Ok(Tick::Idle));
        assert_eq!(game.countdown(), TURN_SECONDS);
    }

    #[test]
    fn test_disconnect_of_active_player_passes_turn() {
        let (mut game, ids) = started(3);
        assert_eq!(
            game.set_player_status(ids[0], PlayerStatus::Disconnected),
            Ok(Some(ids[1]))
        );
        assert_eq!(game.active_participant(), Some(ids[1]));

        assert_eq!(
            game.set_player_status(ids[2], PlayerStatus::Disconnected),
            Ok(None)
        );
        assert_eq!(game.advance_turn(), Ok(ids[1]));
    }

    #[test]
    fn test_everyone_disconnecting_empties_roster() {
        let (mut game, ids) = started(2);
        game.set_player_status(ids[1], PlayerStatus::Disconnected)
            .unwrap();
        assert_eq!(
            game.set_player_status(ids[0], PlayerStatus::Disconnected),
            Err(GameError::EmptyRoster)
        );
        assert!(game.is_finished());
        assert_eq!(game.winner(), None);
    }

    #[test]
    fn test_reconnect_rejoins_rotation() {
        let (mut game, ids) = started(3);
        game.set_player_status(ids[1], PlayerStatus::Disconnected)
            .unwrap();
        game.set_player_status(ids[1], PlayerStatus::Active).unwrap();
        assert_eq!(game.advance_turn(), Ok(ids[1]));
    }

    #[test]
    fn test_roll_dice_in_range() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let value = roll_dice(&mut rng);
            assert!((1..=DICE_SIDES).contains(&value));
        }
    }
}
