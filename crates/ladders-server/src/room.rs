//! Game room management.

use ladders_core::{
    Board, GameError, GamePhase, GameState, MoveOutcome, ParticipantId, Player, PlayerStatus,
    Seat, Tick,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::protocol::{PlayerInfo, RoomInfo, RoomStatus, StateDelta};

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Room is full")]
    RoomFull,

    #[error("Player not in room")]
    PlayerNotInRoom,

    #[error("Already in this room")]
    AlreadyInRoom,

    #[error("Not the host")]
    NotHost,

    #[error("Game already started")]
    GameAlreadyStarted,

    #[error("Not enough players")]
    NotEnoughPlayers,

    #[error(transparent)]
    Game(#[from] GameError),
}

/// What happened when a player left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// Seat freed before the game started
    Removed,
    /// Seat kept for the running game; `next` is set if the turn moved on
    Disconnected { next: Option<ParticipantId> },
    /// Nobody is left to play
    RosterEmpty,
}

/// A player in a game room.
#[derive(Debug, Clone)]
pub struct RoomPlayer {
    pub id: Uuid,
    pub name: String,
    pub connected: bool,
}

impl RoomPlayer {
    pub fn new(id: Uuid, name: String) -> Self {
        Self {
            id,
            name,
            connected: true,
        }
    }

    pub fn to_info(&self) -> PlayerInfo {
        PlayerInfo {
            id: self.id,
            name: self.name.clone(),
            connected: self.connected,
        }
    }
}

/// A game room that can hold 2-4 players.
pub struct GameRoom {
    pub id: Uuid,
    pub name: String,
    pub max_players: u8,
    pub host_id: Uuid,
    pub players: HashMap<Uuid, RoomPlayer>,
    /// Order of players for turn taking
    pub player_order: Vec<Uuid>,
    game: GameState,
}

impl GameRoom {
    pub fn new(
        id: Uuid,
        host_id: Uuid,
        host_name: String,
        max_players: u8,
        board: Arc<Board>,
        turn_seconds: u32,
    ) -> Self {
        let mut players = HashMap::new();
        players.insert(host_id, RoomPlayer::new(host_id, host_name.clone()));

        Self {
            id,
            name: format!("{}'s Game", host_name),
            max_players: max_players.clamp(2, 4),
            host_id,
            players,
            player_order: vec![host_id],
            game: GameState::with_turn_seconds(board, turn_seconds),
        }
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    pub fn board(&self) -> &Arc<Board> {
        self.game.board()
    }

    pub fn status(&self) -> RoomStatus {
        self.game.phase().into()
    }

    pub fn is_playing(&self) -> bool {
        self.game.phase() == GamePhase::Playing
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn connected_count(&self) -> usize {
        self.players.values().filter(|p| p.connected).count()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players as usize
    }

    pub fn player_name(&self, player_id: Uuid) -> Option<&str> {
        self.players.get(&player_id).map(|p| p.name.as_str())
    }

    pub fn add_player(&mut self, player_id: Uuid, name: String) -> Result<(), RoomError> {
        if self.status() != RoomStatus::Waiting {
            return Err(RoomError::GameAlreadyStarted);
        }
        if self.players.contains_key(&player_id) {
            return Err(RoomError::AlreadyInRoom);
        }
        if self.is_full() {
            return Err(RoomError::RoomFull);
        }

        self.players.insert(player_id, RoomPlayer::new(player_id, name));
        self.player_order.push(player_id);
        Ok(())
    }

    /// Remove a player before the game, or mark them disconnected during it
    pub fn remove_player(&mut self, player_id: Uuid) -> Result<Departure, RoomError> {
        if !self.players.contains_key(&player_id) {
            return Err(RoomError::PlayerNotInRoom);
        }

        if self.status() == RoomStatus::Waiting {
            self.players.remove(&player_id);
            self.player_order.retain(|&id| id != player_id);

            // If host left, assign new host
            if player_id == self.host_id && !self.player_order.is_empty() {
                self.host_id = self.player_order[0];
            }
            return Ok(Departure::Removed);
        }

        if let Some(player) = self.players.get_mut(&player_id) {
            player.connected = false;
        }

        if self.status() == RoomStatus::Finished {
            return Ok(Departure::Disconnected { next: None });
        }

        match self
            .game
            .set_player_status(player_id, PlayerStatus::Disconnected)
        {
            Ok(next) => Ok(Departure::Disconnected { next }),
            Err(GameError::EmptyRoster) => Ok(Departure::RosterEmpty),
            Err(e) => Err(e.into()),
        }
    }

    pub fn start_game(&mut self, requester_id: Uuid) -> Result<ParticipantId, RoomError> {
        if requester_id != self.host_id {
            return Err(RoomError::NotHost);
        }
        if self.status() != RoomStatus::Waiting {
            return Err(RoomError::GameAlreadyStarted);
        }
        if self.players.len() < 2 {
            return Err(RoomError::NotEnoughPlayers);
        }

        // Seat players in join order
        let roster: Vec<Player> = self
            .player_order
            .iter()
            .enumerate()
            .filter_map(|(seat, id)| {
                self.players
                    .get(id)
                    .map(|p| Player::new(*id, p.name.clone(), seat as Seat))
            })
            .collect();

        Ok(self.game.start(roster)?)
    }

    /// Move errors stay typed so the requester can be told which rule failed
    pub fn apply_move(
        &mut self,
        player_id: Uuid,
        dice_value: u8,
    ) -> Result<MoveOutcome, GameError> {
        if !self.players.contains_key(&player_id) {
            return Err(GameError::UnknownParticipant);
        }
        self.game.apply_move(player_id, dice_value)
    }

    pub fn tick(&mut self) -> Result<Tick, RoomError> {
        Ok(self.game.tick()?)
    }

    pub fn state_delta(&self) -> StateDelta {
        StateDelta::from_game(self.id, &self.game)
    }

    pub fn get_winner(&self) -> Option<(Uuid, String)> {
        let winner_id = self.game.winner()?;
        let winner_name = self.players.get(&winner_id)?.name.clone();
        Some((winner_id, winner_name))
    }

    pub fn to_info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id,
            name: self.name.clone(),
            players: self
                .player_order
                .iter()
                .filter_map(|id| self.players.get(id).map(|p| p.to_info()))
                .collect(),
            max_players: self.max_players,
            host_id: self.host_id,
            status: self.status(),
            board_size: self.board().size(),
        }
    }
}
