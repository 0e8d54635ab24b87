//! WebSocket protocol messages for Ladders multiplayer.

use ladders_core::{
    BoardDefinition, GameError, GamePhase, GameState, ParticipantId, Player, Position, Step,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    /// Create a new game room, optionally with a custom board
    CreateRoom {
        player_name: String,
        max_players: u8,
        #[serde(default)]
        board: Option<BoardDefinition>,
    },

    /// Join an existing room
    JoinRoom { room_id: Uuid, player_name: String },

    /// Leave current room
    LeaveRoom,

    /// Start the game (host only)
    StartGame,

    /// Roll the die and move (active player only)
    RollDice,

    /// Send chat message
    Chat { message: String },

    /// Request room list
    ListRooms,

    /// Ping for keepalive
    Ping,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// Welcome message with assigned player ID
    Welcome { player_id: Uuid },

    /// Room created successfully
    RoomCreated { room_id: Uuid },

    /// Joined room successfully
    JoinedRoom { room: RoomInfo },

    /// Left room successfully
    LeftRoom,

    /// Room state updated (player joined/left)
    RoomUpdated { room: RoomInfo },

    /// Game started, with the board layout to render
    GameStarted {
        state: StateDelta,
        board: BoardDefinition,
    },

    /// Authoritative game state
    StateDelta { state: StateDelta },

    /// One display step of a token's movement
    MovementStep {
        participant_id: ParticipantId,
        step: Step,
    },

    /// A move request was refused (sent only to the requester)
    MoveRejected { error: GameError, reason: String },

    /// Seconds left for the active player
    Countdown {
        participant_id: ParticipantId,
        remaining: u32,
    },

    /// The active player ran out of time
    TurnTimedOut { participant_id: ParticipantId },

    /// Fire-and-forget cue for the audio layer
    Sound { cue: SoundCue },

    /// Chat message received
    ChatMessage { player_name: String, message: String },

    /// List of available rooms
    RoomList { rooms: Vec<RoomInfo> },

    /// Error occurred
    Error { message: String },

    /// Pong response
    Pong,

    /// Game finished
    GameOver {
        winner_id: ParticipantId,
        winner_name: String,
    },

    /// The session was torn down
    SessionClosed { reason: String },
}

/// Sounds the presentation layer may play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoundCue {
    Ladder,
    Snake,
    TurnTimeout,
    Victory,
}

/// Authoritative state of one session as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDelta {
    pub session_id: Uuid,
    pub players: Vec<Player>,
    pub active_participant_id: Option<ParticipantId>,
    pub dice_value: Option<u8>,
    pub countdown: u32,
    pub phase: GamePhase,
    pub winner_id: Option<ParticipantId>,
}

impl StateDelta {
    pub fn from_game(session_id: Uuid, game: &GameState) -> Self {
        let state = game.state();
        Self {
            session_id,
            players: state.players.clone(),
            active_participant_id: state.active_participant_id,
            dice_value: state.dice_value,
            countdown: state.countdown,
            phase: state.phase,
            winner_id: state.winner_id,
        }
    }

    pub fn position_of(&self, participant_id: ParticipantId) -> Option<Position> {
        self.players
            .iter()
            .find(|p| p.participant_id == participant_id)
            .map(|p| p.position)
    }
}

/// Room information for clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomInfo {
    pub id: Uuid,
    pub name: String,
    pub players: Vec<PlayerInfo>,
    pub max_players: u8,
    pub host_id: Uuid,
    pub status: RoomStatus,
    pub board_size: Position,
}

/// Player information in a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: Uuid,
    pub name: String,
    pub connected: bool,
}

/// Room status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomStatus {
    Waiting,
    InGame,
    Finished,
}

impl From<GamePhase> for RoomStatus {
    fn from(phase: GamePhase) -> Self {
        match phase {
            GamePhase::Waiting => RoomStatus::Waiting,
            GamePhase::Playing => RoomStatus::InGame,
            GamePhase::Finished => RoomStatus::Finished,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_wire_format() {
        let msg: ClientMessage = serde_json::from_str(r#"{ "type": "RollDice" }"#).unwrap();
        assert!(matches!(msg, ClientMessage::RollDice));

        let msg: ClientMessage = serde_json::from_str(
            r#"{ "type": "CreateRoom", "payload": { "player_name": "Ann", "max_players": 3 } }"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::CreateRoom { max_players: 3, board: None, .. }
        ));
    }

    #[test]
    fn test_create_room_with_board() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{ "type": "CreateRoom", "payload": { "player_name": "Ann", "max_players": 2,
                 "board": { "size": 30, "transports": [ { "from": 4, "to": 20 } ] } } }"#,
        )
        .unwrap();
        match msg {
            ClientMessage::CreateRoom { board: Some(board), .. } => {
                assert_eq!(board.size, 30);
                assert_eq!(board.transports.len(), 1);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_move_rejected_carries_error_kind() {
        let msg = ServerMessage::MoveRejected {
            error: GameError::NotYourTurn,
            reason: GameError::NotYourTurn.to_string(),
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "MoveRejected");
        assert_eq!(json["payload"]["error"], "NotYourTurn");
        assert_eq!(json["payload"]["reason"], "Not your turn");

        let invalid = GameError::InvalidMove("dice value must be positive".to_string());
        let msg = ServerMessage::MoveRejected {
            reason: invalid.to_string(),
            error: invalid,
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json["payload"]["error"]["InvalidMove"],
            "dice value must be positive"
        );
    }

    #[test]
    fn test_movement_step_wire_format() {
        let id = Uuid::nil();
        let msg = ServerMessage::MovementStep {
            participant_id: id,
            step: Step::advance(7),
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "MovementStep");
        assert_eq!(json["payload"]["step"]["display_position"], 7);
        assert_eq!(json["payload"]["step"]["kind"], "Advance");
    }
}
