//! WebSocket server and connection handling.

use crate::broadcaster::{RoomBroadcaster, SessionId};
use crate::config::ServerConfig;
use crate::protocol::{ClientMessage, RoomInfo, RoomStatus, ServerMessage};
use crate::session::{spawn_session, SessionCommand, SessionHandle};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use ladders_core::{Board, ParticipantId};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Server state shared across all connections.
pub struct ServerState {
    pub config: ServerConfig,
    /// Room membership and outgoing channels
    pub broadcaster: Arc<RoomBroadcaster>,
    /// All running sessions
    pub sessions: DashMap<SessionId, SessionHandle>,
    /// Mapping from player ID to their session ID
    pub player_sessions: DashMap<ParticipantId, SessionId>,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            broadcaster: Arc::new(RoomBroadcaster::new()),
            sessions: DashMap::new(),
            player_sessions: DashMap::new(),
        }
    }

    /// Send a message to a specific player.
    pub fn send_to_player(&self, player_id: Uuid, msg: ServerMessage) {
        self.broadcaster.send(player_id, msg);
    }

    fn send_error(&self, player_id: Uuid, message: impl Into<String>) {
        self.send_to_player(
            player_id,
            ServerMessage::Error {
                message: message.into(),
            },
        );
    }

    /// The session a player is currently in
    pub fn session_of(&self, player_id: Uuid) -> Option<SessionHandle> {
        let session_id = *self.player_sessions.get(&player_id)?;
        self.sessions.get(&session_id).map(|s| s.clone())
    }

    /// Get list of waiting rooms.
    pub fn get_waiting_rooms(&self) -> Vec<RoomInfo> {
        self.sessions
            .iter()
            .map(|s| s.info())
            .filter(|r| r.status == RoomStatus::Waiting)
            .collect()
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

/// Run the WebSocket server.
pub async fn run_server(state: Arc<ServerState>) -> anyhow::Result<()> {
    let addr = state.config.addr;
    let listener = TcpListener::bind(addr).await?;
    info!("Ladders server listening on {}", addr);

    while let Ok((stream, peer_addr)) = listener.accept().await {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, state).await {
                error!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }

    Ok(())
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<ServerState>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    info!(
        "New WebSocket connection from {} ({} connected)",
        addr,
        state.broadcaster.connected_count()
    );

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Assign a player ID
    let player_id = Uuid::new_v4();

    // Create channel for outgoing messages
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    state.broadcaster.connect(player_id, tx);

    // Send welcome message
    let welcome = ServerMessage::Welcome { player_id };
    let msg_text = serde_json::to_string(&welcome)?;
    ws_sender.send(Message::Text(msg_text.into())).await?;

    // Spawn task to forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(text) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    // Handle incoming messages
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => handle_message(player_id, client_msg, &state),
                Err(e) => {
                    warn!("Invalid message from {}: {}", player_id, e);
                    state.send_error(player_id, "Malformed message");
                }
            },
            Ok(Message::Close(_)) => {
                info!("Client {} closing connection", player_id);
                break;
            }
            Ok(Message::Ping(_)) => {
                state.send_to_player(player_id, ServerMessage::Pong);
            }
            Err(e) => {
                error!("WebSocket error from {}: {}", player_id, e);
                break;
            }
            _ => {}
        }
    }

    // Clean up on disconnect
    handle_disconnect(player_id, &state);
    state.broadcaster.disconnect(player_id);
    send_task.abort();

    info!("Connection closed for {}", player_id);
    Ok(())
}

/// Handle a client message.
fn handle_message(player_id: Uuid, msg: ClientMessage, state: &Arc<ServerState>) {
    match msg {
        ClientMessage::CreateRoom {
            player_name,
            max_players,
            board,
        } => {
            let board = match board {
                Some(definition) => match Board::from_definition(&definition) {
                    Ok(board) => Arc::new(board),
                    Err(e) => {
                        state.send_error(player_id, format!("Invalid board: {}", e));
                        return;
                    }
                },
                None => Arc::clone(&state.config.default_board),
            };

            match state.player_sessions.entry(player_id) {
                Entry::Occupied(_) => state.send_error(player_id, "Already in a room"),
                Entry::Vacant(slot) => {
                    let handle = spawn_session(state, player_id, player_name, max_players, board);
                    slot.insert(handle.session_id);

                    state.send_to_player(
                        player_id,
                        ServerMessage::RoomCreated {
                            room_id: handle.session_id,
                        },
                    );
                    state.send_to_player(
                        player_id,
                        ServerMessage::JoinedRoom {
                            room: handle.info(),
                        },
                    );
                }
            }
        }

        ClientMessage::JoinRoom {
            room_id,
            player_name,
        } => {
            let Some(handle) = state.sessions.get(&room_id).map(|s| s.clone()) else {
                state.send_error(player_id, "Room not found");
                return;
            };

            match state.player_sessions.entry(player_id) {
                Entry::Occupied(_) => state.send_error(player_id, "Already in a room"),
                Entry::Vacant(slot) => {
                    slot.insert(room_id);
                    let queued = handle.send(SessionCommand::Join {
                        participant_id: player_id,
                        name: player_name,
                    });
                    if !queued {
                        state
                            .player_sessions
                            .remove_if(&player_id, |_, s| *s == room_id);
                        state.send_error(player_id, "Room not found");
                    }
                }
            }
        }

        ClientMessage::LeaveRoom => {
            forward(player_id, state, |participant_id| SessionCommand::Leave {
                participant_id,
            });
        }

        ClientMessage::StartGame => {
            forward(player_id, state, |participant_id| SessionCommand::Start {
                participant_id,
            });
        }

        ClientMessage::RollDice => {
            forward(player_id, state, |participant_id| SessionCommand::Roll {
                participant_id,
            });
        }

        ClientMessage::Chat { message } => {
            forward(player_id, state, |participant_id| SessionCommand::Chat {
                participant_id,
                message,
            });
        }

        ClientMessage::ListRooms => {
            let rooms = state.get_waiting_rooms();
            state.send_to_player(player_id, ServerMessage::RoomList { rooms });
        }

        ClientMessage::Ping => {
            state.send_to_player(player_id, ServerMessage::Pong);
        }
    }
}

/// Route a request to the player's session
fn forward(
    player_id: Uuid,
    state: &ServerState,
    command: impl FnOnce(ParticipantId) -> SessionCommand,
) {
    match state.session_of(player_id) {
        Some(handle) if handle.send(command(player_id)) => {}
        _ => {
            // Stale entry for a session that already shut down
            state.player_sessions.remove(&player_id);
            state.send_error(player_id, "Not in a room");
        }
    }
}

/// Handle player disconnect.
fn handle_disconnect(player_id: Uuid, state: &Arc<ServerState>) {
    match state.session_of(player_id) {
        Some(handle) => {
            handle.send(SessionCommand::Disconnect {
                participant_id: player_id,
            });
        }
        None => {
            state.player_sessions.remove(&player_id);
        }
    }
}
