//! Per-session orchestration.
//!
//! Every room is driven by one task that owns its `GameRoom`. Client
//! requests, countdown ticks and playback completions are all handled
//! inside that task's loop, so nothing mutates a session's game state
//! concurrently. Sessions never share state with each other except through
//! the broadcaster and the registry maps in [`ServerState`].

use crate::broadcaster::SessionId;
use crate::playback::{Playback, PlaybackFinished};
use crate::protocol::{RoomInfo, ServerMessage, SoundCue};
use crate::room::{Departure, GameRoom, RoomError};
use crate::server::ServerState;
use ladders_core::{
    plan, roll_dice, Board, CellKind, GameError, MoveOutcome, ParticipantId, Tick,
};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Requests handled by a session task, in arrival order
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Join {
        participant_id: ParticipantId,
        name: String,
    },
    /// Explicit leave; the participant stays connected
    Leave { participant_id: ParticipantId },
    /// The participant's connection is gone
    Disconnect { participant_id: ParticipantId },
    Start { participant_id: ParticipantId },
    /// Server-side die roll for the requester
    Roll { participant_id: ParticipantId },
    /// Move by a count decided outside the session. Clients always go through
    /// `Roll`; this is the entry point for tests and scripted games that need
    /// a known dice value.
    Move {
        participant_id: ParticipantId,
        dice_value: u8,
    },
    Chat {
        participant_id: ParticipantId,
        message: String,
    },
}

impl SessionCommand {
    pub fn participant_id(&self) -> ParticipantId {
        match self {
            SessionCommand::Join { participant_id, .. }
            | SessionCommand::Leave { participant_id }
            | SessionCommand::Disconnect { participant_id }
            | SessionCommand::Start { participant_id }
            | SessionCommand::Roll { participant_id }
            | SessionCommand::Move { participant_id, .. }
            | SessionCommand::Chat { participant_id, .. } => *participant_id,
        }
    }
}

/// Cheap handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    pub session_id: SessionId,
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    info: watch::Receiver<RoomInfo>,
}

impl SessionHandle {
    /// Queue a command. Returns false once the session has shut down.
    pub fn send(&self, cmd: SessionCommand) -> bool {
        self.cmd_tx.send(cmd).is_ok()
    }

    /// Latest published room summary
    pub fn info(&self) -> RoomInfo {
        self.info.borrow().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }
}

/// Create a room hosted by `host_id` and spawn the task that drives it.
///
/// The host is added to the room's broadcast group and the session is
/// registered in `state.sessions`. Recording the host in
/// `state.player_sessions` is left to the caller.
pub fn spawn_session(
    state: &Arc<ServerState>,
    host_id: ParticipantId,
    host_name: String,
    max_players: u8,
    board: Arc<Board>,
) -> SessionHandle {
    let session_id = Uuid::new_v4();
    let config = state.config.session;
    let room = GameRoom::new(
        session_id,
        host_id,
        host_name,
        max_players,
        board,
        config.turn_seconds,
    );

    if let Some(channel) = state.broadcaster.channel(host_id) {
        state.broadcaster.join(session_id, host_id, channel);
    }

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (done_tx, done_rx) = mpsc::unbounded_channel();
    let (info_tx, info_rx) = watch::channel(room.to_info());

    let handle = SessionHandle {
        session_id,
        cmd_tx,
        info: info_rx,
    };
    state.sessions.insert(session_id, handle.clone());

    let session = Session {
        id: session_id,
        playback: Playback::new(
            session_id,
            Arc::clone(&state.broadcaster),
            config.pacing,
            done_tx,
        ),
        state: Arc::clone(state),
        room,
        info_tx,
        restart_clock: false,
    };

    info!(session_id = %session_id, host_id = %host_id, "session created");
    tokio::spawn(session.run(cmd_rx, done_rx));

    handle
}

struct Session {
    id: SessionId,
    state: Arc<ServerState>,
    room: GameRoom,
    playback: Playback,
    info_tx: watch::Sender<RoomInfo>,
    /// Set when a new turn began and the countdown must restart a full second out
    restart_clock: bool,
}

impl Session {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
        mut finished: mpsc::UnboundedReceiver<PlaybackFinished>,
    ) {
        let mut ticker = time::interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            let playing = self.room.is_playing();
            let flow = tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => ControlFlow::Break("Server shutting down".to_string()),
                },
                Some(done) = finished.recv() => self.on_playback_finished(done),
                _ = ticker.tick(), if playing => self.on_tick(),
            };

            if let ControlFlow::Break(reason) = flow {
                break reason;
            }
            if std::mem::take(&mut self.restart_clock) {
                ticker.reset();
            }
        };

        self.close(&reason, commands);
    }

    fn handle_command(&mut self, cmd: SessionCommand) -> ControlFlow<String> {
        match cmd {
            SessionCommand::Join {
                participant_id,
                name,
            } => self.join(participant_id, name),
            SessionCommand::Leave { participant_id } => self.depart(participant_id, true),
            SessionCommand::Disconnect { participant_id } => self.depart(participant_id, false),
            SessionCommand::Start { participant_id } => self.start(participant_id),
            SessionCommand::Roll { participant_id } => {
                let dice_value = roll_dice(&mut rand::thread_rng());
                self.apply_move(participant_id, dice_value)
            }
            SessionCommand::Move {
                participant_id,
                dice_value,
            } => self.apply_move(participant_id, dice_value),
            SessionCommand::Chat {
                participant_id,
                message,
            } => {
                let player_name = self
                    .room
                    .player_name(participant_id)
                    .unwrap_or("Unknown")
                    .to_string();
                self.state.broadcaster.broadcast_room(
                    self.id,
                    ServerMessage::ChatMessage {
                        player_name,
                        message,
                    },
                );
                ControlFlow::Continue(())
            }
        }
    }

    fn join(&mut self, participant_id: ParticipantId, name: String) -> ControlFlow<String> {
        if let Err(e) = self.room.add_player(participant_id, name) {
            self.send_error(participant_id, &e);
            self.forget(participant_id);
            return ControlFlow::Continue(());
        }

        let broadcaster = &self.state.broadcaster;
        if let Some(channel) = broadcaster.channel(participant_id) {
            broadcaster.join(self.id, participant_id, channel);
        }

        let room = self.room.to_info();
        broadcaster.send(participant_id, ServerMessage::JoinedRoom { room: room.clone() });
        broadcaster.broadcast_room_except(
            self.id,
            participant_id,
            ServerMessage::RoomUpdated { room },
        );
        self.publish();

        info!(session_id = %self.id, participant_id = %participant_id, "player joined");
        ControlFlow::Continue(())
    }

    fn depart(&mut self, participant_id: ParticipantId, explicit: bool) -> ControlFlow<String> {
        let departure = match self.room.remove_player(participant_id) {
            Ok(departure) => departure,
            Err(e) => {
                debug!(session_id = %self.id, participant_id = %participant_id, "depart ignored: {}", e);
                return ControlFlow::Continue(());
            }
        };

        self.state.broadcaster.leave(self.id, participant_id);
        self.forget(participant_id);
        if explicit {
            self.state
                .broadcaster
                .send(participant_id, ServerMessage::LeftRoom);
        }
        info!(
            session_id = %self.id,
            participant_id = %participant_id,
            ?departure,
            "player left"
        );

        if departure == Departure::RosterEmpty {
            return ControlFlow::Break("All players have left".to_string());
        }
        if self.room.player_count() == 0 || self.room.connected_count() == 0 {
            return ControlFlow::Break("Room is empty".to_string());
        }

        if let Departure::Disconnected { next } = departure {
            if next.is_some() {
                self.restart_clock = true;
            }
            self.broadcast_state();
        }

        self.state.broadcaster.broadcast_room(
            self.id,
            ServerMessage::RoomUpdated {
                room: self.room.to_info(),
            },
        );
        self.publish();
        ControlFlow::Continue(())
    }

    fn start(&mut self, requester: ParticipantId) -> ControlFlow<String> {
        match self.room.start_game(requester) {
            Ok(first) => {
                info!(session_id = %self.id, first_player = %first, "game started");
                self.state.broadcaster.broadcast_room(
                    self.id,
                    ServerMessage::GameStarted {
                        state: self.room.state_delta(),
                        board: self.room.board().to_definition(),
                    },
                );
                self.restart_clock = true;
                self.publish();
            }
            Err(e) => self.send_error(requester, &e),
        }
        ControlFlow::Continue(())
    }

    fn apply_move(&mut self, participant_id: ParticipantId, dice_value: u8) -> ControlFlow<String> {
        let outcome = match self.room.apply_move(participant_id, dice_value) {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!(session_id = %self.id, participant_id = %participant_id, "move rejected: {}", e);
                self.state.broadcaster.send(
                    participant_id,
                    ServerMessage::MoveRejected {
                        reason: e.to_string(),
                        error: e,
                    },
                );
                return ControlFlow::Continue(());
            }
        };

        debug!(
            session_id = %self.id,
            participant_id = %participant_id,
            dice_value,
            from = outcome.from,
            to = outcome.final_position,
            "move applied"
        );

        // Authoritative state first, the animation follows
        self.broadcast_state();
        if let Some(cue) = transport_cue(&outcome) {
            self.broadcast_sound(cue);
        }

        let movement = plan(outcome.from, outcome.landed, self.room.board());
        self.playback.start(participant_id, movement);

        if outcome.is_winning() {
            self.announce_winner();
        }
        self.restart_clock = true;
        ControlFlow::Continue(())
    }

    fn announce_winner(&mut self) {
        let Some((winner_id, winner_name)) = self.room.get_winner() else {
            return;
        };
        info!(session_id = %self.id, winner_id = %winner_id, "game won by {}", winner_name);

        self.state.broadcaster.broadcast_room(
            self.id,
            ServerMessage::GameOver {
                winner_id,
                winner_name,
            },
        );
        self.broadcast_sound(SoundCue::Victory);
        self.publish();
    }

    fn on_playback_finished(&mut self, done: PlaybackFinished) -> ControlFlow<String> {
        if self.playback.finish(done) {
            // Reconcile anything the client drifted on during the animation
            self.broadcast_state();
        }
        ControlFlow::Continue(())
    }

    fn on_tick(&mut self) -> ControlFlow<String> {
        match self.room.tick() {
            Ok(Tick::Idle) => {}
            Ok(Tick::Counting { remaining }) => {
                if let Some(participant_id) = self.room.game().active_participant() {
                    self.state.broadcaster.broadcast_room(
                        self.id,
                        ServerMessage::Countdown {
                            participant_id,
                            remaining,
                        },
                    );
                }
            }
            Ok(Tick::TimedOut { skipped, next }) => {
                info!(session_id = %self.id, skipped = %skipped, next = %next, "turn timed out");
                self.state.broadcaster.broadcast_room(
                    self.id,
                    ServerMessage::TurnTimedOut {
                        participant_id: skipped,
                    },
                );
                self.broadcast_sound(SoundCue::TurnTimeout);
                self.broadcast_state();
            }
            Err(RoomError::Game(GameError::EmptyRoster)) => {
                return ControlFlow::Break("All players have left".to_string());
            }
            Err(e) => warn!(session_id = %self.id, "tick failed: {}", e),
        }
        ControlFlow::Continue(())
    }

    fn close(mut self, reason: &str, mut commands: mpsc::UnboundedReceiver<SessionCommand>) {
        info!(
            session_id = %self.id,
            reason,
            in_flight = self.playback.in_flight_count(),
            "closing session"
        );

        // Refuse new work, then release anyone whose join was still queued
        commands.close();
        while let Ok(cmd) = commands.try_recv() {
            self.forget(cmd.participant_id());
        }

        self.playback.cancel_all();

        let broadcaster = &self.state.broadcaster;
        broadcaster.broadcast_room(
            self.id,
            ServerMessage::SessionClosed {
                reason: reason.to_string(),
            },
        );
        for member in broadcaster.members(self.id) {
            broadcaster.leave(self.id, member);
        }
        for participant_id in &self.room.player_order {
            self.forget(*participant_id);
        }

        self.state.sessions.remove(&self.id);
    }

    /// Drop a participant's registry entry if it still points here
    fn forget(&self, participant_id: ParticipantId) {
        self.state
            .player_sessions
            .remove_if(&participant_id, |_, session_id| *session_id == self.id);
    }

    fn publish(&self) {
        self.info_tx.send_replace(self.room.to_info());
    }

    fn broadcast_state(&self) {
        self.state.broadcaster.broadcast_room(
            self.id,
            ServerMessage::StateDelta {
                state: self.room.state_delta(),
            },
        );
    }

    fn broadcast_sound(&self, cue: SoundCue) {
        self.state
            .broadcaster
            .broadcast_room(self.id, ServerMessage::Sound { cue });
    }

    fn send_error(&self, participant_id: ParticipantId, error: &RoomError) {
        self.state.broadcaster.send(
            participant_id,
            ServerMessage::Error {
                message: error.to_string(),
            },
        );
    }
}

fn transport_cue(outcome: &MoveOutcome) -> Option<SoundCue> {
    match outcome.transport? {
        CellKind::TransportUp => Some(SoundCue::Ladder),
        CellKind::TransportDown => Some(SoundCue::Snake),
        CellKind::Normal => None,
    }
}
