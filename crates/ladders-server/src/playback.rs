//! Paced, cancellable delivery of movement plans.
//!
//! Each plan is streamed to the room by its own task. Starting a new plan for
//! a participant cancels whatever is left of the previous one, so at most one
//! plan per participant is ever in flight. Every plan carries a generation
//! number; the completion notice echoes it so the session can ignore notices
//! from superseded plans.

use crate::broadcaster::{RoomBroadcaster, SessionId};
use crate::protocol::ServerMessage;
use ladders_core::{MovementPlan, Pacing, ParticipantId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Sent when a plan has delivered its last step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackFinished {
    pub participant_id: ParticipantId,
    pub generation: u64,
}

struct InFlight {
    generation: u64,
    cancel: CancellationToken,
}

/// Per-session movement sequencer
pub struct Playback {
    session_id: SessionId,
    broadcaster: Arc<RoomBroadcaster>,
    pacing: Pacing,
    in_flight: HashMap<ParticipantId, InFlight>,
    next_generation: u64,
    done_tx: mpsc::UnboundedSender<PlaybackFinished>,
}

impl Playback {
    pub fn new(
        session_id: SessionId,
        broadcaster: Arc<RoomBroadcaster>,
        pacing: Pacing,
        done_tx: mpsc::UnboundedSender<PlaybackFinished>,
    ) -> Self {
        Self {
            session_id,
            broadcaster,
            pacing,
            in_flight: HashMap::new(),
            next_generation: 0,
            done_tx,
        }
    }

    /// Start streaming `plan` for a participant, superseding any plan in flight.
    ///
    /// Returns the generation assigned to this plan.
    pub fn start(&mut self, participant_id: ParticipantId, plan: MovementPlan) -> u64 {
        self.cancel(participant_id);

        self.next_generation += 1;
        let generation = self.next_generation;
        let cancel = CancellationToken::new();
        self.in_flight.insert(
            participant_id,
            InFlight {
                generation,
                cancel: cancel.clone(),
            },
        );

        tokio::spawn(stream_plan(
            Arc::clone(&self.broadcaster),
            self.session_id,
            participant_id,
            plan,
            self.pacing,
            cancel,
            generation,
            self.done_tx.clone(),
        ));

        generation
    }

    /// Cancel the undelivered steps of a participant's plan
    pub fn cancel(&mut self, participant_id: ParticipantId) -> bool {
        match self.in_flight.remove(&participant_id) {
            Some(previous) => {
                previous.cancel.cancel();
                debug!(
                    session_id = %self.session_id,
                    participant_id = %participant_id,
                    generation = previous.generation,
                    "movement plan superseded"
                );
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, in_flight) in self.in_flight.drain() {
            in_flight.cancel.cancel();
        }
    }

    /// Record a completion. Returns false for notices from superseded plans.
    pub fn finish(&mut self, done: PlaybackFinished) -> bool {
        let current = self
            .in_flight
            .get(&done.participant_id)
            .is_some_and(|f| f.generation == done.generation);
        if current {
            self.in_flight.remove(&done.participant_id);
        }
        current
    }

    pub fn is_playing(&self, participant_id: ParticipantId) -> bool {
        self.in_flight.contains_key(&participant_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

#[allow(clippy::too_many_arguments)]
async fn stream_plan(
    broadcaster: Arc<RoomBroadcaster>,
    session_id: SessionId,
    participant_id: ParticipantId,
    plan: MovementPlan,
    pacing: Pacing,
    cancel: CancellationToken,
    generation: u64,
    done_tx: mpsc::UnboundedSender<PlaybackFinished>,
) {
    for step in plan.iter() {
        if cancel.is_cancelled() {
            return;
        }

        broadcaster.broadcast_room(
            session_id,
            ServerMessage::MovementStep {
                participant_id,
                step: *step,
            },
        );

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(pacing.delay_after(step, &plan)) => {}
        }
    }

    if !cancel.is_cancelled() {
        let _ = done_tx.send(PlaybackFinished {
            participant_id,
            generation,
        });
    }
}
