//! Room-scoped message fan-out.
//!
//! Two maps: each session's room (`participant -> channel`) and every
//! connected participant's personal channel. A room's member set is only
//! touched under its map entry, so a broadcast always clones a complete
//! snapshot of the room and never sees a half-applied join or leave.
//! Delivery is best-effort: a closed channel is logged and skipped.

use crate::protocol::ServerMessage;
use dashmap::DashMap;
use ladders_core::ParticipantId;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Outgoing message channel of one connection
pub type Channel = mpsc::UnboundedSender<ServerMessage>;

/// Session (room) identifier
pub type SessionId = Uuid;

/// A message could not be handed to a participant's connection
#[derive(Debug, Error)]
#[error("Delivery to {participant_id} failed: connection closed")]
pub struct DeliveryFailure {
    pub participant_id: ParticipantId,
}

/// Membership bookkeeping and fan-out primitives
#[derive(Default)]
pub struct RoomBroadcaster {
    rooms: DashMap<SessionId, HashMap<ParticipantId, Channel>>,
    channels: DashMap<ParticipantId, Channel>,
}

impl RoomBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a participant's personal channel
    pub fn connect(&self, participant_id: ParticipantId, channel: Channel) {
        self.channels.insert(participant_id, channel);
    }

    /// Forget a participant's personal channel
    pub fn disconnect(&self, participant_id: ParticipantId) {
        self.channels.remove(&participant_id);
    }

    /// Personal channel of a connected participant
    pub fn channel(&self, participant_id: ParticipantId) -> Option<Channel> {
        self.channels.get(&participant_id).map(|c| c.clone())
    }

    pub fn connected_count(&self) -> usize {
        self.channels.len()
    }

    /// Add a participant to a room, creating the room on first join
    pub fn join(&self, session_id: SessionId, participant_id: ParticipantId, channel: Channel) {
        self.channels.insert(participant_id, channel.clone());
        self.rooms
            .entry(session_id)
            .or_default()
            .insert(participant_id, channel);
        debug!(session_id = %session_id, participant_id = %participant_id, "joined room");
    }

    /// Remove a participant from a room, dropping the room after its last member.
    ///
    /// Returns whether the participant was a member.
    pub fn leave(&self, session_id: SessionId, participant_id: ParticipantId) -> bool {
        let removed = match self.rooms.get_mut(&session_id) {
            Some(mut room) => room.remove(&participant_id).is_some(),
            None => false,
        };
        self.rooms.remove_if(&session_id, |_, room| room.is_empty());

        if removed {
            debug!(session_id = %session_id, participant_id = %participant_id, "left room");
        }
        removed
    }

    /// Number of participants currently in a room
    pub fn room_size(&self, session_id: SessionId) -> usize {
        self.rooms.get(&session_id).map(|r| r.len()).unwrap_or(0)
    }

    pub fn room_exists(&self, session_id: SessionId) -> bool {
        self.rooms.contains_key(&session_id)
    }

    pub fn is_member(&self, session_id: SessionId, participant_id: ParticipantId) -> bool {
        self.rooms
            .get(&session_id)
            .is_some_and(|r| r.contains_key(&participant_id))
    }

    /// Current members of a room
    pub fn members(&self, session_id: SessionId) -> Vec<ParticipantId> {
        self.rooms
            .get(&session_id)
            .map(|r| r.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Send a message to one participant. Unknown participants are ignored.
    pub fn send(&self, participant_id: ParticipantId, msg: ServerMessage) -> bool {
        match self.channel(participant_id) {
            Some(channel) => deliver(participant_id, &channel, msg),
            None => false,
        }
    }

    /// Send a message to each of the given participants
    pub fn broadcast_many(&self, participants: &[ParticipantId], msg: ServerMessage) -> usize {
        participants
            .iter()
            .filter(|id| self.send(**id, msg.clone()))
            .count()
    }

    /// Broadcast a message to all participants in a room
    pub fn broadcast_room(&self, session_id: SessionId, msg: ServerMessage) -> usize {
        self.fan_out(session_id, None, msg)
    }

    /// Broadcast a message to all participants in a room except one
    pub fn broadcast_room_except(
        &self,
        session_id: SessionId,
        except: ParticipantId,
        msg: ServerMessage,
    ) -> usize {
        self.fan_out(session_id, Some(except), msg)
    }

    /// Broadcast a message to every connected participant
    pub fn broadcast_all(&self, msg: ServerMessage) -> usize {
        let recipients: Vec<(ParticipantId, Channel)> = self
            .channels
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        recipients
            .iter()
            .filter(|(id, channel)| deliver(*id, channel, msg.clone()))
            .count()
    }

    fn fan_out(
        &self,
        session_id: SessionId,
        except: Option<ParticipantId>,
        msg: ServerMessage,
    ) -> usize {
        // Snapshot under the room's lock, deliver after releasing it
        let recipients: Vec<(ParticipantId, Channel)> = match self.rooms.get(&session_id) {
            Some(room) => room
                .iter()
                .filter(|(id, _)| Some(**id) != except)
                .map(|(id, channel)| (*id, channel.clone()))
                .collect(),
            None => return 0,
        };

        recipients
            .iter()
            .filter(|(id, channel)| deliver(*id, channel, msg.clone()))
            .count()
    }
}

fn try_deliver(
    participant_id: ParticipantId,
    channel: &Channel,
    msg: ServerMessage,
) -> Result<(), DeliveryFailure> {
    channel
        .send(msg)
        .map_err(|_| DeliveryFailure { participant_id })
}

fn deliver(participant_id: ParticipantId, channel: &Channel, msg: ServerMessage) -> bool {
    match try_deliver(participant_id, channel, msg) {
        Ok(()) => true,
        Err(e) => {
            debug!("{}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn channel() -> (Channel, mpsc::UnboundedReceiver<ServerMessage>) {
        mpsc::unbounded_channel()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn test_join_and_leave_track_room_size() {
        let broadcaster = RoomBroadcaster::new();
        let room = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(!broadcaster.room_exists(room));
        broadcaster.join(room, a, channel().0);
        broadcaster.join(room, b, channel().0);
        assert_eq!(broadcaster.room_size(room), 2);
        assert!(broadcaster.is_member(room, a));

        assert!(broadcaster.leave(room, a));
        assert!(!broadcaster.leave(room, a));
        assert_eq!(broadcaster.room_size(room), 1);
        assert!(broadcaster.room_exists(room));

        broadcaster.leave(room, b);
        assert_eq!(broadcaster.room_size(room), 0);
        assert!(!broadcaster.room_exists(room));
    }

    #[test]
    fn test_send_to_unknown_participant_is_noop() {
        let broadcaster = RoomBroadcaster::new();
        assert!(!broadcaster.send(Uuid::new_v4(), ServerMessage::Pong));
    }

    #[test]
    fn test_broadcast_reaches_only_the_room() {
        let broadcaster = RoomBroadcaster::new();
        let (room1, room2) = (Uuid::new_v4(), Uuid::new_v4());
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let (tx_a, mut rx_a) = channel();
        let (tx_b, mut rx_b) = channel();
        let (tx_c, mut rx_c) = channel();

        broadcaster.join(room1, a, tx_a);
        broadcaster.join(room1, b, tx_b);
        broadcaster.join(room2, c, tx_c);

        assert_eq!(broadcaster.broadcast_room(room1, ServerMessage::Pong), 2);
        assert_eq!(drain(&mut rx_a).len(), 1);
        assert_eq!(drain(&mut rx_b).len(), 1);
        assert!(drain(&mut rx_c).is_empty());
    }

    #[test]
    fn test_broadcast_except_skips_sender() {
        let broadcaster = RoomBroadcaster::new();
        let room = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (tx_a, mut rx_a) = channel();
        let (tx_b, mut rx_b) = channel();
        broadcaster.join(room, a, tx_a);
        broadcaster.join(room, b, tx_b);

        assert_eq!(
            broadcaster.broadcast_room_except(room, a, ServerMessage::LeftRoom),
            1
        );
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b).len(), 1);
    }

    #[test]
    fn test_closed_channel_does_not_block_others() {
        let broadcaster = RoomBroadcaster::new();
        let room = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (tx_a, rx_a) = channel();
        let (tx_b, mut rx_b) = channel();
        broadcaster.join(room, a, tx_a);
        broadcaster.join(room, b, tx_b);
        drop(rx_a);

        assert_eq!(broadcaster.broadcast_room(room, ServerMessage::Pong), 1);
        assert_eq!(drain(&mut rx_b).len(), 1);
        assert!(!broadcaster.send(a, ServerMessage::Pong));
    }

    #[test]
    fn test_broadcast_many_and_all() {
        let broadcaster = RoomBroadcaster::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let (tx_a, mut rx_a) = channel();
        let (tx_b, mut rx_b) = channel();
        let (tx_c, mut rx_c) = channel();
        broadcaster.connect(a, tx_a);
        broadcaster.connect(b, tx_b);
        broadcaster.connect(c, tx_c);

        assert_eq!(broadcaster.broadcast_many(&[a, c], ServerMessage::Pong), 2);
        assert_eq!(drain(&mut rx_a).len(), 1);
        assert!(drain(&mut rx_b).is_empty());
        assert_eq!(drain(&mut rx_c).len(), 1);

        assert_eq!(broadcaster.broadcast_all(ServerMessage::Pong), 3);
        broadcaster.disconnect(b);
        assert_eq!(broadcaster.connected_count(), 2);
    }

    #[test]
    fn test_concurrent_joins_are_all_counted() {
        let broadcaster = Arc::new(RoomBroadcaster::new());
        let room = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let broadcaster = Arc::clone(&broadcaster);
                std::thread::spawn(move || {
                    let (tx, _rx) = channel();
                    broadcaster.join(room, Uuid::new_v4(), tx);
                    broadcaster.broadcast_room(room, ServerMessage::Pong);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(broadcaster.room_size(room), 8);
    }
}
