use std::collections::HashMap;

use crate::signaling::protocol::RoomId;
use crate::signaling::types::ClientId;

/// Result of [`Rooms::join`].
#[derive(Debug, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Other members of the joined room, in join order.
    pub others: Vec<ClientId>,
    /// Set when the client was already a member; nothing changed.
    pub already_member: bool,
    /// Room the client had to leave first, with its remaining members.
    pub left: Option<(RoomId, Vec<ClientId>)>,
}

/// In-memory room table: room id -> members, plus the reverse index.
///
/// A room exists while it has members. A client is in at most one room.
#[derive(Debug, Default)]
pub struct Rooms {
    members: HashMap<RoomId, Vec<ClientId>>,
    room_of: HashMap<ClientId, RoomId>,
}

impl Rooms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&mut self, client_id: ClientId, room_id: &str) -> JoinOutcome {
        if self.room_of.get(&client_id).map(String::as_str) == Some(room_id) {
            return JoinOutcome {
                others: self.others_in(room_id, client_id),
                already_member: true,
                left: None,
            };
        }

        let left = self.leave(client_id);
        let others = self.others_in(room_id, client_id);

        self.members
            .entry(room_id.to_owned())
            .or_default()
            .push(client_id);
        self.room_of.insert(client_id, room_id.to_owned());

        JoinOutcome {
            others,
            already_member: false,
            left,
        }
    }

    /// Remove the client from its room.
    ///
    /// Returns the room and its remaining members, or `None` if the client
    /// was not in a room. Empty rooms are dropped.
    pub fn leave(&mut self, client_id: ClientId) -> Option<(RoomId, Vec<ClientId>)> {
        let room_id = self.room_of.remove(&client_id)?;
        let remaining = match self.members.get_mut(&room_id) {
            Some(members) => {
                members.retain(|c| *c != client_id);
                members.clone()
            }
            None => Vec::new(),
        };
        if remaining.is_empty() {
            self.members.remove(&room_id);
        }
        Some((room_id, remaining))
    }

    pub fn room_of(&self, client_id: ClientId) -> Option<&str> {
        self.room_of.get(&client_id).map(String::as_str)
    }

    pub fn share_room(&self, a: ClientId, b: ClientId) -> bool {
        match (self.room_of.get(&a), self.room_of.get(&b)) {
            (Some(ra), Some(rb)) => ra == rb,
            _ => false,
        }
    }

    pub fn members(&self, room_id: &str) -> &[ClientId] {
        self.members
            .get(room_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn room_count(&self) -> usize {
        self.members.len()
    }

    fn others_in(&self, room_id: &str, client_id: ClientId) -> Vec<ClientId> {
        self.members(room_id)
            .iter()
            .copied()
            .filter(|c| *c != client_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_joiner_sees_nobody_and_second_sees_first() {
        let mut rooms = Rooms::new();
        let a = rooms.join(1, "R1");
        assert!(a.others.is_empty());
        assert!(!a.already_member);

        let b = rooms.join(2, "R1");
        assert_eq!(b.others, vec![1]);
        assert!(rooms.share_room(1, 2));
    }

    #[test]
    fn rejoining_the_same_room_is_a_no_op() {
        let mut rooms = Rooms::new();
        rooms.join(1, "R1");
        rooms.join(2, "R1");

        let again = rooms.join(2, "R1");
        assert!(again.already_member);
        assert_eq!(again.others, vec![1]);
        assert_eq!(rooms.members("R1"), &[1, 2]);
    }

    #[test]
    fn switching_rooms_leaves_the_old_one() {
        let mut rooms = Rooms::new();
        rooms.join(1, "R1");
        rooms.join(2, "R1");

        let out = rooms.join(2, "R2");
        assert_eq!(out.left, Some(("R1".to_string(), vec![1])));
        assert!(out.others.is_empty());
        assert!(!rooms.share_room(1, 2));
    }

    #[test]
    fn empty_rooms_are_dropped() {
        let mut rooms = Rooms::new();
        rooms.join(1, "R1");
        assert_eq!(rooms.room_count(), 1);

        assert_eq!(rooms.leave(1), Some(("R1".to_string(), vec![])));
        assert_eq!(rooms.room_count(), 0);
        assert_eq!(rooms.leave(1), None);
    }
}
