//! Room registry.
//!
//! Maps room identifiers to the sessions bound to them. Owned by a single
//! relay task, so it needs no interior locking.

use std::collections::HashMap;

use cliplink_core::{RoomId, UserId};

use crate::messages::PeerInfo;

/// Relay-assigned identifier of one WebSocket connection.
pub type SessionId = u64;

/// A session bound to a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub session: SessionId,
    pub user_id: UserId,
    pub os: String,
}

impl Member {
    pub fn info(&self) -> PeerInfo {
        PeerInfo {
            user_id: self.user_id.clone(),
            os: self.os.clone(),
        }
    }
}

/// In-memory map of rooms to members.
///
/// Invariants: every session belongs to at most one room, and no room is
/// ever empty (it is removed with its last member).
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Vec<Member>>,
    sessions: HashMap<SessionId, RoomId>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a member to `room`.
    ///
    /// The session must not currently be in a room; call [`leave`](Self::leave)
    /// first. Returns the other members in join order.
    pub fn join(&mut self, room: RoomId, member: Member) -> Vec<PeerInfo> {
        let session = member.session;
        let members = self.rooms.entry(room.clone()).or_default();
        let others = members.iter().map(Member::info).collect();
        members.push(member);
        self.sessions.insert(session, room);
        others
    }

    /// Unbind a session. Returns its former room and membership record.
    pub fn leave(&mut self, session: SessionId) -> Option<(RoomId, Member)> {
        let room = self.sessions.remove(&session)?;
        let members = self.rooms.get_mut(&room)?;
        let position = members.iter().position(|m| m.session == session)?;
        let member = members.remove(position);
        if members.is_empty() {
            self.rooms.remove(&room);
        }
        Some((room, member))
    }

    /// The room a session is bound to.
    pub fn room_of(&self, session: SessionId) -> Option<&RoomId> {
        self.sessions.get(&session)
    }

    /// The membership record of a session.
    pub fn member(&self, session: SessionId) -> Option<&Member> {
        let room = self.sessions.get(&session)?;
        self.rooms
            .get(room)?
            .iter()
            .find(|m| m.session == session)
    }

    /// Members of `room` other than `except`.
    pub fn others(&self, room: &RoomId, except: SessionId) -> impl Iterator<Item = &Member> {
        self.rooms
            .get(room)
            .into_iter()
            .flatten()
            .filter(move |m| m.session != except)
    }

    /// Sessions in `room` whose user id is `user`.
    pub fn sessions_for(&self, room: &RoomId, user: &UserId) -> Vec<SessionId> {
        self.rooms
            .get(room)
            .into_iter()
            .flatten()
            .filter(|m| &m.user_id == user)
            .map(|m| m.session)
            .collect()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of members in `room` (0 if it does not exist).
    pub fn member_count(&self, room: &RoomId) -> usize {
        self.rooms.get(room).map_or(0, Vec::len)
    }

    pub fn contains_room(&self, room: &RoomId) -> bool {
        self.rooms.contains_key(room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn member(session: SessionId, user: &str) -> Member {
        Member {
            session,
            user_id: UserId::from(user),
            os: "linux".into(),
        }
    }

    fn room(id: &str) -> RoomId {
        RoomId::new(id).unwrap()
    }

    #[test]
    fn test_join_returns_others_in_order() {
        let mut registry = RoomRegistry::new();
        assert!(registry.join(room("r1"), member(1, "a")).is_empty());
        registry.join(room("r1"), member(2, "b"));

        let others = registry.join(room("r1"), member(3, "c"));
        let ids: Vec<_> = others.iter().map(|p| p.user_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(registry.member_count(&room("r1")), 3);
    }

    #[test]
    fn test_last_leave_deletes_room() {
        let mut registry = RoomRegistry::new();
        registry.join(room("r1"), member(1, "a"));
        registry.join(room("r1"), member(2, "b"));

        let (left_room, left) = registry.leave(1).unwrap();
        assert_eq!(left_room, room("r1"));
        assert_eq!(left.user_id.as_str(), "a");
        assert!(registry.contains_room(&room("r1")));

        registry.leave(2).unwrap();
        assert!(!registry.contains_room(&room("r1")));
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn test_leave_unknown_session() {
        let mut registry = RoomRegistry::new();
        assert!(registry.leave(42).is_none());
    }

    #[test]
    fn test_sessions_for_user() {
        let mut registry = RoomRegistry::new();
        registry.join(room("r1"), member(1, "a"));
        registry.join(room("r1"), member(2, "b"));
        registry.join(room("r2"), member(3, "b"));

        assert_eq!(registry.sessions_for(&room("r1"), &UserId::from("b")), vec![2]);
        assert!(registry.sessions_for(&room("r1"), &UserId::from("z")).is_empty());
    }

    #[test]
    fn test_others_excludes_self() {
        let mut registry = RoomRegistry::new();
        registry.join(room("r1"), member(1, "a"));
        registry.join(room("r1"), member(2, "b"));

        let others: Vec<_> = registry.others(&room("r1"), 1).map(|m| m.session).collect();
        assert_eq!(others, vec![2]);
        assert_eq!(registry.others(&room("nope"), 1).count(), 0);
    }

    proptest! {
        #[test]
        fn test_no_empty_rooms(ops in prop::collection::vec((0u64..8, 0u8..3, any::<bool>()), 0..64)) {
            let mut registry = RoomRegistry::new();
            for (session, room_index, join) in ops {
                registry.leave(session);
                if join {
                    let name = format!("room-{}", room_index);
                    registry.join(room(&name), member(session, &format!("u{}", session)));
                }
            }
            for index in 0..3 {
                let name = room(&format!("room-{}", index));
                prop_assert_eq!(registry.contains_room(&name), registry.member_count(&name) > 0);
            }
        }
    }
}
