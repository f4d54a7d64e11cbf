use std::sync::Arc;

use uuid::Uuid;

use crate::config::OriginPolicy;
use crate::log::NoopLogSink;
use crate::log::log_sink::LogSink;
use crate::signaling::errors::{HelloErrorCode, JoinErrorCode};
use crate::signaling::presence::Presence;
use crate::signaling::protocol::{SessionId, SignalingMsg};
use crate::signaling::rooms::Rooms;
use crate::signaling::types::{ClientId, OutgoingMsg};
use crate::{sink_debug, sink_info, sink_trace, sink_warn};

/// The relay state machine. Owns the room table and the session directory;
/// turns one inbound message into the list of messages to deliver.
///
/// It never parses `sdp`/`candidate` payloads and never reports delivery
/// misses back to the sender.
pub struct ServerEngine {
    presence: Presence,
    rooms: Rooms,
    origins: OriginPolicy,
    /// Connections refused during the last `handle` calls; the runtime closes them.
    rejected: Vec<ClientId>,
    log: Arc<dyn LogSink>,
}

impl ServerEngine {
    pub fn new() -> Self {
        Self::with_log_and_origins(Arc::new(NoopLogSink), OriginPolicy::Any)
    }

    pub fn with_log(log: Arc<dyn LogSink>) -> Self {
        Self::with_log_and_origins(log, OriginPolicy::Any)
    }

    pub fn with_log_and_origins(log: Arc<dyn LogSink>, origins: OriginPolicy) -> Self {
        Self {
            presence: Presence::new(),
            rooms: Rooms::new(),
            origins,
            rejected: Vec::new(),
            log,
        }
    }

    /// Main entrypoint: handle a message from a client.
    ///
    /// Returns a list of (target_client, Msg) to send.
    pub fn handle(&mut self, from_cid: ClientId, msg: SignalingMsg) -> Vec<OutgoingMsg> {
        match msg {
            SignalingMsg::Hello {
                client_version,
                origin,
            } => self.handle_hello(from_cid, client_version, origin),

            SignalingMsg::JoinRoom { room_id } => self.handle_join(from_cid, room_id),

            SignalingMsg::LeaveRoom => self.handle_leave(from_cid),

            SignalingMsg::Offer { .. } | SignalingMsg::Answer { .. } | SignalingMsg::Ice { .. } => {
                self.forward_signaling(from_cid, msg)
            }

            SignalingMsg::Ping { nonce } => vec![OutgoingMsg {
                client_id_target: from_cid,
                msg: SignalingMsg::Pong { nonce },
            }],
            SignalingMsg::Pong { .. } => Vec::new(),

            SignalingMsg::Welcome { .. }
            | SignalingMsg::HelloErr { .. }
            | SignalingMsg::AllUsers { .. }
            | SignalingMsg::JoinErr { .. }
            | SignalingMsg::PeerLeft { .. } => {
                sink_warn!(
                    self.log,
                    "ignoring server-only msg {} from client {}",
                    msg.name(),
                    from_cid
                );
                Vec::new()
            }
        }
    }

    /// Called when a connection closes, to clean up state and notify the room.
    ///
    /// Safe to call more than once for the same client.
    pub fn handle_disconnect(&mut self, client_id: ClientId) -> Vec<OutgoingMsg> {
        let Some(session_id) = self.presence.unregister(client_id) else {
            sink_debug!(
                self.log,
                "client {} disconnected (was not welcomed)",
                client_id
            );
            return Vec::new();
        };

        sink_info!(
            self.log,
            "client {} (session {}) disconnected",
            client_id,
            session_id
        );

        match self.rooms.leave(client_id) {
            Some((room_id, remaining)) => {
                self.peer_left_broadcast(&room_id, &session_id, &remaining)
            }
            None => Vec::new(),
        }
    }

    /// Connections refused since the last call (origin not allowed).
    pub fn take_rejected(&mut self) -> Vec<ClientId> {
        std::mem::take(&mut self.rejected)
    }

    pub fn session_for(&self, client_id: ClientId) -> Option<&SessionId> {
        self.presence.session_for(client_id)
    }

    pub fn connected_sessions(&self) -> usize {
        self.presence.len()
    }

    pub fn room_of(&self, client_id: ClientId) -> Option<&str> {
        self.rooms.room_of(client_id)
    }

    // ---- Individual handlers ---------------------------------------------

    fn handle_hello(
        &mut self,
        client_id: ClientId,
        client_version: String,
        origin: String,
    ) -> Vec<OutgoingMsg> {
        if let Some(existing) = self.presence.session_for(client_id) {
            sink_debug!(
                self.log,
                "client {} repeated HELLO; keeping session {}",
                client_id,
                existing
            );
            return vec![OutgoingMsg {
                client_id_target: client_id,
                msg: SignalingMsg::Welcome {
                    session_id: existing.clone(),
                },
            }];
        }

        if !self.origins.allows(&origin) {
            sink_warn!(
                self.log,
                "client {} rejected: origin {:?} not allowed",
                client_id,
                origin
            );
            self.rejected.push(client_id);
            return vec![OutgoingMsg {
                client_id_target: client_id,
                msg: SignalingMsg::HelloErr {
                    code: HelloErrorCode::OriginNotAllowed.as_u16(),
                },
            }];
        }

        let session_id = Uuid::new_v4().to_string();
        self.presence.register(client_id, session_id.clone());
        sink_info!(
            self.log,
            "client {} welcomed as session {} (version {}, origin {:?})",
            client_id,
            session_id,
            client_version,
            origin
        );

        vec![OutgoingMsg {
            client_id_target: client_id,
            msg: SignalingMsg::Welcome { session_id },
        }]
    }

    fn handle_join(&mut self, client_id: ClientId, room_id: String) -> Vec<OutgoingMsg> {
        let Some(session_id) = self.presence.session_for(client_id).cloned() else {
            sink_warn!(
                self.log,
                "client {} attempted JoinRoom({}) before HELLO",
                client_id,
                room_id
            );
            return vec![OutgoingMsg {
                client_id_target: client_id,
                msg: SignalingMsg::JoinErr {
                    code: JoinErrorCode::NotWelcomed.as_u16(),
                },
            }];
        };

        if room_id.is_empty() {
            return vec![OutgoingMsg {
                client_id_target: client_id,
                msg: SignalingMsg::JoinErr {
                    code: JoinErrorCode::EmptyRoomId.as_u16(),
                },
            }];
        }

        let outcome = self.rooms.join(client_id, &room_id);
        let mut out = Vec::new();

        if let Some((old_room, remaining)) = &outcome.left {
            out.extend(self.peer_left_broadcast(old_room, &session_id, remaining));
        }

        let session_ids: Vec<SessionId> = outcome
            .others
            .iter()
            .filter_map(|c| self.presence.session_for(*c).cloned())
            .collect();

        if outcome.already_member {
            sink_debug!(
                self.log,
                "session {} re-joined room {} (no change)",
                session_id,
                room_id
            );
        } else {
            sink_info!(
                self.log,
                "session {} joined room {} ({} already there)",
                session_id,
                room_id,
                session_ids.len()
            );
        }

        out.push(OutgoingMsg {
            client_id_target: client_id,
            msg: SignalingMsg::AllUsers {
                room_id,
                session_ids,
            },
        });
        out
    }

    fn handle_leave(&mut self, client_id: ClientId) -> Vec<OutgoingMsg> {
        let Some(session_id) = self.presence.session_for(client_id).cloned() else {
            return Vec::new();
        };
        match self.rooms.leave(client_id) {
            Some((room_id, remaining)) => {
                sink_info!(self.log, "session {} left room {}", session_id, room_id);
                self.peer_left_broadcast(&room_id, &session_id, &remaining)
            }
            None => Vec::new(),
        }
    }

    /// Forward Offer/Answer/Ice, enforcing:
    /// - sender must be welcomed
    /// - target must be connected
    /// - both must be in the same room
    ///
    /// Anything else is a silent drop; `from` is always stamped by the relay.
    fn forward_signaling(&mut self, from: ClientId, msg: SignalingMsg) -> Vec<OutgoingMsg> {
        let kind = msg.name();

        let Some(from_session) = self.presence.session_for(from).cloned() else {
            sink_warn!(
                self.log,
                "client {} sent {} before HELLO; dropped",
                from,
                kind
            );
            return Vec::new();
        };

        let (to_session, stamped) = match msg {
            SignalingMsg::Offer { to, sdp, .. } => (
                to.clone(),
                SignalingMsg::Offer {
                    from: from_session.clone(),
                    to,
                    sdp,
                },
            ),
            SignalingMsg::Answer { to, sdp, .. } => (
                to.clone(),
                SignalingMsg::Answer {
                    from: from_session.clone(),
                    to,
                    sdp,
                },
            ),
            SignalingMsg::Ice { to, candidate, .. } => (
                to.clone(),
                SignalingMsg::Ice {
                    from: from_session.clone(),
                    to,
                    candidate,
                },
            ),
            other => {
                sink_warn!(self.log, "forward_signaling got {}", other.name());
                return Vec::new();
            }
        };

        let Some(target_client) = self.presence.client_id_for(&to_session) else {
            sink_debug!(
                self.log,
                "{} from {} to unknown session {} dropped",
                kind,
                from_session,
                to_session
            );
            return Vec::new();
        };

        if !self.rooms.share_room(from, target_client) {
            sink_debug!(
                self.log,
                "{} from {} to {} dropped (no shared room)",
                kind,
                from_session,
                to_session
            );
            return Vec::new();
        }

        sink_trace!(
            self.log,
            "forwarding {} from {} to {}",
            kind,
            from_session,
            to_session
        );

        vec![OutgoingMsg {
            client_id_target: target_client,
            msg: stamped,
        }]
    }

    fn peer_left_broadcast(
        &self,
        room_id: &str,
        session_id: &SessionId,
        remaining: &[ClientId],
    ) -> Vec<OutgoingMsg> {
        sink_debug!(
            self.log,
            "broadcasting PeerLeft({}) to {} members of {}",
            session_id,
            remaining.len(),
            room_id
        );
        remaining
            .iter()
            .map(|member| OutgoingMsg {
                client_id_target: *member,
                msg: SignalingMsg::PeerLeft {
                    session_id: session_id.clone(),
                },
            })
            .collect()
    }
}

impl Default for ServerEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn hello(server: &mut ServerEngine, client_id: ClientId) -> SessionId {
        let out = server.handle(
            client_id,
            SignalingMsg::Hello {
                client_version: "test".into(),
                origin: "http://localhost".into(),
            },
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].client_id_target, client_id);
        match &out[0].msg {
            SignalingMsg::Welcome { session_id } => session_id.clone(),
            other => panic!("expected Welcome, got {:?}", other),
        }
    }

    fn join(server: &mut ServerEngine, client_id: ClientId, room: &str) -> Vec<SessionId> {
        let out = server.handle(
            client_id,
            SignalingMsg::JoinRoom {
                room_id: room.into(),
            },
        );
        let reply = out
            .iter()
            .find(|o| o.client_id_target == client_id)
            .expect("joiner gets a reply");
        match &reply.msg {
            SignalingMsg::AllUsers { session_ids, .. } => session_ids.clone(),
            other => panic!("expected AllUsers, got {:?}", other),
        }
    }

    #[test]
    fn all_users_goes_to_joiner_only() {
        let mut server = ServerEngine::new();
        let a = hello(&mut server, 1);
        let _b = hello(&mut server, 2);

        assert!(join(&mut server, 1, "R1").is_empty());

        let out = server.handle(
            2,
            SignalingMsg::JoinRoom {
                room_id: "R1".into(),
            },
        );
        assert_eq!(out.len(), 1, "no broadcast on join: {:?}", out);
        assert_eq!(out[0].client_id_target, 2);
        assert_eq!(
            out[0].msg,
            SignalingMsg::AllUsers {
                room_id: "R1".into(),
                session_ids: vec![a],
            }
        );
    }

    #[test]
    fn join_before_hello_is_refused() {
        let mut server = ServerEngine::new();
        let out = server.handle(
            1,
            SignalingMsg::JoinRoom {
                room_id: "R1".into(),
            },
        );
        assert_eq!(
            out[0].msg,
            SignalingMsg::JoinErr {
                code: JoinErrorCode::NotWelcomed.as_u16()
            }
        );
    }

    #[test]
    fn offer_is_forwarded_with_sender_stamped() {
        let mut server = ServerEngine::new();
        let a = hello(&mut server, 1);
        let b = hello(&mut server, 2);
        join(&mut server, 1, "R1");
        join(&mut server, 2, "R1");

        let out = server.handle(
            2,
            SignalingMsg::Offer {
                from: "forged".into(),
                to: a.clone(),
                sdp: b"v=0".to_vec(),
            },
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].client_id_target, 1);
        assert_eq!(
            out[0].msg,
            SignalingMsg::Offer {
                from: b,
                to: a,
                sdp: b"v=0".to_vec(),
            }
        );
    }

    #[test]
    fn relay_to_unknown_or_foreign_target_is_silent() {
        let mut server = ServerEngine::new();
        let _a = hello(&mut server, 1);
        let b = hello(&mut server, 2);
        join(&mut server, 1, "R1");
        join(&mut server, 2, "R2");

        let unknown = server.handle(
            1,
            SignalingMsg::Ice {
                from: String::new(),
                to: "nobody".into(),
                candidate: b"c".to_vec(),
            },
        );
        assert!(unknown.is_empty());

        let foreign = server.handle(
            1,
            SignalingMsg::Answer {
                from: String::new(),
                to: b,
                sdp: b"v=0".to_vec(),
            },
        );
        assert!(foreign.is_empty());
    }

    #[test]
    fn disconnect_broadcasts_peer_left_to_remaining_members() {
        let mut server = ServerEngine::new();
        let a = hello(&mut server, 1);
        hello(&mut server, 2);
        hello(&mut server, 3);
        for c in 1..=3 {
            join(&mut server, c, "R1");
        }

        let out = server.handle_disconnect(1);
        let mut targets: Vec<ClientId> = out.iter().map(|o| o.client_id_target).collect();
        targets.sort_unstable();
        assert_eq!(targets, vec![2, 3]);
        for o in &out {
            assert_eq!(
                o.msg,
                SignalingMsg::PeerLeft {
                    session_id: a.clone()
                }
            );
        }

        // second disconnect notification is a no-op
        assert!(server.handle_disconnect(1).is_empty());
        assert_eq!(server.connected_sessions(), 2);
    }

    #[test]
    fn leave_room_keeps_connection_but_notifies_room() {
        let mut server = ServerEngine::new();
        let a = hello(&mut server, 1);
        hello(&mut server, 2);
        join(&mut server, 1, "R1");
        join(&mut server, 2, "R1");

        let out = server.handle(1, SignalingMsg::LeaveRoom);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].client_id_target, 2);
        assert_eq!(out[0].msg, SignalingMsg::PeerLeft { session_id: a });
        assert_eq!(server.room_of(1), None);
        assert!(server.session_for(1).is_some());
    }

    #[test]
    fn switching_rooms_notifies_old_room() {
        let mut server = ServerEngine::new();
        let a = hello(&mut server, 1);
        hello(&mut server, 2);
        join(&mut server, 1, "R1");
        join(&mut server, 2, "R1");

        let out = server.handle(
            1,
            SignalingMsg::JoinRoom {
                room_id: "R2".into(),
            },
        );
        assert!(out.iter().any(|o| o.client_id_target == 2
            && o.msg == SignalingMsg::PeerLeft {
                session_id: a.clone()
            }));
        assert!(out.iter().any(|o| o.client_id_target == 1
            && matches!(&o.msg, SignalingMsg::AllUsers { session_ids, .. } if session_ids.is_empty())));
    }

    #[test]
    fn disallowed_origin_is_rejected() {
        let mut server = ServerEngine::with_log_and_origins(
            Arc::new(NoopLogSink),
            OriginPolicy::AllowList(vec!["https://app.example".into()]),
        );
        let out = server.handle(
            9,
            SignalingMsg::Hello {
                client_version: "x".into(),
                origin: "https://evil.example".into(),
            },
        );
        assert_eq!(
            out[0].msg,
            SignalingMsg::HelloErr {
                code: HelloErrorCode::OriginNotAllowed.as_u16()
            }
        );
        assert_eq!(server.take_rejected(), vec![9]);
        assert!(server.take_rejected().is_empty());
        assert!(server.session_for(9).is_none());
    }

    #[test]
    fn ping_replies_with_pong() {
        let mut server = ServerEngine::new();
        let out = server.handle(4, SignalingMsg::Ping { nonce: 77 });
        assert_eq!(out[0].msg, SignalingMsg::Pong { nonce: 77 });
    }
}
