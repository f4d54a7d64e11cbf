use std::collections::HashMap;

use crate::signaling::protocol::SessionId;
use crate::signaling::types::ClientId;

/// Tracks which connections have been welcomed, under which session id.
#[derive(Debug, Default)]
pub struct Presence {
    session_to_client: HashMap<SessionId, ClientId>,
    client_to_session: HashMap<ClientId, SessionId>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, client_id: ClientId, session_id: SessionId) {
        self.session_to_client.insert(session_id.clone(), client_id);
        self.client_to_session.insert(client_id, session_id);
    }

    /// Remove client from presence; returns its session id if any.
    pub fn unregister(&mut self, client_id: ClientId) -> Option<SessionId> {
        let session_id = self.client_to_session.remove(&client_id)?;
        self.session_to_client.remove(&session_id);
        Some(session_id)
    }

    pub fn client_id_for(&self, session_id: &str) -> Option<ClientId> {
        self.session_to_client.get(session_id).copied()
    }

    pub fn session_for(&self, client_id: ClientId) -> Option<&SessionId> {
        self.client_to_session.get(&client_id)
    }

    pub fn len(&self) -> usize {
        self.client_to_session.len()
    }

    pub fn is_empty(&self) -> bool {
        self.client_to_session.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_lookup_unregister() {
        let mut p = Presence::new();
        p.register(7, "s-7".into());
        assert_eq!(p.client_id_for("s-7"), Some(7));
        assert_eq!(p.session_for(7).map(String::as_str), Some("s-7"));

        assert_eq!(p.unregister(7), Some("s-7".to_string()));
        assert_eq!(p.client_id_for("s-7"), None);
        assert!(p.is_empty());
        assert_eq!(p.unregister(7), None);
    }
}
