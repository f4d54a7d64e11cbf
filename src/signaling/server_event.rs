use std::sync::mpsc::Sender;

use crate::signaling::{protocol::SignalingMsg, types::ClientId};

/// Events sent *to* the relay's event-loop thread.
pub enum ServerEvent {
    /// A new connection is registered with its outgoing queue.
    RegisterClient {
        client_id: ClientId,
        to_client: Sender<SignalingMsg>,
    },

    /// A client sent a signaling message.
    MsgFromClient {
        client_id: ClientId,
        msg: SignalingMsg,
    },

    /// A client disconnected (closed, errored or idle past the timeout).
    Disconnected { client_id: ClientId },
}
