use std::sync::mpsc::Sender;

use crate::signaling::protocol::SignalingMsg;
use crate::signaling_client::SignalingClientError;

/// Where the mesh puts messages bound for the relay.
///
/// Implemented by [`SignalingClient`](super::SignalingClient) and by a plain
/// `Sender<SignalingMsg>` so a coordinator can run against an in-process relay.
pub trait SignalingOutbox: Send + Sync {
    fn send_signal(&self, msg: SignalingMsg) -> Result<(), SignalingClientError>;
}

impl SignalingOutbox for Sender<SignalingMsg> {
    fn send_signal(&self, msg: SignalingMsg) -> Result<(), SignalingClientError> {
        self.send(msg).map_err(|_| SignalingClientError::Disconnected)
    }
}
