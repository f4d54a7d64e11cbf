use std::{fmt, io};

use crate::signaling::protocol::FrameError;

/// Errors from the client side of the relay connection.
///
/// After the handshake the only thing `send()` can reliably report is that the
/// client is disconnected (the writer thread has exited and dropped its
/// command receiver).
#[derive(Debug)]
pub enum SignalingClientError {
    Io(io::Error),
    Frame(FrameError),
    /// The relay answered `Hello` with `HelloErr`.
    Rejected { code: u16 },
    /// The relay answered `Hello` with something other than `Welcome`/`HelloErr`.
    UnexpectedReply(&'static str),
    Disconnected,
}

impl fmt::Display for SignalingClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {e}"),
            Self::Frame(e) => write!(f, "protocol error: {e}"),
            Self::Rejected { code } => write!(f, "relay rejected hello (code {code})"),
            Self::UnexpectedReply(name) => write!(f, "unexpected handshake reply: {name}"),
            Self::Disconnected => write!(f, "signaling client disconnected"),
        }
    }
}

impl std::error::Error for SignalingClientError {}

impl From<io::Error> for SignalingClientError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<FrameError> for SignalingClientError {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}
