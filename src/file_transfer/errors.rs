use std::{fmt, io};

#[derive(Debug)]
pub enum TransferError {
    /// The data channel is not open (or already closed).
    ChannelClosed,
    /// The channel adapter refused a send.
    Channel(String),
    /// A text message that is not a valid control record.
    BadControl(String),
    /// A binary chunk with no `file-start` before it.
    NoActiveTransfer,
    Io(io::Error),
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChannelClosed => write!(f, "data channel closed"),
            Self::Channel(e) => write!(f, "data channel error: {e}"),
            Self::BadControl(e) => write!(f, "bad control record: {e}"),
            Self::NoActiveTransfer => write!(f, "chunk received with no active transfer"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for TransferError {}

impl From<io::Error> for TransferError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for TransferError {
    fn from(e: serde_json::Error) -> Self {
        Self::BadControl(e.to_string())
    }
}
