use std::{fmt, io};

/// Protocol-level errors (body parsing/format issues, etc.).
#[derive(Debug)]
pub enum ProtoError {
    UnknownType(u8),
    BadVersion(u8),
    Truncated,
    InvalidUtf8,
    TooLarge { max: usize, actual: usize },
    InvalidFormat(&'static str),
    StringTooLong { max: usize, actual: usize },
}

impl fmt::Display for ProtoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtoError::UnknownType(t) => write!(f, "unknown message type 0x{t:02x}"),
            ProtoError::BadVersion(v) => write!(f, "unsupported protocol version {v}"),
            ProtoError::Truncated => write!(f, "truncated message body"),
            ProtoError::InvalidUtf8 => write!(f, "string field is not valid UTF-8"),
            ProtoError::TooLarge { max, actual } => {
                write!(f, "frame body of {actual} bytes exceeds limit of {max}")
            }
            ProtoError::InvalidFormat(why) => write!(f, "invalid format: {why}"),
            ProtoError::StringTooLong { max, actual } => {
                write!(f, "string of {actual} bytes exceeds limit of {max}")
            }
        }
    }
}

impl std::error::Error for ProtoError {}

/// Frame-level error wrapper: IO vs protocol.
#[derive(Debug)]
pub enum FrameError {
    Io(io::Error),
    Proto(ProtoError),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Io(e) => write!(f, "io error: {e}"),
            FrameError::Proto(e) => write!(f, "protocol error: {e}"),
        }
    }
}

impl std::error::Error for FrameError {}

impl From<io::Error> for FrameError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ProtoError> for FrameError {
    fn from(e: ProtoError) -> Self {
        Self::Proto(e)
    }
}
