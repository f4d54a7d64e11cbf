use std::fmt;

/// Failures while negotiating one peer link. Any of these closes that link
/// only; other links are untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// The peer-connection adapter failed an operation (`op` names it).
    Adapter { op: &'static str, reason: String },
    /// A relayed description that is not valid UTF-8 SDP.
    MalformedDescription,
    /// A relayed candidate payload that does not decode.
    MalformedCandidate(String),
    /// The factory could not build a connection.
    Factory(String),
}

impl NegotiationError {
    pub fn adapter(op: &'static str, reason: impl Into<String>) -> Self {
        Self::Adapter {
            op,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for NegotiationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adapter { op, reason } => write!(f, "{op} failed: {reason}"),
            Self::MalformedDescription => write!(f, "malformed session description"),
            Self::MalformedCandidate(e) => write!(f, "malformed candidate: {e}"),
            Self::Factory(e) => write!(f, "peer connection creation failed: {e}"),
        }
    }
}

impl std::error::Error for NegotiationError {}
