use std::fmt;

/// Negotiation state of one peer link.
///
/// ```text
/// initiator:  New -> Offering -> AwaitingAnswer -> Stable -> Closed
/// responder:  New -> Answering -> Stable -> Closed
/// renegotiation re-enters Offering (or Answering) from Stable
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    New,
    Offering,
    AwaitingAnswer,
    Answering,
    Stable,
    Closed,
}

impl LinkState {
    pub fn can_transition(self, to: LinkState) -> bool {
        use LinkState::*;
        match (self, to) {
            (Closed, _) => false,
            (_, Closed) => true,
            (New | Stable, Offering) => true,
            (Offering, AwaitingAnswer) => true,
            // failed offer creation or polite rollback
            (Offering | AwaitingAnswer, Stable) => true,
            (New | Stable | AwaitingAnswer, Answering) => true,
            (Answering, Stable) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkState::New => "new",
            LinkState::Offering => "offering",
            LinkState::AwaitingAnswer => "awaiting-answer",
            LinkState::Answering => "answering",
            LinkState::Stable => "stable",
            LinkState::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

#[cfg(test)]
mod tests {
    use super::LinkState::*;

    #[test]
    fn closed_is_terminal() {
        for s in [New, Offering, AwaitingAnswer, Answering, Stable, Closed] {
            assert!(!Closed.can_transition(s));
        }
    }

    #[test]
    fn renegotiation_reenters_from_stable() {
        assert!(Stable.can_transition(Offering));
        assert!(Stable.can_transition(Answering));
        assert!(!New.can_transition(Stable));
        assert!(!Answering.can_transition(AwaitingAnswer));
    }
}
