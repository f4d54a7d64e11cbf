/// Defines the severity levels for log messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Per-message detail (individual frames, chunks, candidates).
    Trace,
    /// Negotiation steps and routing decisions.
    Debug,
    /// Lifecycle events: connections, joins, links opened and closed.
    Info,
    /// Dropped input, stale completions, expired candidates.
    Warn,
    /// Failures that cost a peer link or a device.
    Error,
}
