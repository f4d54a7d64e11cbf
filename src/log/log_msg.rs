use crate::log::log_level::LogLevel;

/// A single log record travelling from a producer to the logger worker.
#[derive(Debug, Clone)]
pub struct LogMsg {
    pub level: LogLevel,
    /// Milliseconds since the UNIX epoch.
    pub ts_ms: u128,
    pub text: String,
    /// Module path of the producer.
    pub target: &'static str,
}

impl LogMsg {
    /// Creates a new `LogMsg`.
    ///
    /// ```rust,ignore
    /// let msg = LogMsg::new(LogLevel::Info, "relay listening", module_path!(), now_millis());
    /// ```
    pub fn new(
        level: LogLevel,
        text: impl Into<String>,
        target: &'static str,
        ts_ms: u128,
    ) -> Self {
        Self {
            level,
            ts_ms,
            text: text.into(),
            target,
        }
    }

    /// Renders the record as one line of the log file.
    pub fn render(&self) -> String {
        format!(
            "[{:?}] {} {} | {}",
            self.level, self.ts_ms, self.target, self.text
        )
    }
}
