use std::io;
use std::sync::Arc;

use crate::config::RelaySettings;
use crate::log::log_sink::LogSink;
use crate::signaling::signaling_server::SignalingServer;

/// Bind and run the relay with the given settings and log sink (blocks).
pub fn run_signaling_server_with_log(
    settings: RelaySettings,
    log_sink: Arc<dyn LogSink>,
) -> io::Result<()> {
    SignalingServer::bind(settings, log_sink)?.run()
}

/// Convenience: run the relay on `addr` with default settings and no logging.
pub fn run_signaling_server(addr: &str) -> io::Result<()> {
    let settings = RelaySettings {
        listen_addr: addr.to_string(),
        ..RelaySettings::default()
    };
    SignalingServer::bind_no_log(settings)?.run()
}
