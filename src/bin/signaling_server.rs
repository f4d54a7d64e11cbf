use std::sync::Arc;
use std::{env, process};

use meshrtc::config::{Config, RelaySettings};
use meshrtc::log::log_sink::LogSink;
use meshrtc::log::logger::Logger;
use meshrtc::signaling::run::run_signaling_server_with_log;

fn main() -> std::io::Result<()> {
    // --- Parse CLI args ----------------------------------------------------
    //
    // Supported:
    //   signaling_server
    //      -> defaults (0.0.0.0:5000, any origin)
    //
    //   signaling_server relay.conf
    //      -> settings from the [Signaling] / [Logging] sections
    //
    //   signaling_server relay.conf 127.0.0.1:7000
    //      -> same, listen address overridden

    let args: Vec<String> = env::args().collect();

    let (config, addr_override) = match args.len() {
        1 => (Config::empty(), None),
        2 | 3 => match Config::load(&args[1]) {
            Ok(c) => (c, args.get(2).cloned()),
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        },
        _ => {
            eprintln!("Usage:");
            eprintln!("  {}                      # listen on 0.0.0.0:5000", args[0]);
            eprintln!("  {} [CONFIG]             # e.g. relay.conf", args[0]);
            eprintln!("  {} [CONFIG] [ADDR]      # e.g. relay.conf 127.0.0.1:7000", args[0]);
            process::exit(1);
        }
    };

    let mut settings = RelaySettings::from_config(&config);
    if let Some(addr) = addr_override {
        settings.listen_addr = addr;
    }

    // --- Start process logger ----------------------------------------------
    let logger = Logger::start_server(1024, &config);
    let log_sink: Arc<dyn LogSink> = Arc::new(logger.handle());

    eprintln!(
        "[signaling_server] starting on {} (log: {})",
        settings.listen_addr,
        logger.file_path().display()
    );

    // --- Run relay (blocks) ------------------------------------------------
    run_signaling_server_with_log(settings, log_sink)
}
