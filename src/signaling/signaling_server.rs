use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, mpsc};
use std::{io, thread};

use crate::config::RelaySettings;
use crate::log::NoopLogSink;
use crate::log::log_sink::LogSink;
use crate::signaling::runtime::run_server_loop;
use crate::signaling::server_engine::ServerEngine;
use crate::signaling::server_event::ServerEvent;
use crate::signaling::transport::spawn_connection_threads;
use crate::signaling::types::ClientId;
use crate::{sink_info, sink_warn};

/// Top-level runtime object for the relay.
///
/// Binding happens in [`bind`](Self::bind) so callers (and tests on port 0)
/// can read the real address before the accept loop blocks.
pub struct SignalingServer {
    listener: TcpListener,
    settings: RelaySettings,
    log: Arc<dyn LogSink>,
}

impl SignalingServer {
    pub fn bind(settings: RelaySettings, log: Arc<dyn LogSink>) -> io::Result<Self> {
        let listener = TcpListener::bind(&settings.listen_addr)?;
        Ok(Self {
            listener,
            settings,
            log,
        })
    }

    pub fn bind_no_log(settings: RelaySettings) -> io::Result<Self> {
        Self::bind(settings, Arc::new(NoopLogSink))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Blocking main loop: spawn the central server loop, accept TCP clients.
    pub fn run(self) -> io::Result<()> {
        let Self {
            listener,
            settings,
            log,
        } = self;

        let (server_tx, server_rx) = mpsc::channel::<ServerEvent>();

        {
            let log_for_loop = log.clone();
            let engine = ServerEngine::with_log_and_origins(log.clone(), settings.origins.clone());
            thread::spawn(move || {
                sink_info!(log_for_loop, "[signaling] server loop started");
                run_server_loop(engine, log_for_loop, server_rx);
            });
        }

        let mut next_client_id: ClientId = 1;
        sink_info!(
            log,
            "signaling relay listening on {} (idle timeout {:?})",
            listener.local_addr()?,
            settings.idle_timeout
        );

        for stream in listener.incoming() {
            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    sink_warn!(
                        log,
                        "incoming TCP accept failed: {:?} (continuing to accept)",
                        e
                    );
                    continue;
                }
            };

            let client_id = next_client_id;
            next_client_id += 1;

            let peer = stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "?".into());
            sink_info!(log, "accepted {} as client_id={}", peer, client_id);

            if let Err(e) = spawn_connection_threads(
                client_id,
                stream,
                server_tx.clone(),
                log.clone(),
                settings.idle_timeout,
                settings.max_body_len,
            ) {
                sink_warn!(
                    log,
                    "failed to spawn connection threads for client {}: {:?}",
                    client_id,
                    e
                );
            }
        }

        Ok(())
    }
}
