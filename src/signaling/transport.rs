use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Duration;

use crate::log::log_sink::LogSink;
use crate::signaling::protocol::{FrameError, SignalingMsg};
use crate::signaling::protocol::{read_msg as proto_read_msg, write_msg as proto_write_msg};
use crate::signaling::server_event::ServerEvent;
use crate::signaling::types::ClientId;
use crate::{sink_debug, sink_info, sink_warn};

/// Thin wrapper over a blocking stream that speaks in `SignalingMsg`.
pub struct Connection<S> {
    pub client_id: ClientId,
    stream: S,
    max_body: usize,
}

impl<S> Connection<S>
where
    S: Read + Write,
{
    pub fn new(id: ClientId, stream: S, max_body: usize) -> Self {
        Self {
            client_id: id,
            stream,
            max_body,
        }
    }

    pub fn recv(&mut self) -> Result<SignalingMsg, FrameError> {
        proto_read_msg(&mut self.stream, self.max_body)
    }

    pub fn send(&mut self, msg: &SignalingMsg) -> Result<(), FrameError> {
        proto_write_msg(&mut self.stream, msg)
    }
}

/// Spawn reader + writer threads for a single TcpStream client.
///
/// `server_tx` is the Sender<ServerEvent> that talks to the central server loop.
/// A connection that sends nothing for `idle_timeout` is dropped; clients keep
/// it alive with `Ping`.
pub fn spawn_connection_threads(
    client_id: ClientId,
    stream: TcpStream,
    server_tx: Sender<ServerEvent>,
    log: Arc<dyn LogSink>,
    idle_timeout: Duration,
    max_body: usize,
) -> io::Result<()> {
    let (to_client_tx, to_client_rx) = mpsc::channel::<SignalingMsg>();

    stream.set_read_timeout(Some(idle_timeout))?;
    let read_stream = stream.try_clone()?;
    let write_stream = stream;

    server_tx
        .send(ServerEvent::RegisterClient {
            client_id,
            to_client: to_client_tx,
        })
        .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "server loop is gone"))?;

    // READER THREAD: socket -> ServerEvent::MsgFromClient
    {
        let server_tx = server_tx.clone();
        let log = log.clone();
        thread::spawn(move || {
            let mut conn = Connection::new(client_id, read_stream, max_body);

            loop {
                match conn.recv() {
                    Ok(msg) => {
                        if server_tx
                            .send(ServerEvent::MsgFromClient { client_id, msg })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(FrameError::Io(e))
                        if matches!(
                            e.kind(),
                            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                        ) =>
                    {
                        sink_info!(log, "[conn {}] idle timeout; closing", client_id);
                        break;
                    }
                    Err(FrameError::Io(e)) => {
                        sink_debug!(
                            log,
                            "[conn {}] reader stopped: {} (kind={:?})",
                            client_id,
                            e,
                            e.kind()
                        );
                        break;
                    }
                    Err(other) => {
                        sink_warn!(log, "[conn {}] frame error in reader: {}", client_id, other);
                        break;
                    }
                }
            }
            let _ = conn.stream.shutdown(Shutdown::Both);
            let _ = server_tx.send(ServerEvent::Disconnected { client_id });
        });
    }

    // WRITER THREAD: to_client_rx -> socket
    thread::spawn(move || {
        let mut conn = Connection::new(client_id, write_stream, max_body);

        while let Ok(msg) = to_client_rx.recv() {
            if let Err(e) = conn.send(&msg) {
                sink_warn!(log, "[conn {}] error sending msg: {}", client_id, e);
                let _ = server_tx.send(ServerEvent::Disconnected { client_id });
                break;
            }
        }
        // Queue closed by the server loop (disconnect or rejection): unblock the reader.
        let _ = conn.stream.shutdown(Shutdown::Both);
    });

    Ok(())
}
