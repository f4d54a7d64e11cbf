use std::io;
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use crate::log::log_sink::LogSink;
use crate::signaling::protocol::{MAX_BODY_LEN, SessionId, SignalingMsg, read_msg, write_msg};
use crate::signaling_client::outbox::SignalingOutbox;
use crate::signaling_client::signaling_client_error::SignalingClientError;
use crate::signaling_client::signaling_command::SignalingCommand;
use crate::signaling_client::signaling_event::SignalingEvent;
use crate::{sink_debug, sink_info, sink_warn};

/// Connection parameters for [`SignalingClient::connect`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub client_version: String,
    pub origin: String,
    pub handshake_timeout: Duration,
    /// Idle interval after which the writer sends a `Ping`.
    pub ping_interval: Duration,
    pub max_body_len: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            origin: String::new(),
            handshake_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(20),
            max_body_len: MAX_BODY_LEN,
        }
    }
}

/// One live connection to the relay, owned by a single session.
///
/// `connect` performs the `Hello`/`Welcome` handshake synchronously, then
/// spawns a reader thread (socket -> events) and a writer thread
/// (commands -> socket, plus keepalive pings).
pub struct SignalingClient {
    cmd_tx: Sender<SignalingCommand>,
    session_id: SessionId,
}

impl SignalingClient {
    pub fn connect<E>(
        addr: &str,
        options: &ClientOptions,
        events: Sender<E>,
        log: Arc<dyn LogSink>,
    ) -> Result<Self, SignalingClientError>
    where
        E: From<SignalingEvent> + Send + 'static,
    {
        let mut stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(options.handshake_timeout))?;

        write_msg(
            &mut stream,
            &SignalingMsg::Hello {
                client_version: options.client_version.clone(),
                origin: options.origin.clone(),
            },
        )?;

        let session_id = match read_msg(&mut stream, options.max_body_len)? {
            SignalingMsg::Welcome { session_id } => session_id,
            SignalingMsg::HelloErr { code } => {
                sink_warn!(log, "relay {} rejected hello (code {})", addr, code);
                return Err(SignalingClientError::Rejected { code });
            }
            other => return Err(SignalingClientError::UnexpectedReply(other.name())),
        };
        stream.set_read_timeout(None)?;
        sink_info!(log, "connected to relay {} as session {}", addr, session_id);

        let (cmd_tx, cmd_rx) = mpsc::channel::<SignalingCommand>();
        let read_stream = stream.try_clone()?;
        let max_body = options.max_body_len;

        // READER THREAD: socket -> SignalingEvent
        {
            let log = log.clone();
            thread::spawn(move || {
                let mut read_stream = read_stream;
                let reason = loop {
                    match read_msg(&mut read_stream, max_body) {
                        Ok(SignalingMsg::Pong { .. }) => {}
                        Ok(msg) => {
                            sink_debug!(log, "relay -> {}", msg.name());
                            if events.send(E::from(SignalingEvent::Message(msg))).is_err() {
                                break "event receiver dropped".to_string();
                            }
                        }
                        Err(e) => break e.to_string(),
                    }
                };
                sink_info!(log, "relay connection closed: {}", reason);
                let _ = events.send(E::from(SignalingEvent::Disconnected { reason }));
            });
        }

        // WRITER THREAD: commands -> socket
        {
            let ping_interval = options.ping_interval;
            thread::spawn(move || {
                let mut stream = stream;
                let mut nonce: u64 = 0;
                loop {
                    let msg = match cmd_rx.recv_timeout(ping_interval) {
                        Ok(SignalingCommand::Send(msg)) => msg,
                        Ok(SignalingCommand::Disconnect) | Err(RecvTimeoutError::Disconnected) => {
                            break;
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            nonce = nonce.wrapping_add(1);
                            SignalingMsg::Ping { nonce }
                        }
                    };
                    if let Err(e) = write_msg(&mut stream, &msg) {
                        sink_warn!(log, "failed to write {} to relay: {}", msg.name(), e);
                        break;
                    }
                }
                let _ = stream.shutdown(Shutdown::Both);
            });
        }

        Ok(Self { cmd_tx, session_id })
    }

    /// Session id assigned by the relay.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn send(&self, msg: SignalingMsg) -> Result<(), SignalingClientError> {
        self.cmd_tx
            .send(SignalingCommand::Send(msg))
            .map_err(|_| SignalingClientError::Disconnected)
    }

    pub fn join_room(&self, room_id: &str) -> Result<(), SignalingClientError> {
        self.send(SignalingMsg::JoinRoom {
            room_id: room_id.to_string(),
        })
    }

    pub fn leave_room(&self) -> Result<(), SignalingClientError> {
        self.send(SignalingMsg::LeaveRoom)
    }

    /// Closes the connection; the relay treats it as a disconnect.
    pub fn disconnect(&self) -> io::Result<()> {
        self.cmd_tx
            .send(SignalingCommand::Disconnect)
            .map_err(|_| io::Error::new(io::ErrorKind::NotConnected, "already disconnected"))
    }
}

impl SignalingOutbox for SignalingClient {
    fn send_signal(&self, msg: SignalingMsg) -> Result<(), SignalingClientError> {
        self.send(msg)
    }
}
