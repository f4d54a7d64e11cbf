use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};

use crate::log::log_sink::LogSink;
use crate::signaling::protocol::SignalingMsg;
use crate::signaling::server_engine::ServerEngine;
use crate::signaling::server_event::ServerEvent;
use crate::signaling::types::{ClientId, OutgoingMsg};
use crate::{sink_debug, sink_info, sink_warn};

/// Central server loop: owns the engine + maps client_id -> Sender<SignalingMsg>.
///
/// Every event is handled to completion before the next one is taken, so
/// messages from one sender reach a recipient in the order they were sent.
pub fn run_server_loop(mut engine: ServerEngine, log: Arc<dyn LogSink>, rx: Receiver<ServerEvent>) {
    use ServerEvent::*;

    let mut clients: HashMap<ClientId, Sender<SignalingMsg>> = HashMap::new();

    while let Ok(ev) = rx.recv() {
        match ev {
            RegisterClient {
                client_id,
                to_client,
            } => {
                clients.insert(client_id, to_client);

                sink_info!(
                    log,
                    "registered client {} in server loop (now {} clients)",
                    client_id,
                    clients.len()
                );
            }

            MsgFromClient { client_id, msg } => {
                sink_debug!(log, "MsgFromClient from {}: {}", client_id, msg.name());

                let outgoing = engine.handle(client_id, msg);
                deliver(&clients, &log, outgoing);

                // Dropping the sender ends the writer thread after it has
                // flushed the HelloErr queued above.
                for rejected in engine.take_rejected() {
                    clients.remove(&rejected);
                }
            }

            Disconnected { client_id } => {
                sink_info!(log, "client {} disconnected (transport)", client_id);
                clients.remove(&client_id);
                let outgoing = engine.handle_disconnect(client_id);
                deliver(&clients, &log, outgoing);
            }
        }
    }

    sink_info!(
        log,
        "ServerEvent channel closed; server loop shutting down ({} clients left)",
        clients.len()
    );
}

fn deliver(
    clients: &HashMap<ClientId, Sender<SignalingMsg>>,
    log: &Arc<dyn LogSink>,
    outgoing: Vec<OutgoingMsg>,
) {
    for OutgoingMsg {
        client_id_target,
        msg,
    } in outgoing
    {
        if let Some(tx) = clients.get(&client_id_target) {
            if tx.send(msg).is_err() {
                sink_warn!(
                    log,
                    "failed to deliver message to client {} (channel closed)",
                    client_id_target
                );
            }
        } else {
            sink_debug!(
                log,
                "no client {} to deliver outgoing message",
                client_id_target
            );
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use crate::config::OriginPolicy;
    use crate::log::NoopLogSink;
    use crate::signaling::errors::HelloErrorCode;

    fn register(ev_tx: &Sender<ServerEvent>, client_id: ClientId) -> Receiver<SignalingMsg> {
        let (to_client_tx, to_client_rx) = mpsc::channel::<SignalingMsg>();
        ev_tx
            .send(ServerEvent::RegisterClient {
                client_id,
                to_client: to_client_tx,
            })
            .unwrap();
        to_client_rx
    }

    fn hello(client_id: ClientId, origin: &str) -> ServerEvent {
        ServerEvent::MsgFromClient {
            client_id,
            msg: SignalingMsg::Hello {
                client_version: "test".into(),
                origin: origin.into(),
            },
        }
    }

    #[test]
    fn server_loop_welcomes_and_announces_departures() {
        let (ev_tx, ev_rx) = mpsc::channel::<ServerEvent>();
        let log = Arc::new(NoopLogSink);
        thread::spawn(move || {
            run_server_loop(ServerEngine::new(), log, ev_rx);
        });

        let rx1 = register(&ev_tx, 1);
        let rx2 = register(&ev_tx, 2);
        ev_tx.send(hello(1, "o")).unwrap();
        ev_tx.send(hello(2, "o")).unwrap();

        let wait = Duration::from_millis(500);
        let SignalingMsg::Welcome { session_id: s1 } = rx1.recv_timeout(wait).unwrap() else {
            panic!("expected Welcome");
        };
        assert!(matches!(
            rx2.recv_timeout(wait).unwrap(),
            SignalingMsg::Welcome { .. }
        ));

        for c in [1, 2] {
            ev_tx
                .send(ServerEvent::MsgFromClient {
                    client_id: c,
                    msg: SignalingMsg::JoinRoom {
                        room_id: "R1".into(),
                    },
                })
                .unwrap();
        }
        assert!(matches!(
            rx1.recv_timeout(wait).unwrap(),
            SignalingMsg::AllUsers { .. }
        ));
        assert!(matches!(
            rx2.recv_timeout(wait).unwrap(),
            SignalingMsg::AllUsers { .. }
        ));

        ev_tx
            .send(ServerEvent::Disconnected { client_id: 1 })
            .unwrap();
        assert_eq!(
            rx2.recv_timeout(wait).unwrap(),
            SignalingMsg::PeerLeft { session_id: s1 }
        );
    }

    #[test]
    fn rejected_client_gets_error_then_channel_closes() {
        let (ev_tx, ev_rx) = mpsc::channel::<ServerEvent>();
        let log = Arc::new(NoopLogSink);
        thread::spawn(move || {
            let engine = ServerEngine::with_log_and_origins(
                log.clone(),
                OriginPolicy::AllowList(vec!["https://ok".into()]),
            );
            run_server_loop(engine, log, ev_rx);
        });

        let rx = register(&ev_tx, 5);
        ev_tx.send(hello(5, "https://nope")).unwrap();

        let wait = Duration::from_millis(500);
        assert_eq!(
            rx.recv_timeout(wait).unwrap(),
            SignalingMsg::HelloErr {
                code: HelloErrorCode::OriginNotAllowed.as_u16()
            }
        );
        assert!(matches!(
            rx.recv_timeout(wait),
            Err(mpsc::RecvTimeoutError::Disconnected)
        ));
    }
}
