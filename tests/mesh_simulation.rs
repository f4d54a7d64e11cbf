#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Whole-room scenarios: an in-process relay engine wired to several
//! `MeshSession`s that use the in-memory peer connection and capture adapters.
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};

use bytes::Bytes;

use meshrtc::config::{MeshSettings, TransferSettings};
use meshrtc::log::NoopLogSink;
use meshrtc::media::mock::{CaptureRequest, MockCaptureDevice};
use meshrtc::media::{CaptureEvent, TrackSource};
use meshrtc::mesh::mock::{MockChannelProbe, MockDataChannel, MockFactory};
use meshrtc::mesh::{DataMessage, FILE_CHANNEL_LABEL, LinkState, PeerEvent, Role};
use meshrtc::session::{ClientEvent, MeshSession, SessionCommand, SessionNotice};
use meshrtc::signaling::ServerEngine;
use meshrtc::signaling::protocol::{SessionId, SignalingMsg};
use meshrtc::signaling::types::{ClientId, OutgoingMsg};
use meshrtc::signaling_client::SignalingEvent;

struct Participant {
    id: SessionId,
    client_id: ClientId,
    session: MeshSession,
    wire: Receiver<SignalingMsg>,
    factory: MockFactory,
    device: MockCaptureDevice,
    notices: Vec<SessionNotice>,
}

struct Room {
    relay: ServerEngine,
    people: Vec<Participant>,
    transfer: TransferSettings,
}

impl Room {
    fn new() -> Self {
        Self::with_transfer(TransferSettings::default())
    }

    fn with_transfer(transfer: TransferSettings) -> Self {
        Self {
            relay: ServerEngine::new(),
            people: Vec::new(),
            transfer,
        }
    }

    /// Connects a participant to the relay and joins it to "R1".
    fn join(&mut self) -> usize {
        let client_id = self.people.len() as ClientId + 1;
        let welcome = self.relay.handle(
            client_id,
            SignalingMsg::Hello {
                client_version: "test".into(),
                origin: "http://localhost".into(),
            },
        );
        let id = match &welcome[..] {
            [OutgoingMsg {
                msg: SignalingMsg::Welcome { session_id },
                ..
            }] => session_id.clone(),
            other => panic!("expected Welcome, got {other:?}"),
        };

        let (tx, rx) = mpsc::channel();
        let factory = MockFactory::new();
        let device = MockCaptureDevice::new();
        let session = MeshSession::new(
            id.clone(),
            Arc::new(tx),
            Box::new(factory.clone()),
            Box::new(device.clone()),
            MeshSettings::default(),
            self.transfer.clone(),
            Arc::new(NoopLogSink),
        );
        self.people.push(Participant {
            id,
            client_id,
            session,
            wire: rx,
            factory,
            device,
            notices: Vec::new(),
        });
        let idx = self.people.len() - 1;
        self.command(idx, SessionCommand::JoinRoom("R1".into()));
        idx
    }

    fn deliver(&mut self, idx: usize, ev: ClientEvent) {
        let p = &mut self.people[idx];
        let notices = p.session.handle(ev);
        p.notices.extend(notices);
        self.settle();
    }

    fn command(&mut self, idx: usize, cmd: SessionCommand) {
        self.deliver(idx, cmd.into());
    }

    fn peer_event(&mut self, idx: usize, from: usize, event: PeerEvent) {
        let remote_id = self.people[from].id.clone();
        self.deliver(idx, ClientEvent::Peer { remote_id, event });
    }

    /// Moves relay traffic until nobody has anything left to send.
    fn settle(&mut self) {
        loop {
            let mut moved = false;
            for i in 0..self.people.len() {
                let sent: Vec<SignalingMsg> = self.people[i].wire.try_iter().collect();
                let from = self.people[i].client_id;
                for msg in sent {
                    moved = true;
                    for out in self.relay.handle(from, msg) {
                        let target = self
                            .people
                            .iter()
                            .position(|p| p.client_id == out.client_id_target)
                            .unwrap();
                        let p = &mut self.people[target];
                        let notices = p.session.handle(SignalingEvent::Message(out.msg).into());
                        p.notices.extend(notices);
                    }
                }
            }
            if !moved {
                break;
            }
        }
    }

    /// Completes the participant's latest capture request.
    fn grant_capture(&mut self, idx: usize) {
        let device = self.people[idx].device.clone();
        let ev = match device.last_request().unwrap() {
            CaptureRequest::UserMedia {
                request,
                constraints,
            } => CaptureEvent::UserMedia {
                request,
                result: Ok(device.stream(constraints)),
            },
            CaptureRequest::Display { request } => CaptureEvent::DisplayMedia {
                request,
                result: Ok(device.track(TrackSource::Screen)),
            },
        };
        self.deliver(idx, ev.into());
    }

    /// Latest description `observer` applied from `sender`.
    fn last_remote_sdp(&self, observer: usize, sender: usize) -> String {
        let pc = self.people[observer]
            .factory
            .probe(&self.people[sender].id)
            .unwrap();
        pc.remote_descriptions().last().unwrap().sdp.clone()
    }

    fn assert_full_mesh_stable(&self) {
        for p in &self.people {
            assert_eq!(p.session.mesh().peer_ids().len(), self.people.len() - 1);
            for q in self.people.iter().filter(|q| q.id != p.id) {
                assert_eq!(
                    p.session.mesh().link_state(&q.id),
                    Some(LinkState::Stable),
                    "{} -> {}",
                    p.id,
                    q.id
                );
            }
        }
    }
}

#[test]
fn sequential_joins_build_a_stable_full_mesh() {
    let mut room = Room::new();
    let a = room.join();
    assert!(room.people[a].session.mesh().peer_ids().is_empty());
    assert!(room.people[a].notices.contains(&SessionNotice::JoinedRoom {
        room_id: "R1".into(),
        peers: 0
    }));

    for _ in 0..3 {
        room.join();
    }
    room.assert_full_mesh_stable();

    // later joiners initiate toward everyone already present
    for (i, p) in room.people.iter().enumerate() {
        for (j, q) in room.people.iter().enumerate().filter(|(j, _)| *j != i) {
            let role = p.session.mesh().registry().get(&q.id).unwrap().link.role();
            let expected = if i > j { Role::Initiator } else { Role::Responder };
            assert_eq!(role, expected);
        }
    }
}

#[test]
fn leaving_peer_is_removed_from_everyone() {
    let mut room = Room::new();
    let a = room.join();
    let b = room.join();
    let c = room.join();
    let b_id = room.people[b].id.clone();

    room.command(b, SessionCommand::LeaveRoom);
    for idx in [a, c] {
        assert!(!room.people[idx].session.mesh().peer_ids().contains(&b_id));
        assert!(room.people[idx]
            .notices
            .contains(&SessionNotice::PeerLeft(b_id.clone())));
        assert!(room.people[idx].factory.probe(&b_id).unwrap().is_closed());
    }
    assert!(room.people[b].session.mesh().peer_ids().is_empty());
    assert_eq!(
        room.people[a].session.mesh().link_state(&room.people[c].id),
        Some(LinkState::Stable)
    );
}

#[test]
fn enabling_video_mid_call_renegotiates_without_teardown() {
    let mut room = Room::new();
    let a = room.join();
    let b = room.join();
    assert!(!room.last_remote_sdp(b, a).contains("m=video"));

    room.command(a, SessionCommand::SetVideoEnabled(true));
    room.grant_capture(a);

    room.assert_full_mesh_stable();
    let sdp = room.last_remote_sdp(b, a);
    assert!(sdp.contains("m=video"));
    assert!(sdp.contains("a=msid:camera-"));
    let a_id = room.people[a].id.clone();
    assert!(room.people[b]
        .notices
        .contains(&SessionNotice::Renegotiated(a_id)));
    assert_eq!(room.people[b].factory.created_count(), 1);
}

#[test]
fn screen_share_swaps_the_video_source_and_back() {
    let mut room = Room::new();
    let a = room.join();
    let b = room.join();
    room.command(a, SessionCommand::SetVideoEnabled(true));
    room.grant_capture(a);
    assert!(room.last_remote_sdp(b, a).contains("a=msid:camera-"));

    room.command(a, SessionCommand::StartScreenShare);
    room.grant_capture(a);
    room.assert_full_mesh_stable();
    let sharing = room.last_remote_sdp(b, a);
    assert!(sharing.contains("a=msid:screen-"));
    assert!(!sharing.contains("a=msid:camera-"));

    room.command(a, SessionCommand::StopScreenShare);
    room.assert_full_mesh_stable();
    let restored = room.last_remote_sdp(b, a);
    assert!(restored.contains("a=msid:camera-"));
    assert!(!restored.contains("a=msid:screen-"));
    assert!(room.people[a]
        .notices
        .contains(&SessionNotice::ScreenShareStopped));

    // one connection per side for the whole call
    assert_eq!(room.people[a].factory.created_count(), 1);
    assert_eq!(room.people[b].factory.created_count(), 1);
}

/// Opens the file channel between responder `a` and initiator `b` and
/// returns a's end.
fn open_file_channel(room: &mut Room, a: usize, b: usize) -> MockChannelProbe {
    let a_id = room.people[a].id.clone();
    let b_end = room.people[b].factory.probe(&a_id).unwrap().channels().remove(0);
    b_end.set_open(true);

    let a_end = MockDataChannel::open(FILE_CHANNEL_LABEL);
    let probe = a_end.probe();
    room.peer_event(a, b, PeerEvent::DataChannel(Box::new(a_end)));
    probe
}

fn forward(room: &mut Room, channel: &MockChannelProbe, from: usize, to: usize) {
    for msg in channel.take_sent() {
        room.peer_event(to, from, PeerEvent::Message(msg));
    }
}

fn received(p: &Participant) -> Vec<&SessionNotice> {
    p.notices
        .iter()
        .filter(|n| matches!(n, SessionNotice::FileReceived(_)))
        .collect()
}

#[test]
fn hundred_kib_file_arrives_in_sixteen_kib_chunks() {
    let mut room = Room::new();
    let a = room.join();
    let b = room.join();
    let channel = open_file_channel(&mut room, a, b);

    let data: Vec<u8> = (0..100 * 1024).map(|i| (i % 251) as u8).collect();
    room.command(
        a,
        SessionCommand::SendFile {
            name: "report.pdf".into(),
            data: Bytes::from(data.clone()),
        },
    );

    let sent = channel.sent();
    let chunks: Vec<usize> = sent
        .iter()
        .filter_map(|m| match m {
            DataMessage::Binary(b) => Some(b.len()),
            DataMessage::Text(_) => None,
        })
        .collect();
    assert!(matches!(&sent[0], DataMessage::Text(_)));
    assert_eq!(chunks, vec![16384, 16384, 16384, 16384, 16384, 16384, 4096]);

    forward(&mut room, &channel, a, b);
    let files = received(&room.people[b]);
    assert_eq!(files.len(), 1);
    match files[0] {
        SessionNotice::FileReceived(file) => {
            assert_eq!(file.name, "report.pdf");
            assert_eq!(file.from, room.people[a].id);
            assert_eq!(&file.data[..], &data[..]);
        }
        _ => unreachable!(),
    }
}

#[test]
fn slow_channel_pauses_at_high_water_and_resumes_when_drained() {
    let mut room = Room::with_transfer(TransferSettings {
        chunk_size: 16384,
        buffered_high_water: 32768,
        ..TransferSettings::default()
    });
    let a = room.join();
    let b = room.join();
    let channel = open_file_channel(&mut room, a, b);

    room.command(
        a,
        SessionCommand::SendFile {
            name: "big.bin".into(),
            data: Bytes::from(vec![1u8; 100 * 1024]),
        },
    );
    assert_eq!(channel.binary_bytes(), 32768);

    let mut rounds = 0;
    while channel.binary_bytes() < 100 * 1024 {
        forward(&mut room, &channel, a, b);
        channel.drain_buffer();
        room.peer_event(a, b, PeerEvent::BufferedAmountLow);
        rounds += 1;
        assert!(rounds < 10, "sender never finished");
    }
    forward(&mut room, &channel, a, b);
    assert_eq!(received(&room.people[b]).len(), 1);
}
