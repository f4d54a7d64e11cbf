//! `MeshSession`: the single-threaded client event loop. Relay messages,
//! peer-connection notifications, capture completions and user commands all
//! arrive on one channel and are handled one at a time.
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::config::{MeshSettings, TransferSettings};
use crate::file_transfer::{self, ReceivedFile};
use crate::log::log_sink::LogSink;
use crate::media::{CaptureDevice, CaptureError, CaptureEvent, MediaSynchronizer, TrackKind};
use crate::mesh::{CloseReason, MeshCoordinator, MeshEvent, PeerConnectionFactory, PeerEvent};
use crate::signaling::protocol::{RoomId, SessionId, SignalingMsg};
use crate::signaling_client::{SignalingEvent, SignalingOutbox};
use crate::{sink_debug, sink_info, sink_warn};

/// How often queued remote candidates are checked for expiry.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(1);

/// User-facing requests.
#[derive(Debug)]
pub enum SessionCommand {
    JoinRoom(RoomId),
    LeaveRoom,
    SetVideoEnabled(bool),
    ToggleMute,
    ToggleVideo,
    StartScreenShare,
    StopScreenShare,
    SendFile { name: String, data: Bytes },
    Shutdown,
}

/// Everything the session loop reacts to.
#[derive(Debug)]
pub enum ClientEvent {
    Signaling(SignalingEvent),
    Peer {
        remote_id: SessionId,
        event: PeerEvent,
    },
    Capture(CaptureEvent),
    Command(SessionCommand),
}

impl From<SignalingEvent> for ClientEvent {
    fn from(ev: SignalingEvent) -> Self {
        ClientEvent::Signaling(ev)
    }
}

impl From<CaptureEvent> for ClientEvent {
    fn from(ev: CaptureEvent) -> Self {
        ClientEvent::Capture(ev)
    }
}

impl From<SessionCommand> for ClientEvent {
    fn from(cmd: SessionCommand) -> Self {
        ClientEvent::Command(cmd)
    }
}

/// State changes worth showing to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    JoinedRoom { room_id: RoomId, peers: usize },
    JoinRejected { code: u16 },
    LeftRoom,
    PeerJoined(SessionId),
    PeerLeft(SessionId),
    PeerFailed { session_id: SessionId, reason: String },
    Renegotiated(SessionId),
    RemoteTrack {
        session_id: SessionId,
        kind: TrackKind,
        label: String,
    },
    FileReceived(ReceivedFile),
    FileQueued { name: String, peers: usize },
    CameraUnavailable(CaptureError),
    ScreenShareUnavailable(CaptureError),
    ScreenShareStopped,
    MuteChanged(bool),
    VideoPaused(bool),
    RelayDisconnected(String),
}

/// One participant: relay connection, mesh and local media.
pub struct MeshSession {
    outbox: Arc<dyn SignalingOutbox>,
    mesh: MeshCoordinator,
    media: MediaSynchronizer,
    transfer: TransferSettings,
    room: Option<RoomId>,
    running: bool,
    log: Arc<dyn LogSink>,
}

impl MeshSession {
    pub fn new(
        local_id: SessionId,
        outbox: Arc<dyn SignalingOutbox>,
        factory: Box<dyn PeerConnectionFactory>,
        device: Box<dyn CaptureDevice>,
        mesh_settings: MeshSettings,
        transfer: TransferSettings,
        log: Arc<dyn LogSink>,
    ) -> Self {
        let media = MediaSynchronizer::new(device, mesh_settings.renegotiation, log.clone());
        let mesh = MeshCoordinator::new(
            local_id,
            outbox.clone(),
            factory,
            mesh_settings,
            log.clone(),
        );
        Self {
            outbox,
            mesh,
            media,
            transfer,
            room: None,
            running: true,
            log,
        }
    }

    /// The channel every producer (signaling client, peer adapter, capture
    /// device, UI) feeds.
    pub fn channel() -> (Sender<ClientEvent>, Receiver<ClientEvent>) {
        mpsc::channel()
    }

    pub fn local_id(&self) -> &SessionId {
        self.mesh.local_id()
    }

    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    pub fn mesh(&self) -> &MeshCoordinator {
        &self.mesh
    }

    pub fn media(&self) -> &MediaSynchronizer {
        &self.media
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Writes a received file under the configured storage directory.
    pub fn save_received(&self, file: &ReceivedFile) -> io::Result<PathBuf> {
        file.save_into(&self.transfer.storage_path)
    }

    /// Blocking loop: handles events until `Shutdown`, relay loss, or every
    /// sender is dropped. Notices go to `notices`.
    pub fn run(mut self, events: Receiver<ClientEvent>, notices: Sender<SessionNotice>) {
        let mut last_housekeeping = Instant::now();
        while self.running {
            match events.recv_timeout(HOUSEKEEPING_INTERVAL) {
                Ok(ev) => {
                    for n in self.handle(ev) {
                        if notices.send(n).is_err() {
                            sink_debug!(self.log, "notice receiver dropped");
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if last_housekeeping.elapsed() >= HOUSEKEEPING_INTERVAL {
                self.housekeeping(Instant::now());
                last_housekeeping = Instant::now();
            }
        }
        self.leave_room();
        sink_info!(self.log, "session {} stopped", self.mesh.local_id());
    }

    /// Periodic work: expire stale queued candidates.
    pub fn housekeeping(&mut self, now: Instant) {
        self.mesh.expire_pending_candidates(now);
    }

    /// Handles one event to completion and returns the resulting notices.
    pub fn handle(&mut self, ev: ClientEvent) -> Vec<SessionNotice> {
        let mut notices = Vec::new();
        match ev {
            ClientEvent::Signaling(SignalingEvent::Message(msg)) => {
                self.on_relay_msg(msg, &mut notices);
            }
            ClientEvent::Signaling(SignalingEvent::Disconnected { reason }) => {
                sink_warn!(self.log, "relay connection lost: {}", reason);
                self.leave_room();
                self.running = false;
                notices.push(SessionNotice::RelayDisconnected(reason));
            }
            ClientEvent::Peer { remote_id, event } => {
                self.on_peer_event(remote_id, event, &mut notices);
            }
            ClientEvent::Capture(ev) => self.on_capture(ev, &mut notices),
            ClientEvent::Command(cmd) => self.on_command(cmd, &mut notices),
        }
        self.collect_mesh_events(&mut notices);
        notices
    }

    fn on_relay_msg(&mut self, msg: SignalingMsg, notices: &mut Vec<SessionNotice>) {
        match msg {
            SignalingMsg::AllUsers {
                room_id,
                session_ids,
            } => {
                let tracks = self.media.outgoing();
                self.mesh.on_all_users(&session_ids, &tracks);
                let peers = session_ids
                    .iter()
                    .filter(|id| *id != self.mesh.local_id())
                    .count();
                sink_info!(self.log, "joined room {} with {} peer(s)", room_id, peers);
                self.room = Some(room_id.clone());
                notices.push(SessionNotice::JoinedRoom { room_id, peers });
            }
            SignalingMsg::JoinErr { code } => {
                sink_warn!(self.log, "join rejected (code {})", code);
                notices.push(SessionNotice::JoinRejected { code });
            }
            SignalingMsg::Offer { from, sdp, .. } => {
                let tracks = self.media.outgoing();
                self.mesh.on_offer(&from, sdp, &tracks);
            }
            SignalingMsg::Answer { from, sdp, .. } => self.mesh.on_answer(&from, sdp),
            SignalingMsg::Ice {
                from, candidate, ..
            } => self.mesh.on_ice(&from, &candidate),
            SignalingMsg::PeerLeft { session_id } => self.mesh.on_peer_left(&session_id),
            other => {
                sink_debug!(self.log, "ignoring relay message {}", other.name());
            }
        }
    }

    fn on_peer_event(
        &mut self,
        remote_id: SessionId,
        event: PeerEvent,
        notices: &mut Vec<SessionNotice>,
    ) {
        match event {
            PeerEvent::LocalCandidate(c) => self.mesh.on_local_candidate(&remote_id, c),
            PeerEvent::RemoteTrack { kind, label } => {
                self.mesh.on_remote_track(&remote_id, kind, label);
            }
            PeerEvent::DataChannel(ch) => {
                let open = ch.is_open();
                self.mesh.on_data_channel(&remote_id, ch);
                if open {
                    self.resume_sending(&remote_id);
                }
            }
            PeerEvent::ChannelOpen | PeerEvent::BufferedAmountLow => {
                self.resume_sending(&remote_id);
            }
            PeerEvent::Message(msg) => {
                match file_transfer::on_channel_message(
                    self.mesh.registry_mut(),
                    &remote_id,
                    msg,
                    &self.log,
                ) {
                    Ok(Some(file)) => {
                        sink_info!(
                            self.log,
                            "received {:?} ({} bytes) from {}",
                            file.name,
                            file.data.len(),
                            file.from
                        );
                        notices.push(SessionNotice::FileReceived(file));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        sink_warn!(self.log, "data from {} dropped: {}", remote_id, e);
                    }
                }
            }
            PeerEvent::ConnectionFailed(reason) => {
                self.mesh.on_connection_failed(&remote_id, reason);
            }
        }
    }

    fn on_capture(&mut self, ev: CaptureEvent, notices: &mut Vec<SessionNotice>) {
        match ev {
            CaptureEvent::UserMedia { request, result } => {
                if let Err(e) = self.media.on_user_media(request, result, &mut self.mesh) {
                    notices.push(SessionNotice::CameraUnavailable(e));
                }
            }
            CaptureEvent::DisplayMedia { request, result } => {
                if let Err(e) = self.media.on_display_media(request, result, &mut self.mesh) {
                    notices.push(SessionNotice::ScreenShareUnavailable(e));
                }
            }
            CaptureEvent::Ended { track_id } => {
                let was_sharing = self.media.is_screen_sharing();
                if self.media.on_track_ended(track_id, &mut self.mesh)
                    && was_sharing
                    && !self.media.is_screen_sharing()
                {
                    notices.push(SessionNotice::ScreenShareStopped);
                }
            }
        }
    }

    fn on_command(&mut self, cmd: SessionCommand, notices: &mut Vec<SessionNotice>) {
        match cmd {
            SessionCommand::JoinRoom(room_id) => {
                if self.room.as_deref() == Some(room_id.as_str()) {
                    sink_debug!(self.log, "already in room {}", room_id);
                    return;
                }
                if self.room.is_some() {
                    // the relay moves us; our links to the old room go now
                    self.mesh.leave();
                }
                self.send(SignalingMsg::JoinRoom { room_id });
            }
            SessionCommand::LeaveRoom => {
                if self.room.is_some() {
                    self.send(SignalingMsg::LeaveRoom);
                    self.leave_room();
                    notices.push(SessionNotice::LeftRoom);
                }
            }
            SessionCommand::SetVideoEnabled(enabled) => {
                self.media.set_video_enabled(enabled);
            }
            SessionCommand::ToggleMute => {
                notices.push(SessionNotice::MuteChanged(self.media.toggle_mute()));
            }
            SessionCommand::ToggleVideo => {
                if let Some(enabled) = self.media.toggle_video_enabled() {
                    notices.push(SessionNotice::VideoPaused(!enabled));
                }
            }
            SessionCommand::StartScreenShare => {
                self.media.start_screen_share();
            }
            SessionCommand::StopScreenShare => {
                if self.media.stop_screen_share(&mut self.mesh) {
                    notices.push(SessionNotice::ScreenShareStopped);
                }
            }
            SessionCommand::SendFile { name, data } => {
                let peers = file_transfer::broadcast_file(
                    self.mesh.registry_mut(),
                    &name,
                    data,
                    &self.transfer,
                    &self.log,
                );
                notices.push(SessionNotice::FileQueued { name, peers });
            }
            SessionCommand::Shutdown => {
                self.running = false;
            }
        }
    }

    fn collect_mesh_events(&mut self, notices: &mut Vec<SessionNotice>) {
        for ev in self.mesh.drain_events() {
            notices.push(match ev {
                MeshEvent::PeerConnected { session_id } => SessionNotice::PeerJoined(session_id),
                MeshEvent::Renegotiated { session_id } => SessionNotice::Renegotiated(session_id),
                MeshEvent::PeerClosed { session_id, reason } => match reason {
                    CloseReason::PeerLeft | CloseReason::LocalLeave => {
                        SessionNotice::PeerLeft(session_id)
                    }
                    CloseReason::NegotiationFailed(reason)
                    | CloseReason::ConnectionFailed(reason) => {
                        SessionNotice::PeerFailed { session_id, reason }
                    }
                },
                MeshEvent::RemoteTrack {
                    session_id,
                    kind,
                    label,
                } => SessionNotice::RemoteTrack {
                    session_id,
                    kind,
                    label,
                },
            });
        }
    }

    fn resume_sending(&mut self, remote_id: &str) {
        file_transfer::resume_sending(
            self.mesh.registry_mut(),
            remote_id,
            &self.transfer,
            &self.log,
        );
    }

    /// Hard exit: close every link and stop local capture.
    fn leave_room(&mut self) {
        if let Some(room) = self.room.take() {
            sink_info!(self.log, "leaving room {}", room);
        }
        self.mesh.leave();
        self.media.stop_all();
    }

    fn send(&self, msg: SignalingMsg) {
        let name = msg.name();
        if let Err(e) = self.outbox.send_signal(msg) {
            sink_warn!(self.log, "could not send {}: {}", name, e);
        }
    }
}
