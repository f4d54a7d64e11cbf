use std::sync::Arc;

use crate::log::log_sink::LogSink;
use crate::media::capture::{
    CaptureDevice, CaptureError, CaptureRequestId, CaptureStream, MediaConstraints,
};
use crate::media::track::{LocalTrack, OutgoingTracks, TrackId, TrackKind};
use crate::mesh::MeshCoordinator;
use crate::{sink_debug, sink_info, sink_warn};

/// When a local media change triggers a new offer on a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenegotiationPolicy {
    /// Every change, including same-kind replacement.
    #[default]
    Always,
    /// Only when a track kind was added or removed.
    OnTopologyChange,
}

impl RenegotiationPolicy {
    pub fn should_renegotiate(self, changed: bool, topology: bool) -> bool {
        match self {
            RenegotiationPolicy::Always => changed,
            RenegotiationPolicy::OnTopologyChange => topology,
        }
    }
}

/// Owns the local capture stream (microphone, camera, screen) and mirrors
/// it onto every peer link.
///
/// Acquisitions are asynchronous: a request id is handed out and the
/// completion is applied only if it is still the latest request of its kind.
/// Anything older is stale and its tracks are stopped on arrival.
pub struct MediaSynchronizer {
    device: Box<dyn CaptureDevice>,
    policy: RenegotiationPolicy,
    next_request: CaptureRequestId,
    audio: Option<Arc<LocalTrack>>,
    camera: Option<Arc<LocalTrack>>,
    /// When set, feeds the video slot instead of `camera`.
    screen: Option<Arc<LocalTrack>>,
    pending_user_media: Option<CaptureRequestId>,
    pending_display: Option<CaptureRequestId>,
    muted: bool,
    log: Arc<dyn LogSink>,
}

impl MediaSynchronizer {
    pub fn new(
        device: Box<dyn CaptureDevice>,
        policy: RenegotiationPolicy,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            device,
            policy,
            next_request: 0,
            audio: None,
            camera: None,
            screen: None,
            pending_user_media: None,
            pending_display: None,
            muted: false,
            log,
        }
    }

    /// What every link should be sending right now.
    pub fn outgoing(&self) -> OutgoingTracks {
        OutgoingTracks {
            audio: self.audio.clone(),
            video: self.screen.clone().or_else(|| self.camera.clone()),
        }
    }

    pub fn policy(&self) -> RenegotiationPolicy {
        self.policy
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_screen_sharing(&self) -> bool {
        self.screen.is_some()
    }

    pub fn has_camera(&self) -> bool {
        self.camera.is_some()
    }

    fn next_request_id(&mut self) -> CaptureRequestId {
        self.next_request += 1;
        self.next_request
    }

    // ---- Camera / microphone -------------------------------------------

    /// Re-acquires the capture stream with audio and, if `enabled`, video.
    /// A newer call supersedes an acquisition still in flight.
    pub fn set_video_enabled(&mut self, enabled: bool) -> CaptureRequestId {
        let request = self.next_request_id();
        self.pending_user_media = Some(request);
        sink_debug!(
            self.log,
            "requesting user media #{} (video={})",
            request,
            enabled
        );
        self.device.request_user_media(
            request,
            MediaConstraints {
                audio: true,
                video: enabled,
            },
        );
        request
    }

    /// Completion of [`set_video_enabled`](Self::set_video_enabled).
    ///
    /// Returns `Ok(true)` when the new stream was installed, `Ok(false)` for a
    /// stale completion. On error the previous stream stays as it was.
    pub fn on_user_media(
        &mut self,
        request: CaptureRequestId,
        result: Result<CaptureStream, CaptureError>,
        mesh: &mut MeshCoordinator,
    ) -> Result<bool, CaptureError> {
        if self.pending_user_media != Some(request) {
            sink_debug!(self.log, "stale user media #{} discarded", request);
            if let Ok(stream) = result {
                for t in &stream.tracks {
                    self.stop_track(t);
                }
            }
            return Ok(false);
        }
        self.pending_user_media = None;

        let stream = result.inspect_err(|e| {
            sink_warn!(self.log, "user media #{} failed: {}", request, e);
        })?;

        let new_audio = stream.track(TrackKind::Audio).cloned();
        let new_camera = stream.track(TrackKind::Video).cloned();
        if let Some(a) = &new_audio {
            a.set_enabled(!self.muted);
        }

        let old_audio = std::mem::replace(&mut self.audio, new_audio);
        let old_camera = std::mem::replace(&mut self.camera, new_camera);

        let renegotiated = mesh.sync_outgoing_tracks(&self.outgoing(), self.policy);
        sink_info!(
            self.log,
            "capture stream replaced (audio={}, video={}); {} link(s) renegotiating",
            self.audio.is_some(),
            self.camera.is_some(),
            renegotiated
        );

        for t in old_audio.iter().chain(old_camera.iter()) {
            self.stop_track(t);
        }
        for t in &stream.tracks {
            if !self.owns(t) {
                self.stop_track(t);
            }
        }
        Ok(true)
    }

    /// Flips the microphone's `enabled` flag. No renegotiation. Returns the
    /// new muted state.
    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        if let Some(a) = &self.audio {
            a.set_enabled(!self.muted);
        }
        self.muted
    }

    /// Flips the camera track's `enabled` flag without re-acquiring it.
    /// Returns the new state, or `None` without a camera.
    pub fn toggle_video_enabled(&mut self) -> Option<bool> {
        let cam = self.camera.as_ref()?;
        let enabled = !cam.is_enabled();
        cam.set_enabled(enabled);
        Some(enabled)
    }

    // ---- Screen share ------------------------------------------------------

    /// Requests a display track. `None` if already sharing or a request
    /// is in flight.
    pub fn start_screen_share(&mut self) -> Option<CaptureRequestId> {
        if self.screen.is_some() || self.pending_display.is_some() {
            sink_debug!(self.log, "screen share already active or pending");
            return None;
        }
        let request = self.next_request_id();
        self.pending_display = Some(request);
        self.device.request_display_media(request);
        Some(request)
    }

    pub fn on_display_media(
        &mut self,
        request: CaptureRequestId,
        result: Result<Arc<LocalTrack>, CaptureError>,
        mesh: &mut MeshCoordinator,
    ) -> Result<bool, CaptureError> {
        if self.pending_display != Some(request) || self.screen.is_some() {
            sink_debug!(self.log, "stale display media #{} discarded", request);
            if let Ok(track) = result {
                self.stop_track(&track);
            }
            return Ok(false);
        }
        self.pending_display = None;

        let track = result.inspect_err(|e| {
            sink_warn!(self.log, "display media #{} failed: {}", request, e);
        })?;
        self.screen = Some(track);
        let n = mesh.sync_outgoing_tracks(&self.outgoing(), self.policy);
        sink_info!(self.log, "screen share started; {} link(s) renegotiating", n);
        Ok(true)
    }

    /// Puts the camera back on every link. Returns `false` if not sharing.
    pub fn stop_screen_share(&mut self, mesh: &mut MeshCoordinator) -> bool {
        // a request still in flight becomes stale
        self.pending_display = None;
        let Some(screen) = self.screen.take() else {
            return false;
        };
        let n = mesh.sync_outgoing_tracks(&self.outgoing(), self.policy);
        self.stop_track(&screen);
        sink_info!(self.log, "screen share stopped; {} link(s) renegotiating", n);
        true
    }

    /// A capture source ended on its own. A revoked screen share is handled
    /// exactly like [`stop_screen_share`](Self::stop_screen_share); a lost
    /// camera or microphone leaves its slot empty.
    pub fn on_track_ended(&mut self, track_id: TrackId, mesh: &mut MeshCoordinator) -> bool {
        let is = |slot: &Option<Arc<LocalTrack>>| slot.as_ref().is_some_and(|t| t.id() == track_id);

        if is(&self.screen) {
            return self.stop_screen_share(mesh);
        }
        let lost = if is(&self.camera) {
            self.camera.take()
        } else if is(&self.audio) {
            self.audio.take()
        } else {
            return false;
        };
        if let Some(t) = lost {
            sink_warn!(self.log, "{} track {} ended", t.kind(), t.label());
            mesh.sync_outgoing_tracks(&self.outgoing(), self.policy);
            self.stop_track(&t);
        }
        true
    }

    /// Stops every local track and forgets pending acquisitions (room exit).
    pub fn stop_all(&mut self) {
        self.pending_user_media = None;
        self.pending_display = None;
        let tracks: Vec<Arc<LocalTrack>> = [self.audio.take(), self.camera.take(), self.screen.take()]
            .into_iter()
            .flatten()
            .collect();
        for t in &tracks {
            self.stop_track(t);
        }
    }

    fn owns(&self, track: &Arc<LocalTrack>) -> bool {
        [&self.audio, &self.camera, &self.screen]
            .into_iter()
            .flatten()
            .any(|t| Arc::ptr_eq(t, track))
    }

    fn stop_track(&mut self, track: &LocalTrack) {
        if track.stop() {
            self.device.release(track);
        }
    }
}
