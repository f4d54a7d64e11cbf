//! Capture device that records requests and mints tracks on demand.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::media::capture::{CaptureDevice, CaptureRequestId, CaptureStream, MediaConstraints};
use crate::media::track::{LocalTrack, TrackId, TrackSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureRequest {
    UserMedia {
        request: CaptureRequestId,
        constraints: MediaConstraints,
    },
    Display {
        request: CaptureRequestId,
    },
}

#[derive(Debug, Default)]
struct DeviceState {
    next_track: TrackId,
    requests: Vec<CaptureRequest>,
    released: Vec<TrackId>,
}

/// Cloneable: every clone sees the same request log.
#[derive(Debug, Clone, Default)]
pub struct MockCaptureDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl MockCaptureDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn requests(&self) -> Vec<CaptureRequest> {
        self.lock().requests.clone()
    }

    pub fn last_request(&self) -> Option<CaptureRequest> {
        self.lock().requests.last().copied()
    }

    pub fn released(&self) -> Vec<TrackId> {
        self.lock().released.clone()
    }

    pub fn track(&self, source: TrackSource) -> Arc<LocalTrack> {
        let mut st = self.lock();
        st.next_track += 1;
        let id = st.next_track;
        let label = match source {
            TrackSource::Microphone => format!("mic-{id}"),
            TrackSource::Camera => format!("camera-{id}"),
            TrackSource::Screen => format!("screen-{id}"),
        };
        Arc::new(LocalTrack::new(id, source, label))
    }

    /// A stream satisfying `constraints`.
    pub fn stream(&self, constraints: MediaConstraints) -> CaptureStream {
        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(self.track(TrackSource::Microphone));
        }
        if constraints.video {
            tracks.push(self.track(TrackSource::Camera));
        }
        CaptureStream { tracks }
    }
}

impl CaptureDevice for MockCaptureDevice {
    fn request_user_media(&mut self, request: CaptureRequestId, constraints: MediaConstraints) {
        self.lock().requests.push(CaptureRequest::UserMedia {
            request,
            constraints,
        });
    }

    fn request_display_media(&mut self, request: CaptureRequestId) {
        self.lock()
            .requests
            .push(CaptureRequest::Display { request });
    }

    fn release(&mut self, track: &LocalTrack) {
        self.lock().released.push(track.id());
    }
}
