use std::fmt;
use std::sync::Arc;

use crate::media::track::{LocalTrack, TrackId, TrackKind};

pub type CaptureRequestId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

/// Tracks produced by one user-media acquisition.
#[derive(Debug, Clone, Default)]
pub struct CaptureStream {
    pub tracks: Vec<Arc<LocalTrack>>,
}

impl CaptureStream {
    pub fn track(&self, kind: TrackKind) -> Option<&Arc<LocalTrack>> {
        self.tracks.iter().find(|t| t.kind() == kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    PermissionDenied,
    DeviceUnavailable(String),
    /// The user dismissed the picker (display capture).
    Cancelled,
    Other(String),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::PermissionDenied => write!(f, "capture permission denied"),
            CaptureError::DeviceUnavailable(d) => write!(f, "capture device unavailable: {d}"),
            CaptureError::Cancelled => write!(f, "capture cancelled"),
            CaptureError::Other(e) => write!(f, "capture failed: {e}"),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Completions delivered back to the session event loop.
#[derive(Debug)]
pub enum CaptureEvent {
    UserMedia {
        request: CaptureRequestId,
        result: Result<CaptureStream, CaptureError>,
    },
    DisplayMedia {
        request: CaptureRequestId,
        result: Result<Arc<LocalTrack>, CaptureError>,
    },
    /// The capture source ended on its own (e.g. sharing revoked from the OS).
    Ended { track_id: TrackId },
}

/// Camera/microphone/screen access. Requests return immediately; the
/// outcome arrives later as a [`CaptureEvent`] carrying the same request id.
pub trait CaptureDevice: Send {
    fn request_user_media(&mut self, request: CaptureRequestId, constraints: MediaConstraints);
    fn request_display_media(&mut self, request: CaptureRequestId);
    /// Frees the hardware behind a track that has been stopped.
    fn release(&mut self, track: &LocalTrack);
}
