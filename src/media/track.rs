use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub type TrackId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub const ALL: [TrackKind; 2] = [TrackKind::Audio, TrackKind::Video];
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSource {
    Microphone,
    Camera,
    Screen,
}

impl TrackSource {
    pub fn kind(self) -> TrackKind {
        match self {
            TrackSource::Microphone => TrackKind::Audio,
            TrackSource::Camera | TrackSource::Screen => TrackKind::Video,
        }
    }
}

/// A captured track. Peer connections hold `Arc` references; the media
/// synchronizer is the only owner that stops it.
///
/// `enabled` is read by the media adapter on every frame, so flipping it
/// pauses the flow without touching the connection.
#[derive(Debug)]
pub struct LocalTrack {
    id: TrackId,
    source: TrackSource,
    label: String,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl LocalTrack {
    pub fn new(id: TrackId, source: TrackSource, label: impl Into<String>) -> Self {
        Self {
            id,
            source,
            label: label.into(),
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.source.kind()
    }

    pub fn source(&self) -> TrackSource {
        self.source
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Marks the track ended. Returns `false` if it was already stopped.
    pub fn stop(&self) -> bool {
        !self.stopped.swap(true, Ordering::Relaxed)
    }
}

/// What every peer connection should currently be sending, one slot per kind.
#[derive(Debug, Clone, Default)]
pub struct OutgoingTracks {
    pub audio: Option<Arc<LocalTrack>>,
    pub video: Option<Arc<LocalTrack>>,
}

impl OutgoingTracks {
    pub fn get(&self, kind: TrackKind) -> Option<&Arc<LocalTrack>> {
        match kind {
            TrackKind::Audio => self.audio.as_ref(),
            TrackKind::Video => self.video.as_ref(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<LocalTrack>> {
        self.audio.iter().chain(self.video.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.video.is_none()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn stop_reports_first_call_only() {
        let t = LocalTrack::new(1, TrackSource::Camera, "cam");
        assert_eq!(t.kind(), TrackKind::Video);
        assert!(t.stop());
        assert!(!t.stop());
        assert!(t.is_stopped());
    }

    #[test]
    fn outgoing_slots_by_kind() {
        let mic = Arc::new(LocalTrack::new(1, TrackSource::Microphone, "mic"));
        let screen = Arc::new(LocalTrack::new(2, TrackSource::Screen, "screen"));
        let out = OutgoingTracks {
            audio: Some(mic.clone()),
            video: Some(screen),
        };
        assert!(Arc::ptr_eq(out.get(TrackKind::Audio).unwrap(), &mic));
        assert_eq!(
            out.get(TrackKind::Video).map(|t| t.source()),
            Some(TrackSource::Screen)
        );
        assert_eq!(out.iter().count(), 2);
    }
}
