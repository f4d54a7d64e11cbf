//! Local capture stream and its propagation onto every peer link.
pub mod capture;
pub mod mock;
pub mod synchronizer;
pub mod track;

pub use capture::{
    CaptureDevice, CaptureError, CaptureEvent, CaptureRequestId, CaptureStream, MediaConstraints,
};
pub use synchronizer::{MediaSynchronizer, RenegotiationPolicy};
pub use track::{LocalTrack, OutgoingTracks, TrackId, TrackKind, TrackSource};
