//! Client-side mesh: one negotiated peer link per remote session in the room.
pub mod coordinator;
pub mod errors;
pub mod link_state;
pub mod mock;
pub mod peer_link;
pub mod registry;
pub mod transport;

pub use coordinator::{CloseReason, FILE_CHANNEL_LABEL, MeshCoordinator, MeshEvent};
pub use errors::NegotiationError;
pub use link_state::{LinkState, Role};
pub use registry::{PeerEntry, PeerRegistry};
pub use transport::{
    DataChannel, DataMessage, IceCandidate, PeerConnection, PeerConnectionFactory, PeerEvent,
    SdpKind, SessionDescription,
};
