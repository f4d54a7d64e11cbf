//! meshrtc: full-mesh WebRTC rooms bootstrapped by a small signaling relay.
//!
//! It provides:
//! - `signaling_server`: the relay binary (rooms, session ids, directed
//!   offer/answer/candidate forwarding).
//! - `mesh_client`: a signaling dry-run participant built on the in-memory
//!   media adapters.
//!
//! The library side holds the client mesh orchestration; the peer-connection
//! stack and capture devices plug in through traits.

/// INI configuration and typed settings.
pub mod config;
/// Chunked file transfer over peer data channels.
pub mod file_transfer;
/// Leveled logging through a `LogSink` and a background file logger.
pub mod log;
/// Local capture stream and track propagation.
pub mod media;
/// Peer links, their registry and the mesh coordinator.
pub mod mesh;
/// The client event loop.
pub mod session;
/// Signaling relay: wire protocol, rooms, relay engine and TCP runtime.
pub mod signaling;
/// Client connection to the relay.
pub mod signaling_client;
/// Small time helpers shared by the logger.
pub mod utils;
