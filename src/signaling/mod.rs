//! Room-based signaling relay: session ids, room membership and
//! offer/answer/candidate forwarding between members of the same room.
pub mod errors;
pub mod presence;
pub mod protocol;
pub mod rooms;
pub mod run;
pub mod runtime;
pub mod server_engine;
pub mod server_event;
pub mod signaling_server;
pub mod transport;
pub mod types;

pub use server_engine::ServerEngine;
pub use signaling_server::SignalingServer;
