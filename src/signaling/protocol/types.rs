/// Relay-assigned identifier of one connected client (UUID v4 text).
pub type SessionId = String;

/// Opaque room name chosen by clients.
pub type RoomId = String;
