/// Protocol version (first byte in the frame header).
pub const PROTO_VERSION: u8 = 2;

/// Frame header length: `[ver][type][flags u16][body_len u32]`.
pub const HEADER_LEN: usize = 8;

/// Default maximum body size for a frame (to avoid OOM).
pub const MAX_BODY_LEN: usize = 1_048_576; // 1 MiB
