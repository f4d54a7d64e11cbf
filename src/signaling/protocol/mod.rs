//! Framed binary protocol spoken between mesh clients and the relay.
//!
//! ```text
//! ----------- Header (8B) ----------------------------
//! Version (1B) | Msg Type (1B) | Flags (2B) | Body Length (4B, BE)
//! ----------- Body -----------------------------------
//! Message fields, at most `max_body` bytes
//! ```
pub mod codec;
pub mod constants;
pub mod errors;
pub mod framing;
pub mod msg;
pub mod msg_type;
pub mod types;

use std::io::{Read, Write};

pub use codec::{decode_msg, encode_msg};
pub use constants::{MAX_BODY_LEN, PROTO_VERSION};
pub use errors::{FrameError, ProtoError};
pub use framing::{read_frame, write_frame};
pub use msg::SignalingMsg;
pub use msg_type::MsgType;
pub use types::{RoomId, SessionId};

/// Read one frame and decode it into a message.
pub fn read_msg<R: Read>(r: &mut R, max_body: usize) -> Result<SignalingMsg, FrameError> {
    let (msg_type, body) = read_frame(r, max_body)?;
    Ok(decode_msg(msg_type, &body)?)
}

/// Encode a message and write it as one frame.
pub fn write_msg<W: Write>(w: &mut W, msg: &SignalingMsg) -> Result<(), FrameError> {
    let (msg_type, body) = encode_msg(msg)?;
    write_frame(w, msg_type, &body)?;
    Ok(())
}
