use super::{MsgType, ProtoError, SignalingMsg};
use std::str;

// ---- Encode to body bytes -------------------------------------------------

pub fn encode_msg(msg: &SignalingMsg) -> Result<(MsgType, Vec<u8>), ProtoError> {
    use SignalingMsg::*;
    let mut body = Vec::new();

    let msg_type = match msg {
        Hello {
            client_version,
            origin,
        } => {
            put_str16(&mut body, client_version)?;
            put_str16(&mut body, origin)?;
            MsgType::Hello
        }
        Welcome { session_id } => {
            put_str16(&mut body, session_id)?;
            MsgType::Welcome
        }
        HelloErr { code } => {
            put_u16(&mut body, *code);
            MsgType::HelloErr
        }

        JoinRoom { room_id } => {
            put_str16(&mut body, room_id)?;
            MsgType::JoinRoom
        }
        AllUsers {
            room_id,
            session_ids,
        } => {
            put_str16(&mut body, room_id)?;
            let count = u16::try_from(session_ids.len()).map_err(|_| {
                ProtoError::InvalidFormat("too many session ids in AllUsers")
            })?;
            put_u16(&mut body, count);
            for id in session_ids {
                put_str16(&mut body, id)?;
            }
            MsgType::AllUsers
        }
        JoinErr { code } => {
            put_u16(&mut body, *code);
            MsgType::JoinErr
        }
        LeaveRoom => MsgType::LeaveRoom,
        PeerLeft { session_id } => {
            put_str16(&mut body, session_id)?;
            MsgType::PeerLeft
        }

        Offer { from, to, sdp } => {
            put_str16(&mut body, from)?;
            put_str16(&mut body, to)?;
            put_bytes32(&mut body, sdp)?;
            MsgType::Offer
        }
        Answer { from, to, sdp } => {
            put_str16(&mut body, from)?;
            put_str16(&mut body, to)?;
            put_bytes32(&mut body, sdp)?;
            MsgType::Answer
        }
        Ice {
            from,
            to,
            candidate,
        } => {
            put_str16(&mut body, from)?;
            put_str16(&mut body, to)?;
            put_bytes32(&mut body, candidate)?;
            MsgType::Ice
        }

        Ping { nonce } => {
            put_u64(&mut body, *nonce);
            MsgType::Ping
        }
        Pong { nonce } => {
            put_u64(&mut body, *nonce);
            MsgType::Pong
        }
    };

    Ok((msg_type, body))
}

// ---- Decode from body bytes ----------------------------------------------

pub fn decode_msg(msg_type: MsgType, body: &[u8]) -> Result<SignalingMsg, ProtoError> {
    use SignalingMsg::*;
    let mut cursor = Cursor::new(body);

    let msg = match msg_type {
        MsgType::Hello => {
            let client_version = cursor.get_str16()?.to_owned();
            let origin = cursor.get_str16()?.to_owned();
            Hello {
                client_version,
                origin,
            }
        }
        MsgType::Welcome => Welcome {
            session_id: cursor.get_str16()?.to_owned(),
        },
        MsgType::HelloErr => HelloErr {
            code: cursor.get_u16()?,
        },

        MsgType::JoinRoom => JoinRoom {
            room_id: cursor.get_str16()?.to_owned(),
        },
        MsgType::AllUsers => {
            let room_id = cursor.get_str16()?.to_owned();
            let count = cursor.get_u16()? as usize;
            let mut session_ids = Vec::with_capacity(count);
            for _ in 0..count {
                session_ids.push(cursor.get_str16()?.to_owned());
            }
            AllUsers {
                room_id,
                session_ids,
            }
        }
        MsgType::JoinErr => JoinErr {
            code: cursor.get_u16()?,
        },
        MsgType::LeaveRoom => LeaveRoom,
        MsgType::PeerLeft => PeerLeft {
            session_id: cursor.get_str16()?.to_owned(),
        },

        MsgType::Offer => {
            let from = cursor.get_str16()?.to_owned();
            let to = cursor.get_str16()?.to_owned();
            let sdp = cursor.get_bytes32()?.to_vec();
            Offer { from, to, sdp }
        }
        MsgType::Answer => {
            let from = cursor.get_str16()?.to_owned();
            let to = cursor.get_str16()?.to_owned();
            let sdp = cursor.get_bytes32()?.to_vec();
            Answer { from, to, sdp }
        }
        MsgType::Ice => {
            let from = cursor.get_str16()?.to_owned();
            let to = cursor.get_str16()?.to_owned();
            let candidate = cursor.get_bytes32()?.to_vec();
            Ice {
                from,
                to,
                candidate,
            }
        }

        MsgType::Ping => Ping {
            nonce: cursor.get_u64()?,
        },
        MsgType::Pong => Pong {
            nonce: cursor.get_u64()?,
        },
    };

    cursor.finish()?;
    Ok(msg)
}

// ---- Primitive write helpers ---------------------------------------------

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

/// str16 = u16 length + UTF-8 bytes
fn put_str16(buf: &mut Vec<u8>, s: &str) -> Result<(), ProtoError> {
    let bytes = s.as_bytes();
    let len = u16::try_from(bytes.len()).map_err(|_| ProtoError::StringTooLong {
        max: u16::MAX as usize,
        actual: bytes.len(),
    })?;

    put_u16(buf, len);
    buf.extend_from_slice(bytes);
    Ok(())
}

/// bytes32 = u32 length + opaque bytes
fn put_bytes32(buf: &mut Vec<u8>, bytes: &[u8]) -> Result<(), ProtoError> {
    let len = u32::try_from(bytes.len()).map_err(|_| ProtoError::TooLarge {
        max: u32::MAX as usize,
        actual: bytes.len(),
    })?;
    put_u32(buf, len);
    buf.extend_from_slice(bytes);
    Ok(())
}

// ---- Cursor for decoding --------------------------------------------------

#[derive(Debug)]
struct Cursor<'a> {
    buf: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn get_u16(&mut self) -> Result<u16, ProtoError> {
        let b = self.get_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn get_u32(&mut self) -> Result<u32, ProtoError> {
        let b = self.get_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn get_u64(&mut self) -> Result<u64, ProtoError> {
        let b = self.get_bytes(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn get_bytes(&mut self, len: usize) -> Result<&'a [u8], ProtoError> {
        if self.buf.len() < len {
            return Err(ProtoError::Truncated);
        }
        let (head, rest) = self.buf.split_at(len);
        self.buf = rest;
        Ok(head)
    }

    /// Read str16 = u16 length + UTF-8 bytes
    fn get_str16(&mut self) -> Result<&'a str, ProtoError> {
        let len = self.get_u16()? as usize;
        let bytes = self.get_bytes(len)?;
        str::from_utf8(bytes).map_err(|_| ProtoError::InvalidUtf8)
    }

    fn get_bytes32(&mut self) -> Result<&'a [u8], ProtoError> {
        let len = self.get_u32()? as usize;
        self.get_bytes(len)
    }

    /// Enforce that we've consumed the whole body.
    fn finish(self) -> Result<(), ProtoError> {
        if !self.buf.is_empty() {
            Err(ProtoError::InvalidFormat("trailing bytes in message body"))
        } else {
            Ok(())
        }
    }
}
