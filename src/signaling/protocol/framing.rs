use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use std::io::{self, Read, Write};

use super::constants::HEADER_LEN;
use super::{FrameError, MsgType, PROTO_VERSION, ProtoError};

/// Write a single frame: [ver][type][reserved u16=0][len u32][body...]
pub fn write_frame<W: Write>(w: &mut W, msg_type: MsgType, body: &[u8]) -> io::Result<()> {
    let len = u32::try_from(body.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "body too large"))?;

    let mut header = Vec::with_capacity(HEADER_LEN);
    header.write_u8(PROTO_VERSION)?;
    header.write_u8(msg_type.as_u8())?;
    header.write_u16::<BigEndian>(0)?;
    header.write_u32::<BigEndian>(len)?;

    w.write_all(&header)?;
    w.write_all(body)?;
    w.flush()?;
    Ok(())
}

/// Read a single frame, enforcing a max body length.
pub fn read_frame<R: Read>(r: &mut R, max_body: usize) -> Result<(MsgType, Vec<u8>), FrameError> {
    let mut header = [0u8; HEADER_LEN];
    r.read_exact(&mut header)?;

    let ver = header[0];
    if ver != PROTO_VERSION {
        return Err(ProtoError::BadVersion(ver).into());
    }

    let msg_type = MsgType::from_u8(header[1])?;

    // flags (header[2..4]) are reserved
    let len = BigEndian::read_u32(&header[4..8]) as usize;
    if len > max_body {
        return Err(ProtoError::TooLarge {
            max: max_body,
            actual: len,
        }
        .into());
    }

    let mut body = vec![0u8; len];
    r.read_exact(&mut body)?;

    Ok((msg_type, body))
}
