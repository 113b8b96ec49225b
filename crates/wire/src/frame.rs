//! Length-prefixed MessagePack framing
//!
//! ## Frame Format
//!
//! ```text
//! +----------------+----------------------+
//! | len: u32 (LE)  | body: [u8; len]      |
//! +----------------+----------------------+
//! ```
//!
//! The body is the MessagePack encoding of one message. A stream that ends
//! exactly on a frame boundary is a clean end of session; anything else
//! that cannot be decoded is a protocol error.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{self, Read, Write};
use tally_core::{Error, Result};

/// Largest accepted frame body, in bytes
pub const MAX_FRAME_LEN: u32 = 1 << 20;

const LEN_PREFIX: usize = 4;

/// Encode `msg` and write it as one frame, then flush
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, msg: &T) -> Result<()> {
    let body = rmp_serde::to_vec_named(msg)
        .map_err(|e| Error::Serialization(format!("failed to encode message: {}", e)))?;
    if body.len() > MAX_FRAME_LEN as usize {
        return Err(Error::Serialization(format!(
            "message of {} bytes exceeds frame limit",
            body.len()
        )));
    }

    writer.write_u32::<LittleEndian>(body.len() as u32)?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame and decode it
///
/// Returns `Ok(None)` when the stream ends before the first byte of a frame.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>> {
    let mut prefix = [0u8; LEN_PREFIX];
    if !read_prefix(reader, &mut prefix)? {
        return Ok(None);
    }

    let len = LittleEndian::read_u32(&prefix);
    if len > MAX_FRAME_LEN {
        return Err(Error::protocol(format!(
            "frame of {} bytes exceeds limit of {}",
            len, MAX_FRAME_LEN
        )));
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body)?;
    rmp_serde::from_slice(&body)
        .map(Some)
        .map_err(|e| Error::protocol(format!("undecodable message: {}", e)))
}

/// Fill `prefix`, returning false on EOF before any byte arrived
fn read_prefix<R: Read>(reader: &mut R, prefix: &mut [u8; LEN_PREFIX]) -> Result<bool> {
    let mut filled = 0;
    while filled < LEN_PREFIX {
        match reader.read(&mut prefix[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended inside frame header",
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}
