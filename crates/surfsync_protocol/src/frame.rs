//! Length-prefixed framing.
//!
//! Each frame is a 4-byte big-endian payload length followed by the payload.

use crate::error::{ProtocolError, ProtocolResult};
use std::io::{Read, Write};

/// Default upper bound on a frame payload (64 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Writes one frame and flushes the writer.
pub fn write_frame<W: Write>(w: &mut W, payload: &[u8]) -> ProtocolResult<()> {
    let len = u32::try_from(payload.len()).map_err(|_| ProtocolError::FrameTooLarge {
        size: payload.len(),
        limit: u32::MAX as usize,
    })?;
    w.write_all(&len.to_be_bytes())?;
    w.write_all(payload)?;
    w.flush()?;
    Ok(())
}

/// Reads one frame, rejecting payloads larger than `max_size`.
pub fn read_frame<R: Read>(r: &mut R, max_size: usize) -> ProtocolResult<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_size {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            limit: max_size,
        });
    }
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)?;
    Ok(payload)
}
