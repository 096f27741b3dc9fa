//! DNS message parsing and construction.
//!
//! Only the parts needed to forward and cache responses are decoded: the
//! header, the question section, and the answer section. Responses are
//! relayed as opaque bytes, so encoding exists mainly to build packets in
//! tests and benchmarks.

pub mod message;
pub mod name;

pub use message::{Answer, HEADER_LEN, Header, Message, Question, rewrite_id};
pub use name::{decode_name, encode_name};

use crate::error::DecodeError;

/// Record type A (IPv4 host address).
pub const TYPE_A: u16 = 1;
/// Record type AAAA (IPv6 host address).
pub const TYPE_AAAA: u16 = 28;
/// Class IN (Internet).
pub const CLASS_IN: u16 = 1;

/// Borrow `needed` bytes starting at `offset`, or fail with `Truncated`.
fn take(buf: &[u8], offset: usize, needed: usize) -> Result<&[u8], DecodeError> {
    offset
        .checked_add(needed)
        .and_then(|end| buf.get(offset..end))
        .ok_or(DecodeError::Truncated {
            offset,
            needed,
            len: buf.len(),
        })
}

fn read_u16(buf: &[u8], offset: usize) -> Result<u16, DecodeError> {
    let b = take(buf, offset, 2)?;
    Ok(u16::from_be_bytes([b[0], b[1]]))
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, DecodeError> {
    let b = take(buf, offset, 4)?;
    Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}
