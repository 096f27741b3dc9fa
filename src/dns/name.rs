//! Domain name wire format (RFC 1035 section 4.1.4).

use super::take;
use crate::error::{DecodeError, EncodeError};

/// Longest label allowed on the wire.
pub const MAX_LABEL_LEN: usize = 63;

/// Longest name allowed on the wire, counting length bytes and the root.
pub const MAX_NAME_LEN: usize = 255;

const LABEL_TYPE_MASK: u8 = 0xC0;
const POINTER_OFFSET_MASK: u16 = 0x3FFF;

/// Upper bound on pointers followed while decoding one name.
const MAX_POINTER_HOPS: usize = 64;

/// Decode the name starting at `offset`.
///
/// Returns the dotted name and the offset just past it in the original
/// position. When the name ends in a compression pointer, that is the byte
/// after the 2-byte pointer, however long the name it points to.
/// The root name decodes to an empty string.
pub fn decode_name(buf: &[u8], offset: usize) -> Result<(String, usize), DecodeError> {
    let mut labels: Vec<&str> = Vec::new();
    let mut pos = offset;
    let mut resume_at = None;
    let mut hops = 0;
    // Root byte.
    let mut wire_len = 1;

    loop {
        let len = take(buf, pos, 1)?[0];

        match len & LABEL_TYPE_MASK {
            LABEL_TYPE_MASK => {
                let ptr = take(buf, pos, 2)?;
                let target = (u16::from_be_bytes([ptr[0], ptr[1]]) & POINTER_OFFSET_MASK) as usize;
                if target >= buf.len() {
                    return Err(DecodeError::PointerOutOfBounds {
                        offset: pos,
                        target,
                    });
                }

                hops += 1;
                if hops > MAX_POINTER_HOPS {
                    return Err(DecodeError::PointerLoop { offset });
                }

                resume_at.get_or_insert(pos + 2);
                pos = target;
            }
            0 => {
                pos += 1;
                if len == 0 {
                    break;
                }

                wire_len += 1 + len as usize;
                if wire_len > MAX_NAME_LEN {
                    return Err(DecodeError::NameTooLong { offset });
                }

                let bytes = take(buf, pos, len as usize)?;
                if !bytes.is_ascii() {
                    return Err(DecodeError::NonAscii { offset: pos });
                }
                let label =
                    std::str::from_utf8(bytes).map_err(|_| DecodeError::NonAscii { offset: pos })?;
                labels.push(label);
                pos += bytes.len();
            }
            _ => {
                return Err(DecodeError::BadLabelType {
                    offset: pos,
                    byte: len,
                });
            }
        }
    }

    Ok((labels.join("."), resume_at.unwrap_or(pos)))
}

/// Append `name` to `buf` as uncompressed labels plus the root byte.
///
/// A trailing dot is accepted. `""` and `"."` encode the root name.
/// Nothing is written if the name is invalid.
pub fn encode_name(buf: &mut Vec<u8>, name: &str) -> Result<(), EncodeError> {
    if !name.is_ascii() {
        return Err(EncodeError::NonAscii(name.to_string()));
    }

    let name = name.strip_suffix('.').unwrap_or(name);
    let labels: Vec<&str> = if name.is_empty() {
        Vec::new()
    } else {
        name.split('.').collect()
    };

    for label in &labels {
        if label.is_empty() {
            return Err(EncodeError::EmptyLabel(name.to_string()));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(EncodeError::LabelTooLong(label.to_string()));
        }
    }

    for label in labels {
        buf.push(label.len() as u8);
        buf.extend_from_slice(label.as_bytes());
    }
    buf.push(0);

    Ok(())
}
