//! Error types for the proxy.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for proxy operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A DNS message could not be decoded.
///
/// Every variant carries the byte offset where decoding stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("message truncated at offset {offset}: need {needed} bytes, message is {len} bytes")]
    Truncated {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("compression pointer at offset {offset} targets {target}, past end of message")]
    PointerOutOfBounds { offset: usize, target: usize },

    #[error("too many compression pointers in name at offset {offset}")]
    PointerLoop { offset: usize },

    #[error("reserved label type {byte:#04x} at offset {offset}")]
    BadLabelType { offset: usize, byte: u8 },

    #[error("non-ASCII label at offset {offset}")]
    NonAscii { offset: usize },

    #[error("name at offset {offset} is longer than 255 bytes")]
    NameTooLong { offset: usize },
}

/// A domain name could not be encoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("label `{0}` is longer than 63 bytes")]
    LabelTooLong(String),

    #[error("empty label in `{0}`")]
    EmptyLabel(String),

    #[error("name `{0}` is not ASCII")]
    NonAscii(String),
}

/// Errors that can occur while proxying a query.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed DNS message: {0}")]
    Decode(#[from] DecodeError),

    #[error("cannot encode DNS name: {0}")]
    Encode(#[from] EncodeError),

    #[error("no reply from upstream {upstream} within {timeout:?}")]
    UpstreamTimeout {
        upstream: SocketAddr,
        timeout: Duration,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
