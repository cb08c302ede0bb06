//! Protocol decoders for the supported beacon formats.
//!
//! Every decoder takes the payload it was detected on (manufacturer data with
//! its company ID, or service data following its UUID) and either returns a
//! fully populated value or a [`DecodeError`]. Short input never yields a
//! partial result.

pub mod eddystone;
pub mod estimote;
pub mod ibeacon;

use serde::Serializer;
use std::fmt::Write;
use thiserror::Error;

/// Error types for decoding beacon payloads.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Payload ends before the layout does
    #[error("Too short: need {needed} bytes, got {actual}")]
    TooShort { needed: usize, actual: usize },
    /// Frame type or protocol version this crate does not understand
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    /// Bytes are present but not valid for the layout
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Fail with [`DecodeError::TooShort`] unless `data` holds at least `needed` bytes.
pub(crate) fn require(data: &[u8], needed: usize) -> Result<(), DecodeError> {
    if data.len() < needed {
        return Err(DecodeError::TooShort {
            needed,
            actual: data.len(),
        });
    }
    Ok(())
}

pub(crate) fn byte(data: &[u8], at: usize) -> Result<u8, DecodeError> {
    data.get(at).copied().ok_or(DecodeError::TooShort {
        needed: at + 1,
        actual: data.len(),
    })
}

pub(crate) fn array<const N: usize>(data: &[u8], at: usize) -> Result<[u8; N], DecodeError> {
    data.get(at..at + N)
        .and_then(|s| s.try_into().ok())
        .ok_or(DecodeError::TooShort {
            needed: at + N,
            actual: data.len(),
        })
}

/// Upper-case hex without separators.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02X}");
        s
    })
}

pub(crate) fn serialize_hex<T, S>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: AsRef<[u8]>,
    S: Serializer,
{
    serializer.serialize_str(&to_hex(bytes.as_ref()))
}
