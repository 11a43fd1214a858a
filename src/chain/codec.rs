//! Text codec: record bytes in, decoded text out, and the inverse.
//!
//! Decode failure policy: reject. A record that does not decode yields a
//! [`DecodeError`] and the caller synthesizes an error reply for that
//! record only; the connection stays open. Substitution-on-decode was the
//! alternative and is deliberately not used.

use thiserror::Error;

/// A record that could not be decoded under the configured encoding.
///
/// Record-scoped: never fatal to the connection or the server.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot decode record as {encoding}")]
pub struct DecodeError {
    pub encoding: &'static str,
}

/// Converts between record bytes and text.
pub trait Codec: Send {
    /// Decode one record into text.
    fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError>;

    /// Encode reply text into record bytes.
    ///
    /// Must round-trip unambiguously for any text this codec can produce
    /// from `decode`.
    fn encode(&self, text: &str) -> Vec<u8>;
}

/// Byte-preserving 1:1 codec (ISO-8859-1). Decoding never fails.
///
/// Characters above U+00FF cannot be represented on encode and are
/// replaced with `?`.
pub struct Latin1Codec;

impl Codec for Latin1Codec {
    fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        Ok(bytes.iter().map(|&b| b as char).collect())
    }

    fn encode(&self, text: &str) -> Vec<u8> {
        text.chars()
            .map(|c| if (c as u32) <= 0xFF { c as u8 } else { b'?' })
            .collect()
    }
}

/// Strict UTF-8 codec. Malformed sequences are rejected per record.
pub struct Utf8Codec;

impl Codec for Utf8Codec {
    fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError { encoding: "utf-8" })
    }

    fn encode(&self, text: &str) -> Vec<u8> {
        text.as_bytes().to_vec()
    }
}
