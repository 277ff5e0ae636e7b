//! Codecs for values stored in the archive.
//!
//! Every stored value is either fixed-width big-endian (balances, nonces,
//! hashes, slot values, account states) or a raw byte string (code). Reads
//! validate the stored length before decoding; a mismatch means the entry
//! was not written by this codec.

use crate::{Balance, Code, Nonce};
use alloy_primitives::B256;

/// Errors produced when decoding a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The stored byte string has the wrong length for the expected type.
    #[error("invalid value length, expected {expected}, got {got}")]
    UnexpectedLength {
        /// Length the type's encoding requires.
        expected: usize,
        /// Length found in the store.
        got: usize,
    },
}

/// Decoding of a value from its stored byte representation.
///
/// The `Default` bound supplies the zero value returned for entries that
/// were never written.
pub trait DecodeValue: Sized + Default {
    /// Decodes the value, validating the stored length.
    fn decode_value(buf: &[u8]) -> Result<Self, DecodeError>;
}

fn expect_len(buf: &[u8], expected: usize) -> Result<(), DecodeError> {
    if buf.len() == expected {
        Ok(())
    } else {
        Err(DecodeError::UnexpectedLength { expected, got: buf.len() })
    }
}

impl DecodeValue for Balance {
    fn decode_value(buf: &[u8]) -> Result<Self, DecodeError> {
        expect_len(buf, 16)?;
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(buf);
        Ok(Self::from_be_bytes(bytes))
    }
}

impl DecodeValue for Nonce {
    fn decode_value(buf: &[u8]) -> Result<Self, DecodeError> {
        expect_len(buf, 8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(buf);
        Ok(Self::from_be_bytes(bytes))
    }
}

impl DecodeValue for B256 {
    fn decode_value(buf: &[u8]) -> Result<Self, DecodeError> {
        expect_len(buf, 32)?;
        Ok(Self::from_slice(buf))
    }
}

impl DecodeValue for Code {
    fn decode_value(buf: &[u8]) -> Result<Self, DecodeError> {
        Ok(Self::copy_from_slice(buf))
    }
}
