//! Primitive types shared across the chronicle block-history archive.
//!
//! The archive records, per block, the state every account was left in:
//! existence, balance, nonce, contract code and storage slots. This crate
//! defines the value-level vocabulary for that history — the scalar type
//! aliases, the stored-value codecs, the [`AccountState`] entry and the
//! [`BlockUpdate`]/[`AccountUpdate`] change-set model together with its
//! canonical SHA-256 hashing.

mod account;
mod codec;
mod update;

pub use account::{AccountState, ACCOUNT_STATE_LEN};
pub use codec::{DecodeError, DecodeValue};
pub use update::{chain_hash, AccountUpdate, BlockUpdate, SlotUpdate};

pub use alloy_primitives::{Address, BlockNumber, Bytes, B256, U128};

/// Account balance, stored as a 16-byte big-endian magnitude.
pub type Balance = U128;

/// Account transaction counter, stored as 8 big-endian bytes.
pub type Nonce = u64;

/// A 32-byte key identifying one slot inside an account's storage.
pub type SlotKey = B256;

/// The 32-byte value held in one storage slot.
pub type SlotValue = B256;

/// Number of times an account has been created or deleted.
///
/// Storage keys embed this counter, which is what lets the archive purge a
/// recreated account's old slots logically without deleting them physically.
pub type Reincarnation = u32;

/// Contract bytecode, stored as its raw byte sequence.
pub type Code = Bytes;
