//! Error types surfaced by the archive.

use chronicle_primitives::{Address, BlockNumber, DecodeError, Reincarnation};
use thiserror::Error;

/// Archive result type.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors returned by archive operations.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The archive was closed and can no longer serve requests.
    #[error("archive is closed")]
    Closed,
    /// `add` was called with a block at or below the current head.
    #[error("unable to insert block {block}, archive already contains block {latest}")]
    OutOfOrder {
        /// The rejected block.
        block: BlockNumber,
        /// The highest block already present.
        latest: BlockNumber,
    },
    /// Stored entries are inconsistent with the key schema or the hash chain.
    #[error("corrupted archive: {0}")]
    Corruption(#[from] CorruptionError),
    /// The underlying key/value store failed.
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<DecodeError> for ArchiveError {
    fn from(err: DecodeError) -> Self {
        Self::Corruption(CorruptionError::Value(err))
    }
}

/// Inconsistencies found in the stored entries.
#[derive(Error, Debug)]
pub enum CorruptionError {
    /// A stored value does not decode to its expected type.
    #[error("stored value has the wrong format: {0}")]
    Value(#[from] DecodeError),
    /// A stored key has the wrong length for its family.
    #[error("stored key has the wrong length, expected {expected}, got {got}")]
    KeyLength {
        /// Length the key family requires.
        expected: usize,
        /// Length found in the store.
        got: usize,
    },
    /// Duplicate or out-of-order entries for one block.
    #[error("multiple updates for block {block}")]
    DuplicateBlock {
        /// The block with conflicting entries.
        block: BlockNumber,
    },
    /// An account state entry does not advance the reincarnation counter by one.
    #[error("reincarnation numbers are not incremental, at block {block} the value moves from {from} to {to}")]
    ReincarnationGap {
        /// The block of the offending entry.
        block: BlockNumber,
        /// Counter value before the entry.
        from: Reincarnation,
        /// Counter value carried by the entry.
        to: Reincarnation,
    },
    /// A storage entry is keyed under the wrong reincarnation.
    #[error("invalid reincarnation for storage value at block {block}, expected {expected}, got {got}")]
    StorageReincarnation {
        /// The block of the offending entry.
        block: BlockNumber,
        /// The reincarnation in effect at that block.
        expected: Reincarnation,
        /// The reincarnation embedded in the key.
        got: Reincarnation,
    },
    /// A stored account hash does not match the recomputed chain.
    #[error("account hash for {address} at block {block} does not match the recomputed chain")]
    AccountHashMismatch {
        /// The account whose chain broke.
        address: Address,
        /// The block at which it broke.
        block: BlockNumber,
    },
    /// A hash entry exists for a block that carries no change.
    #[error("hash recorded for block {block} without a matching change")]
    HashWithoutChange {
        /// The block with the dangling hash.
        block: BlockNumber,
    },
    /// A change exists for a block that carries no hash entry.
    #[error("change recorded for block {block} without a matching hash")]
    ChangeWithoutHash {
        /// The block with the unhashed change.
        block: BlockNumber,
    },
    /// A stored block hash does not match the recomputed chain.
    #[error("block hash at block {block} does not match the recomputed chain")]
    BlockHashMismatch {
        /// The block at which the chain broke.
        block: BlockNumber,
    },
    /// The archive's hash at the target block differs from the expected one.
    #[error("archive hash at block {block} does not match the expected hash")]
    UnexpectedArchiveHash {
        /// The verification target block.
        block: BlockNumber,
    },
}

/// Errors surfaced by the RocksDB instance backing the archive.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open the database.
    #[error("failed to open the database: {0}")]
    Open(#[source] rocksdb::Error),
    /// Failed to read from the database.
    #[error("failed to read from the database: {0}")]
    Read(#[source] rocksdb::Error),
    /// Failed to write to the database.
    #[error("failed to write to the database: {0}")]
    Write(#[source] rocksdb::Error),
    /// Failed to commit a write batch.
    #[error("failed to commit a write batch: {0}")]
    Commit(#[source] rocksdb::Error),
    /// Failed to flush the database.
    #[error("failed to flush the database: {0}")]
    Flush(#[source] rocksdb::Error),
}
