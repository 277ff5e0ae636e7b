//! Thin wrapper around the RocksDB instance backing an archive.
//!
//! All key families share the default column family; the leading tag byte
//! of the key schema keeps them apart. The wrapper exposes exactly what the
//! archive needs from an ordered store: point puts, atomic write batches,
//! raw cursors with lower-bound seeks, and flushing.

use crate::error::DatabaseError;
use rocksdb::{
    BlockBasedOptions, Cache, CompactionPri, DBCompressionType, DBRawIteratorWithThreadMode,
    Options, WriteBatch, DB,
};
use std::{fmt, path::Path};
use tracing::debug;

/// Default block cache capacity (64 MB).
const DEFAULT_CACHE_SIZE: usize = 64 << 20;

/// Default block size for RocksDB tables (16 KB).
const DEFAULT_BLOCK_SIZE: usize = 16 * 1024;

/// Default bloom filter bits per key (~1% false positive rate).
const DEFAULT_BLOOM_FILTER_BITS: f64 = 10.0;

/// Raw cursor over the store's ordered keyspace.
pub(crate) type StoreIter<'a> = DBRawIteratorWithThreadMode<'a, DB>;

/// Tuning options for opening a [`Store`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    block_cache_size: usize,
    compression: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { block_cache_size: DEFAULT_CACHE_SIZE, compression: true }
    }
}

impl StoreOptions {
    /// Creates the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a custom block cache capacity.
    pub const fn with_block_cache_size(mut self, capacity_bytes: usize) -> Self {
        self.block_cache_size = capacity_bytes;
        self
    }

    /// Disables on-disk compression.
    pub const fn without_compression(mut self) -> Self {
        self.compression = false;
        self
    }

    fn rocksdb_options(&self) -> Options {
        let cache = Cache::new_lru_cache(self.block_cache_size);

        let mut table_options = BlockBasedOptions::default();
        table_options.set_block_size(DEFAULT_BLOCK_SIZE);
        table_options.set_block_cache(&cache);
        table_options.set_cache_index_and_filter_blocks(true);
        table_options.set_bloom_filter(DEFAULT_BLOOM_FILTER_BITS, false);

        let mut options = Options::default();
        options.set_block_based_table_factory(&table_options);
        options.create_if_missing(true);
        options.set_compaction_pri(CompactionPri::MinOverlappingRatio);
        if self.compression {
            options.set_compression_type(DBCompressionType::Lz4);
            options.set_bottommost_compression_type(DBCompressionType::Zstd);
        } else {
            options.set_compression_type(DBCompressionType::None);
        }
        options
    }
}

/// Ordered key/value store holding every archive entry.
pub(crate) struct Store {
    db: DB,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").field("path", &self.db.path()).finish()
    }
}

impl Store {
    /// Opens (creating if missing) the store at `path`.
    pub(crate) fn open(path: &Path, options: &StoreOptions) -> Result<Self, DatabaseError> {
        let db = DB::open(&options.rocksdb_options(), path).map_err(DatabaseError::Open)?;
        debug!(target: "archive::db", path = %path.display(), "opened store");
        Ok(Self { db })
    }

    /// Inserts or overwrites a single entry.
    pub(crate) fn put(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> Result<(), DatabaseError> {
        self.db.put(key, value).map_err(DatabaseError::Write)
    }

    /// Commits a batch of writes atomically.
    pub(crate) fn write(&self, batch: WriteBatch) -> Result<(), DatabaseError> {
        self.db.write(batch).map_err(DatabaseError::Commit)
    }

    /// Returns an unpositioned raw cursor over the keyspace.
    pub(crate) fn raw_iter(&self) -> StoreIter<'_> {
        self.db.raw_iterator()
    }

    /// Flushes memtables to disk.
    pub(crate) fn flush(&self) -> Result<(), DatabaseError> {
        self.db.flush().map_err(DatabaseError::Flush)
    }
}

/// Surfaces an I/O error that invalidated a cursor, if any.
///
/// A cursor that runs off either end of the keyspace is invalid but not
/// errored; only genuine read failures are reported here.
pub(crate) fn iter_status(iter: &StoreIter<'_>) -> Result<(), DatabaseError> {
    iter.status().map_err(DatabaseError::Read)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> Store {
        Store::open(dir.path(), &StoreOptions::default()).unwrap()
    }

    #[test]
    fn put_then_seek_exact() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.put(b"key-1", b"value-1").unwrap();

        let mut iter = store.raw_iter();
        iter.seek(b"key-1");
        assert!(iter.valid());
        assert_eq!(iter.key(), Some(&b"key-1"[..]));
        assert_eq!(iter.value(), Some(&b"value-1"[..]));
    }

    #[test]
    fn seek_for_prev_finds_floor_entry() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.put([0u8, 1], b"a").unwrap();
        store.put([0u8, 5], b"b").unwrap();

        // Exact hit.
        let mut iter = store.raw_iter();
        iter.seek_for_prev([0u8, 5]);
        assert_eq!(iter.value(), Some(&b"b"[..]));

        // Between entries: floor wins.
        let mut iter = store.raw_iter();
        iter.seek_for_prev([0u8, 3]);
        assert_eq!(iter.value(), Some(&b"a"[..]));

        // Before all entries: invalid.
        let mut iter = store.raw_iter();
        iter.seek_for_prev([0u8, 0]);
        assert!(!iter.valid());
        assert!(iter_status(&iter).is_ok());
    }

    #[test]
    fn write_batch_is_atomic() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut batch = WriteBatch::default();
        batch.put(b"x", b"1");
        batch.put(b"y", b"2");
        store.write(batch).unwrap();

        let mut iter = store.raw_iter();
        iter.seek(b"x");
        assert_eq!(iter.value(), Some(&b"1"[..]));
        iter.next();
        assert_eq!(iter.value(), Some(&b"2"[..]));
    }

    #[test]
    fn iteration_is_byte_lexicographic() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.put([2u8], b"c").unwrap();
        store.put([1u8, 0], b"b").unwrap();
        store.put([1u8], b"a").unwrap();

        let mut iter = store.raw_iter();
        iter.seek([0u8]);
        let mut seen = Vec::new();
        while iter.valid() {
            seen.push(iter.key().unwrap().to_vec());
            iter.next();
        }
        assert_eq!(seen, vec![vec![1u8], vec![1u8, 0], vec![2u8]]);
    }
}
