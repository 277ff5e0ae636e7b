//! The archive engine: write path, historical reads and lifecycle.

use crate::{
    db::{self, Store, StoreIter, StoreOptions},
    error::{ArchiveError, ArchiveResult, CorruptionError},
    keys::{self, KeySpace},
    verify,
};
use alloy_primitives::B256;
use chronicle_primitives::{
    chain_hash, AccountState, Address, Balance, BlockNumber, BlockUpdate, Code, DecodeValue,
    Nonce, SlotKey, SlotValue,
};
use rocksdb::WriteBatch;
use sha2::{Digest, Sha256};
use std::{collections::HashMap, path::Path};
use tracing::debug;

/// An append-only, hash-chained archive of per-block account state.
///
/// The archive owns its backing store exclusively. Adding updates requires
/// `&mut self`, which makes the single-writer rule a compile-time property;
/// reads take `&self` and may run concurrently.
pub struct Archive {
    store: Option<Store>,
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive").field("store", &self.store).finish()
    }
}

impl Archive {
    /// Opens (creating if missing) an archive in the given directory.
    pub fn open(path: impl AsRef<Path>) -> ArchiveResult<Self> {
        Self::open_with(path, StoreOptions::default())
    }

    /// Opens an archive with custom store options.
    pub fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> ArchiveResult<Self> {
        let store = Store::open(path.as_ref(), &options)?;
        Ok(Self { store: Some(store) })
    }

    /// Appends the changes of `block` to the archive.
    ///
    /// The block must be strictly above the current head. An empty update is
    /// a no-op: nothing is written and no hash is chained, so the block-hash
    /// chain stays dense only if callers do not skip blocks. All entries of
    /// one call are committed in a single atomic batch.
    pub fn add(&mut self, block: BlockNumber, update: &BlockUpdate) -> ArchiveResult<()> {
        let store = self.store()?;

        if let Some(latest) = self.latest_block()? {
            if block <= latest {
                return Err(ArchiveError::OutOfOrder { block, latest });
            }
        }
        if update.is_empty() {
            return Ok(());
        }

        let diff_hashes: Vec<(Address, B256)> =
            update.account_updates().iter().map(|(address, diff)| (*address, diff.hash())).collect();

        debug!(target: "archive", block, accounts = diff_hashes.len(), "adding block update");

        let mut batch = WriteBatch::default();
        // Account states already advanced by this call; batched writes are
        // invisible to reads until the batch commits.
        let mut touched: HashMap<Address, AccountState> = HashMap::new();

        for address in update.deleted_accounts() {
            let mut state = match touched.get(address) {
                Some(state) => *state,
                None => self.account_state(block, *address)?,
            };
            state.exists = false;
            state.reincarnation += 1;
            batch.put(keys::account_state_key(*address, block), state.encode());
            touched.insert(*address, state);
        }

        for address in update.created_accounts() {
            let mut state = match touched.get(address) {
                Some(state) => *state,
                None => self.account_state(block, *address)?,
            };
            state.exists = true;
            state.reincarnation += 1;
            batch.put(keys::account_state_key(*address, block), state.encode());
            touched.insert(*address, state);
        }

        for (address, balance) in update.balances() {
            batch.put(keys::balance_key(*address, block), balance.to_be_bytes::<16>());
        }

        for (address, code) in update.codes() {
            batch.put(keys::code_key(*address, block), code.as_ref());
        }

        for (address, nonce) in update.nonces() {
            batch.put(keys::nonce_key(*address, block), nonce.to_be_bytes());
        }

        for (address, slot) in update.storage() {
            let reincarnation = match touched.get(address) {
                Some(state) => state.reincarnation,
                None => self.account_state(block, *address)?.reincarnation,
            };
            batch.put(keys::storage_key(*address, reincarnation, slot.slot, block), slot.value);
        }

        // Chain the per-account hashes, folding them into the block hash in
        // ascending address order.
        let mut hasher = Sha256::new();
        hasher.update(self.block_hash(block)?);
        for (address, diff_hash) in &diff_hashes {
            let previous = self.account_hash(block, *address)?;
            let chained = chain_hash(&previous, diff_hash);
            batch.put(keys::account_hash_key(*address, block), chained);
            hasher.update(chained);
        }
        batch.put(keys::block_key(block), B256::from_slice(&hasher.finalize()));

        store.write(batch)?;
        Ok(())
    }

    /// Whether `address` exists at `block`.
    pub fn exists(&self, block: BlockNumber, address: Address) -> ArchiveResult<bool> {
        Ok(self.account_state(block, address)?.exists)
    }

    /// Balance of `address` at `block`; zero if never assigned.
    pub fn balance(&self, block: BlockNumber, address: Address) -> ArchiveResult<Balance> {
        Self::find_most_recent(self.store()?, &keys::balance_key(address, block))
    }

    /// Nonce of `address` at `block`; zero if never assigned.
    pub fn nonce(&self, block: BlockNumber, address: Address) -> ArchiveResult<Nonce> {
        Self::find_most_recent(self.store()?, &keys::nonce_key(address, block))
    }

    /// Contract code of `address` at `block`; empty if never assigned.
    pub fn code(&self, block: BlockNumber, address: Address) -> ArchiveResult<Code> {
        Self::find_most_recent(self.store()?, &keys::code_key(address, block))
    }

    /// Value of `slot` of `address` at `block`; zero if never assigned
    /// within the account's incarnation in effect at `block`.
    pub fn storage(
        &self,
        block: BlockNumber,
        address: Address,
        slot: SlotKey,
    ) -> ArchiveResult<SlotValue> {
        let state = self.account_state(block, address)?;
        Self::find_most_recent(
            self.store()?,
            &keys::storage_key(address, state.reincarnation, slot, block),
        )
    }

    /// The highest block recorded so far, or `None` for an empty archive.
    pub fn latest_block(&self) -> ArchiveResult<Option<BlockNumber>> {
        let store = self.store()?;
        let mut iter = store.raw_iter();
        iter.seek_for_prev(keys::block_key(u64::MAX));
        db::iter_status(&iter)?;
        match iter.key() {
            Some(key)
                if key.len() == keys::BLOCK_KEY_LEN && key[0] == KeySpace::BlockHash.tag() =>
            {
                Ok(Some(keys::block_from_key(key)))
            }
            _ => Ok(None),
        }
    }

    /// The archive hash at `block`: the hash of the most recent block at or
    /// before it, or zero for an empty archive.
    pub fn block_hash(&self, block: BlockNumber) -> ArchiveResult<B256> {
        Self::find_most_recent(self.store()?, &keys::block_key(block))
    }

    /// The per-account chain hash of `address` at `block`; zero if the
    /// account was never touched.
    pub fn account_hash(&self, block: BlockNumber, address: Address) -> ArchiveResult<B256> {
        Self::find_most_recent(self.store()?, &keys::account_hash_key(address, block))
    }

    /// All addresses touched at or before `block`, ascending and
    /// duplicate-free.
    pub fn accounts(&self, block: BlockNumber) -> ArchiveResult<Vec<Address>> {
        let store = self.store()?;
        let mut iter = store.raw_iter();
        iter.seek([KeySpace::AccountHash.tag()]);

        let mut result: Vec<Address> = Vec::new();
        while let Some(key) = iter.key() {
            if key.first() != Some(&KeySpace::AccountHash.tag()) {
                break;
            }
            if key.len() != keys::PROPERTY_KEY_LEN {
                return Err(CorruptionError::KeyLength {
                    expected: keys::PROPERTY_KEY_LEN,
                    got: key.len(),
                }
                .into());
            }
            // The family iterates in (address, block) order, so the first
            // qualifying entry of each address is hit before any other
            // address appears again.
            if keys::block_from_key(key) <= block {
                let address = keys::address_from_key(key);
                if result.last() != Some(&address) {
                    result.push(address);
                }
            }
            iter.next();
        }
        db::iter_status(&iter)?;
        Ok(result)
    }

    /// Re-derives the hash chain of `address` from the raw stored entries,
    /// up to and including `block`.
    ///
    /// Fails with [`ArchiveError::Corruption`] if entries are duplicated or
    /// out of order, the reincarnation counter does not advance by exactly
    /// one per state entry, a storage entry is keyed under the wrong
    /// reincarnation, changes and hash entries do not pair up one-to-one,
    /// or a stored hash disagrees with the recomputed chain.
    pub fn verify_account(&self, block: BlockNumber, address: Address) -> ArchiveResult<()> {
        verify::verify_account(self.store()?, block, address)
    }

    /// Re-derives the block-hash chain up to and including `block` and
    /// compares the result with `expected_hash`.
    ///
    /// Every stored block hash at or before `block` is recomputed from the
    /// previous block hash and the block's account hashes in ascending
    /// address order. `progress` receives occasional human-readable status
    /// reports.
    pub fn verify(
        &self,
        block: BlockNumber,
        expected_hash: B256,
        progress: impl FnMut(&str),
    ) -> ArchiveResult<()> {
        verify::verify_archive(self.store()?, block, expected_hash, progress)
    }

    /// Flushes pending writes to disk. A no-op on a closed archive.
    pub fn flush(&self) -> ArchiveResult<()> {
        match &self.store {
            Some(store) => Ok(store.flush()?),
            None => Ok(()),
        }
    }

    /// Flushes and releases the backing store. Subsequent operations fail
    /// with [`ArchiveError::Closed`]; closing twice is a no-op.
    pub fn close(&mut self) -> ArchiveResult<()> {
        let Some(store) = self.store.take() else { return Ok(()) };
        store.flush()?;
        debug!(target: "archive", "closed archive");
        Ok(())
    }

    fn store(&self) -> ArchiveResult<&Store> {
        self.store.as_ref().ok_or(ArchiveError::Closed)
    }

    /// Raw store access for corruption tests.
    #[cfg(test)]
    pub(crate) fn store_for_tests(&self) -> &Store {
        self.store.as_ref().expect("archive is open")
    }

    fn account_state(&self, block: BlockNumber, address: Address) -> ArchiveResult<AccountState> {
        Self::find_most_recent(self.store()?, &keys::account_state_key(address, block))
    }

    /// Resolves the entry stored under `key`, or under the same key with
    /// the largest smaller block number. Returns the type's zero default if
    /// no such entry exists.
    fn find_most_recent<V: DecodeValue>(store: &Store, key: &[u8]) -> ArchiveResult<V> {
        let mut iter: StoreIter<'_> = store.raw_iter();
        iter.seek_for_prev(key);
        db::iter_status(&iter)?;

        let Some(found) = iter.key() else { return Ok(V::default()) };
        // The probe embeds the requested block, so a floor entry with the
        // same prefix can only reference that block or an earlier one.
        if found.len() != key.len() ||
            keys::versioned_prefix(found) != keys::versioned_prefix(key)
        {
            return Ok(V::default());
        }
        let Some(value) = iter.value() else { return Ok(V::default()) };
        Ok(V::decode_value(value)?)
    }
}

impl Drop for Archive {
    fn drop(&mut self) {
        if let Some(store) = self.store.take() {
            let _ = store.flush();
        }
    }
}
