//! Re-derivation of the stored hash chains from raw entries.

use crate::{
    db::{self, Store, StoreIter},
    error::{ArchiveResult, CorruptionError},
    keys::{self, KeySpace},
};
use alloy_primitives::B256;
use chronicle_primitives::{
    chain_hash, AccountState, AccountUpdate, Address, Balance, BlockNumber, Code, DecodeValue,
    Nonce, Reincarnation, SlotKey, SlotUpdate, SlotValue,
};
use sha2::{Digest, Sha256};
use std::{collections::BTreeMap, marker::PhantomData};
use tracing::debug;

/// Blocks verified between two progress reports of [`verify_archive`].
const PROGRESS_INTERVAL: u64 = 1 << 16;

/// Forward scan over one key family's entries for a single account.
///
/// Positions at the first entry carrying the family/account prefix and
/// reports the block of the current entry until the range is exhausted.
struct FamilyScan<'db, V> {
    iter: StoreIter<'db>,
    prefix: [u8; keys::ACCOUNT_PREFIX_LEN],
    finished: bool,
    _value: PhantomData<V>,
}

impl<'db, V: DecodeValue> FamilyScan<'db, V> {
    fn new(store: &'db Store, space: KeySpace, address: Address) -> ArchiveResult<Self> {
        let prefix = keys::account_prefix(space, address);
        let mut iter = store.raw_iter();
        iter.seek(prefix);
        db::iter_status(&iter)?;
        let mut scan = Self { iter, prefix, finished: false, _value: PhantomData };
        scan.update_finished();
        Ok(scan)
    }

    fn update_finished(&mut self) {
        self.finished = !matches!(self.iter.key(), Some(key) if key.starts_with(&self.prefix));
    }

    /// Block of the current entry, or `None` once the range is exhausted.
    fn block(&self) -> Option<BlockNumber> {
        if self.finished {
            return None;
        }
        self.iter.key().map(keys::block_from_key)
    }

    /// Decodes the current entry's value, validating its stored length.
    fn value(&self) -> ArchiveResult<V> {
        Ok(V::decode_value(self.iter.value().unwrap_or_default())?)
    }

    fn advance(&mut self) -> ArchiveResult<()> {
        self.iter.next();
        db::iter_status(&self.iter)?;
        self.update_finished();
        Ok(())
    }
}

/// One storage entry of the account under verification.
struct StorageEntry {
    block: BlockNumber,
    reincarnation: Reincarnation,
    slot: SlotKey,
    value: SlotValue,
}

/// Collects the account's storage entries across all reincarnations,
/// reordered by block.
///
/// The storage family sorts keys by slot before block, so a forward scan
/// does not visit a multi-slot account's writes in block order; the union
/// walk below needs them per block.
fn storage_entries(store: &Store, address: Address) -> ArchiveResult<Vec<StorageEntry>> {
    let prefix = keys::account_prefix(KeySpace::Storage, address);
    let mut iter = store.raw_iter();
    iter.seek(prefix);

    let mut entries = Vec::new();
    while let Some(key) = iter.key() {
        if !key.starts_with(&prefix) {
            break;
        }
        if key.len() != keys::STORAGE_KEY_LEN {
            return Err(CorruptionError::KeyLength {
                expected: keys::STORAGE_KEY_LEN,
                got: key.len(),
            }
            .into());
        }
        entries.push(StorageEntry {
            block: keys::block_from_key(key),
            reincarnation: keys::reincarnation_from_storage_key(key),
            slot: keys::slot_from_storage_key(key),
            value: SlotValue::decode_value(iter.value().unwrap_or_default())?,
        });
        iter.next();
    }
    db::iter_status(&iter)?;

    entries.sort_by(|a, b| (a.block, a.slot).cmp(&(b.block, b.slot)));
    Ok(entries)
}

/// Re-derives the hash chain of `address` from the raw stored entries, up
/// to and including `block`.
pub(crate) fn verify_account(
    store: &Store,
    block: BlockNumber,
    address: Address,
) -> ArchiveResult<()> {
    let mut state_scan = FamilyScan::<AccountState>::new(store, KeySpace::AccountState, address)?;
    let mut balance_scan = FamilyScan::<Balance>::new(store, KeySpace::Balance, address)?;
    let mut nonce_scan = FamilyScan::<Nonce>::new(store, KeySpace::Nonce, address)?;
    let mut code_scan = FamilyScan::<Code>::new(store, KeySpace::Code, address)?;
    let mut hash_scan = FamilyScan::<B256>::new(store, KeySpace::AccountHash, address)?;

    let storage = storage_entries(store, address)?;
    let mut storage_at = 0usize;

    let mut reincarnation: Reincarnation = 0;
    let mut chain = B256::ZERO;
    let mut last: Option<BlockNumber> = None;

    loop {
        // The earliest block any property still references.
        let mut next: Option<BlockNumber> = None;
        for candidate in [
            state_scan.block(),
            balance_scan.block(),
            nonce_scan.block(),
            code_scan.block(),
            storage.get(storage_at).map(|entry| entry.block),
        ] {
            next = match (next, candidate) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }
        let Some(current) = next.filter(|next| *next <= block) else { break };

        if last.is_some_and(|last| current <= last) {
            return Err(CorruptionError::DuplicateBlock { block: current }.into());
        }
        last = Some(current);

        // Rebuild the account update recorded at this block.
        let mut update = AccountUpdate::default();

        if state_scan.block() == Some(current) {
            let state = state_scan.value()?;
            if state.exists {
                update.created = true;
            } else {
                update.deleted = true;
            }
            if state.reincarnation != reincarnation + 1 {
                return Err(CorruptionError::ReincarnationGap {
                    block: current,
                    from: reincarnation,
                    to: state.reincarnation,
                }
                .into());
            }
            reincarnation = state.reincarnation;
            state_scan.advance()?;
        }

        if balance_scan.block() == Some(current) {
            update.balance = Some(balance_scan.value()?);
            balance_scan.advance()?;
        }

        if nonce_scan.block() == Some(current) {
            update.nonce = Some(nonce_scan.value()?);
            nonce_scan.advance()?;
        }

        if code_scan.block() == Some(current) {
            update.code = Some(code_scan.value()?);
            code_scan.advance()?;
        }

        while let Some(entry) = storage.get(storage_at).filter(|entry| entry.block == current) {
            if entry.reincarnation != reincarnation {
                return Err(CorruptionError::StorageReincarnation {
                    block: current,
                    expected: reincarnation,
                    got: entry.reincarnation,
                }
                .into());
            }
            update.storage.push(SlotUpdate { slot: entry.slot, value: entry.value });
            storage_at += 1;
        }

        // Every change must pair with exactly one hash entry at its block.
        match hash_scan.block() {
            Some(hashed) if hashed == current => {}
            Some(hashed) if hashed < current => {
                return Err(CorruptionError::HashWithoutChange { block: hashed }.into())
            }
            _ => return Err(CorruptionError::ChangeWithoutHash { block: current }.into()),
        }

        chain = chain_hash(&chain, &update.hash());
        if chain != hash_scan.value()? {
            return Err(CorruptionError::AccountHashMismatch { address, block: current }.into());
        }
        hash_scan.advance()?;
    }

    if let Some(hashed) = hash_scan.block() {
        if hashed < block {
            return Err(CorruptionError::HashWithoutChange { block: hashed }.into());
        }
    }

    debug!(target: "archive::verify", %address, block, "account chain verified");
    Ok(())
}

/// Re-derives the block-hash chain up to and including `block` and compares
/// the result with `expected_hash`.
pub(crate) fn verify_archive(
    store: &Store,
    block: BlockNumber,
    expected_hash: B256,
    mut progress: impl FnMut(&str),
) -> ArchiveResult<()> {
    // One ordered pass over the account hash family groups each block's
    // account hashes; the family's (address, block) key order delivers them
    // in ascending address order per block.
    let mut per_block: BTreeMap<BlockNumber, Vec<B256>> = BTreeMap::new();
    let mut iter = store.raw_iter();
    iter.seek([KeySpace::AccountHash.tag()]);
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
        let hashed = keys::block_from_key(key);
        if hashed <= block {
            let hash = B256::decode_value(iter.value().unwrap_or_default())?;
            per_block.entry(hashed).or_default().push(hash);
        }
        iter.next();
    }
    db::iter_status(&iter)?;

    // Replay the chain against the stored block hashes.
    let mut chain = B256::ZERO;
    let mut remaining = per_block.into_iter();
    let mut pending = remaining.next();
    let mut verified: u64 = 0;

    let mut iter = store.raw_iter();
    iter.seek([KeySpace::BlockHash.tag()]);
    while let Some(key) = iter.key() {
        if key.first() != Some(&KeySpace::BlockHash.tag()) {
            break;
        }
        if key.len() != keys::BLOCK_KEY_LEN {
            return Err(CorruptionError::KeyLength {
                expected: keys::BLOCK_KEY_LEN,
                got: key.len(),
            }
            .into());
        }
        let current = keys::block_from_key(key);
        if current > block {
            break;
        }

        let stored = B256::decode_value(iter.value().unwrap_or_default())?;
        let account_hashes = match pending.as_ref().map(|(hashed, _)| *hashed) {
            Some(hashed) if hashed == current => {
                let hashes = pending.take().map(|(_, hashes)| hashes).unwrap_or_default();
                pending = remaining.next();
                hashes
            }
            Some(hashed) if hashed < current => {
                return Err(CorruptionError::ChangeWithoutHash { block: hashed }.into())
            }
            _ => Vec::new(),
        };

        let mut hasher = Sha256::new();
        hasher.update(chain);
        for hash in &account_hashes {
            hasher.update(hash);
        }
        let recomputed = B256::from_slice(&hasher.finalize());
        if recomputed != stored {
            return Err(CorruptionError::BlockHashMismatch { block: current }.into());
        }
        chain = recomputed;

        verified += 1;
        if verified % PROGRESS_INTERVAL == 0 {
            progress(&format!("verified {verified} blocks, at block {current}"));
        }
        iter.next();
    }
    db::iter_status(&iter)?;

    if let Some((hashed, _)) = pending {
        return Err(CorruptionError::ChangeWithoutHash { block: hashed }.into());
    }

    if chain != expected_hash {
        return Err(CorruptionError::UnexpectedArchiveHash { block }.into());
    }

    progress(&format!("verified {verified} blocks, archive hash matches"));
    debug!(target: "archive::verify", block, blocks = verified, "archive chain verified");
    Ok(())
}
