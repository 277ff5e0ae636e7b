//! Per-block change sets and their canonical hashing.

use crate::{Address, Balance, Code, Nonce, SlotKey, SlotValue};
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// A single storage slot assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotUpdate {
    /// The slot being written.
    pub slot: SlotKey,
    /// The value assigned to the slot.
    pub value: SlotValue,
}

/// The complete set of state changes produced by one block.
///
/// Account creations and deletions are kept apart from the plain property
/// assignments because they advance the account's reincarnation counter.
/// Balance, nonce and code assignments are keyed per account; storage writes
/// keep their submission order.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockUpdate {
    created: BTreeSet<Address>,
    deleted: BTreeSet<Address>,
    balances: BTreeMap<Address, Balance>,
    nonces: BTreeMap<Address, Nonce>,
    codes: BTreeMap<Address, Code>,
    storage: Vec<(Address, SlotUpdate)>,
}

impl BlockUpdate {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `address` as created in this block.
    pub fn create_account(&mut self, address: Address) {
        self.created.insert(address);
    }

    /// Marks `address` as deleted in this block.
    pub fn delete_account(&mut self, address: Address) {
        self.deleted.insert(address);
    }

    /// Assigns the balance of `address`.
    pub fn set_balance(&mut self, address: Address, balance: Balance) {
        self.balances.insert(address, balance);
    }

    /// Assigns the nonce of `address`.
    pub fn set_nonce(&mut self, address: Address, nonce: Nonce) {
        self.nonces.insert(address, nonce);
    }

    /// Assigns the contract code of `address`.
    pub fn set_code(&mut self, address: Address, code: Code) {
        self.codes.insert(address, code);
    }

    /// Appends a storage slot write for `address`.
    pub fn set_storage(&mut self, address: Address, slot: SlotKey, value: SlotValue) {
        self.storage.push((address, SlotUpdate { slot, value }));
    }

    /// True if the update carries no changes at all.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() &&
            self.deleted.is_empty() &&
            self.balances.is_empty() &&
            self.nonces.is_empty() &&
            self.codes.is_empty() &&
            self.storage.is_empty()
    }

    /// Accounts created in this block, in ascending address order.
    pub fn created_accounts(&self) -> impl Iterator<Item = &Address> {
        self.created.iter()
    }

    /// Accounts deleted in this block, in ascending address order.
    pub fn deleted_accounts(&self) -> impl Iterator<Item = &Address> {
        self.deleted.iter()
    }

    /// Balance assignments of this block.
    pub fn balances(&self) -> &BTreeMap<Address, Balance> {
        &self.balances
    }

    /// Nonce assignments of this block.
    pub fn nonces(&self) -> &BTreeMap<Address, Nonce> {
        &self.nonces
    }

    /// Code assignments of this block.
    pub fn codes(&self) -> &BTreeMap<Address, Code> {
        &self.codes
    }

    /// Storage writes of this block, in submission order.
    pub fn storage(&self) -> &[(Address, SlotUpdate)] {
        &self.storage
    }

    /// Partitions the update into per-account updates.
    ///
    /// The returned map iterates in ascending address order, and each
    /// account's storage writes are sorted by slot key, which makes the
    /// partition — and every hash derived from it — a deterministic function
    /// of the update's contents.
    pub fn account_updates(&self) -> BTreeMap<Address, AccountUpdate> {
        let mut updates: BTreeMap<Address, AccountUpdate> = BTreeMap::new();
        for address in &self.deleted {
            updates.entry(*address).or_default().deleted = true;
        }
        for address in &self.created {
            updates.entry(*address).or_default().created = true;
        }
        for (address, balance) in &self.balances {
            updates.entry(*address).or_default().balance = Some(*balance);
        }
        for (address, nonce) in &self.nonces {
            updates.entry(*address).or_default().nonce = Some(*nonce);
        }
        for (address, code) in &self.codes {
            updates.entry(*address).or_default().code = Some(code.clone());
        }
        for (address, slot) in &self.storage {
            updates.entry(*address).or_default().storage.push(*slot);
        }
        for update in updates.values_mut() {
            update.storage.sort_by_key(|entry| entry.slot);
        }
        updates
    }
}

/// The portion of a [`BlockUpdate`] restricted to a single account.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdate {
    /// The account was deleted in this block.
    pub deleted: bool,
    /// The account was created in this block.
    pub created: bool,
    /// New balance, if assigned.
    pub balance: Option<Balance>,
    /// New nonce, if assigned.
    pub nonce: Option<Nonce>,
    /// New contract code, if assigned.
    pub code: Option<Code>,
    /// Storage writes, sorted ascending by slot key.
    pub storage: Vec<SlotUpdate>,
}

impl AccountUpdate {
    /// True if the update carries no changes for the account.
    pub fn is_empty(&self) -> bool {
        !self.deleted &&
            !self.created &&
            self.balance.is_none() &&
            self.nonce.is_none() &&
            self.code.is_none() &&
            self.storage.is_empty()
    }

    /// SHA-256 over the canonical encoding of this update.
    ///
    /// The encoding is one byte each for the deleted and created flags,
    /// then balance, nonce and code in that order — a presence byte,
    /// followed by the field's big-endian encoding when present, with code
    /// length-prefixed by a big-endian `u32` — then the storage writes in
    /// ascending slot order as raw `slot ‖ value` pairs. Stored hash chains
    /// depend on this layout; changing it invalidates existing archives.
    pub fn hash(&self) -> B256 {
        let mut hasher = Sha256::new();
        hasher.update([self.deleted as u8, self.created as u8]);
        match &self.balance {
            Some(balance) => {
                hasher.update([1]);
                hasher.update(balance.to_be_bytes::<16>());
            }
            None => hasher.update([0]),
        }
        match &self.nonce {
            Some(nonce) => {
                hasher.update([1]);
                hasher.update(nonce.to_be_bytes());
            }
            None => hasher.update([0]),
        }
        match &self.code {
            Some(code) => {
                hasher.update([1]);
                hasher.update((code.len() as u32).to_be_bytes());
                hasher.update(code);
            }
            None => hasher.update([0]),
        }
        for entry in &self.storage {
            hasher.update(entry.slot);
            hasher.update(entry.value);
        }
        B256::from_slice(&hasher.finalize())
    }
}

/// Extends a running hash chain by one link: `SHA-256(prev ‖ next)`.
pub fn chain_hash(prev: &B256, next: &B256) -> B256 {
    let mut hasher = Sha256::new();
    hasher.update(prev);
    hasher.update(next);
    B256::from_slice(&hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};

    const ADDR_A: Address = address!("0x1000000000000000000000000000000000000001");
    const ADDR_B: Address = address!("0x2000000000000000000000000000000000000002");

    #[test]
    fn empty_update_is_empty() {
        assert!(BlockUpdate::new().is_empty());
        assert!(AccountUpdate::default().is_empty());
    }

    #[test]
    fn any_change_makes_update_non_empty() {
        let mut update = BlockUpdate::new();
        update.set_nonce(ADDR_A, 1);
        assert!(!update.is_empty());

        let mut update = BlockUpdate::new();
        update.delete_account(ADDR_A);
        assert!(!update.is_empty());
    }

    #[test]
    fn partition_groups_changes_by_account() {
        let mut update = BlockUpdate::new();
        update.create_account(ADDR_B);
        update.set_balance(ADDR_A, Balance::from(12u64));
        update.set_nonce(ADDR_A, 7);
        update.set_code(ADDR_B, Code::from_static(&[0x60, 0x00]));
        update.set_storage(ADDR_A, B256::with_last_byte(9), B256::with_last_byte(1));

        let parts = update.account_updates();
        assert_eq!(parts.len(), 2);

        let a = &parts[&ADDR_A];
        assert!(!a.created && !a.deleted);
        assert_eq!(a.balance, Some(Balance::from(12u64)));
        assert_eq!(a.nonce, Some(7));
        assert_eq!(a.storage.len(), 1);

        let b = &parts[&ADDR_B];
        assert!(b.created);
        assert_eq!(b.code, Some(Code::from_static(&[0x60, 0x00])));
    }

    #[test]
    fn partition_iterates_in_address_order() {
        let mut update = BlockUpdate::new();
        update.set_nonce(ADDR_B, 1);
        update.set_nonce(ADDR_A, 1);
        let addresses: Vec<_> = update.account_updates().into_keys().collect();
        assert_eq!(addresses, vec![ADDR_A, ADDR_B]);
    }

    #[test]
    fn partition_sorts_storage_by_slot() {
        let mut update = BlockUpdate::new();
        update.set_storage(ADDR_A, B256::with_last_byte(9), B256::with_last_byte(1));
        update.set_storage(ADDR_A, B256::with_last_byte(3), B256::with_last_byte(2));
        let parts = update.account_updates();
        let slots: Vec<_> = parts[&ADDR_A].storage.iter().map(|entry| entry.slot).collect();
        assert_eq!(slots, vec![B256::with_last_byte(3), B256::with_last_byte(9)]);
    }

    #[test]
    fn hash_is_deterministic() {
        let make = || {
            let mut update = BlockUpdate::new();
            update.create_account(ADDR_A);
            update.set_balance(ADDR_A, Balance::from(100u64));
            update.set_storage(ADDR_A, B256::with_last_byte(1), B256::with_last_byte(2));
            update.account_updates().remove(&ADDR_A).unwrap()
        };
        assert_eq!(make().hash(), make().hash());
    }

    #[test]
    fn hash_depends_on_every_field() {
        let base = AccountUpdate::default();
        let mut created = base.clone();
        created.created = true;
        let mut deleted = base.clone();
        deleted.deleted = true;
        let mut balance = base.clone();
        balance.balance = Some(Balance::ZERO);
        let mut nonce = base.clone();
        nonce.nonce = Some(0);
        let mut code = base.clone();
        code.code = Some(Code::new());

        let hashes =
            [base.hash(), created.hash(), deleted.hash(), balance.hash(), nonce.hash(), code.hash()];
        for (i, a) in hashes.iter().enumerate() {
            for b in &hashes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn absent_and_zero_valued_fields_hash_differently() {
        // A zero balance is still an assignment; it must not collide with
        // the absence of one.
        let absent = AccountUpdate::default();
        let mut zero = AccountUpdate::default();
        zero.balance = Some(Balance::ZERO);
        assert_ne!(absent.hash(), zero.hash());
    }

    #[test]
    fn chain_hash_matches_manual_digest() {
        use sha2::{Digest, Sha256};
        let prev = b256!("0x1111111111111111111111111111111111111111111111111111111111111111");
        let next = b256!("0x2222222222222222222222222222222222222222222222222222222222222222");
        let mut hasher = Sha256::new();
        hasher.update(prev);
        hasher.update(next);
        assert_eq!(chain_hash(&prev, &next), B256::from_slice(&hasher.finalize()));
    }
}
