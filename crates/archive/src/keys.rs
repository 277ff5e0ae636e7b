//! Key schema of the archive's ordered keyspace.
//!
//! Every key starts with a one-byte family tag, continues with the account
//! address where the family is account-scoped, and ends with the big-endian
//! block number, so that byte-lexicographic iteration visits entries in
//! `(family, address, block)` order. Storage keys additionally embed the
//! reincarnation counter and the slot key between address and block, which
//! scopes each slot entry to one incarnation of the account.
//!
//! Big-endian block numbers are what make lexicographic key order agree
//! with numeric block order; the lower-bound probes in the read path and
//! the range scans in the verifier both depend on it.

use alloy_primitives::B256;
use chronicle_primitives::{Address, BlockNumber, Reincarnation, SlotKey};

/// Length of the family tag prefix.
pub const TAG_LEN: usize = 1;
/// Length of an account address.
pub const ADDRESS_LEN: usize = 20;
/// Length of a big-endian reincarnation counter.
pub const REINCARNATION_LEN: usize = 4;
/// Length of a storage slot key.
pub const SLOT_LEN: usize = 32;
/// Length of the trailing big-endian block number.
pub const BLOCK_LEN: usize = 8;

/// Length of keys addressing one per-account property at one block.
pub const PROPERTY_KEY_LEN: usize = TAG_LEN + ADDRESS_LEN + BLOCK_LEN;
/// Length of storage slot keys.
pub const STORAGE_KEY_LEN: usize = TAG_LEN + ADDRESS_LEN + REINCARNATION_LEN + SLOT_LEN + BLOCK_LEN;
/// Length of block hash keys.
pub const BLOCK_KEY_LEN: usize = TAG_LEN + BLOCK_LEN;
/// Length of the prefix shared by all entries of one family for one account.
pub const ACCOUNT_PREFIX_LEN: usize = TAG_LEN + ADDRESS_LEN;

/// The key families sharing the archive's single ordered keyspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KeySpace {
    /// Account existence and reincarnation entries.
    AccountState = 0,
    /// Balance entries.
    Balance = 1,
    /// Nonce entries.
    Nonce = 2,
    /// Contract code entries.
    Code = 3,
    /// Storage slot entries, scoped per reincarnation.
    Storage = 4,
    /// Per-account hash chain entries.
    AccountHash = 5,
    /// Per-block hash chain entries.
    BlockHash = 6,
}

impl KeySpace {
    /// The tag byte leading every key of this family.
    pub const fn tag(self) -> u8 {
        self as u8
    }
}

/// Builds the key of a per-account property entry at `block`.
pub fn property_key(
    space: KeySpace,
    address: Address,
    block: BlockNumber,
) -> [u8; PROPERTY_KEY_LEN] {
    let mut key = [0u8; PROPERTY_KEY_LEN];
    key[0] = space.tag();
    key[TAG_LEN..ACCOUNT_PREFIX_LEN].copy_from_slice(address.as_slice());
    key[ACCOUNT_PREFIX_LEN..].copy_from_slice(&block.to_be_bytes());
    key
}

/// Key of the account state entry of `address` at `block`.
pub fn account_state_key(address: Address, block: BlockNumber) -> [u8; PROPERTY_KEY_LEN] {
    property_key(KeySpace::AccountState, address, block)
}

/// Key of the balance entry of `address` at `block`.
pub fn balance_key(address: Address, block: BlockNumber) -> [u8; PROPERTY_KEY_LEN] {
    property_key(KeySpace::Balance, address, block)
}

/// Key of the nonce entry of `address` at `block`.
pub fn nonce_key(address: Address, block: BlockNumber) -> [u8; PROPERTY_KEY_LEN] {
    property_key(KeySpace::Nonce, address, block)
}

/// Key of the code entry of `address` at `block`.
pub fn code_key(address: Address, block: BlockNumber) -> [u8; PROPERTY_KEY_LEN] {
    property_key(KeySpace::Code, address, block)
}

/// Key of the account hash entry of `address` at `block`.
pub fn account_hash_key(address: Address, block: BlockNumber) -> [u8; PROPERTY_KEY_LEN] {
    property_key(KeySpace::AccountHash, address, block)
}

/// Key of the storage entry for `slot` of `address` at `block`, scoped to
/// the given incarnation of the account.
pub fn storage_key(
    address: Address,
    reincarnation: Reincarnation,
    slot: SlotKey,
    block: BlockNumber,
) -> [u8; STORAGE_KEY_LEN] {
    let mut key = [0u8; STORAGE_KEY_LEN];
    key[0] = KeySpace::Storage.tag();
    let mut at = TAG_LEN;
    key[at..at + ADDRESS_LEN].copy_from_slice(address.as_slice());
    at += ADDRESS_LEN;
    key[at..at + REINCARNATION_LEN].copy_from_slice(&reincarnation.to_be_bytes());
    at += REINCARNATION_LEN;
    key[at..at + SLOT_LEN].copy_from_slice(slot.as_slice());
    at += SLOT_LEN;
    key[at..].copy_from_slice(&block.to_be_bytes());
    key
}

/// Key of the block hash entry at `block`.
pub fn block_key(block: BlockNumber) -> [u8; BLOCK_KEY_LEN] {
    let mut key = [0u8; BLOCK_KEY_LEN];
    key[0] = KeySpace::BlockHash.tag();
    key[TAG_LEN..].copy_from_slice(&block.to_be_bytes());
    key
}

/// Block number from the trailing eight bytes of a key.
pub fn block_from_key(key: &[u8]) -> BlockNumber {
    let (_, block) = key.split_last_chunk().unwrap();
    u64::from_be_bytes(*block)
}

/// Address from bytes 1..21 of an account-scoped key.
pub fn address_from_key(key: &[u8]) -> Address {
    Address::from_slice(&key[TAG_LEN..ACCOUNT_PREFIX_LEN])
}

/// Reincarnation counter embedded in a storage key.
pub fn reincarnation_from_storage_key(key: &[u8]) -> Reincarnation {
    let mut buf = [0u8; REINCARNATION_LEN];
    buf.copy_from_slice(&key[ACCOUNT_PREFIX_LEN..ACCOUNT_PREFIX_LEN + REINCARNATION_LEN]);
    Reincarnation::from_be_bytes(buf)
}

/// Slot key embedded in a storage key.
pub fn slot_from_storage_key(key: &[u8]) -> SlotKey {
    let start = ACCOUNT_PREFIX_LEN + REINCARNATION_LEN;
    B256::from_slice(&key[start..start + SLOT_LEN])
}

/// Fixed prefix of `key` preceding the trailing block number.
///
/// Entries sharing this prefix describe one property of one account (for
/// storage, one slot of one incarnation) across time.
pub fn versioned_prefix(key: &[u8]) -> &[u8] {
    &key[..key.len() - BLOCK_LEN]
}

/// Prefix covering every entry of `space` for `address`, across
/// reincarnations, slots and blocks.
pub fn account_prefix(space: KeySpace, address: Address) -> [u8; ACCOUNT_PREFIX_LEN] {
    let mut prefix = [0u8; ACCOUNT_PREFIX_LEN];
    prefix[0] = space.tag();
    prefix[TAG_LEN..].copy_from_slice(address.as_slice());
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use proptest::prelude::*;

    const ADDR: Address = address!("0x0102030405060708091011121314151617181920");

    #[test]
    fn family_tags_are_distinct() {
        let tags = [
            KeySpace::AccountState,
            KeySpace::Balance,
            KeySpace::Nonce,
            KeySpace::Code,
            KeySpace::Storage,
            KeySpace::AccountHash,
            KeySpace::BlockHash,
        ]
        .map(KeySpace::tag);
        for (i, a) in tags.iter().enumerate() {
            for b in &tags[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn property_key_layout() {
        let key = balance_key(ADDR, 0x0a0b0c0d);
        assert_eq!(key.len(), PROPERTY_KEY_LEN);
        assert_eq!(key[0], KeySpace::Balance.tag());
        assert_eq!(&key[1..21], ADDR.as_slice());
        assert_eq!(&key[21..], &[0, 0, 0, 0, 0x0a, 0x0b, 0x0c, 0x0d]);
    }

    #[test]
    fn storage_key_layout_and_extractors() {
        let slot = B256::with_last_byte(0x33);
        let key = storage_key(ADDR, 7, slot, 99);
        assert_eq!(key.len(), STORAGE_KEY_LEN);
        assert_eq!(key[0], KeySpace::Storage.tag());
        assert_eq!(address_from_key(&key), ADDR);
        assert_eq!(reincarnation_from_storage_key(&key), 7);
        assert_eq!(slot_from_storage_key(&key), slot);
        assert_eq!(block_from_key(&key), 99);
    }

    #[test]
    fn block_key_layout() {
        let key = block_key(u64::MAX);
        assert_eq!(key.len(), BLOCK_KEY_LEN);
        assert_eq!(key[0], KeySpace::BlockHash.tag());
        assert_eq!(block_from_key(&key), u64::MAX);
    }

    #[test]
    fn versioned_prefix_strips_the_block() {
        let key = nonce_key(ADDR, 5);
        assert_eq!(versioned_prefix(&key), &key[..PROPERTY_KEY_LEN - BLOCK_LEN]);
        assert_eq!(versioned_prefix(&key), &account_prefix(KeySpace::Nonce, ADDR));

        let key = storage_key(ADDR, 1, B256::ZERO, 5);
        assert_eq!(versioned_prefix(&key).len(), STORAGE_KEY_LEN - BLOCK_LEN);
    }

    #[test]
    fn account_prefix_covers_all_reincarnations() {
        let prefix = account_prefix(KeySpace::Storage, ADDR);
        let first = storage_key(ADDR, 0, B256::ZERO, 0);
        let later = storage_key(ADDR, 3, B256::with_last_byte(0xff), 12);
        assert!(first.starts_with(&prefix));
        assert!(later.starts_with(&prefix));
    }

    proptest! {
        #[test]
        fn property_key_order_follows_block_order(a: u64, b: u64) {
            let ka = balance_key(ADDR, a);
            let kb = balance_key(ADDR, b);
            prop_assert_eq!(a.cmp(&b), ka.cmp(&kb));
        }

        #[test]
        fn block_key_order_follows_block_order(a: u64, b: u64) {
            prop_assert_eq!(a.cmp(&b), block_key(a).cmp(&block_key(b)));
        }

        #[test]
        fn storage_key_order_follows_tuple_order(
            ra: u32,
            rb: u32,
            sa: u8,
            sb: u8,
            ba: u64,
            bb: u64,
        ) {
            let ka = storage_key(ADDR, ra, B256::with_last_byte(sa), ba);
            let kb = storage_key(ADDR, rb, B256::with_last_byte(sb), bb);
            let tuple_a = (ra, sa, ba);
            let tuple_b = (rb, sb, bb);
            prop_assert_eq!(tuple_a.cmp(&tuple_b), ka.cmp(&kb));
        }
    }
}
