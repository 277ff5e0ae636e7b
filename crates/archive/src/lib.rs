//! Append-only, hash-chained archive of per-block account state.
//!
//! The archive records complete block updates — account creations and
//! deletions, balance/nonce/code assignments and storage writes — and can
//! serve the value of any account property at any historical block. Entries
//! are written once and never modified; historical reads resolve the most
//! recent entry at or before the requested block with an ordered-key
//! lower-bound probe.
//!
//! Every update is covered by a two-level SHA-256 chain: per account, each
//! block's change hash is chained onto the account's previous hash; per
//! block, the chained account hashes (in ascending address order) are folded
//! onto the previous block hash. [`Archive::verify_account`] re-derives an
//! account's chain from the raw stored entries, and [`Archive::verify`]
//! replays the whole block chain against an expected root.
//!
//! Deleting and re-creating an account bumps its reincarnation counter,
//! which is embedded in storage keys: slots of earlier incarnations remain
//! on disk but become unreachable to reads.
//!
//! # Example
//!
//! ```no_run
//! use chronicle_archive::Archive;
//! use chronicle_primitives::{Address, Balance, BlockUpdate};
//!
//! # fn main() -> Result<(), chronicle_archive::ArchiveError> {
//! let mut archive = Archive::open("/var/lib/chronicle")?;
//!
//! let account = Address::repeat_byte(0x42);
//! let mut update = BlockUpdate::new();
//! update.create_account(account);
//! update.set_balance(account, Balance::from(1_000u64));
//! archive.add(1, &update)?;
//!
//! assert!(archive.exists(1, account)?);
//! assert_eq!(archive.balance(1, account)?, Balance::from(1_000u64));
//! archive.verify_account(1, account)?;
//! archive.close()?;
//! # Ok(())
//! # }
//! ```

mod archive;
mod db;
mod error;
pub mod keys;
mod verify;

pub use archive::Archive;
pub use db::StoreOptions;
pub use error::{ArchiveError, ArchiveResult, CorruptionError, DatabaseError};

pub use chronicle_primitives as primitives;
