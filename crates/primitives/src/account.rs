use crate::{
    codec::{DecodeError, DecodeValue},
    Reincarnation,
};
use serde::{Deserialize, Serialize};

/// Encoded length of an [`AccountState`] entry.
pub const ACCOUNT_STATE_LEN: usize = 5;

/// Existence and reincarnation state of an account at some block.
///
/// An account that was never touched decodes to the default state: it does
/// not exist and its reincarnation counter is zero. The counter increases by
/// one every time an entry is written, whether the account is being created
/// or deleted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    /// Whether the account exists at this block.
    pub exists: bool,
    /// Number of times the account has been created or deleted.
    pub reincarnation: Reincarnation,
}

impl AccountState {
    /// Encodes the state into its 5-byte stored representation.
    pub fn encode(&self) -> [u8; ACCOUNT_STATE_LEN] {
        let mut buf = [0u8; ACCOUNT_STATE_LEN];
        buf[0] = self.exists as u8;
        buf[1..].copy_from_slice(&self.reincarnation.to_be_bytes());
        buf
    }
}

impl DecodeValue for AccountState {
    fn decode_value(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() != ACCOUNT_STATE_LEN {
            return Err(DecodeError::UnexpectedLength { expected: ACCOUNT_STATE_LEN, got: buf.len() });
        }
        let mut reincarnation = [0u8; 4];
        reincarnation.copy_from_slice(&buf[1..]);
        Ok(Self { exists: buf[0] != 0, reincarnation: Reincarnation::from_be_bytes(reincarnation) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let state = AccountState { exists: true, reincarnation: 0x01020304 };
        let encoded = state.encode();
        assert_eq!(encoded, [1, 1, 2, 3, 4]);
        assert_eq!(AccountState::decode_value(&encoded), Ok(state));
    }

    #[test]
    fn default_is_absent_account() {
        let state = AccountState::default();
        assert!(!state.exists);
        assert_eq!(state.reincarnation, 0);
        assert_eq!(state.encode(), [0u8; ACCOUNT_STATE_LEN]);
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert_eq!(
            AccountState::decode_value(&[0u8; 4]),
            Err(DecodeError::UnexpectedLength { expected: ACCOUNT_STATE_LEN, got: 4 })
        );
    }
}
