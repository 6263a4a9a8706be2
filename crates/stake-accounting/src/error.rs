//! Typed errors for the staking engine
//!
//! The first three variants are the recoverable user-facing errors the
//! surrounding system matches on; their messages are part of the API
//! contract. `InvariantViolation` signals a bug, never a user error:
//! the engine refuses to persist any state that fails the conservation
//! check, so a violation always surfaces before custody is touched.

use solana_sdk::pubkey::Pubkey;

pub type Result<T> = std::result::Result<T, StakeError>;

#[derive(Debug, thiserror::Error)]
pub enum StakeError {
    /// Unlock request exceeds the currently locked (locking + locked) amount
    #[error("Amount greater than locked amount")]
    InsufficientLockedBalance,

    /// Withdrawal request exceeds the currently withdrawable amount
    #[error("Amount exceeds withdrawable")]
    ExceedsWithdrawable,

    /// Operation references an owner with no stake account
    #[error("No stake account found for owner {0}")]
    AccountNotFound(Pubkey),

    /// Zero or otherwise unusable amount
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    /// A vesting deposit targeted an account that already has a schedule
    #[error("Account already has a vesting schedule")]
    VestingAlreadyConfigured,

    /// Conservation check failed; fatal, the affected account (or the
    /// pool aggregate) must not be mutated further
    #[error("Balance invariant violated ({scope}): {detail}")]
    InvariantViolation { scope: String, detail: String },

    /// Persistence or custody collaborator failure
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl StakeError {
    pub(crate) fn invariant(owner: &Pubkey, detail: impl Into<String>) -> Self {
        StakeError::InvariantViolation {
            scope: owner.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn pool_invariant(detail: impl Into<String>) -> Self {
        StakeError::InvariantViolation {
            scope: "pool".to_string(),
            detail: detail.into(),
        }
    }
}
