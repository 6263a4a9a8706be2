//! Custody ledger collaborator
//!
//! The engine does not hold tokens itself; it instructs a custody
//! ledger to take amounts in on deposit and hand them back on
//! withdrawal. Each call is atomic from the engine's point of view.
//! The engine validates every operation against a fresh balance
//! summary first, so a release exceeding what custody holds can only
//! mean corrupted state.

use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Result, StakeError};

pub trait CustodyLedger: Send + Sync {
    /// Take `amount` into custody for `owner`
    fn credit(&self, owner: &Pubkey, amount: u64) -> Result<()>;

    /// Release `amount` from custody back to `owner`
    fn release(&self, owner: &Pubkey, amount: u64) -> Result<()>;

    /// Amount currently held for `owner`
    fn held(&self, owner: &Pubkey) -> u64;
}

/// In-process ledger for tests and embedders that settle elsewhere
#[derive(Debug, Default)]
pub struct MemoryLedger {
    held: Mutex<HashMap<Pubkey, u64>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CustodyLedger for MemoryLedger {
    fn credit(&self, owner: &Pubkey, amount: u64) -> Result<()> {
        let mut held = self.held.lock().expect("custody ledger poisoned");
        let balance = held.entry(*owner).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| StakeError::invariant(owner, "custody balance overflow"))?;
        Ok(())
    }

    fn release(&self, owner: &Pubkey, amount: u64) -> Result<()> {
        let mut held = self.held.lock().expect("custody ledger poisoned");
        let balance = held.entry(*owner).or_insert(0);
        *balance = balance
            .checked_sub(amount)
            .ok_or_else(|| StakeError::invariant(owner, "release exceeds custody balance"))?;
        Ok(())
    }

    fn held(&self, owner: &Pubkey) -> u64 {
        self.held
            .lock()
            .expect("custody ledger poisoned")
            .get(owner)
            .copied()
            .unwrap_or(0)
    }
}
