//! End-to-end flows through the staking engine with synthetic time.
//!
//! Epochs are 100 seconds from genesis 0, so epoch N spans
//! [N*100, N*100+99] and tests can advance time by picking timestamps.

use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

use stake_accounting::{
    CustodyLedger, EpochClock, MemoryLedger, MemoryStore, StakeEngine, StakeError, VestingSchedule,
};

fn engine() -> StakeEngine<MemoryStore, MemoryLedger> {
    StakeEngine::new(EpochClock::new(0, 100), MemoryStore::new(), MemoryLedger::new())
}

#[tokio::test]
async fn deposit_unlock_withdraw_full_scenario() {
    let engine = engine();
    let owner = Pubkey::new_unique();
    let now = 50; // epoch 0

    // Deposit and lock
    let position_ref = engine.deposit_and_lock(&owner, 600, now).await.unwrap();
    assert_eq!(position_ref.owner, owner);
    assert_eq!(position_ref.index, 0);

    // Find and parse stake accounts: exactly one per owner
    let accounts = engine.get_stake_accounts(&owner).await.unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].owner, owner);
    assert_eq!(accounts[0].positions[0].amount, 600);
    assert_eq!(accounts[0].token_balance, 600);

    let summary = engine.summarize_owner(&owner, now).await.unwrap();
    assert_eq!(summary.locked.locking, 600);
    assert_eq!(summary.withdrawable, 0);

    // Second deposit in the same epoch appends a position; no time has
    // passed, but LOCKING tokens count as locked for the summary
    let position_ref = engine.deposit_and_lock(&owner, 100, now).await.unwrap();
    assert_eq!(position_ref.index, 1);

    let accounts = engine.get_stake_accounts(&owner).await.unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].positions[1].amount, 100);
    assert_eq!(accounts[0].token_balance, 700);

    let summary = engine.summarize_owner(&owner, now).await.unwrap();
    assert_eq!(summary.locked.locking, 700);
    assert_eq!(summary.total(), 700);

    // Unlock too much
    let before = engine.summarize_owner(&owner, now).await.unwrap();
    let err = engine.unlock_tokens(&owner, 701, now).await.unwrap_err();
    assert!(matches!(err, StakeError::InsufficientLockedBalance));
    assert_eq!(err.to_string(), "Amount greater than locked amount");
    assert_eq!(engine.summarize_owner(&owner, now).await.unwrap(), before);

    // Unlock 600: the tokens never finished locking, so they come back
    // withdrawable immediately
    engine.unlock_tokens(&owner, 600, now).await.unwrap();
    let summary = engine.summarize_owner(&owner, now).await.unwrap();
    assert_eq!(summary.locked.locking, 100);
    assert_eq!(summary.withdrawable, 600);

    // Withdraw too much
    let before = engine.summarize_owner(&owner, now).await.unwrap();
    let err = engine.withdraw_tokens(&owner, 601, now).await.unwrap_err();
    assert!(matches!(err, StakeError::ExceedsWithdrawable));
    assert_eq!(err.to_string(), "Amount exceeds withdrawable");
    assert_eq!(engine.summarize_owner(&owner, now).await.unwrap(), before);

    // Withdraw
    engine.withdraw_tokens(&owner, 600, now).await.unwrap();
    let summary = engine.summarize_owner(&owner, now).await.unwrap();
    assert_eq!(summary.locked.locking, 100);
    assert_eq!(summary.withdrawable, 0);
    assert_eq!(summary.total(), 100);

    // Custody released exactly the withdrawn amount
    assert_eq!(engine.custody().held(&owner), 100);
}

#[tokio::test]
async fn unlocking_locked_tokens_goes_through_the_cooldown() {
    let engine = engine();
    let owner = Pubkey::new_unique();

    engine.deposit_and_lock(&owner, 500, 50).await.unwrap();

    // Epoch 2: warmup over, position is Locked
    engine.unlock_tokens(&owner, 500, 250).await.unwrap();

    // Same epoch: still counted under locked.*, not withdrawable
    let summary = engine.summarize_owner(&owner, 250).await.unwrap();
    assert_eq!(summary.locked.unlocking, 500);
    assert_eq!(summary.withdrawable, 0);

    // Epoch 3: one cooldown epoch remains
    let summary = engine.summarize_owner(&owner, 350).await.unwrap();
    assert_eq!(summary.locked.unlocking, 500);
    assert_eq!(summary.withdrawable, 0);

    let err = engine.withdraw_tokens(&owner, 500, 350).await.unwrap_err();
    assert!(matches!(err, StakeError::ExceedsWithdrawable));

    // Epoch 4: cooldown complete
    let summary = engine.summarize_owner(&owner, 450).await.unwrap();
    assert_eq!(summary.locked.unlocking, 0);
    assert_eq!(summary.withdrawable, 500);

    engine.withdraw_tokens(&owner, 500, 450).await.unwrap();
    assert_eq!(engine.custody().held(&owner), 0);
    let summary = engine.summarize_owner(&owner, 450).await.unwrap();
    assert_eq!(summary.total(), 0);
}

#[tokio::test]
async fn partial_unlock_splits_a_position_exactly() {
    let engine = engine();
    let owner = Pubkey::new_unique();

    engine.deposit_and_lock(&owner, 300, 50).await.unwrap();

    // Epoch 5: fully locked; unlock less than the position holds
    engine.unlock_tokens(&owner, 120, 550).await.unwrap();

    let accounts = engine.get_stake_accounts(&owner).await.unwrap();
    let positions = &accounts[0].positions;
    assert_eq!(positions.len(), 2);
    assert_eq!(positions[0].amount, 180);
    assert_eq!(positions[0].unlocking_start, None);
    assert_eq!(positions[1].amount, 120);
    assert_eq!(positions[1].unlocking_start, Some(5));

    let summary = engine.summarize_owner(&owner, 550).await.unwrap();
    assert_eq!(summary.locked.locked, 180);
    assert_eq!(summary.locked.unlocking, 120);
    assert_eq!(summary.total(), 300);

    // After the cooldown only the split-off portion is withdrawable,
    // and withdrawing it leaves the locked remainder untouched
    engine.withdraw_tokens(&owner, 120, 750).await.unwrap();
    let summary = engine.summarize_owner(&owner, 750).await.unwrap();
    assert_eq!(summary.locked.locked, 180);
    assert_eq!(summary.withdrawable, 0);
    assert_eq!(summary.total(), 180);
}

#[tokio::test]
async fn vesting_deposits_release_over_time() {
    let engine = engine();
    let owner = Pubkey::new_unique();
    let schedule = VestingSchedule::Linear {
        start_time: 0,
        duration_secs: 1_000,
        amount: 1_000,
    };

    engine.deposit_with_vesting(&owner, 1_000, schedule, 0).await.unwrap();

    let summary = engine.summarize_owner(&owner, 0).await.unwrap();
    assert_eq!(summary.unvested, 1_000);
    assert_eq!(summary.withdrawable, 0);
    assert_eq!(summary.total(), 1_000);

    // Halfway: half released, half withheld, conservation intact
    let summary = engine.summarize_owner(&owner, 500).await.unwrap();
    assert_eq!(summary.unvested, 500);
    assert_eq!(summary.withdrawable, 500);
    assert_eq!(summary.total(), 1_000);

    // The released half can be withdrawn; the rest cannot
    let err = engine.withdraw_tokens(&owner, 501, 500).await.unwrap_err();
    assert!(matches!(err, StakeError::ExceedsWithdrawable));
    engine.withdraw_tokens(&owner, 500, 500).await.unwrap();

    let summary = engine.summarize_owner(&owner, 500).await.unwrap();
    assert_eq!(summary.unvested, 500);
    assert_eq!(summary.withdrawable, 0);
    assert_eq!(summary.total(), 500);

    // A second schedule on the same account is rejected
    let err = engine
        .deposit_with_vesting(&owner, 10, VestingSchedule::Cliff { release_time: 9, amount: 10 }, 500)
        .await
        .unwrap_err();
    assert!(matches!(err, StakeError::VestingAlreadyConfigured));
}

#[tokio::test]
async fn operations_on_unknown_owners_fail_cleanly() {
    let engine = engine();
    let owner = Pubkey::new_unique();

    let err = engine.unlock_tokens(&owner, 1, 0).await.unwrap_err();
    assert!(matches!(err, StakeError::AccountNotFound(_)));
    let err = engine.withdraw_tokens(&owner, 1, 0).await.unwrap_err();
    assert!(matches!(err, StakeError::AccountNotFound(_)));
    let err = engine.summarize_owner(&owner, 0).await.unwrap_err();
    assert!(matches!(err, StakeError::AccountNotFound(_)));

    assert!(engine.get_stake_accounts(&owner).await.unwrap().is_empty());

    // Zero amounts are rejected, not silently dropped
    let err = engine.deposit_and_lock(&owner, 0, 0).await.unwrap_err();
    assert!(matches!(err, StakeError::InvalidAmount));
}

#[tokio::test]
async fn pool_tally_tracks_deposits_and_unlocks() {
    let engine = engine();
    let owner = Pubkey::new_unique();

    engine.deposit_and_lock(&owner, 600, 50).await.unwrap();
    engine.deposit_and_lock(&owner, 100, 50).await.unwrap();
    let aggregate = engine.locked_aggregate();
    assert_eq!(aggregate.locked, 0);
    assert_eq!(aggregate.delta_locked, 700);

    engine.unlock_tokens(&owner, 600, 50).await.unwrap();
    let aggregate = engine.locked_aggregate();
    assert_eq!(aggregate.delta_locked, 100);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_deposits_serialize_per_account() {
    let engine = Arc::new(engine());
    let owner = Pubkey::new_unique();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine.deposit_and_lock(&owner, 10, 50).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let accounts = engine.get_stake_accounts(&owner).await.unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].positions.len(), 10);
    assert_eq!(accounts[0].token_balance, 100);
    assert_eq!(engine.custody().held(&owner), 100);

    let summary = engine.summarize_owner(&owner, 50).await.unwrap();
    assert_eq!(summary.locked.locking, 100);
    assert_eq!(summary.total(), 100);
}

#[tokio::test]
async fn summaries_are_stable_for_fixed_inputs() {
    let engine = engine();
    let owner = Pubkey::new_unique();

    engine.deposit_and_lock(&owner, 700, 50).await.unwrap();
    engine.unlock_tokens(&owner, 200, 350).await.unwrap();

    for t in [0, 50, 349, 350, 351, 449, 450, 10_000] {
        let a = engine.summarize_owner(&owner, t).await.unwrap();
        let b = engine.summarize_owner(&owner, t).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.total(), 700, "conservation broken at t={}", t);
    }
}
