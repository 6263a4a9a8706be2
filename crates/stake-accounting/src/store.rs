//! Durable storage for stake accounts
//!
//! One record per owner, updated with a compare-and-swap version so
//! concurrent mutating operations against the same account serialize
//! cleanly: whoever loses the race reloads and revalidates against the
//! fresh state. Encoding of the persisted record is this module's
//! concern alone; the engine only sees `StakeAccount` values.

use anyhow::{Context, Result as AnyResult};
use solana_sdk::pubkey::Pubkey;
use sqlx::{FromRow, SqlitePool};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use crate::accounts::StakeAccount;
use crate::error::Result;
use crate::positions::Position;
use crate::vesting::VestingSchedule;

/// A stored account plus the version token needed to update it
#[derive(Debug, Clone)]
pub struct VersionedAccount {
    pub account: StakeAccount,
    pub version: u64,
}

pub trait AccountStore: Send + Sync {
    /// Load the owner's account, if any
    fn load(&self, owner: &Pubkey) -> impl Future<Output = Result<Option<VersionedAccount>>> + Send;

    /// Create a new account record. Returns false when the owner
    /// already has one (a concurrent creator won); the caller reloads
    /// and retries as a plain update.
    fn insert(&self, account: &StakeAccount) -> impl Future<Output = Result<bool>> + Send;

    /// Compare-and-swap update. Returns false when `expected_version`
    /// no longer matches (a concurrent writer won); the caller reloads
    /// and retries the whole read-validate-write cycle.
    fn update(&self, account: &StakeAccount, expected_version: u64) -> impl Future<Output = Result<bool>> + Send;

    /// All accounts for an owner; zero or one by design, the sequence
    /// shape is kept for forward compatibility
    fn accounts_for(&self, owner: &Pubkey) -> impl Future<Output = Result<Vec<StakeAccount>>> + Send;
}

// =============================================================================
// In-memory store
// =============================================================================

/// Mutexed map store for tests and embedders with their own durability
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<Pubkey, VersionedAccount>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountStore for MemoryStore {
    async fn load(&self, owner: &Pubkey) -> Result<Option<VersionedAccount>> {
        let records = self.records.lock().expect("account store poisoned");
        Ok(records.get(owner).cloned())
    }

    async fn insert(&self, account: &StakeAccount) -> Result<bool> {
        let mut records = self.records.lock().expect("account store poisoned");
        if records.contains_key(&account.owner) {
            return Ok(false);
        }
        records.insert(
            account.owner,
            VersionedAccount {
                account: account.clone(),
                version: 0,
            },
        );
        Ok(true)
    }

    async fn update(&self, account: &StakeAccount, expected_version: u64) -> Result<bool> {
        let mut records = self.records.lock().expect("account store poisoned");
        match records.get_mut(&account.owner) {
            Some(record) if record.version == expected_version => {
                record.account = account.clone();
                record.version += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(anyhow::anyhow!("no account record for owner {}", account.owner).into()),
        }
    }

    async fn accounts_for(&self, owner: &Pubkey) -> Result<Vec<StakeAccount>> {
        let records = self.records.lock().expect("account store poisoned");
        Ok(records.get(owner).map(|r| r.account.clone()).into_iter().collect())
    }
}

// =============================================================================
// SQLite store
// =============================================================================

/// Row type for stake account queries
#[derive(FromRow)]
struct StakeAccountRow {
    owner: String,
    token_balance: i64,
    vesting_json: String,
    positions: Vec<u8>,
    version: i64,
}

/// SQLite-backed store
///
/// One row per owner: the position list is a bincode blob, the vesting
/// schedule JSON (readable when poking at the database by hand), and a
/// version counter drives the compare-and-swap update.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub async fn open(path: &Path) -> AnyResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // SQLx requires the file to exist for SQLite
        if !path.exists() {
            std::fs::File::create(path)?;
        }

        let url = format!("sqlite:{}", path.display());
        let pool = SqlitePool::connect(&url)
            .await
            .context("Failed to open stake account database")?;

        // WAL mode and a busy timeout prevent SQLITE_BUSY errors when
        // multiple processes touch the database
        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout=5000").execute(&pool).await?;

        let store = Self { pool };
        store.init_schema().await?;

        Ok(store)
    }

    async fn init_schema(&self) -> AnyResult<()> {
        sqlx::query(
            "
            -- One record per owner; positions travel as a bincode blob
            CREATE TABLE IF NOT EXISTS stake_accounts (
                owner TEXT PRIMARY KEY,
                token_balance INTEGER NOT NULL,
                vesting_json TEXT NOT NULL,
                positions BLOB NOT NULL,
                version INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn decode_row(row: StakeAccountRow) -> AnyResult<VersionedAccount> {
        let owner = Pubkey::from_str(&row.owner).with_context(|| format!("Invalid owner key: {}", row.owner))?;
        let positions: Vec<Position> =
            bincode::deserialize(&row.positions).context("Failed to decode position list")?;
        let vesting_schedule: VestingSchedule =
            serde_json::from_str(&row.vesting_json).context("Failed to decode vesting schedule")?;
        let token_balance =
            u64::try_from(row.token_balance).context("Negative token balance in stored record")?;

        Ok(VersionedAccount {
            account: StakeAccount {
                owner,
                positions,
                token_balance,
                vesting_schedule,
            },
            version: u64::try_from(row.version).context("Negative version in stored record")?,
        })
    }

    fn encode_fields(account: &StakeAccount) -> AnyResult<(i64, String, Vec<u8>)> {
        let balance = i64::try_from(account.token_balance).context("Token balance exceeds storable range")?;
        let vesting_json = serde_json::to_string(&account.vesting_schedule).context("Failed to encode vesting")?;
        let positions = bincode::serialize(&account.positions).context("Failed to encode position list")?;
        Ok((balance, vesting_json, positions))
    }
}

impl AccountStore for SqliteStore {
    async fn load(&self, owner: &Pubkey) -> Result<Option<VersionedAccount>> {
        let row: Option<StakeAccountRow> = sqlx::query_as(
            "SELECT owner, token_balance, vesting_json, positions, version
             FROM stake_accounts WHERE owner = ?",
        )
        .bind(owner.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load stake account")?;

        match row {
            Some(row) => Ok(Some(Self::decode_row(row)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, account: &StakeAccount) -> Result<bool> {
        let (balance, vesting_json, positions) = Self::encode_fields(account)?;

        let result = sqlx::query(
            "INSERT INTO stake_accounts (owner, token_balance, vesting_json, positions, version)
             VALUES (?, ?, ?, ?, 0)
             ON CONFLICT(owner) DO NOTHING",
        )
        .bind(account.owner.to_string())
        .bind(balance)
        .bind(vesting_json)
        .bind(positions)
        .execute(&self.pool)
        .await
        .context("Failed to insert stake account")?;

        Ok(result.rows_affected() == 1)
    }

    async fn update(&self, account: &StakeAccount, expected_version: u64) -> Result<bool> {
        let (balance, vesting_json, positions) = Self::encode_fields(account)?;
        let expected = i64::try_from(expected_version).context("Version exceeds storable range")?;

        let result = sqlx::query(
            "UPDATE stake_accounts
             SET token_balance = ?, vesting_json = ?, positions = ?,
                 version = version + 1, updated_at = datetime('now')
             WHERE owner = ? AND version = ?",
        )
        .bind(balance)
        .bind(vesting_json)
        .bind(positions)
        .bind(account.owner.to_string())
        .bind(expected)
        .execute(&self.pool)
        .await
        .context("Failed to update stake account")?;

        Ok(result.rows_affected() == 1)
    }

    async fn accounts_for(&self, owner: &Pubkey) -> Result<Vec<StakeAccount>> {
        Ok(self.load(owner).await?.map(|v| v.account).into_iter().collect())
    }
}
