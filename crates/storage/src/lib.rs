use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use ledger_core::{CashEntry, SumFilter};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

/// Append-only store of cash entries.
///
/// `recorded_at` is stamped by the store at insert time. Range sums use the
/// half-open interval carried by [`SumFilter::Range`].
pub trait CashLedger: Send + Sync {
    async fn insert_cash_entry(&self, sender: &str, amount: Decimal) -> Result<CashEntry>;
    async fn sum_amounts(&self, filter: SumFilter) -> Result<Decimal>;
}

fn new_entry(sender: &str, amount: Decimal, recorded_at: DateTime<Utc>) -> Result<CashEntry> {
    if amount < Decimal::ZERO {
        bail!("refusing to record negative amount {}", amount);
    }

    Ok(CashEntry {
        id: Uuid::new_v4(),
        sender: sender.to_string(),
        amount,
        recorded_at,
    })
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<Vec<CashEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_cash_entry_at(
        &self,
        sender: &str,
        amount: Decimal,
        recorded_at: DateTime<Utc>,
    ) -> Result<CashEntry> {
        let entry = new_entry(sender, amount, recorded_at)?;
        self.entries.write().push(entry.clone());
        Ok(entry)
    }

    pub fn entries(&self) -> Vec<CashEntry> {
        self.entries.read().clone()
    }
}

impl CashLedger for MemoryStore {
    async fn insert_cash_entry(&self, sender: &str, amount: Decimal) -> Result<CashEntry> {
        self.insert_cash_entry_at(sender, amount, Utc::now())
    }

    async fn sum_amounts(&self, filter: SumFilter) -> Result<Decimal> {
        self.entries
            .read()
            .iter()
            .filter(|entry| filter.contains(entry.recorded_at))
            .try_fold(Decimal::ZERO, |sum, entry| add_amount(sum, entry.amount))
    }
}

fn add_amount(sum: Decimal, amount: Decimal) -> Result<Decimal> {
    sum.checked_add(amount).context("cash total overflowed")
}

// Fixed-width UTC text keeps lexical order equal to time order.
fn timestamp_text(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite url {}", database_url))?
            .create_if_missing(true);

        let mut pool_options = SqlitePoolOptions::new().max_connections(5);
        if database_url.contains(":memory:") {
            // Every connection to an in-memory database sees its own empty copy.
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("failed connecting to sqlite at {}", database_url))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cash_entries (
              id TEXT PRIMARY KEY,
              sender TEXT NOT NULL,
              amount TEXT NOT NULL,
              recorded_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS cash_entries_recorded_at ON cash_entries (recorded_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_cash_entry_at(
        &self,
        sender: &str,
        amount: Decimal,
        recorded_at: DateTime<Utc>,
    ) -> Result<CashEntry> {
        let entry = new_entry(sender, amount, recorded_at)?;

        sqlx::query(
            r#"
            INSERT INTO cash_entries (id, sender, amount, recorded_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(&entry.sender)
        .bind(entry.amount.to_string())
        .bind(timestamp_text(entry.recorded_at))
        .execute(&self.pool)
        .await
        .context("failed inserting cash entry")?;

        debug!(id = %entry.id, sender = %entry.sender, "cash entry stored");
        Ok(entry)
    }
}

impl CashLedger for SqliteStore {
    async fn insert_cash_entry(&self, sender: &str, amount: Decimal) -> Result<CashEntry> {
        self.insert_cash_entry_at(sender, amount, Utc::now()).await
    }

    async fn sum_amounts(&self, filter: SumFilter) -> Result<Decimal> {
        let rows = match filter {
            SumFilter::All => {
                sqlx::query("SELECT amount FROM cash_entries")
                    .fetch_all(&self.pool)
                    .await
            }
            SumFilter::Range {
                start_inclusive,
                end_exclusive,
            } => {
                sqlx::query(
                    r#"
                    SELECT amount
                    FROM cash_entries
                    WHERE recorded_at >= ?1 AND recorded_at < ?2
                    "#,
                )
                .bind(timestamp_text(start_inclusive))
                .bind(timestamp_text(end_exclusive))
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("failed reading cash entries")?;

        rows.iter().try_fold(Decimal::ZERO, |sum, row| {
            let text: String = row.get("amount");
            let amount = Decimal::from_str(&text)
                .with_context(|| format!("stored amount {:?} is not a decimal", text))?;
            add_amount(sum, amount)
        })
    }
}

#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl Store {
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub async fn sqlite(database_url: &str) -> Result<Self> {
        let sqlite = SqliteStore::connect(database_url).await?;
        Ok(Self::Sqlite(sqlite))
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Store::Memory(_) => "memory",
            Store::Sqlite(_) => "sqlite",
        }
    }
}

impl CashLedger for Store {
    async fn insert_cash_entry(&self, sender: &str, amount: Decimal) -> Result<CashEntry> {
        match self {
            Store::Memory(store) => store.insert_cash_entry(sender, amount).await,
            Store::Sqlite(store) => store.insert_cash_entry(sender, amount).await,
        }
    }

    async fn sum_amounts(&self, filter: SumFilter) -> Result<Decimal> {
        match self {
            Store::Memory(store) => store.sum_amounts(filter).await,
            Store::Sqlite(store) => store.sum_amounts(filter).await,
        }
    }
}
