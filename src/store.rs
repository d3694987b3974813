/// store.rs — SQLite repository for daily price bars
///
/// One table per ticker, keyed by date. Writes take an explicit
/// `ConflictPolicy` per call instead of relying on any implicit global
/// "if exists" state: `Fail` surfaces `StoreConflict` when the table is
/// already present, `Replace` drops and recreates it.
///
/// The pool handle is cheaply clonable; the engine takes one per
/// invocation so concurrent requests never share mutable core state.
use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::data::PriceBar;
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Error with `StoreConflict` if the table already exists.
    Fail,
    /// Drop any existing table for the ticker and write the new rows.
    Replace,
}

#[derive(Debug, Clone)]
pub struct BarStore {
    pool: SqlitePool,
}

impl BarStore {
    /// Open (creating if missing) the bar database at `path`.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));
        let pool = SqlitePool::connect_with(options).await?;
        info!(path = %path.display(), "opened bar store");
        Ok(Self { pool })
    }

    /// In-memory store, used by tests. Pinned to a single pooled
    /// connection: each SQLite `:memory:` connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::new().in_memory(true))
            .await?;
        Ok(Self { pool })
    }

    /// Insert a full bar table for `ticker` under the given conflict
    /// policy. Returns the number of rows written.
    pub async fn insert_bars(
        &self,
        ticker: &str,
        bars: &[PriceBar],
        policy: ConflictPolicy,
    ) -> Result<u64> {
        let exists = self.table_exists(ticker).await?;
        match policy {
            ConflictPolicy::Fail if exists => {
                return Err(EngineError::StoreConflict(ticker.to_owned()));
            }
            ConflictPolicy::Replace if exists => {
                sqlx::query(&format!("DROP TABLE {}", quote_ident(ticker)))
                    .execute(&self.pool)
                    .await?;
            }
            _ => {}
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "CREATE TABLE {} (
                date TEXT PRIMARY KEY,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL
            )",
            quote_ident(ticker)
        ))
        .execute(&mut *tx)
        .await?;

        let insert_sql = format!(
            "INSERT INTO {} (date, open, high, low, close, volume) VALUES (?, ?, ?, ?, ?, ?)",
            quote_ident(ticker)
        );
        for bar in bars {
            sqlx::query(&insert_sql)
                .bind(bar.date)
                .bind(bar.open)
                .bind(bar.high)
                .bind(bar.low)
                .bind(bar.close)
                .bind(bar.volume)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!(ticker, rows = bars.len(), "inserted bar table");
        Ok(bars.len() as u64)
    }

    /// Read stored bars for `ticker`, ascending by date. With a limit,
    /// the *most recent* `limit` rows are returned (still ascending).
    /// A ticker with no table reads as zero rows.
    pub async fn read_bars(&self, ticker: &str, limit: Option<u32>) -> Result<Vec<PriceBar>> {
        if !self.table_exists(ticker).await? {
            return Ok(Vec::new());
        }

        let sql = match limit {
            Some(n) => format!(
                "SELECT date, open, high, low, close, volume FROM {} \
                 ORDER BY date DESC LIMIT {n}",
                quote_ident(ticker)
            ),
            None => format!(
                "SELECT date, open, high, low, close, volume FROM {} ORDER BY date DESC",
                quote_ident(ticker)
            ),
        };

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let mut bars = Vec::with_capacity(rows.len());
        for row in rows {
            bars.push(PriceBar {
                date: row.try_get::<NaiveDate, _>("date")?,
                open: row.try_get("open")?,
                high: row.try_get("high")?,
                low: row.try_get("low")?,
                close: row.try_get("close")?,
                volume: row.try_get("volume")?,
            });
        }
        bars.reverse(); // DESC fetch → ascending output
        Ok(bars)
    }

    async fn table_exists(&self, ticker: &str) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(ticker)
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n > 0)
    }
}

/// Double-quote an identifier so arbitrary ticker symbols are safe as
/// table names.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
