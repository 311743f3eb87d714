use crate::errors::{Error, Result};
use crate::metrics::DB_FAILURES_TOTAL;
use crate::model::{Reading, StoredReading};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, info, warn};

pub const DEFAULT_HISTORY_LIMIT: usize = 100;
pub const MAX_HISTORY_LIMIT: usize = 1000;

/// Clamps a requested history size to [1, 1000]; absent or non-positive
/// requests fall back to the default of 100.
pub fn clamp_limit(requested: Option<i64>) -> usize {
    match requested {
        Some(n) if n > 0 => (n as usize).min(MAX_HISTORY_LIMIT),
        _ => DEFAULT_HISTORY_LIMIT,
    }
}

/// Append-only persistence of validated readings.
///
/// `recent(n)` returns the n most recently appended readings in append
/// order, oldest first. Append must succeed before a reading is broadcast.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn append(&self, reading: &Reading) -> Result<i64>;
    async fn recent(&self, limit: usize) -> Result<Vec<StoredReading>>;
}

pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        info!("Connecting to database...");
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;

        info!("Database connection established");
        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Migrations completed");

        Ok(Self { pool })
    }

    async fn insert(&self, reading: &Reading) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO readings (device_id, ts, payload) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(reading.device_id())
        .bind(reading.timestamp())
        .bind(Json(reading))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }
}

#[async_trait]
impl ReadingStore for PgReadingStore {
    async fn append(&self, reading: &Reading) -> Result<i64> {
        let mut attempts = 0;
        let max_attempts = 5;

        loop {
            attempts += 1;
            match self.insert(reading).await {
                Ok(seq) => return Ok(seq),
                Err(Error::Database(db_err)) => {
                    if attempts >= max_attempts || !is_transient_error(&db_err) {
                        error!(
                            "Database append failed permanently after {} attempts: {}",
                            attempts, db_err
                        );
                        return Err(Error::Database(db_err));
                    }

                    let wait_ms = 100 * 2_u64.pow(attempts - 1).min(32);
                    warn!(
                        "Database append failed (attempt {}/{}), retrying in {}ms: {}",
                        attempts, max_attempts, wait_ms, db_err
                    );
                    DB_FAILURES_TOTAL.inc();
                    tokio::time::sleep(Duration::from_millis(wait_ms)).await;
                }
                Err(e) => {
                    error!("Database append failed with non-database error: {}", e);
                    return Err(e);
                }
            }
        }
    }

    async fn recent(&self, limit: usize) -> Result<Vec<StoredReading>> {
        let limit = limit.clamp(1, MAX_HISTORY_LIMIT);
        let rows: Vec<(i64, Json<Reading>)> =
            sqlx::query_as("SELECT id, payload FROM readings ORDER BY id DESC LIMIT $1")
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?;

        let mut readings: Vec<StoredReading> = rows
            .into_iter()
            .map(|(seq, payload)| StoredReading {
                seq,
                reading: payload.0,
            })
            .collect();
        readings.reverse();
        Ok(readings)
    }
}

fn is_transient_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db_err) => {
            // Connection-related SQLSTATE classes
            db_err.code().is_some_and(|code| {
                code == "08000" || // connection_exception
                code == "08003" || // connection_does_not_exist
                code == "08006" || // connection_failure
                code == "57P03" || // cannot_connect_now
                code == "53300" // too_many_connections
            })
        }
        _ => false,
    }
}

/// In-memory store for local testing.
pub struct MemoryReadingStore {
    inner: Mutex<MemoryInner>,
}

struct MemoryInner {
    next_seq: i64,
    rows: Vec<StoredReading>,
}

impl MemoryReadingStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                next_seq: 1,
                rows: Vec::new(),
            }),
        }
    }
}

impl Default for MemoryReadingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadingStore for MemoryReadingStore {
    async fn append(&self, reading: &Reading) -> Result<i64> {
        let mut inner = self.inner.lock().expect("reading store lock poisoned");
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.rows.push(StoredReading {
            seq,
            reading: reading.clone(),
        });
        Ok(seq)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<StoredReading>> {
        let limit = limit.clamp(1, MAX_HISTORY_LIMIT);
        let inner = self.inner.lock().expect("reading store lock poisoned");
        let start = inner.rows.len().saturating_sub(limit);
        Ok(inner.rows[start..].to_vec())
    }
}
