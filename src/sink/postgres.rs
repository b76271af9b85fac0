use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use super::{FlushReport, Sink, SinkError};
use crate::transaction::Transaction;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Batch upserts into a PostgreSQL table keyed by `transaction_id`
pub struct PgSink {
    pool: PgPool,
    table: String,
    insert_query: String,
}

/// A batch split into one array per column, the shape `UNNEST` wants
#[derive(Debug, Default, PartialEq)]
struct Columns {
    transaction_ids: Vec<String>,
    user_ids: Vec<i64>,
    amounts: Vec<f64>,
    timestamps: Vec<String>,
    frauds: Vec<bool>,
}

impl From<&[Transaction]> for Columns {
    fn from(batch: &[Transaction]) -> Self {
        let mut columns = Columns {
            transaction_ids: Vec::with_capacity(batch.len()),
            user_ids: Vec::with_capacity(batch.len()),
            amounts: Vec::with_capacity(batch.len()),
            timestamps: Vec::with_capacity(batch.len()),
            frauds: Vec::with_capacity(batch.len()),
        };
        for tx in batch {
            columns.transaction_ids.push(tx.transaction_id.clone());
            columns.user_ids.push(tx.user_id);
            columns.amounts.push(tx.amount);
            columns.timestamps.push(tx.timestamp.clone());
            columns.frauds.push(tx.is_fraud);
        }
        columns
    }
}

fn create_table_query(table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    transaction_id TEXT PRIMARY KEY,
    user_id BIGINT NOT NULL,
    amount DOUBLE PRECISION NOT NULL,
    "timestamp" TEXT NOT NULL,
    is_fraud BOOLEAN NOT NULL
)
"#
    )
}

fn insert_query(table: &str) -> String {
    // a single statement, so the whole batch commits or fails as one
    format!(
        r#"
INSERT INTO {table} (transaction_id, user_id, amount, "timestamp", is_fraud)
SELECT * FROM UNNEST($1::text[], $2::int8[], $3::float8[], $4::text[], $5::bool[])
ON CONFLICT (transaction_id) DO NOTHING
"#
    )
}

impl PgSink {
    /// Connects to `dsn`; fails if the database cannot be reached.
    pub async fn connect(dsn: &str, max_connections: u32, table: &str) -> Result<Self, SinkError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(dsn)
            .await
            .map_err(SinkError::Connection)?;
        Ok(Self::from_pool(pool, table))
    }

    pub fn from_pool(pool: PgPool, table: &str) -> Self {
        PgSink {
            pool,
            table: table.to_string(),
            insert_query: insert_query(table),
        }
    }

    /// Creates the target table unless it already exists
    pub async fn ensure_schema(&self) -> Result<(), SinkError> {
        sqlx::query(&create_table_query(&self.table))
            .execute(&self.pool)
            .await
            .map_err(|error| SinkError::Query {
                command: "CREATE TABLE".to_owned(),
                error,
            })?;
        info!(table = self.table, "database initialized");
        Ok(())
    }
}

#[async_trait]
impl Sink for PgSink {
    async fn flush(&self, batch: &[Transaction]) -> Result<FlushReport, SinkError> {
        if batch.is_empty() {
            return Ok(FlushReport::default());
        }
        let columns = Columns::from(batch);
        let result = sqlx::query(&self.insert_query)
            .bind(&columns.transaction_ids)
            .bind(&columns.user_ids)
            .bind(&columns.amounts)
            .bind(&columns.timestamps)
            .bind(&columns.frauds)
            .execute(&self.pool)
            .await
            .map_err(|error| SinkError::Query {
                command: "INSERT".to_owned(),
                error,
            })?;

        let report = FlushReport {
            rows: batch.len() as u64,
            inserted: result.rows_affected(),
            fraud: columns.frauds.iter().filter(|f| **f).count() as u64,
        };
        debug!(
            rows = report.rows,
            inserted = report.inserted,
            "batch upserted"
        );
        if report.fraud > 0 {
            info!(fraud = report.fraud, rows = report.rows, "fraudulent transactions in batch");
        }
        Ok(report)
    }
}
