use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::{
    config::StoreConfig, Outcome, Phase, Result, StoreError, TransactionDraft, TransactionRecord,
    TransactionStore, TxId,
};

/// PostgreSQL-backed transaction store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store on top of an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects using the given configuration.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| StoreError::Config("DATABASE_URL is not set".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(url)
            .await?;

        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record(row: PgRow) -> Result<TransactionRecord> {
        let timeout_secs: i64 = row.try_get("timeout")?;
        let timeout = u64::try_from(timeout_secs)
            .map(Duration::from_secs)
            .map_err(|_| StoreError::Corrupt(format!("negative timeout: {timeout_secs}")))?;

        let result = row
            .try_get::<Option<String>, _>("result")?
            .map(|s| {
                s.parse::<Outcome>()
                    .map_err(|e| StoreError::Corrupt(e.to_string()))
            })
            .transpose()?;

        let cost = row
            .try_get::<Option<i64>, _>("cost_ns")?
            .map(|ns| {
                u64::try_from(ns)
                    .map(Duration::from_nanos)
                    .map_err(|_| StoreError::Corrupt(format!("negative cost: {ns}")))
            })
            .transpose()?;

        Ok(TransactionRecord {
            id: TxId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            times: row.try_get::<i32, _>("times")? as u32,
            retry_at: row.try_get("retry_at")?,
            timeout,
            result,
            cost,
            content: row.try_get("content")?,
        })
    }
}

#[async_trait]
impl TransactionStore for PostgresStore {
    async fn save_transaction(&self, draft: &TransactionDraft) -> Result<TxId> {
        let id = TxId::generate();

        sqlx::query(
            r#"
            INSERT INTO gtm_transactions (id, name, times, retry_at, timeout, content)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id.as_uuid())
        .bind(&draft.name)
        .bind(draft.times as i32)
        .bind(draft.retry_at)
        .bind(draft.timeout.as_secs() as i64)
        .bind(&draft.content)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn save_transaction_result(
        &self,
        id: TxId,
        cost: Duration,
        result: Outcome,
    ) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE gtm_transactions
            SET result = $2, cost_ns = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(result.as_str())
        .bind(cost.as_nanos() as i64)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::TransactionNotFound(id));
        }
        Ok(())
    }

    async fn save_partner_result(
        &self,
        id: TxId,
        phase: Phase,
        offset: usize,
        cost: Duration,
        result: Outcome,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO gtm_partner_results (transaction_id, phase, step_offset, result, cost_ns)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (transaction_id, phase, step_offset)
            DO UPDATE SET result = EXCLUDED.result,
                          cost_ns = EXCLUDED.cost_ns,
                          updated_at = now()
            "#,
        )
        .bind(id.as_uuid())
        .bind(phase.as_str())
        .bind(offset as i32)
        .bind(result.as_str())
        .bind(cost.as_nanos() as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_partner_result(
        &self,
        id: TxId,
        phase: Phase,
        offset: usize,
    ) -> Result<Option<Outcome>> {
        let row: Option<String> = sqlx::query_scalar(
            r#"
            SELECT result FROM gtm_partner_results
            WHERE transaction_id = $1 AND phase = $2 AND step_offset = $3
            "#,
        )
        .bind(id.as_uuid())
        .bind(phase.as_str())
        .bind(offset as i32)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|s| {
            s.parse::<Outcome>()
                .map_err(|e| StoreError::Corrupt(e.to_string()))
        })
        .transpose()
    }

    async fn update_retry_time(
        &self,
        id: TxId,
        times: u32,
        retry_at: DateTime<Utc>,
    ) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE gtm_transactions
            SET times = $2, retry_at = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(times as i32)
        .bind(retry_at)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::TransactionNotFound(id));
        }
        Ok(())
    }

    async fn get_timeout_transactions(&self, count: usize) -> Result<Vec<TransactionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, times, retry_at, timeout, result, cost_ns, content
            FROM gtm_transactions
            WHERE result IS NULL AND retry_at < now()
            ORDER BY retry_at ASC
            LIMIT $1
            "#,
        )
        .bind(count as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }
}
