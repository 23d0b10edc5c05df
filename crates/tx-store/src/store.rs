use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Outcome, Phase, Result, TransactionDraft, TransactionRecord, TxId};

/// Core trait for transaction store implementations.
///
/// The coordinator treats the store as the only durable record of a
/// transaction's progress: the transaction row itself, one result row per
/// partner step, and a retry index ordering non-terminal transactions by
/// due time. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Persists a new transaction and enters it into the retry index.
    ///
    /// Must be durable before returning. Assigns and returns the
    /// transaction's id.
    async fn save_transaction(&self, draft: &TransactionDraft) -> Result<TxId>;

    /// Records the transaction's terminal result and accumulated cost.
    ///
    /// Must be durable before returning. A definite result removes the
    /// transaction from the retry index, so the sweeper never sees it again.
    async fn save_transaction_result(
        &self,
        id: TxId,
        cost: Duration,
        result: Outcome,
    ) -> Result<()>;

    /// Upserts the result of one partner step, keyed by
    /// `(id, phase, offset)`.
    ///
    /// Performance first, best-effort durable: the coordinator tolerates a
    /// lost write by re-invoking the (idempotent) partner on the next retry.
    async fn save_partner_result(
        &self,
        id: TxId,
        phase: Phase,
        offset: usize,
        cost: Duration,
        result: Outcome,
    ) -> Result<()>;

    /// Returns the stored result of one partner step.
    ///
    /// A miss is `Ok(None)` and is normal on a transaction's first pass
    /// through a phase.
    async fn get_partner_result(
        &self,
        id: TxId,
        phase: Phase,
        offset: usize,
    ) -> Result<Option<Outcome>>;

    /// Rewrites the transaction's attempt counter and next due time in a
    /// single write.
    async fn update_retry_time(
        &self,
        id: TxId,
        times: u32,
        retry_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Returns up to `count` transactions with no terminal result whose
    /// `retry_at` has elapsed, ordered by due time.
    ///
    /// Callers running several sweepers concurrently must layer an atomic
    /// claim on top; a single sweeper per process needs none.
    async fn get_timeout_transactions(&self, count: usize) -> Result<Vec<TransactionRecord>>;
}
