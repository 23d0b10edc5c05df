use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    Outcome, PartnerResultRecord, Phase, Result, StoreError, TransactionDraft, TransactionRecord,
    TransactionStore, TxId,
};

/// In-memory transaction store for testing.
///
/// Stores everything behind an `Arc`, so clones observe the same state and
/// a test can inspect what the coordinator persisted. Provides the same
/// interface as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    transactions: HashMap<TxId, TransactionRecord>,
    partner_results: HashMap<(TxId, Phase, usize), PartnerResultRecord>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a stored transaction row, if present.
    pub async fn transaction(&self, id: TxId) -> Option<TransactionRecord> {
        self.inner.read().await.transactions.get(&id).cloned()
    }

    /// Returns every partner result stored for a transaction, ordered by
    /// phase then offset.
    pub async fn partner_results(&self, id: TxId) -> Vec<PartnerResultRecord> {
        let inner = self.inner.read().await;
        let mut rows: Vec<_> = inner
            .partner_results
            .values()
            .filter(|r| r.tx_id == id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.phase.as_str(), r.offset));
        rows
    }

    /// Returns the total number of stored transactions.
    pub async fn transaction_count(&self) -> usize {
        self.inner.read().await.transactions.len()
    }

    /// Clears all transactions and partner results.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.transactions.clear();
        inner.partner_results.clear();
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn save_transaction(&self, draft: &TransactionDraft) -> Result<TxId> {
        let id = TxId::generate();
        let record = TransactionRecord {
            id,
            name: draft.name.clone(),
            times: draft.times,
            retry_at: draft.retry_at,
            timeout: draft.timeout,
            result: None,
            cost: None,
            content: draft.content.clone(),
        };

        self.inner.write().await.transactions.insert(id, record);
        Ok(id)
    }

    async fn save_transaction_result(
        &self,
        id: TxId,
        cost: Duration,
        result: Outcome,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .transactions
            .get_mut(&id)
            .ok_or(StoreError::TransactionNotFound(id))?;

        record.result = Some(result);
        record.cost = Some(cost);
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
        let record = PartnerResultRecord {
            tx_id: id,
            phase,
            offset,
            result,
            cost,
        };

        self.inner
            .write()
            .await
            .partner_results
            .insert((id, phase, offset), record);
        Ok(())
    }

    async fn get_partner_result(
        &self,
        id: TxId,
        phase: Phase,
        offset: usize,
    ) -> Result<Option<Outcome>> {
        let inner = self.inner.read().await;
        Ok(inner
            .partner_results
            .get(&(id, phase, offset))
            .map(|r| r.result))
    }

    async fn update_retry_time(
        &self,
        id: TxId,
        times: u32,
        retry_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .transactions
            .get_mut(&id)
            .ok_or(StoreError::TransactionNotFound(id))?;

        record.times = times;
        record.retry_at = retry_at;
        Ok(())
    }

    async fn get_timeout_transactions(&self, count: usize) -> Result<Vec<TransactionRecord>> {
        let now = Utc::now();
        let inner = self.inner.read().await;

        let mut due: Vec<_> = inner
            .transactions
            .values()
            .filter(|r| r.result.is_none() && r.retry_at < now)
            .cloned()
            .collect();
        due.sort_by_key(|r| r.retry_at);
        due.truncate(count);
        Ok(due)
    }
}
