use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::{Outcome, Phase, TxId};

/// A transaction as handed to [`save_transaction`] for its first durable
/// write. The store assigns the id.
///
/// `content` is an opaque blob owned by the coordinator; the store round-trips
/// it untouched so a reloaded transaction can rebuild its partner list.
///
/// [`save_transaction`]: crate::TransactionStore::save_transaction
#[derive(Debug, Clone)]
pub struct TransactionDraft {
    pub name: String,
    pub times: u32,
    pub retry_at: DateTime<Utc>,
    pub timeout: Duration,
    pub content: serde_json::Value,
}

/// A stored transaction row, as returned by the retry sweep.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub id: TxId,
    pub name: String,
    pub times: u32,
    pub retry_at: DateTime<Utc>,
    /// Minimum interval between retry attempts.
    pub timeout: Duration,
    /// Terminal result; `None` while the transaction is in flight.
    pub result: Option<Outcome>,
    /// Accumulated execution time, recorded with the terminal result.
    pub cost: Option<Duration>,
    pub content: serde_json::Value,
}

impl TransactionRecord {
    /// Returns true once a terminal result has been recorded.
    pub fn is_terminal(&self) -> bool {
        self.result.is_some()
    }
}

/// The durable result of one partner step.
///
/// `(tx_id, phase, offset)` is the primary key; writes are upserts and rows
/// are never deleted or downgraded.
#[derive(Debug, Clone)]
pub struct PartnerResultRecord {
    pub tx_id: TxId,
    pub phase: Phase,
    pub offset: usize,
    pub result: Outcome,
    /// Wall-clock time the partner call took.
    pub cost: Duration,
}
