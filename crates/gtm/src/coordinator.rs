//! The coordinator: drives transactions through their phases and sweeps
//! timed-out ones back to a terminal outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use common::TxId;
use tx_store::{Outcome, TransactionDraft, TransactionStore};

use crate::doer::{Doer, PhaseVerdict, SequentialDoer};
use crate::error::{GtmError, Result};
use crate::registry::PartnerRegistry;
use crate::timer::{DoubleTimer, RetryTimer};
use crate::transaction::Transaction;

/// Default minimum interval between retry attempts.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Coordinates global transactions against a store, a retry timer and a
/// doer.
///
/// One `Gtm` per process is the intended deployment; transactions read their
/// dependencies from it at execution time, so a transaction reloaded by the
/// sweeper rebinds to whatever the coordinator currently holds.
pub struct Gtm {
    store: Arc<dyn TransactionStore>,
    timer: Arc<dyn RetryTimer>,
    doer: Arc<dyn Doer>,
    registry: Arc<PartnerRegistry>,
    default_timeout: Duration,
}

impl Gtm {
    /// Creates a coordinator with the default timer ([`DoubleTimer`]), the
    /// default doer ([`SequentialDoer`]), a 60s default timeout and an empty
    /// partner registry.
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self {
            store,
            timer: Arc::new(DoubleTimer),
            doer: Arc::new(SequentialDoer),
            registry: Arc::new(PartnerRegistry::new()),
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Replaces the retry timer.
    pub fn with_timer(mut self, timer: impl RetryTimer + 'static) -> Self {
        self.timer = Arc::new(timer);
        self
    }

    /// Replaces the doer.
    pub fn with_doer(mut self, doer: impl Doer + 'static) -> Self {
        self.doer = Arc::new(doer);
        self
    }

    /// Installs the partner registry the sweeper uses to rebuild reloaded
    /// transactions.
    pub fn with_registry(mut self, registry: PartnerRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Changes the default minimum retry interval applied to transactions
    /// that did not set their own.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Executes a transaction inline and returns its outcome.
    ///
    /// `Ok(Success)` and `Ok(Fail)` are terminal. An `Err` whose
    /// [`is_in_flight`](GtmError::is_in_flight) is true means the
    /// transaction was persisted and the sweeper will drive it to a terminal
    /// outcome; an `Err` on the first save means nothing was persisted and
    /// the caller decides whether to try again.
    #[tracing::instrument(skip(self, tx), fields(name = %tx.name()))]
    pub async fn execute(&self, tx: &mut Transaction) -> Result<Outcome> {
        metrics::counter!("gtm_executions_total").increment(1);

        let timeout = tx.timeout.unwrap_or(self.default_timeout);
        tx.timeout = Some(timeout);
        tx.times = 1;
        tx.retry_at = Some(self.timer.next_retry_at(0, timeout));

        let draft = self.draft(tx)?;
        let id = self.store.save_transaction(&draft).await?;
        tx.id = Some(id);
        tracing::info!(%id, "transaction saved; starting first attempt");

        self.run(tx).await
    }

    /// Persists a transaction for background execution and returns
    /// immediately.
    ///
    /// The transaction is due at once; the sweeper's next cycle picks it up
    /// and runs its first attempt.
    #[tracing::instrument(skip(self, tx), fields(name = %tx.name()))]
    pub async fn execute_async(&self, tx: &mut Transaction) -> Result<()> {
        let timeout = tx.timeout.unwrap_or(self.default_timeout);
        tx.timeout = Some(timeout);
        tx.retry_at = Some(Utc::now());

        let draft = self.draft(tx)?;
        let id = self.store.save_transaction(&draft).await?;
        tx.id = Some(id);
        tracing::info!(%id, "transaction queued for background execution");

        Ok(())
    }

    /// Runs one retry attempt of a persisted transaction.
    ///
    /// Advances the attempt counter and the next due time in a single store
    /// write, then runs the same phase sequence as [`execute`](Gtm::execute).
    /// Because the counter is now past 1, the doer consults stored step
    /// results before invoking any partner, resuming past the last durable
    /// success.
    #[tracing::instrument(skip(self, tx), fields(id = ?tx.id(), name = %tx.name()))]
    pub async fn execute_retry(&self, tx: &mut Transaction) -> Result<Outcome> {
        let id = tx.id.ok_or(GtmError::NotPersisted)?;
        metrics::counter!("gtm_retries_total").increment(1);

        let timeout = tx.timeout.unwrap_or(self.default_timeout);
        tx.timeout = Some(timeout);
        tx.times += 1;
        let retry_at = self.timer.next_retry_at(tx.times, timeout);
        tx.retry_at = Some(retry_at);
        self.store.update_retry_time(id, tx.times, retry_at).await?;
        tracing::info!(%id, times = tx.times, "retrying transaction");

        self.run(tx).await
    }

    /// Fetches up to `count` due transactions and retries each one.
    ///
    /// Returns one entry per fetched row, in due-time order. This performs a
    /// single pass; an outer driver calls it on a timer, sleeping between
    /// empty batches.
    #[tracing::instrument(skip(self))]
    pub async fn retry_timeout_transactions(&self, count: usize) -> Result<Vec<SweepOutcome>> {
        let records = self.store.get_timeout_transactions(count).await?;
        tracing::debug!(due = records.len(), "sweeping due transactions");

        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            let id = record.id;
            match self.registry.decode(&record) {
                Ok(mut tx) => {
                    let result = self.execute_retry(&mut tx).await;
                    outcomes.push(SweepOutcome {
                        id,
                        transaction: Some(tx),
                        result,
                    });
                }
                Err(e) => {
                    tracing::warn!(%id, error = %e, "stored transaction failed to decode");
                    outcomes.push(SweepOutcome {
                        id,
                        transaction: None,
                        result: Err(e),
                    });
                }
            }
        }

        Ok(outcomes)
    }

    /// The shared attempt body: prepare phases, then the outcome table.
    async fn run(&self, tx: &mut Transaction) -> Result<Outcome> {
        let begin = Instant::now();
        tx.started_at = Some(Utc::now());

        let result = self.run_phases(tx, begin).await;
        metrics::histogram!("gtm_duration_seconds").record(begin.elapsed().as_secs_f64());

        match &result {
            Ok(outcome) => {
                metrics::counter!("gtm_completed", "outcome" => outcome.as_str()).increment(1);
                tracing::info!(id = ?tx.id, %outcome, "transaction reached a terminal outcome");
            }
            Err(e) if e.is_in_flight() => {
                metrics::counter!("gtm_uncertain").increment(1);
                tracing::warn!(id = ?tx.id, error = %e, "transaction left in flight; sweeper will retry");
            }
            Err(e) => {
                tracing::warn!(id = ?tx.id, error = %e, "transaction attempt failed");
            }
        }

        result
    }

    async fn run_phases(&self, tx: &mut Transaction, begin: Instant) -> Result<Outcome> {
        let store = self.store.as_ref();
        let id = tx.id.ok_or(GtmError::NotPersisted)?;

        let verdict = match self.doer.do_normal(store, tx).await {
            PhaseVerdict::Success => self.doer.do_uncertain(store, tx).await,
            verdict => verdict,
        };

        match verdict {
            PhaseVerdict::Success => {
                let done = self.doer.do_next(store, tx).await?;
                if done {
                    self.store
                        .save_transaction_result(id, begin.elapsed(), Outcome::Success)
                        .await
                        .map_err(GtmError::TerminalWriteFailed)?;
                } else {
                    tracing::info!(%id, "async partners pending; terminal write deferred to retry");
                }
                Ok(Outcome::Success)
            }
            PhaseVerdict::Fail { undo_from } => {
                self.doer.undo(store, tx, undo_from).await?;
                self.store
                    .save_transaction_result(id, begin.elapsed(), Outcome::Fail)
                    .await
                    .map_err(GtmError::TerminalWriteFailed)?;
                Ok(Outcome::Fail)
            }
            PhaseVerdict::Uncertain(e) => Err(e),
        }
    }

    fn draft(&self, tx: &Transaction) -> Result<TransactionDraft> {
        Ok(TransactionDraft {
            name: tx.name.clone(),
            times: tx.times,
            retry_at: tx.retry_at.unwrap_or_else(Utc::now),
            timeout: tx.timeout.unwrap_or(self.default_timeout),
            content: tx.content()?,
        })
    }
}

/// Result of retrying one swept transaction.
#[derive(Debug)]
pub struct SweepOutcome {
    pub id: TxId,
    /// `None` when the stored content blob could not be decoded.
    pub transaction: Option<Transaction>,
    pub result: Result<Outcome>,
}
