//! Phase execution across a transaction's partners.

use std::future::Future;
use std::time::Instant;

use async_trait::async_trait;
use common::TxId;
use tracing::{debug, warn};
use tx_store::{Outcome, Phase, TransactionStore};

use crate::error::{GtmError, PartnerError};
use crate::transaction::Transaction;

/// Verdict of a prepare-phase walk.
#[derive(Debug)]
pub enum PhaseVerdict {
    /// Every partner prepared successfully.
    Success,
    /// Definite failure; compensate offsets `0..=undo_from` in reverse.
    /// `None` means no partner needs compensation.
    Fail { undo_from: Option<usize> },
    /// The attempt cannot classify the transaction; it stays in flight and
    /// the sweeper retries it.
    Uncertain(GtmError),
}

/// Drives one phase at a time across the partner lists.
///
/// The default implementation is [`SequentialDoer`]; replace it through
/// [`Gtm::with_doer`](crate::Gtm::with_doer) to change the walking strategy.
/// Every implementation must preserve the offset semantics: a partner's
/// offset within its phase keys its durable step result.
#[async_trait]
pub trait Doer: Send + Sync {
    /// Walks the normal partners in ascending offset order.
    async fn do_normal(&self, store: &dyn TransactionStore, tx: &Transaction) -> PhaseVerdict;

    /// Prepares the single optional uncertain partner.
    async fn do_uncertain(&self, store: &dyn TransactionStore, tx: &Transaction) -> PhaseVerdict;

    /// Commits normal, certain and (on retries) async partners.
    ///
    /// Returns `done = true` when the commit walk covered everything the
    /// transaction will ever run, so the terminal success result may be
    /// written. On a first attempt with async partners pending, `done` is
    /// false and the terminal write is deferred to the retry that flushes
    /// them.
    async fn do_next(
        &self,
        store: &dyn TransactionStore,
        tx: &Transaction,
    ) -> Result<bool, GtmError>;

    /// Compensates normal partners from `undo_from` down to 0.
    async fn undo(
        &self,
        store: &dyn TransactionStore,
        tx: &Transaction,
        undo_from: Option<usize>,
    ) -> Result<(), GtmError>;
}

/// The default doer: partners run one at a time, in registration order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialDoer;

#[async_trait]
impl Doer for SequentialDoer {
    async fn do_normal(&self, store: &dyn TransactionStore, tx: &Transaction) -> PhaseVerdict {
        let Some(id) = tx.id else {
            return PhaseVerdict::Uncertain(GtmError::NotPersisted);
        };

        for (offset, slot) in tx.normals.iter().enumerate() {
            let outcome = match cached_result(store, tx, Phase::DoNormal, offset).await {
                Some(outcome) => {
                    debug!(offset, %outcome, "using stored do-normal result");
                    outcome
                }
                None => {
                    let begin = Instant::now();
                    let (outcome, reason) = classify(slot.partner.prepare().await);
                    if let Some(reason) = &reason {
                        warn!(offset, %reason, "normal partner prepare error");
                    }

                    if let Err(e) = store
                        .save_partner_result(id, Phase::DoNormal, offset, begin.elapsed(), outcome)
                        .await
                    {
                        return PhaseVerdict::Uncertain(GtmError::Uncertain {
                            phase: Phase::DoNormal,
                            offset,
                            reason: format!("save partner result failed: {e}"),
                        });
                    }
                    outcome
                }
            };

            match outcome {
                Outcome::Success => {}
                Outcome::Fail => {
                    warn!(offset, "normal partner failed; compensating earlier partners");
                    return PhaseVerdict::Fail {
                        undo_from: offset.checked_sub(1),
                    };
                }
                Outcome::Uncertain => {
                    warn!(offset, "normal partner uncertain; compensating through this partner");
                    return PhaseVerdict::Fail {
                        undo_from: Some(offset),
                    };
                }
            }
        }

        PhaseVerdict::Success
    }

    async fn do_uncertain(&self, store: &dyn TransactionStore, tx: &Transaction) -> PhaseVerdict {
        let Some(slot) = &tx.uncertain else {
            return PhaseVerdict::Success;
        };
        let Some(id) = tx.id else {
            return PhaseVerdict::Uncertain(GtmError::NotPersisted);
        };

        let (outcome, reason) = match cached_result(store, tx, Phase::DoUncertain, 0).await {
            Some(outcome) => {
                debug!(%outcome, "using stored do-uncertain result");
                (outcome, None)
            }
            None => {
                let begin = Instant::now();
                let (outcome, reason) = classify(slot.partner.prepare().await);

                // Only definite answers are recorded; an uncertain one must
                // be asked again on the next attempt.
                if outcome.is_definite()
                    && let Err(e) = store
                        .save_partner_result(id, Phase::DoUncertain, 0, begin.elapsed(), outcome)
                        .await
                {
                    return PhaseVerdict::Uncertain(GtmError::Uncertain {
                        phase: Phase::DoUncertain,
                        offset: 0,
                        reason: format!("save partner result failed: {e}"),
                    });
                }
                (outcome, reason)
            }
        };

        match outcome {
            Outcome::Success => PhaseVerdict::Success,
            Outcome::Fail => {
                warn!("uncertain partner failed; compensating all normal partners");
                PhaseVerdict::Fail {
                    undo_from: tx.normals.len().checked_sub(1),
                }
            }
            Outcome::Uncertain => PhaseVerdict::Uncertain(GtmError::Uncertain {
                phase: Phase::DoUncertain,
                offset: 0,
                reason: reason
                    .unwrap_or_else(|| "partner gave no definite result".to_string()),
            }),
        }
    }

    async fn do_next(
        &self,
        store: &dyn TransactionStore,
        tx: &Transaction,
    ) -> Result<bool, GtmError> {
        let Some(id) = tx.id else {
            return Err(GtmError::NotPersisted);
        };

        // Async partners join the walk on retries only, so a foreground
        // execute returns without waiting for them.
        let include_async = tx.times > 1;
        let done = include_async || tx.asyncs.is_empty();

        let mut offset = 0;
        for slot in &tx.normals {
            commit_step(store, tx, id, offset, slot.partner.commit()).await?;
            offset += 1;
        }
        for slot in &tx.certains {
            commit_step(store, tx, id, offset, slot.partner.commit()).await?;
            offset += 1;
        }
        if include_async {
            for slot in &tx.asyncs {
                commit_step(store, tx, id, offset, slot.partner.commit()).await?;
                offset += 1;
            }
        }

        Ok(done)
    }

    async fn undo(
        &self,
        store: &dyn TransactionStore,
        tx: &Transaction,
        undo_from: Option<usize>,
    ) -> Result<(), GtmError> {
        let Some(from) = undo_from else {
            return Ok(());
        };
        let Some(id) = tx.id else {
            return Err(GtmError::NotPersisted);
        };

        for offset in (0..=from).rev() {
            if cached_result(store, tx, Phase::Undo, offset).await == Some(Outcome::Success) {
                debug!(offset, "undo already recorded; skipping");
                continue;
            }

            let begin = Instant::now();
            tx.normals[offset]
                .partner
                .compensate()
                .await
                .map_err(|e| GtmError::CompensateIncomplete {
                    offset,
                    reason: e.to_string(),
                })?;

            store
                .save_partner_result(id, Phase::Undo, offset, begin.elapsed(), Outcome::Success)
                .await
                .map_err(|e| GtmError::CompensateIncomplete {
                    offset,
                    reason: format!("save partner result failed: {e}"),
                })?;
        }

        Ok(())
    }
}

/// Runs one commit step, skipping it when a success is already on record.
async fn commit_step<F>(
    store: &dyn TransactionStore,
    tx: &Transaction,
    id: TxId,
    offset: usize,
    commit: F,
) -> Result<(), GtmError>
where
    F: Future<Output = Result<(), PartnerError>> + Send,
{
    if cached_result(store, tx, Phase::DoNext, offset).await == Some(Outcome::Success) {
        debug!(offset, "doNext already recorded; skipping");
        return Ok(());
    }

    let begin = Instant::now();
    commit.await.map_err(|e| GtmError::CommitIncomplete {
        offset,
        reason: e.to_string(),
    })?;

    store
        .save_partner_result(id, Phase::DoNext, offset, begin.elapsed(), Outcome::Success)
        .await
        .map_err(|e| GtmError::CommitIncomplete {
            offset,
            reason: format!("save partner result failed: {e}"),
        })?;
    Ok(())
}

/// Folds a partner call's error channel into the outcome: an `Err` means the
/// caller cannot know whether the side effect applied.
fn classify(result: Result<Outcome, PartnerError>) -> (Outcome, Option<String>) {
    match result {
        Ok(outcome) => (outcome, None),
        Err(e) => (Outcome::Uncertain, Some(e.to_string())),
    }
}

/// Reads a step's stored result, skipping the round trip on first attempts.
///
/// The cache is consulted only when `times > 1`: a first attempt cannot have
/// prior results. Read failures degrade to a miss; the step re-runs, which
/// the idempotency contract allows.
async fn cached_result(
    store: &dyn TransactionStore,
    tx: &Transaction,
    phase: Phase,
    offset: usize,
) -> Option<Outcome> {
    if tx.times <= 1 {
        return None;
    }
    let id = tx.id?;

    match store.get_partner_result(id, phase, offset).await {
        Ok(result) => result,
        Err(e) => {
            warn!(%phase, offset, error = %e, "partner result lookup failed; re-running step");
            None
        }
    }
}
