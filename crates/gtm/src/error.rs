//! Coordinator error types.

use thiserror::Error;
use tx_store::{Phase, StoreError};

/// Error type partners report from their operations.
///
/// The coordinator never inspects it beyond formatting; it is carried into
/// [`GtmError`] with the phase and offset where the step ran.
pub type PartnerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while driving a transaction.
///
/// `Uncertain`, `CommitIncomplete` and `CompensateIncomplete` all mean the
/// transaction is still in flight: no terminal result was written and the
/// sweeper will drive it to an outcome, resuming at the phase and offset
/// the error names.
#[derive(Debug, Error)]
pub enum GtmError {
    /// The prepare phase could not classify the transaction.
    #[error("uncertain at {phase}/{offset}: {reason}")]
    Uncertain {
        phase: Phase,
        offset: usize,
        reason: String,
    },

    /// A commit step failed transiently; the retry resumes at this offset.
    #[error("commit incomplete at offset {offset}: {reason}")]
    CommitIncomplete { offset: usize, reason: String },

    /// A compensation step failed transiently; the retry resumes at this
    /// offset.
    #[error("compensation incomplete at offset {offset}: {reason}")]
    CompensateIncomplete { offset: usize, reason: String },

    /// The transaction ran to a decision, but the terminal result could not
    /// be recorded. The reported outcome is downgraded to uncertain: the
    /// row is persisted, still in the retry index, and the sweeper will
    /// replay the attempt.
    #[error("terminal result write failed: {0}")]
    TerminalWriteFailed(#[source] StoreError),

    /// The transaction store failed before the transaction was persisted,
    /// or while rescheduling it.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A stored content blob names a partner kind the registry does not know.
    #[error("unknown partner kind: {0:?}")]
    UnknownPartnerKind(String),

    /// A partner payload could not be serialized or deserialized.
    #[error("partner payload error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The operation requires a transaction that has been saved.
    #[error("transaction has not been persisted")]
    NotPersisted,

    /// A transaction may carry at most one uncertain partner.
    #[error("transaction already has an uncertain partner")]
    UncertainPartnerAlreadySet,
}

impl GtmError {
    /// Returns true when the transaction remains in flight and the sweeper
    /// will converge it.
    ///
    /// False for errors raised before the transaction was persisted, where
    /// nothing exists for the sweeper to pick up.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            GtmError::Uncertain { .. }
                | GtmError::CommitIncomplete { .. }
                | GtmError::CompensateIncomplete { .. }
                | GtmError::TerminalWriteFailed(_)
        )
    }
}

/// Convenience type alias for coordinator results.
pub type Result<T> = std::result::Result<T, GtmError>;
