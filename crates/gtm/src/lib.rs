//! Global transaction manager.
//!
//! This crate coordinates a business operation spanning several independent
//! services (payment, order, inventory, messaging, ...) as a single logical
//! transaction with eventual atomicity: a variant of two-phase commit
//! augmented with idempotent replay and timeout-driven retry.
//!
//! A transaction is built from *partners* of three kinds:
//! 1. Normal partners prepare, commit and compensate.
//! 2. At most one uncertain partner prepares with a definite-or-retry answer.
//! 3. Certain partners only commit, and are retried until they succeed.
//!
//! The [`Gtm`] coordinator persists every step result through a
//! [`TransactionStore`], so a crashed or retried attempt resumes past the
//! last durable success instead of re-executing it. Transactions whose
//! outcome is still open are picked up by
//! [`Gtm::retry_timeout_transactions`] once their retry time elapses.

pub mod coordinator;
pub mod doer;
pub mod error;
pub mod partner;
pub mod registry;
pub mod timer;
pub mod transaction;

pub use coordinator::{DEFAULT_TIMEOUT, Gtm, SweepOutcome};
pub use doer::{Doer, PhaseVerdict, SequentialDoer};
pub use error::{GtmError, PartnerError, Result};
pub use partner::{CertainPartner, NormalPartner, PartnerKind, UncertainPartner};
pub use registry::PartnerRegistry;
pub use timer::{DoubleTimer, RetryTimer};
pub use transaction::Transaction;

pub use tx_store::{
    InMemoryStore, Outcome, Phase, PostgresStore, StoreConfig, StoreError, TransactionStore, TxId,
};
