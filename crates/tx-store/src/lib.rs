//! Durable state for the global transaction manager.
//!
//! This crate defines the storage contract the coordinator runs against:
//! transaction rows, per-partner phase results keyed by
//! `(transaction, phase, offset)`, and the retry index that orders
//! non-terminal transactions by their next due time.
//!
//! Two implementations are provided: [`InMemoryStore`] for tests and
//! [`PostgresStore`] for production.

pub mod config;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;
pub mod types;

pub use common::TxId;
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use record::{PartnerResultRecord, TransactionDraft, TransactionRecord};
pub use store::TransactionStore;
pub use types::{Outcome, Phase};
