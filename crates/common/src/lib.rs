//! Shared identifier types used across the transaction manager crates.

mod types;

pub use types::TxId;
