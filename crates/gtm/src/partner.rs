//! Partner capability traits.
//!
//! A partner is an external service taking part in a global transaction.
//! Partners fall into three disjoint capability sets, and the coordinator
//! never looks past these traits: partner payloads are opaque to it.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tx_store::Outcome;

use crate::error::PartnerError;

/// A participant capable of the full two-phase protocol: prepare, commit,
/// compensate.
///
/// If `prepare` returns [`Outcome::Fail`], `compensate` will not be called
/// for this partner — a definite failure means the partner applied no side
/// effect. If `prepare` returns [`Outcome::Uncertain`] (or an error), the
/// partner is included in the compensation range, since the side effect may
/// or may not have applied.
///
/// `commit` and `compensate` must be idempotent: a crash between the call
/// and the durable write of its result causes one re-invocation on retry.
#[async_trait]
pub trait NormalPartner: Send + Sync {
    /// First phase: attempt the operation and classify the result.
    ///
    /// An `Err` means the partner cannot know whether its side effect
    /// applied; the coordinator treats it exactly like `Ok(Uncertain)`.
    async fn prepare(&self) -> std::result::Result<Outcome, PartnerError>;

    /// Second phase: make the prepared operation final.
    ///
    /// Business partners routinely have nothing to do here; the default
    /// reports success.
    async fn commit(&self) -> std::result::Result<(), PartnerError> {
        Ok(())
    }

    /// Roll back a prepared operation.
    async fn compensate(&self) -> std::result::Result<(), PartnerError>;
}

/// An unstable participant: a single prepare whose only terminal answers are
/// success and failure.
///
/// On [`Outcome::Uncertain`] the whole transaction stays in flight and the
/// prepare is re-run on the next retry. At most one uncertain partner is
/// allowed per transaction, ordered after all normal partners.
#[async_trait]
pub trait UncertainPartner: Send + Sync {
    /// Attempt the operation; `Uncertain` (or an error) forces a retry of
    /// the transaction.
    async fn prepare(&self) -> std::result::Result<Outcome, PartnerError>;
}

/// A stable participant: a commit that is assumed to eventually succeed.
///
/// Certain partners run at the end of the transaction and are retried
/// without bound until their commit reports success. `commit` must be
/// idempotent.
#[async_trait]
pub trait CertainPartner: Send + Sync {
    async fn commit(&self) -> std::result::Result<(), PartnerError>;
}

/// Serializable identity of a partner implementation.
///
/// `KIND` tags the partner's payload inside a transaction's durable content
/// blob, and is the key under which the implementation is registered with a
/// [`PartnerRegistry`](crate::PartnerRegistry) so reloaded transactions can
/// rebuild the same partner list.
pub trait PartnerKind: Serialize + DeserializeOwned {
    const KIND: &'static str;
}
