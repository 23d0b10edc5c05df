//! The transaction aggregate.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::TxId;
use serde_json::Value;

use crate::error::{GtmError, Result};
use crate::partner::{CertainPartner, NormalPartner, PartnerKind, UncertainPartner};
use crate::registry::{ContentBlob, PartnerBlob};

/// A partner held by a transaction, together with the serialized form that
/// goes into the durable content blob.
pub(crate) struct Slot<P: ?Sized> {
    pub(crate) kind: String,
    pub(crate) payload: Value,
    pub(crate) partner: Arc<P>,
}

impl<P: ?Sized> Clone for Slot<P> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            payload: self.payload.clone(),
            partner: Arc::clone(&self.partner),
        }
    }
}

impl<P: ?Sized> Slot<P> {
    fn blob(&self) -> PartnerBlob {
        PartnerBlob {
            kind: self.kind.clone(),
            payload: self.payload.clone(),
        }
    }
}

/// A global transaction: an ordered set of partners plus retry metadata.
///
/// Build one with [`Transaction::new`] and the `add_*` methods, then hand it
/// to a [`Gtm`](crate::Gtm) coordinator. Partner order is fixed for the
/// transaction's lifetime: the offset of a partner within its list keys its
/// durable step results, so partners must never be inserted or reordered
/// between retries.
#[derive(Clone)]
pub struct Transaction {
    pub(crate) id: Option<TxId>,
    pub(crate) name: String,
    pub(crate) times: u32,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) retry_at: Option<DateTime<Utc>>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) normals: Vec<Slot<dyn NormalPartner>>,
    pub(crate) uncertain: Option<Slot<dyn UncertainPartner>>,
    pub(crate) certains: Vec<Slot<dyn CertainPartner>>,
    pub(crate) asyncs: Vec<Slot<dyn CertainPartner>>,
}

impl Transaction {
    /// Creates an empty transaction with the given business name.
    ///
    /// The name is an opaque human label; it is persisted but never
    /// interpreted.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            times: 0,
            started_at: None,
            retry_at: None,
            timeout: None,
            normals: Vec::new(),
            uncertain: None,
            certains: Vec::new(),
            asyncs: Vec::new(),
        }
    }

    /// Replaces the business name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the minimum interval between retry attempts.
    ///
    /// Defaults to the coordinator's default (60s) when unset.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Appends a normal partner (prepare / commit / compensate).
    pub fn add_normal<P>(mut self, partner: P) -> Result<Self>
    where
        P: NormalPartner + PartnerKind + 'static,
    {
        let payload = serde_json::to_value(&partner)?;
        self.normals.push(Slot {
            kind: P::KIND.to_string(),
            payload,
            partner: Arc::new(partner),
        });
        Ok(self)
    }

    /// Sets the single uncertain partner.
    ///
    /// At most one is allowed per transaction; it prepares after all normal
    /// partners.
    pub fn add_uncertain<P>(mut self, partner: P) -> Result<Self>
    where
        P: UncertainPartner + PartnerKind + 'static,
    {
        if self.uncertain.is_some() {
            return Err(GtmError::UncertainPartnerAlreadySet);
        }

        let payload = serde_json::to_value(&partner)?;
        self.uncertain = Some(Slot {
            kind: P::KIND.to_string(),
            payload,
            partner: Arc::new(partner),
        });
        Ok(self)
    }

    /// Appends a certain partner (commit only, assumed to eventually
    /// succeed).
    pub fn add_certain<P>(mut self, partner: P) -> Result<Self>
    where
        P: CertainPartner + PartnerKind + 'static,
    {
        let payload = serde_json::to_value(&partner)?;
        self.certains.push(Slot {
            kind: P::KIND.to_string(),
            payload,
            partner: Arc::new(partner),
        });
        Ok(self)
    }

    /// Appends a certain partner that only runs on retry attempts, so the
    /// foreground execute returns without waiting for it.
    pub fn add_async<P>(mut self, partner: P) -> Result<Self>
    where
        P: CertainPartner + PartnerKind + 'static,
    {
        let payload = serde_json::to_value(&partner)?;
        self.asyncs.push(Slot {
            kind: P::KIND.to_string(),
            payload,
            partner: Arc::new(partner),
        });
        Ok(self)
    }

    /// The id assigned by the store, once the transaction has been saved.
    pub fn id(&self) -> Option<TxId> {
        self.id
    }

    /// The business name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of attempts so far; 0 before the first execution.
    pub fn times(&self) -> u32 {
        self.times
    }

    /// When the current attempt started.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Earliest instant at which the sweeper may pick this transaction up.
    pub fn retry_at(&self) -> Option<DateTime<Utc>> {
        self.retry_at
    }

    /// Minimum interval between retry attempts, if set.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Serializes the partner lists into the opaque content blob the store
    /// keeps alongside the transaction row.
    pub(crate) fn content(&self) -> Result<Value> {
        let blob = ContentBlob {
            normal: self.normals.iter().map(Slot::blob).collect(),
            uncertain: self.uncertain.as_ref().map(Slot::blob),
            certain: self.certains.iter().map(Slot::blob).collect(),
            asyncs: self.asyncs.iter().map(Slot::blob).collect(),
        };
        Ok(serde_json::to_value(blob)?)
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("times", &self.times)
            .field("retry_at", &self.retry_at)
            .field("normal_partners", &self.normals.len())
            .field("has_uncertain_partner", &self.uncertain.is_some())
            .field("certain_partners", &self.certains.len())
            .field("async_partners", &self.asyncs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use tx_store::Outcome;

    use crate::error::PartnerError;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Payer {
        order_id: String,
        amount: i64,
    }

    impl PartnerKind for Payer {
        const KIND: &'static str = "payer";
    }

    #[async_trait]
    impl NormalPartner for Payer {
        async fn prepare(&self) -> std::result::Result<Outcome, PartnerError> {
            Ok(Outcome::Success)
        }

        async fn compensate(&self) -> std::result::Result<(), PartnerError> {
            Ok(())
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct OrderCreator {
        order_id: String,
    }

    impl PartnerKind for OrderCreator {
        const KIND: &'static str = "order-creator";
    }

    #[async_trait]
    impl UncertainPartner for OrderCreator {
        async fn prepare(&self) -> std::result::Result<Outcome, PartnerError> {
            Ok(Outcome::Success)
        }
    }

    fn payer() -> Payer {
        Payer {
            order_id: "o-1".to_string(),
            amount: 99,
        }
    }

    #[test]
    fn builder_collects_partners_in_order() {
        let tx = Transaction::new("place-order")
            .with_timeout(Duration::from_secs(30))
            .add_normal(payer())
            .unwrap()
            .add_normal(Payer {
                order_id: "o-2".to_string(),
                amount: 17,
            })
            .unwrap()
            .add_uncertain(OrderCreator {
                order_id: "o-1".to_string(),
            })
            .unwrap();

        assert_eq!(tx.name(), "place-order");
        assert_eq!(tx.times(), 0);
        assert!(tx.id().is_none());
        assert_eq!(tx.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(tx.normals.len(), 2);
        assert_eq!(tx.normals[0].kind, "payer");
        assert_eq!(tx.normals[0].payload["order_id"], "o-1");
        assert_eq!(tx.normals[1].payload["order_id"], "o-2");
    }

    #[test]
    fn second_uncertain_partner_is_rejected() {
        let err = Transaction::new("t")
            .add_uncertain(OrderCreator {
                order_id: "o-1".to_string(),
            })
            .unwrap()
            .add_uncertain(OrderCreator {
                order_id: "o-2".to_string(),
            })
            .unwrap_err();

        assert!(matches!(err, GtmError::UncertainPartnerAlreadySet));
    }

    #[test]
    fn content_blob_carries_every_partner_list() {
        let tx = Transaction::new("t")
            .add_normal(payer())
            .unwrap()
            .add_uncertain(OrderCreator {
                order_id: "o-1".to_string(),
            })
            .unwrap();

        let content = tx.content().unwrap();
        assert_eq!(content["normal"][0]["kind"], "payer");
        assert_eq!(content["normal"][0]["payload"]["amount"], 99);
        assert_eq!(content["uncertain"]["kind"], "order-creator");
        assert_eq!(content["certain"], serde_json::json!([]));
        assert_eq!(content["async"], serde_json::json!([]));
    }
}
