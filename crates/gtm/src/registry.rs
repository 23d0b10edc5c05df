//! Rebuilding partner instances from stored transactions.
//!
//! A transaction's partner list is persisted as an opaque JSON blob of
//! `{kind, payload}` pairs. The registry maps each kind back to a concrete
//! implementation so the sweeper can resume a reloaded transaction with a
//! functionally equivalent partner list, in the same order, with the same
//! payloads.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tx_store::TransactionRecord;

use crate::error::{GtmError, Result};
use crate::partner::{CertainPartner, NormalPartner, PartnerKind, UncertainPartner};
use crate::transaction::{Slot, Transaction};

/// One partner inside the durable content blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PartnerBlob {
    pub(crate) kind: String,
    pub(crate) payload: Value,
}

/// The durable content blob: every partner list of a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ContentBlob {
    pub(crate) normal: Vec<PartnerBlob>,
    pub(crate) uncertain: Option<PartnerBlob>,
    pub(crate) certain: Vec<PartnerBlob>,
    #[serde(rename = "async")]
    pub(crate) asyncs: Vec<PartnerBlob>,
}

type NormalFactory =
    Box<dyn Fn(Value) -> serde_json::Result<Arc<dyn NormalPartner>> + Send + Sync>;
type UncertainFactory =
    Box<dyn Fn(Value) -> serde_json::Result<Arc<dyn UncertainPartner>> + Send + Sync>;
type CertainFactory =
    Box<dyn Fn(Value) -> serde_json::Result<Arc<dyn CertainPartner>> + Send + Sync>;

/// Maps partner kinds to constructors for each capability set.
///
/// Every partner type that can appear in a persisted transaction must be
/// registered with the coordinator that runs the sweeper, under the same
/// [`PartnerKind::KIND`] it was added with. Certain and async partners share
/// one registration, since both are commit-only.
#[derive(Default)]
pub struct PartnerRegistry {
    normal: HashMap<&'static str, NormalFactory>,
    uncertain: HashMap<&'static str, UncertainFactory>,
    certain: HashMap<&'static str, CertainFactory>,
}

impl PartnerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a normal partner implementation.
    pub fn register_normal<P>(mut self) -> Self
    where
        P: NormalPartner + PartnerKind + 'static,
    {
        self.normal.insert(
            P::KIND,
            Box::new(|payload| {
                let partner: Arc<dyn NormalPartner> =
                    Arc::new(serde_json::from_value::<P>(payload)?);
                Ok(partner)
            }),
        );
        self
    }

    /// Registers an uncertain partner implementation.
    pub fn register_uncertain<P>(mut self) -> Self
    where
        P: UncertainPartner + PartnerKind + 'static,
    {
        self.uncertain.insert(
            P::KIND,
            Box::new(|payload| {
                let partner: Arc<dyn UncertainPartner> =
                    Arc::new(serde_json::from_value::<P>(payload)?);
                Ok(partner)
            }),
        );
        self
    }

    /// Registers a certain partner implementation, used for both the certain
    /// and the async list.
    pub fn register_certain<P>(mut self) -> Self
    where
        P: CertainPartner + PartnerKind + 'static,
    {
        self.certain.insert(
            P::KIND,
            Box::new(|payload| {
                let partner: Arc<dyn CertainPartner> =
                    Arc::new(serde_json::from_value::<P>(payload)?);
                Ok(partner)
            }),
        );
        self
    }

    /// Rebuilds a transaction from its stored record.
    pub fn decode(&self, record: &TransactionRecord) -> Result<Transaction> {
        let blob: ContentBlob = serde_json::from_value(record.content.clone())?;

        let mut tx = Transaction::new(record.name.clone()).with_timeout(record.timeout);
        tx.id = Some(record.id);
        tx.times = record.times;
        tx.retry_at = Some(record.retry_at);

        for b in blob.normal {
            let partner = self.build(&self.normal, &b)?;
            tx.normals.push(Slot {
                kind: b.kind,
                payload: b.payload,
                partner,
            });
        }

        if let Some(b) = blob.uncertain {
            let partner = self.build(&self.uncertain, &b)?;
            tx.uncertain = Some(Slot {
                kind: b.kind,
                payload: b.payload,
                partner,
            });
        }

        for b in blob.certain {
            let partner = self.build(&self.certain, &b)?;
            tx.certains.push(Slot {
                kind: b.kind,
                payload: b.payload,
                partner,
            });
        }

        for b in blob.asyncs {
            let partner = self.build(&self.certain, &b)?;
            tx.asyncs.push(Slot {
                kind: b.kind,
                payload: b.payload,
                partner,
            });
        }

        Ok(tx)
    }

    fn build<P: ?Sized>(
        &self,
        factories: &HashMap<&'static str, Box<dyn Fn(Value) -> serde_json::Result<Arc<P>> + Send + Sync>>,
        blob: &PartnerBlob,
    ) -> Result<Arc<P>> {
        let factory = factories
            .get(blob.kind.as_str())
            .ok_or_else(|| GtmError::UnknownPartnerKind(blob.kind.clone()))?;
        Ok(factory(blob.payload.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use tx_store::{Outcome, TxId};

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
    struct Notifier {
        channel: String,
    }

    impl PartnerKind for Notifier {
        const KIND: &'static str = "notifier";
    }

    #[async_trait]
    impl CertainPartner for Notifier {
        async fn commit(&self) -> std::result::Result<(), PartnerError> {
            Ok(())
        }
    }

    fn record(content: serde_json::Value) -> TransactionRecord {
        TransactionRecord {
            id: TxId::generate(),
            name: "reloaded".to_string(),
            times: 2,
            retry_at: Utc::now(),
            timeout: Duration::from_secs(45),
            result: None,
            cost: None,
            content,
        }
    }

    #[tokio::test]
    async fn decode_rebuilds_the_same_partner_lists() {
        let tx = Transaction::new("reloaded")
            .add_normal(Payer {
                order_id: "o-9".to_string(),
                amount: 150,
            })
            .unwrap()
            .add_certain(Notifier {
                channel: "orders".to_string(),
            })
            .unwrap()
            .add_async(Notifier {
                channel: "audit".to_string(),
            })
            .unwrap();

        let registry = PartnerRegistry::new()
            .register_normal::<Payer>()
            .register_certain::<Notifier>();

        let decoded = registry.decode(&record(tx.content().unwrap())).unwrap();

        assert_eq!(decoded.name(), "reloaded");
        assert_eq!(decoded.times(), 2);
        assert_eq!(decoded.timeout(), Some(Duration::from_secs(45)));
        assert_eq!(decoded.normals.len(), 1);
        assert_eq!(decoded.normals[0].kind, "payer");
        assert_eq!(decoded.normals[0].payload["order_id"], "o-9");
        assert_eq!(decoded.certains.len(), 1);
        assert_eq!(decoded.asyncs.len(), 1);
        assert_eq!(decoded.asyncs[0].payload["channel"], "audit");

        // The rebuilt instance is live, not just structurally equal.
        let result = decoded.normals[0].partner.prepare().await.unwrap();
        assert_eq!(result, Outcome::Success);
    }

    #[test]
    fn unknown_kind_is_an_error_not_a_panic() {
        let tx = Transaction::new("t")
            .add_normal(Payer {
                order_id: "o-1".to_string(),
                amount: 1,
            })
            .unwrap();

        let registry = PartnerRegistry::new();
        let err = registry.decode(&record(tx.content().unwrap())).unwrap_err();

        assert!(matches!(err, GtmError::UnknownPartnerKind(kind) if kind == "payer"));
    }

    #[test]
    fn malformed_content_is_a_codec_error() {
        let registry = PartnerRegistry::new();
        let err = registry
            .decode(&record(serde_json::json!("not a blob")))
            .unwrap_err();

        assert!(matches!(err, GtmError::Codec(_)));
    }
}
