use std::time::Duration;

use chrono::Utc;
use criterion::{criterion_group, criterion_main, Criterion};
use tx_store::{InMemoryStore, Outcome, Phase, TransactionDraft, TransactionStore};

fn make_draft() -> TransactionDraft {
    TransactionDraft {
        name: "bench-tx".to_string(),
        times: 0,
        retry_at: Utc::now() - chrono::Duration::seconds(1),
        timeout: Duration::from_secs(60),
        content: serde_json::json!({
            "normal": [{"kind": "payer", "payload": {"order_id": "o-1", "amount": 99}}],
            "uncertain": null,
            "certain": [],
            "async": []
        }),
    }
}

fn bench_save_transaction(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("tx_store/save_transaction", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryStore::new();
                store.save_transaction(&make_draft()).await.unwrap();
            });
        });
    });
}

fn bench_partner_result_upsert(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("tx_store/partner_result_upsert", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryStore::new();
                let id = store.save_transaction(&make_draft()).await.unwrap();
                for offset in 0..8 {
                    store
                        .save_partner_result(
                            id,
                            Phase::DoNormal,
                            offset,
                            Duration::from_micros(50),
                            Outcome::Success,
                        )
                        .await
                        .unwrap();
                }
            });
        });
    });
}

fn bench_timeout_scan(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let store = InMemoryStore::new();
    rt.block_on(async {
        for _ in 0..100 {
            store.save_transaction(&make_draft()).await.unwrap();
        }
    });

    c.bench_function("tx_store/timeout_scan_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                let rows = store.get_timeout_transactions(50).await.unwrap();
                assert_eq!(rows.len(), 50);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_save_transaction,
    bench_partner_result_upsert,
    bench_timeout_scan
);
criterion_main!(benches);
