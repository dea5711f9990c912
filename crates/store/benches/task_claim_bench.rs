use chrono::Utc;
use common::TransactionId;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{TaskAttributes, TaskData, TaskName};
use store::{InMemoryTaskRepository, TaskRepository};

fn place_order_task() -> TaskAttributes {
    TaskAttributes::asap(
        TaskData::PlaceOrder {
            transaction_id: TransactionId::new(),
        },
        Utc::now(),
    )
}

fn bench_save_task(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("task_store/save", |b| {
        b.iter(|| {
            rt.block_on(async {
                let repo = InMemoryTaskRepository::new();
                repo.save(place_order_task()).await.unwrap();
            });
        });
    });
}

fn bench_claim_from_100(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("task_store/claim_from_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                let repo = InMemoryTaskRepository::new();
                for _ in 0..100 {
                    repo.save(place_order_task()).await.unwrap();
                }
                let now = Utc::now();
                while repo
                    .claim_one_by_name(TaskName::PlaceOrder, now)
                    .await
                    .unwrap()
                    .is_some()
                {}
            });
        });
    });
}

fn bench_find_by_key(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let repo = InMemoryTaskRepository::new();
    let key = rt.block_on(async {
        for _ in 0..1000 {
            repo.save(place_order_task()).await.unwrap();
        }
        let attributes = place_order_task();
        let key = attributes.data.key();
        repo.save(attributes).await.unwrap();
        key
    });

    c.bench_function("task_store/find_by_key_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                repo.find_by_key(TaskName::PlaceOrder, &key).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_save_task,
    bench_claim_from_100,
    bench_find_by_key
);
criterion_main!(benches);
