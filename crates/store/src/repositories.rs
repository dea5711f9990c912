use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    ActionRepository, InMemoryActionRepository, InMemoryOrderRepository,
    InMemoryOwnershipInfoRepository, InMemoryTaskRepository, InMemoryTransactionRepository,
    OrderRepository, OwnershipInfoRepository, PostgresActionRepository, PostgresOrderRepository,
    PostgresOwnershipInfoRepository, PostgresTaskRepository, PostgresTransactionRepository,
    TaskRepository, TransactionRepository,
};

/// Every repository the engine needs, sharing one backend.
#[derive(Clone)]
pub struct Repositories {
    pub transactions: Arc<dyn TransactionRepository>,
    pub actions: Arc<dyn ActionRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub ownership_infos: Arc<dyn OwnershipInfoRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            transactions: Arc::new(InMemoryTransactionRepository::new()),
            actions: Arc::new(InMemoryActionRepository::new()),
            tasks: Arc::new(InMemoryTaskRepository::new()),
            orders: Arc::new(InMemoryOrderRepository::new()),
            ownership_infos: Arc::new(InMemoryOwnershipInfoRepository::new()),
        }
    }

    /// All repositories backed by the same connection pool.
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            transactions: Arc::new(PostgresTransactionRepository::new(pool.clone())),
            actions: Arc::new(PostgresActionRepository::new(pool.clone())),
            tasks: Arc::new(PostgresTaskRepository::new(pool.clone())),
            orders: Arc::new(PostgresOrderRepository::new(pool.clone())),
            ownership_infos: Arc::new(PostgresOwnershipInfoRepository::new(pool)),
        }
    }
}
