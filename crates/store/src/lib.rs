//! Persistence for the saga and task engine.
//!
//! Every repository is an async trait with an in-memory implementation (tests,
//! database-less runs) and a PostgreSQL implementation. Each status change is
//! a single conditional write, which is the only concurrency control the
//! engine relies on: a transition succeeds iff the prior status matched.

pub mod action;
pub mod error;
pub mod memory;
pub mod order;
pub mod ownership;
pub mod postgres;
pub mod repositories;
pub mod task;
pub mod transaction;

pub use action::ActionRepository;
pub use error::{Result, StoreError};
pub use memory::{
    InMemoryActionRepository, InMemoryOrderRepository, InMemoryOwnershipInfoRepository,
    InMemoryTaskRepository, InMemoryTransactionRepository,
};
pub use order::OrderRepository;
pub use ownership::OwnershipInfoRepository;
pub use postgres::{
    PostgresActionRepository, PostgresOrderRepository, PostgresOwnershipInfoRepository,
    PostgresTaskRepository, PostgresTransactionRepository, run_migrations,
};
pub use repositories::Repositories;
pub use task::{TaskRepository, TaskSearch};
pub use transaction::{TransactionRepository, TransactionSearch};
