//! In-memory repositories.
//!
//! Each repository keeps its records behind a `tokio::sync::RwLock`; every
//! conditional transition checks and writes under one write guard, which
//! gives the same exclusivity as the single-statement updates in PostgreSQL.

mod action;
mod order;
mod ownership;
mod task;
mod transaction;

pub use action::InMemoryActionRepository;
pub use order::InMemoryOrderRepository;
pub use ownership::InMemoryOwnershipInfoRepository;
pub use task::InMemoryTaskRepository;
pub use transaction::InMemoryTransactionRepository;

/// Applies an optional limit to an already ordered listing.
fn apply_limit<T>(mut items: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(limit) = limit {
        items.truncate(limit);
    }
    items
}
