//! Identifier types shared by every crate in the workspace.

pub mod ids;

pub use ids::{ActionId, TaskId, TransactionId};
