//! HTTP route handlers.

pub mod status;
pub mod tasks;
pub mod transactions;
