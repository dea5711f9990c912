//! Task dispatch runtime.
//!
//! This crate runs the deferred work that saga transactions leave behind:
//! - [`TaskHandler`] trait for executing one kind of task payload
//! - [`TaskRegistry`] mapping every task name to its handler
//! - [`TaskRuntime`] for claiming, executing, retrying and aborting tasks
//! - [`Notifier`] boundary for alerting operators about aborted tasks

pub mod error;
pub mod handler;
pub mod notifier;
pub mod runtime;

pub use error::{Result, TaskError};
pub use handler::{SagaTaskHandler, TaskHandler, TaskRegistry};
pub use notifier::{Alert, InMemoryNotifier, LogNotifier, Notifier};
pub use runtime::TaskRuntime;
