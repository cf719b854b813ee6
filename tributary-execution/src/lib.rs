//! Tributary Execution Engine
//!
//! This crate runs asset tasks out of process. The worker side owns a
//! [`SupervisorComms`] channel for its whole lifetime and resolves inlet
//! assets through it; the [`Supervisor`] side starts the task and answers
//! resolution requests from an [`AssetCatalog`].

pub mod catalog;
pub mod comms;
pub mod error;
pub mod runner;
pub mod supervisor;

#[cfg(test)]
mod testing;

// Re-export main types
pub use catalog::{AssetCatalog, InMemoryAssetCatalog};
pub use comms::SupervisorComms;
pub use error::ExecutionError;
pub use runner::{run_stdio_worker, TaskRunOutcome, TaskRunner};
pub use supervisor::{Supervisor, TaskOutcome};
