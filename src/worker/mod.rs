//! Task execution pipeline.
//!
//! - [`SandboxExecutor`]: runs a task image in the container runtime and
//!   always evicts the image afterwards
//! - [`ProcessedSet`]: ids already submitted by this process
//! - [`Pipeline`]: execute → commit → record for one task
//!
//! # Flow
//!
//! 1. A task source hands a [`Task`](crate::ledger::Task) to [`Pipeline::process`]
//! 2. Already-submitted ids return immediately
//! 3. [`SandboxExecutor::execute`] produces the output
//! 4. [`ResultCommitter::commit`](crate::ledger::ResultCommitter::commit)
//!    hashes it and submits the commitment
//! 5. The receipt is recorded in the [`ProcessedSet`]

pub mod dedup;
pub mod executor;
pub mod pipeline;

pub use dedup::ProcessedSet;
pub use executor::SandboxExecutor;
pub use pipeline::{Outcome, Pipeline};
