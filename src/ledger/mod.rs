//! Boundary to the coordinating contract.
//!
//! - [`LedgerClient`]: query/call interface, implemented by [`MxpyLedger`]
//! - [`ResultCommitter`]: hashes workload output and submits the commitment
//! - [`Task`] / [`TaskStatus`] / [`TaskDetails`]: read-only task snapshots

pub mod client;
pub mod committer;
pub mod task;

pub use client::{extract_tx_hash, LedgerClient, MxpyLedger};
pub use committer::{Commitment, ResultCommitter, SubmissionRecord};
pub use task::{Task, TaskDetails, TaskStatus};
