//! Where tasks come from.
//!
//! - [`Poller`]: scans a bounded id range on the ledger for open tasks.
//!   The contract exposes no event stream, so scanning is the only
//!   discovery strategy available.
//! - [`RequestServer`]: accepts explicit task requests over HTTP.
//!
//! Both hand tasks to the shared [`Pipeline`](crate::worker::Pipeline) and
//! run until the shutdown token is cancelled.

pub mod poller;
pub mod server;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

pub use poller::{CycleReport, Poller};
pub use server::{router, RequestServer, ServerState};

#[async_trait]
pub trait TaskSource: Send {
    /// Feed tasks to the pipeline until `shutdown` fires.
    async fn run(&mut self, shutdown: CancellationToken) -> Result<()>;
}
