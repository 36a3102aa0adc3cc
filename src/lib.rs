pub mod command;
pub mod config;
pub mod error;
pub mod ledger;
pub mod shutdown;
pub mod source;
pub mod worker;
pub mod workload;
