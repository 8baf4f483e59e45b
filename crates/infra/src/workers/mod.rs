//! Background workers.

mod run_worker;

pub use run_worker::{RunWorker, RunWorkerConfig, RunWorkerHandle};
