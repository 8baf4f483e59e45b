//! Background executor for consolidation runs.
//!
//! Polls the run store for Pending runs and executes each claimed run
//! through the orchestrator. One claimed run executes its steps strictly
//! sequentially; several workers may serve distinct (group, period) pairs
//! concurrently because the store's create-time conflict check already
//! keeps a single pair exclusive.

use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use groupledger_core::TenantId;
use groupledger_consolidation::{ConsolidationService, RunStatus, RunStore};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct RunWorkerConfig {
    pub poll_interval: Duration,
    pub name: String,
    /// When set, only runs of this tenant are claimed.
    pub tenant_id: Option<TenantId>,
}

impl Default for RunWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            name: "consolidation-worker".to_string(),
            tenant_id: None,
        }
    }
}

/// Handle to stop and join a running worker.
#[derive(Debug)]
pub struct RunWorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl RunWorkerHandle {
    /// Request graceful shutdown and wait for the worker thread.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Spawns run-executor threads.
#[derive(Debug)]
pub struct RunWorker;

impl RunWorker {
    pub fn spawn<S>(
        service: Arc<ConsolidationService<S>>,
        store: S,
        config: RunWorkerConfig,
    ) -> RunWorkerHandle
    where
        S: RunStore + Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let name = config.name.clone();

        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(service, store, config, shutdown_rx))
            .expect("failed to spawn consolidation run worker");

        RunWorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}

fn worker_loop<S>(
    service: Arc<ConsolidationService<S>>,
    store: S,
    config: RunWorkerConfig,
    shutdown_rx: mpsc::Receiver<()>,
) where
    S: RunStore,
{
    info!(worker = %config.name, "consolidation run worker started");

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match store.claim_next_pending(config.tenant_id) {
            Ok(Some(run)) => {
                let run_id = run.id;
                match service.execute_claimed(run) {
                    Ok(finished) => {
                        if finished.status == RunStatus::Failed {
                            warn!(
                                worker = %config.name,
                                %run_id,
                                error = finished.error_message.as_deref().unwrap_or(""),
                                "run finished failed"
                            );
                        } else {
                            info!(worker = %config.name, %run_id, status = ?finished.status, "run finished");
                        }
                    }
                    Err(err) => {
                        warn!(worker = %config.name, %run_id, error = %err, "run execution errored");
                    }
                }
            }
            Ok(None) => thread::sleep(config.poll_interval),
            Err(err) => {
                warn!(worker = %config.name, error = %err, "failed to claim next run");
                thread::sleep(config.poll_interval);
            }
        }
    }

    info!(worker = %config.name, "consolidation run worker stopped");
}
