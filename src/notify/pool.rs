use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{NotifyError, OutboundCall};
use crate::config::NotificationConfig;
use crate::telemetry::counters;

/// Work performed for each queued call.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle(&self, call: OutboundCall) -> Result<(), NotifyError>;

    fn name(&self) -> &'static str;
}

/// Bounded queue drained by a fixed number of workers.
pub struct NotificationPool {
    tx: mpsc::Sender<OutboundCall>,
    workers: Vec<JoinHandle<()>>,
}

impl NotificationPool {
    /// Spawn the workers. Must be called within a Tokio runtime.
    pub fn start(config: &NotificationConfig, handler: Arc<dyn NotificationHandler>) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..config.workers.max(1))
            .map(|worker| {
                let rx = rx.clone();
                let handler = handler.clone();
                tokio::spawn(async move { run_worker(worker, rx, handler).await })
            })
            .collect::<Vec<_>>();

        info!(
            workers = workers.len(),
            queue_capacity = config.queue_capacity,
            handler = handler.name(),
            "notification pool started"
        );

        Self { tx, workers }
    }

    /// Queue a task without waiting. Returns `false` if it was dropped.
    pub fn dispatch(&self, call: OutboundCall) -> bool {
        match self.tx.try_send(call) {
            Ok(()) => {
                counters::notification("dispatched");
                true
            }
            Err(mpsc::error::TrySendError::Full(call)) => {
                warn!(
                    workspace = %call.workspace_id,
                    to = %call.to,
                    "notification queue full, dropping task"
                );
                counters::notification("dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(call)) => {
                warn!(workspace = %call.workspace_id, "notification pool closed, dropping task");
                counters::notification("dropped");
                false
            }
        }
    }

    /// Stop accepting tasks and wait for queued ones to finish.
    pub async fn shutdown(self) {
        drop(self.tx);
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "notification worker panicked");
            }
        }
        info!("notification pool stopped");
    }
}

async fn run_worker(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<OutboundCall>>>,
    handler: Arc<dyn NotificationHandler>,
) {
    loop {
        let next = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(call) = next else {
            break;
        };

        debug!(worker, workspace = %call.workspace_id, dest_code = %call.dest_code, "handling notification");
        if let Err(e) = handler.handle(call).await {
            warn!(worker, handler = handler.name(), error = %e, "notification failed");
            counters::notification("failed");
        }
    }
    debug!(worker, "notification worker stopped");
}
