//! Debounced job log loading
//!
//! Moving the cursor through the job list changes the inspected job on every
//! key press. Only the target that stays selected for [`LOG_DEBOUNCE`] gets
//! its logs fetched; every earlier timer is aborted, not just ignored.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::debug;

use super::app::AppUpdate;
use crate::gateway::JobGateway;

/// Quiet period before a log fetch is issued
pub(crate) const LOG_DEBOUNCE: Duration = Duration::from_millis(150);

/// Most recent log lines fetched per job
pub(crate) const LOG_LINES: usize = 100;

pub(crate) struct DetailLoader {
    jobs: Arc<dyn JobGateway>,
    tx: UnboundedSender<AppUpdate>,
    pending: Option<JoinHandle<()>>,
}

impl DetailLoader {
    pub(crate) fn new(jobs: Arc<dyn JobGateway>, tx: UnboundedSender<AppUpdate>) -> Self {
        Self {
            jobs,
            tx,
            pending: None,
        }
    }

    /// Schedule a log fetch, superseding any pending one
    pub(crate) fn load(&mut self, token: u64, queue: String, job_id: String) {
        self.cancel();
        let jobs = Arc::clone(&self.jobs);
        let tx = self.tx.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(LOG_DEBOUNCE).await;
            debug!(token, queue = %queue, job = %job_id, "Fetching job logs");
            let result = jobs
                .get_logs(&queue, &job_id, 0, LOG_LINES)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(AppUpdate::JobLogs { token, result });
        }));
    }

    /// Abort the pending fetch, if any
    pub(crate) fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for DetailLoader {
    fn drop(&mut self) {
        self.cancel();
    }
}
