//! Background worker for the dashboard
//!
//! Owns the poller, the log loader and every in-flight mutation. It runs
//! until the UI drops its command sender, then releases all of them before
//! returning. The job query and the log request are read from watch
//! channels, so the latest selection reaches it even when commands back up.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{Receiver, UnboundedSender, unbounded_channel};
use tokio::task::{Id, JoinSet};
use tracing::{debug, warn};

use super::app::{AppUpdate, BgCommand, TargetWatch};
use super::detail_loader::DetailLoader;
use super::dispatcher::{self, ActionOutcome, MutationKind};
use crate::config::Polling;
use crate::gateway::Gateways;
use crate::poller::{PollUpdate, Poller};

/// How long in-flight mutations may finish after the UI quits
pub(crate) const MUTATION_GRACE: Duration = Duration::from_secs(2);

/// Process commands until the UI goes away
pub(crate) async fn run_worker(
    gateways: Gateways,
    intervals: Polling,
    mut cmd_rx: Receiver<BgCommand>,
    mut targets: TargetWatch,
    update_tx: UnboundedSender<AppUpdate>,
) {
    let (poll_tx, mut poll_rx) = unbounded_channel::<PollUpdate>();
    let mut poller = Poller::start(gateways.clone(), intervals, poll_tx);
    let mut loader = DetailLoader::new(Arc::clone(&gateways.jobs), update_tx.clone());
    let mut mutations: JoinSet<ActionOutcome> = JoinSet::new();
    // Kind and description per task, for tasks that never report back
    let mut in_flight: HashMap<Id, (MutationKind, String)> = HashMap::new();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    break;
                };
                match cmd {
                    BgCommand::Refresh(domain) => poller.refresh(domain),
                    BgCommand::Mutate(mutation) => {
                        let label = (mutation.kind(), mutation.describe());
                        let gateways = gateways.clone();
                        let task = mutations
                            .spawn(async move { dispatcher::execute(&gateways, mutation).await });
                        in_flight.insert(task.id(), label);
                    }
                }
            }
            Ok(()) = targets.jobs.changed() => {
                let query = targets.jobs.borrow_and_update().clone();
                poller.retarget_jobs(query);
            }
            Ok(()) = targets.logs.changed() => {
                let request = targets.logs.borrow_and_update().clone();
                match request {
                    Some(req) => loader.load(req.token, req.queue, req.job_id),
                    None => loader.cancel(),
                }
            }
            Some(update) = poll_rx.recv() => {
                if update_tx.send(AppUpdate::Poll(update)).is_err() {
                    break;
                }
            }
            Some(done) = mutations.join_next_with_id(), if !mutations.is_empty() => {
                let outcome = match done {
                    Ok((id, outcome)) => {
                        in_flight.remove(&id);
                        outcome
                    }
                    Err(e) => {
                        warn!(error = %e, "Mutation task ended abnormally");
                        let Some((kind, description)) = in_flight.remove(&e.id()) else {
                            continue;
                        };
                        ActionOutcome::abandoned(kind, &description)
                    }
                };
                let _ = update_tx.send(AppUpdate::ActionResult(outcome));
            }
        }
    }

    debug!("Background worker shutting down");
    loader.cancel();
    poller.shutdown().await;

    if !mutations.is_empty() {
        let finish = async {
            while let Some(done) = mutations.join_next().await {
                if let Ok(outcome) = done {
                    debug!(message = %outcome.message, "Mutation finished during shutdown");
                }
            }
        };
        if tokio::time::timeout(MUTATION_GRACE, finish).await.is_err() {
            warn!("Aborting mutations still running at exit");
        }
        mutations.abort_all();
    }
}
