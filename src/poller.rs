//! Periodic refresh loops, one per data domain
//!
//! Each loop fetches on a fixed interval and sends the outcome, success or
//! error, to a single channel. Every outcome carries a sequence number taken
//! when the fetch was issued; job outcomes also carry the [`JobQuery`] they
//! answer. The receiver uses both to drop late or superseded results, so the
//! loops never touch UI state themselves.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::Polling;
use crate::gateway::{GatewayError, GatewayResult, Gateways, list_all_stats};
use crate::model::{JobSnapshot, QueueSnapshot, StateFilter, WorkerSnapshot};

/// Upper bound for one poll fetch
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Data domains refreshed independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollDomain {
    Queues,
    Jobs,
    Workers,
}

impl PollDomain {
    pub const ALL: [PollDomain; 3] = [PollDomain::Queues, PollDomain::Jobs, PollDomain::Workers];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PollDomain::Queues => "queues",
            PollDomain::Jobs => "jobs",
            PollDomain::Workers => "workers",
        }
    }
}

/// Parameters of the job-list fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobQuery {
    pub queue: String,
    pub filter: StateFilter,
    pub start: usize,
    pub end: usize,
}

impl JobQuery {
    /// First page of `page_size` jobs
    #[must_use]
    pub fn first_page(queue: impl Into<String>, filter: StateFilter, page_size: usize) -> Self {
        Self {
            queue: queue.into(),
            filter,
            start: 0,
            end: page_size.saturating_sub(1),
        }
    }
}

/// Outcome of one poll cycle
#[derive(Debug)]
pub enum PollUpdate {
    Queues {
        seq: u64,
        result: GatewayResult<Vec<QueueSnapshot>>,
    },
    Jobs {
        seq: u64,
        query: JobQuery,
        result: GatewayResult<Vec<JobSnapshot>>,
    },
    Workers {
        seq: u64,
        result: GatewayResult<Vec<WorkerSnapshot>>,
    },
}

impl PollUpdate {
    #[must_use]
    pub const fn domain(&self) -> PollDomain {
        match self {
            PollUpdate::Queues { .. } => PollDomain::Queues,
            PollUpdate::Jobs { .. } => PollDomain::Jobs,
            PollUpdate::Workers { .. } => PollDomain::Workers,
        }
    }

    #[must_use]
    pub const fn seq(&self) -> u64 {
        match self {
            PollUpdate::Queues { seq, .. }
            | PollUpdate::Jobs { seq, .. }
            | PollUpdate::Workers { seq, .. } => *seq,
        }
    }
}

struct DomainLoop {
    handle: JoinHandle<()>,
    wake: Arc<Notify>,
}

impl DomainLoop {
    /// Run `cycle` now, then every `period`, and again whenever woken
    fn spawn<F, Fut>(period: Duration, mut cycle: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let wake = Arc::new(Notify::new());
        let woken = Arc::clone(&wake);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    () = woken.notified() => ticker.reset(),
                }
                cycle().await;
            }
        });
        Self { handle, wake }
    }

    fn refresh(&self) {
        self.wake.notify_one();
    }
}

async fn with_timeout<T>(fut: impl Future<Output = GatewayResult<T>>) -> GatewayResult<T> {
    tokio::time::timeout(FETCH_TIMEOUT, fut)
        .await
        .unwrap_or(Err(GatewayError::Timeout))
}

fn log_outcome<T>(domain: PollDomain, seq: u64, result: &GatewayResult<Vec<T>>) {
    match result {
        Ok(items) => debug!(domain = domain.as_str(), seq, count = items.len(), "Poll ok"),
        Err(e) => warn!(domain = domain.as_str(), seq, error = %e, "Poll failed"),
    }
}

/// Owner of the three refresh loops
pub struct Poller {
    gateways: Gateways,
    intervals: Polling,
    tx: UnboundedSender<PollUpdate>,
    seq: Arc<AtomicU64>,
    queues: Option<DomainLoop>,
    workers: Option<DomainLoop>,
    jobs: Option<DomainLoop>,
    job_query: Option<JobQuery>,
}

impl Poller {
    /// Start the queue and worker loops; the job loop starts on [`Self::retarget_jobs`]
    #[must_use]
    pub fn start(gateways: Gateways, intervals: Polling, tx: UnboundedSender<PollUpdate>) -> Self {
        let seq = Arc::new(AtomicU64::new(0));

        let queues = {
            let (gw, tx, seq) = (Arc::clone(&gateways.queues), tx.clone(), Arc::clone(&seq));
            DomainLoop::spawn(intervals.queues, move || {
                let (gw, tx, seq) = (Arc::clone(&gw), tx.clone(), Arc::clone(&seq));
                async move {
                    let seq = seq.fetch_add(1, Ordering::Relaxed) + 1;
                    let result = with_timeout(list_all_stats(gw.as_ref())).await;
                    log_outcome(PollDomain::Queues, seq, &result);
                    let _ = tx.send(PollUpdate::Queues { seq, result });
                }
            })
        };

        let workers = {
            let (gw, tx, seq) = (Arc::clone(&gateways.workers), tx.clone(), Arc::clone(&seq));
            DomainLoop::spawn(intervals.workers, move || {
                let (gw, tx, seq) = (Arc::clone(&gw), tx.clone(), Arc::clone(&seq));
                async move {
                    let seq = seq.fetch_add(1, Ordering::Relaxed) + 1;
                    let result = with_timeout(gw.list_workers()).await;
                    log_outcome(PollDomain::Workers, seq, &result);
                    let _ = tx.send(PollUpdate::Workers { seq, result });
                }
            })
        };

        Self {
            gateways,
            intervals,
            tx,
            seq,
            queues: Some(queues),
            workers: Some(workers),
            jobs: None,
            job_query: None,
        }
    }

    /// Point the job loop at a new query, or stop it with `None`
    ///
    /// The previous loop is aborted, which drops any fetch it has in flight.
    pub fn retarget_jobs(&mut self, query: Option<JobQuery>) {
        if query == self.job_query && (query.is_none() || self.jobs.is_some()) {
            return;
        }
        if let Some(old) = self.jobs.take() {
            old.handle.abort();
        }
        debug!(?query, "Retarget job poll");
        self.job_query.clone_from(&query);

        let Some(query) = query else {
            return;
        };
        let (gw, tx, seq) = (
            Arc::clone(&self.gateways.jobs),
            self.tx.clone(),
            Arc::clone(&self.seq),
        );
        self.jobs = Some(DomainLoop::spawn(self.intervals.jobs, move || {
            let (gw, tx, seq, query) = (
                Arc::clone(&gw),
                tx.clone(),
                Arc::clone(&seq),
                query.clone(),
            );
            async move {
                let seq = seq.fetch_add(1, Ordering::Relaxed) + 1;
                let result = with_timeout(gw.list_jobs(
                    &query.queue,
                    query.filter,
                    query.start,
                    query.end,
                ))
                .await;
                log_outcome(PollDomain::Jobs, seq, &result);
                let _ = tx.send(PollUpdate::Jobs { seq, query, result });
            }
        }));
    }

    #[must_use]
    pub fn job_query(&self) -> Option<&JobQuery> {
        self.job_query.as_ref()
    }

    /// Fetch a domain out of cycle; coalesces with an already pending wake-up
    pub fn refresh(&self, domain: PollDomain) {
        let target = match domain {
            PollDomain::Queues => self.queues.as_ref(),
            PollDomain::Jobs => self.jobs.as_ref(),
            PollDomain::Workers => self.workers.as_ref(),
        };
        if let Some(domain_loop) = target {
            domain_loop.refresh();
        }
    }

    fn take_loops(&mut self) -> Vec<DomainLoop> {
        [self.queues.take(), self.workers.take(), self.jobs.take()]
            .into_iter()
            .flatten()
            .collect()
    }

    /// Stop every loop and wait until they are gone
    pub async fn shutdown(&mut self) {
        for domain_loop in self.take_loops() {
            domain_loop.handle.abort();
            let _ = domain_loop.handle.await;
        }
        self.job_query = None;
        debug!("Poller stopped");
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        for domain_loop in self.take_loops() {
            domain_loop.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::fake::{Call, FakeGateway};
    use crate::model::JobState;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc::unbounded_channel;

    fn intervals() -> Polling {
        Polling {
            queues: Duration::from_secs(3),
            jobs: Duration::from_secs(3),
            workers: Duration::from_secs(5),
            job_page_size: 50,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polls_immediately_then_on_interval() {
        let fake = FakeGateway::with_queues(&["orders"]);
        let (tx, mut rx) = unbounded_channel();
        let mut poller = Poller::start(fake.gateways(), intervals(), tx);

        let mut domains = vec![
            rx.recv().await.unwrap().domain(),
            rx.recv().await.unwrap().domain(),
        ];
        domains.sort_by_key(|d| d.as_str());
        assert_eq!(domains, vec![PollDomain::Queues, PollDomain::Workers]);

        tokio::time::sleep(Duration::from_millis(3001)).await;
        let next = rx.recv().await.unwrap();
        assert_eq!(next.domain(), PollDomain::Queues);

        poller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_reported_and_retried() {
        let fake = FakeGateway::with_queues(&["orders"]);
        fake.fail_polls(true);
        let (tx, mut rx) = unbounded_channel();
        let mut poller = Poller::start(fake.gateways(), intervals(), tx);

        let first = loop {
            if let PollUpdate::Queues { result, .. } = rx.recv().await.unwrap() {
                break result;
            }
        };
        assert!(first.is_err());

        fake.fail_polls(false);
        poller.refresh(PollDomain::Queues);
        let second = loop {
            if let PollUpdate::Queues { result, .. } = rx.recv().await.unwrap() {
                break result;
            }
        };
        assert_eq!(second.unwrap().len(), 1);
        poller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn retarget_drops_in_flight_job_fetch() {
        let fake = FakeGateway::with_queues(&["slow", "fast"]);
        fake.set_list_delay("slow", Duration::from_secs(2));
        let (tx, mut rx) = unbounded_channel();
        let mut poller = Poller::start(fake.gateways(), intervals(), tx);

        poller.retarget_jobs(Some(JobQuery::first_page("slow", StateFilter::All, 50)));
        tokio::time::sleep(Duration::from_millis(100)).await;
        poller.retarget_jobs(Some(JobQuery::first_page("fast", StateFilter::All, 50)));
        tokio::time::sleep(Duration::from_secs(5)).await;
        poller.shutdown().await;

        let mut job_queues = Vec::new();
        while let Ok(update) = rx.try_recv() {
            if let PollUpdate::Jobs { query, .. } = update {
                job_queues.push(query.queue);
            }
        }
        assert!(!job_queues.is_empty());
        assert!(job_queues.iter().all(|q| q == "fast"), "{job_queues:?}");
        assert!(fake.calls().contains(&Call::ListJobs("slow".into(), StateFilter::All)));
    }

    #[tokio::test(start_paused = true)]
    async fn sequence_numbers_increase() {
        let fake = FakeGateway::with_queues(&["orders"]);
        let (tx, mut rx) = unbounded_channel();
        let mut poller = Poller::start(fake.gateways(), intervals(), tx);
        poller.retarget_jobs(Some(JobQuery::first_page(
            "orders",
            StateFilter::Only(JobState::Failed),
            50,
        )));

        let mut last = 0;
        for _ in 0..6 {
            let seq = rx.recv().await.unwrap().seq();
            assert!(seq > last);
            last = seq;
        }
        poller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_all_loops() {
        let fake = FakeGateway::with_queues(&["orders"]);
        let (tx, mut rx) = unbounded_channel();
        let mut poller = Poller::start(fake.gateways(), intervals(), tx);
        poller.retarget_jobs(Some(JobQuery::first_page("orders", StateFilter::All, 50)));
        tokio::time::sleep(Duration::from_millis(10)).await;
        poller.shutdown().await;
        while rx.try_recv().is_ok() {}

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(poller.job_query(), None);
    }
}
