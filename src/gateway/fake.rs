//! In-memory gateways for tests
//!
//! Mirrors the observable behaviour of the Redis gateways closely enough to
//! drive the poller and the dashboard state machine without a server.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::redis_job::sort_newest_first;
use super::{
    AddJobOptions, CLEAN_LIMIT, CleanTarget, GatewayError, GatewayResult, Gateways, JobGateway,
    QueueGateway, WorkerSource, validate_queue_name,
};
use crate::model::{
    JobSnapshot, JobState, Progress, QueueSnapshot, StateCounts, StateFilter, WorkerSnapshot,
};

/// Calls worth asserting on
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    ListJobs(String, StateFilter),
    GetLogs(String, String),
    Mutation(String),
}

#[derive(Default)]
struct FakeQueue {
    paused: bool,
    jobs: Vec<JobSnapshot>,
}

#[derive(Default)]
struct Store {
    queues: BTreeMap<String, FakeQueue>,
    logs: HashMap<(String, String), Vec<String>>,
    workers: Vec<WorkerSnapshot>,
    next_id: u64,
    fail_polls: bool,
    fail_mutations: bool,
    panic_mutations: bool,
    list_delay: HashMap<String, Duration>,
    calls: Vec<Call>,
}

#[derive(Default)]
pub(crate) struct FakeGateway {
    store: Mutex<Store>,
}

/// A job with the given identity; everything else defaulted
pub(crate) fn job(id: &str, state: JobState, created_at: i64) -> JobSnapshot {
    JobSnapshot {
        id: id.to_string(),
        name: format!("job-{id}"),
        data: Value::Object(serde_json::Map::new()),
        progress: Progress::default(),
        created_at,
        processed_at: None,
        finished_at: None,
        failure_reason: None,
        stack_frames: Vec::new(),
        attempts_made: 0,
        attempts_allowed: 3,
        state,
        return_value: None,
    }
}

fn unavailable() -> GatewayError {
    GatewayError::Redis(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "connection refused",
    )))
}

const fn target_state(target: CleanTarget) -> JobState {
    match target {
        CleanTarget::Completed => JobState::Completed,
        CleanTarget::Failed => JobState::Failed,
        CleanTarget::Delayed => JobState::Delayed,
        CleanTarget::Waiting => JobState::Waiting,
        CleanTarget::Active => JobState::Active,
    }
}

impl FakeGateway {
    pub(crate) fn with_queues(names: &[&str]) -> Arc<Self> {
        let fake = Self::default();
        {
            let mut store = fake.lock();
            for name in names {
                store.queues.insert((*name).to_string(), FakeQueue::default());
            }
        }
        Arc::new(fake)
    }

    pub(crate) fn gateways(self: &Arc<Self>) -> Gateways {
        Gateways {
            queues: Arc::clone(self) as Arc<dyn QueueGateway>,
            jobs: Arc::clone(self) as Arc<dyn JobGateway>,
            workers: Arc::clone(self) as Arc<dyn WorkerSource>,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(crate) fn fail_polls(&self, fail: bool) {
        self.lock().fail_polls = fail;
    }

    pub(crate) fn fail_mutations(&self, fail: bool) {
        self.lock().fail_mutations = fail;
    }

    /// Make every mutation panic inside its task
    pub(crate) fn panic_mutations(&self, panic: bool) {
        self.lock().panic_mutations = panic;
    }

    pub(crate) fn set_list_delay(&self, queue: &str, delay: Duration) {
        self.lock().list_delay.insert(queue.to_string(), delay);
    }

    pub(crate) fn push_job(&self, queue: &str, job: JobSnapshot) {
        self.lock()
            .queues
            .entry(queue.to_string())
            .or_default()
            .jobs
            .push(job);
    }

    pub(crate) fn set_logs(&self, queue: &str, id: &str, lines: &[&str]) {
        self.lock().logs.insert(
            (queue.to_string(), id.to_string()),
            lines.iter().map(|l| (*l).to_string()).collect(),
        );
    }

    pub(crate) fn set_workers(&self, workers: Vec<WorkerSnapshot>) {
        self.lock().workers = workers;
    }

    pub(crate) fn drop_queue(&self, name: &str) {
        self.lock().queues.remove(name);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub(crate) fn log_fetches(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::GetLogs(q, id) => Some((q, id)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn job_state(&self, queue: &str, id: &str) -> Option<JobState> {
        self.lock()
            .queues
            .get(queue)?
            .jobs
            .iter()
            .find(|j| j.id == id)
            .map(|j| j.state)
    }

    fn mutate(&self, label: String) -> GatewayResult<MutexGuard<'_, Store>> {
        let mut store = self.lock();
        store.calls.push(Call::Mutation(label));
        if store.panic_mutations {
            drop(store);
            panic!("mutation panicked");
        }
        if store.fail_mutations {
            return Err(unavailable());
        }
        Ok(store)
    }
}

#[async_trait]
impl QueueGateway for FakeGateway {
    async fn list_queue_names(&self) -> GatewayResult<Vec<String>> {
        let store = self.lock();
        if store.fail_polls {
            return Err(unavailable());
        }
        Ok(store.queues.keys().cloned().collect())
    }

    async fn get_stats(&self, name: &str) -> GatewayResult<QueueSnapshot> {
        let store = self.lock();
        let mut counts = StateCounts::default();
        let mut paused = false;
        if let Some(queue) = store.queues.get(name) {
            paused = queue.paused;
            for job in &queue.jobs {
                let slot = match job.state {
                    JobState::Waiting => &mut counts.waiting,
                    JobState::Active => &mut counts.active,
                    JobState::Completed => &mut counts.completed,
                    JobState::Failed => &mut counts.failed,
                    JobState::Delayed => &mut counts.delayed,
                };
                *slot += 1;
            }
        }
        Ok(QueueSnapshot {
            name: name.to_string(),
            counts,
            paused,
        })
    }

    async fn create(&self, name: &str) -> GatewayResult<()> {
        let name = validate_queue_name(name)?;
        let mut store = self.mutate(format!("create {name}"))?;
        store.queues.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn pause(&self, name: &str) -> GatewayResult<()> {
        let mut store = self.mutate(format!("pause {name}"))?;
        store.queues.entry(name.to_string()).or_default().paused = true;
        Ok(())
    }

    async fn resume(&self, name: &str) -> GatewayResult<()> {
        let mut store = self.mutate(format!("resume {name}"))?;
        store.queues.entry(name.to_string()).or_default().paused = false;
        Ok(())
    }

    async fn drain(&self, name: &str) -> GatewayResult<()> {
        let mut store = self.mutate(format!("drain {name}"))?;
        if let Some(queue) = store.queues.get_mut(name) {
            queue.jobs.retain(|j| j.state != JobState::Waiting);
        }
        Ok(())
    }

    async fn clean(&self, name: &str, target: CleanTarget, _grace_ms: u64) -> GatewayResult<u64> {
        let mut store = self.mutate(format!("clean {name} {}", target.as_str()))?;
        let state = target_state(target);
        let Some(queue) = store.queues.get_mut(name) else {
            return Ok(0);
        };
        let mut removed = 0;
        queue.jobs.retain(|j| {
            if j.state == state && removed < CLEAN_LIMIT {
                removed += 1;
                false
            } else {
                true
            }
        });
        Ok(removed as u64)
    }

    async fn delete(&self, name: &str) -> GatewayResult<()> {
        let mut store = self.mutate(format!("delete {name}"))?;
        store.queues.remove(name);
        Ok(())
    }
}

#[async_trait]
impl JobGateway for FakeGateway {
    async fn list_jobs(
        &self,
        queue: &str,
        filter: StateFilter,
        start: usize,
        end: usize,
    ) -> GatewayResult<Vec<JobSnapshot>> {
        let delay = {
            let mut store = self.lock();
            store.calls.push(Call::ListJobs(queue.to_string(), filter));
            if store.fail_polls {
                return Err(unavailable());
            }
            store.list_delay.get(queue).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let store = self.lock();
        let states = filter.states();
        let mut jobs: Vec<JobSnapshot> = store
            .queues
            .get(queue)
            .map(|q| {
                q.jobs
                    .iter()
                    .filter(|j| states.contains(&j.state))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        sort_newest_first(&mut jobs);
        Ok(jobs.into_iter().skip(start).take((end + 1).saturating_sub(start)).collect())
    }

    async fn get_by_id(&self, queue: &str, id: &str) -> GatewayResult<Option<JobSnapshot>> {
        let store = self.lock();
        Ok(store
            .queues
            .get(queue)
            .and_then(|q| q.jobs.iter().find(|j| j.id == id).cloned()))
    }

    async fn add(
        &self,
        queue: &str,
        job_name: &str,
        payload: Value,
        opts: AddJobOptions,
    ) -> GatewayResult<String> {
        let queue = validate_queue_name(queue)?;
        let mut store = self.mutate(format!("add {queue} {job_name}"))?;
        store.next_id += 1;
        let id = store.next_id.to_string();
        let state = if opts.delay_ms.is_some_and(|d| d > 0) {
            JobState::Delayed
        } else {
            JobState::Waiting
        };
        let mut snapshot = job(&id, state, store.next_id as i64);
        snapshot.name = job_name.to_string();
        snapshot.data = payload;
        snapshot.attempts_allowed = opts.max_attempts;
        store.queues.entry(queue.to_string()).or_default().jobs.push(snapshot);
        Ok(id)
    }

    async fn retry(&self, queue: &str, id: &str) -> GatewayResult<bool> {
        let mut store = self.mutate(format!("retry {queue} {id}"))?;
        let Some(found) = store
            .queues
            .get_mut(queue)
            .and_then(|q| q.jobs.iter_mut().find(|j| j.id == id))
        else {
            return Ok(false);
        };
        if found.state != JobState::Failed {
            return Err(GatewayError::NotRetryable {
                id: id.to_string(),
                state: found.state.to_string(),
            });
        }
        found.state = JobState::Waiting;
        found.failure_reason = None;
        Ok(true)
    }

    async fn remove(&self, queue: &str, id: &str) -> GatewayResult<bool> {
        let mut store = self.mutate(format!("remove {queue} {id}"))?;
        let Some(jobs) = store.queues.get_mut(queue).map(|q| &mut q.jobs) else {
            return Ok(false);
        };
        let Some(pos) = jobs.iter().position(|j| j.id == id) else {
            return Ok(false);
        };
        if jobs[pos].state == JobState::Active {
            return Err(GatewayError::Locked(id.to_string()));
        }
        jobs.remove(pos);
        Ok(true)
    }

    async fn get_logs(
        &self,
        queue: &str,
        id: &str,
        start: usize,
        end: usize,
    ) -> GatewayResult<Vec<String>> {
        let mut store = self.lock();
        store.calls.push(Call::GetLogs(queue.to_string(), id.to_string()));
        if end <= start {
            return Ok(Vec::new());
        }
        let lines = store
            .logs
            .get(&(queue.to_string(), id.to_string()))
            .cloned()
            .unwrap_or_default();
        let hi = lines.len().saturating_sub(start);
        let lo = lines.len().saturating_sub(end);
        Ok(lines[lo..hi].to_vec())
    }
}

#[async_trait]
impl WorkerSource for FakeGateway {
    async fn list_workers(&self) -> GatewayResult<Vec<WorkerSnapshot>> {
        let store = self.lock();
        if store.fail_polls {
            return Err(unavailable());
        }
        Ok(store.workers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn create_reports_zero_counts() {
        let fake = FakeGateway::with_queues(&[]);
        fake.create("fresh").await.unwrap();
        let stats = fake.get_stats("fresh").await.unwrap();
        assert_eq!(stats.counts, StateCounts::default());
        assert!(!stats.paused);
        assert_eq!(fake.list_queue_names().await.unwrap(), vec!["fresh".to_string()]);
    }

    #[tokio::test]
    async fn logs_count_back_from_newest() {
        let fake = FakeGateway::with_queues(&["q"]);
        fake.set_logs("q", "1", &["a", "b", "c", "d"]);
        assert_eq!(fake.get_logs("q", "1", 0, 2).await.unwrap(), vec!["c", "d"]);
        assert_eq!(fake.get_logs("q", "1", 0, 100).await.unwrap().len(), 4);
    }
}
