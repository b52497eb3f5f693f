//! Data gateways for the queue service
//!
//! The dashboard talks to the queue service only through the traits in this
//! module. The Redis implementations follow the BullMQ key layout; tests
//! substitute in-memory fakes.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::model::{JobSnapshot, JobState, QueueSnapshot, StateFilter, WorkerSnapshot};

#[cfg(test)]
pub(crate) mod fake;
pub mod keys;
pub mod redis_job;
pub mod redis_queue;
pub mod workers;

pub use keys::QueueKeys;
pub use redis_job::RedisJobGateway;
pub use redis_queue::RedisQueueGateway;
pub use workers::RedisWorkerSource;

/// Maximum number of jobs removed by a single clean call
pub const CLEAN_LIMIT: usize = 1000;

/// Errors surfaced by gateway operations
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("invalid queue name '{0}'")]
    InvalidName(String),

    #[error("job {id} is {state}, only failed jobs can be retried")]
    NotRetryable { id: String, state: String },

    #[error("job {0} is locked by a worker")]
    Locked(String),

    #[error("request timed out")]
    Timeout,
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Which jobs a clean call removes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanTarget {
    Completed,
    Failed,
    Delayed,
    Waiting,
    Active,
}

impl CleanTarget {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CleanTarget::Completed => "completed",
            CleanTarget::Failed => "failed",
            CleanTarget::Delayed => "delayed",
            CleanTarget::Waiting => "wait",
            CleanTarget::Active => "active",
        }
    }
}

impl From<JobState> for CleanTarget {
    fn from(state: JobState) -> Self {
        match state {
            JobState::Waiting => CleanTarget::Waiting,
            JobState::Active => CleanTarget::Active,
            JobState::Completed => CleanTarget::Completed,
            JobState::Failed => CleanTarget::Failed,
            JobState::Delayed => CleanTarget::Delayed,
        }
    }
}

/// Retry backoff stored with a job
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Backoff {
    Fixed { delay: u64 },
    Exponential { delay: u64 },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Exponential { delay: 2000 }
    }
}

/// Options accepted by [`JobGateway::add`]
#[derive(Debug, Clone, PartialEq)]
pub struct AddJobOptions {
    pub delay_ms: Option<u64>,
    pub priority: Option<u32>,
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for AddJobOptions {
    fn default() -> Self {
        Self {
            delay_ms: None,
            priority: None,
            max_attempts: 3,
            backoff: Backoff::default(),
        }
    }
}

/// Queue discovery, counters and queue-level mutations
#[async_trait]
pub trait QueueGateway: Send + Sync {
    /// Queue names sorted lexicographically
    async fn list_queue_names(&self) -> GatewayResult<Vec<String>>;

    async fn get_stats(&self, name: &str) -> GatewayResult<QueueSnapshot>;

    /// Idempotent; leaves a durable marker so an empty queue stays discoverable
    async fn create(&self, name: &str) -> GatewayResult<()>;

    async fn pause(&self, name: &str) -> GatewayResult<()>;

    async fn resume(&self, name: &str) -> GatewayResult<()>;

    /// Removes jobs that have not started yet
    async fn drain(&self, name: &str) -> GatewayResult<()>;

    /// Removes up to [`CLEAN_LIMIT`] jobs in `target` older than `grace_ms`
    async fn clean(&self, name: &str, target: CleanTarget, grace_ms: u64) -> GatewayResult<u64>;

    /// Purges every key of the queue, active jobs included
    async fn delete(&self, name: &str) -> GatewayResult<()>;
}

/// Job listing, detail and job-level mutations
#[async_trait]
pub trait JobGateway: Send + Sync {
    /// Jobs sorted by creation time, newest first
    async fn list_jobs(
        &self,
        queue: &str,
        filter: StateFilter,
        start: usize,
        end: usize,
    ) -> GatewayResult<Vec<JobSnapshot>>;

    async fn get_by_id(&self, queue: &str, id: &str) -> GatewayResult<Option<JobSnapshot>>;

    async fn add(
        &self,
        queue: &str,
        job_name: &str,
        payload: Value,
        opts: AddJobOptions,
    ) -> GatewayResult<String>;

    /// Returns `false` when the job no longer exists
    async fn retry(&self, queue: &str, id: &str) -> GatewayResult<bool>;

    /// Returns `false` when the job no longer exists
    async fn remove(&self, queue: &str, id: &str) -> GatewayResult<bool>;

    /// Log lines counted back from the newest, returned oldest first
    async fn get_logs(
        &self,
        queue: &str,
        id: &str,
        start: usize,
        end: usize,
    ) -> GatewayResult<Vec<String>>;
}

/// Connected workers
#[async_trait]
pub trait WorkerSource: Send + Sync {
    async fn list_workers(&self) -> GatewayResult<Vec<WorkerSnapshot>>;
}

/// The three gateways the dashboard needs, shareable across tasks
#[derive(Clone)]
pub struct Gateways {
    pub queues: Arc<dyn QueueGateway>,
    pub jobs: Arc<dyn JobGateway>,
    pub workers: Arc<dyn WorkerSource>,
}

impl Gateways {
    /// Redis-backed gateways sharing one multiplexed connection
    #[must_use]
    pub fn redis(handle: &crate::connection::RedisHandle) -> Self {
        let keys = QueueKeys::new(handle.prefix());
        Self {
            queues: Arc::new(RedisQueueGateway::new(handle.manager(), keys.clone())),
            jobs: Arc::new(RedisJobGateway::new(handle.manager(), keys)),
            workers: Arc::new(RedisWorkerSource::new(handle.manager())),
        }
    }
}

/// Discover every queue and fetch its stats
///
/// Stats are fetched concurrently. A queue that disappears between discovery
/// and the stats call is still reported, with zero counts.
pub async fn list_all_stats(gateway: &dyn QueueGateway) -> GatewayResult<Vec<QueueSnapshot>> {
    let names = gateway.list_queue_names().await?;
    let stats = futures_util::future::try_join_all(names.iter().map(|n| gateway.get_stats(n)));
    stats.await
}

/// Validate a queue name before it is used to build keys
pub(crate) fn validate_queue_name(name: &str) -> GatewayResult<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.contains(':') || trimmed.contains(char::is_whitespace) {
        return Err(GatewayError::InvalidName(name.to_string()));
    }
    Ok(trimmed)
}
