//! Job gateway backed by Redis

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use tracing::{debug, info};

use super::keys::{KeyKind, QueueKeys};
use super::{AddJobOptions, GatewayError, GatewayResult, JobGateway, validate_queue_name};
use crate::model::{JobSnapshot, JobState, Progress, StateFilter};

// Workers of BullMQ v5 block on the `marker` sorted set: member "0" means a job
// is ready, member "1" scored with a timestamp means the next delayed job is
// due then. Every state change is also appended to the `events` stream.

// KEYS: id, meta, wait, paused, delayed, prioritized, pc, marker, events
// ARGV: job key prefix, name, data, opts, timestamp, delay, priority
static ADD_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local id = redis.call("INCR", KEYS[1])
local jobKey = ARGV[1] .. id
local timestamp = tonumber(ARGV[5])
local delay = tonumber(ARGV[6])
local priority = tonumber(ARGV[7])
redis.call("HSET", jobKey, "name", ARGV[2], "data", ARGV[3], "opts", ARGV[4],
  "timestamp", timestamp, "delay", delay, "priority", priority, "atm", 0)
redis.call("HSETNX", KEYS[2], "opts.maxLenEvents", 10000)
local maxEvents = tonumber(redis.call("HGET", KEYS[2], "opts.maxLenEvents")) or 10000
local paused = redis.call("HEXISTS", KEYS[2], "paused") == 1
redis.call("XADD", KEYS[9], "MAXLEN", "~", maxEvents, "*",
  "event", "added", "jobId", id, "name", ARGV[2])
if delay > 0 then
  redis.call("ZADD", KEYS[5], (timestamp + delay) * 4096 + bit.band(id, 0xfff), id)
  redis.call("XADD", KEYS[9], "MAXLEN", "~", maxEvents, "*",
    "event", "delayed", "jobId", id, "delay", timestamp + delay)
  local head = redis.call("ZRANGE", KEYS[5], 0, 0, "WITHSCORES")
  if head[2] then
    redis.call("ZADD", KEYS[8], math.floor(tonumber(head[2]) / 4096), "1")
  end
  return tostring(id)
end
if priority > 0 then
  local counter = redis.call("INCR", KEYS[7])
  redis.call("ZADD", KEYS[6], priority * 4294967296 + bit.band(counter, 0xffffffff), id)
elseif paused then
  redis.call("LPUSH", KEYS[4], id)
else
  redis.call("LPUSH", KEYS[3], id)
end
if not paused then
  redis.call("ZADD", KEYS[8], 0, "0")
end
redis.call("XADD", KEYS[9], "MAXLEN", "~", maxEvents, "*", "event", "waiting", "jobId", id)
return tostring(id)
"#,
    )
});

// KEYS: job, failed, wait, paused, meta, marker, events. ARGV[1]: id
// 0 = missing, -1 = not failed, 1 = moved back to waiting
static RETRY_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
if redis.call("EXISTS", KEYS[1]) == 0 then return 0 end
if not redis.call("ZSCORE", KEYS[2], ARGV[1]) then return -1 end
redis.call("ZREM", KEYS[2], ARGV[1])
redis.call("HDEL", KEYS[1], "finishedOn", "processedOn", "failedReason", "returnvalue")
if redis.call("HEXISTS", KEYS[5], "paused") == 1 then
  redis.call("LPUSH", KEYS[4], ARGV[1])
else
  redis.call("LPUSH", KEYS[3], ARGV[1])
  redis.call("ZADD", KEYS[6], 0, "0")
end
local maxEvents = tonumber(redis.call("HGET", KEYS[5], "opts.maxLenEvents")) or 10000
redis.call("XADD", KEYS[7], "MAXLEN", "~", maxEvents, "*",
  "event", "waiting", "jobId", ARGV[1], "prev", "failed")
return 1
"#,
    )
});

// KEYS: job, lock, logs, wait, paused, active, prioritized, delayed, completed, failed
// ARGV[1]: id. 0 = missing, -1 = locked, 1 = removed
static REMOVE_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
if redis.call("EXISTS", KEYS[1]) == 0 then return 0 end
if redis.call("EXISTS", KEYS[2]) == 1 then return -1 end
for i = 4, 6 do redis.call("LREM", KEYS[i], 0, ARGV[1]) end
for i = 7, 10 do redis.call("ZREM", KEYS[i], ARGV[1]) end
redis.call("DEL", KEYS[1], KEYS[3])
return 1
"#,
    )
});

/// [`JobGateway`] over a shared Redis connection
pub struct RedisJobGateway {
    conn: ConnectionManager,
    keys: QueueKeys,
}

impl RedisJobGateway {
    #[must_use]
    pub fn new(conn: ConnectionManager, keys: QueueKeys) -> Self {
        Self { conn, keys }
    }

    /// Detect the state of a job from key membership
    async fn state_of(&self, queue: &str, id: &str) -> GatewayResult<Option<JobState>> {
        let mut conn = self.conn.clone();
        let k = |suffix: &str| self.keys.key(queue, suffix);
        let mut pipe = redis::pipe();
        pipe.cmd("LPOS")
            .arg(k("active"))
            .arg(id)
            .zscore(k("failed"), id)
            .zscore(k("completed"), id)
            .zscore(k("delayed"), id)
            .cmd("LPOS")
            .arg(k("wait"))
            .arg(id)
            .cmd("LPOS")
            .arg(k("paused"))
            .arg(id)
            .zscore(k("prioritized"), id);

        #[allow(clippy::type_complexity)]
        let (active, failed, completed, delayed, wait, paused, prioritized): (
            Option<i64>,
            Option<f64>,
            Option<f64>,
            Option<f64>,
            Option<i64>,
            Option<i64>,
            Option<f64>,
        ) = pipe.query_async(&mut conn).await?;

        let state = if active.is_some() {
            Some(JobState::Active)
        } else if failed.is_some() {
            Some(JobState::Failed)
        } else if completed.is_some() {
            Some(JobState::Completed)
        } else if delayed.is_some() {
            Some(JobState::Delayed)
        } else if wait.is_some() || paused.is_some() || prioritized.is_some() {
            Some(JobState::Waiting)
        } else {
            None
        };
        Ok(state)
    }

    /// Ids in one state for a page range, newest first per key
    async fn ids_in_state(
        &self,
        queue: &str,
        state: JobState,
        start: usize,
        end: usize,
    ) -> GatewayResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let (start, end) = (start as isize, end as isize);
        let mut ids = Vec::new();
        for state_key in self.keys.state_keys(queue, state) {
            let batch: Vec<String> = match state_key.kind {
                KeyKind::List => conn.lrange(&state_key.key, start, end).await?,
                KeyKind::SortedSet => conn.zrevrange(&state_key.key, start, end).await?,
            };
            ids.extend(batch);
        }
        Ok(ids)
    }
}

fn parse_ms(fields: &HashMap<String, String>, key: &str) -> Option<i64> {
    fields
        .get(key)
        .and_then(|v| v.parse::<f64>().ok())
        .map(|v| v as i64)
}

fn parse_json(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Build a snapshot from the fields of a job hash
pub(crate) fn job_from_hash(
    id: &str,
    state: JobState,
    fields: &HashMap<String, String>,
) -> JobSnapshot {
    let opts = fields.get("opts").map_or(Value::Null, |raw| parse_json(raw));
    let attempts_allowed = opts
        .get("attempts")
        .and_then(Value::as_u64)
        .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX));

    let attempts_made = fields
        .get("atm")
        .or_else(|| fields.get("attemptsMade"))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let stack_frames = fields
        .get("stacktrace")
        .and_then(|raw| serde_json::from_str::<Vec<Value>>(raw).ok())
        .map(|frames| {
            frames
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let return_value = fields
        .get("returnvalue")
        .map(|raw| parse_json(raw))
        .filter(|v| !v.is_null());

    JobSnapshot {
        id: id.to_string(),
        name: fields.get("name").cloned().unwrap_or_default(),
        data: fields.get("data").map_or(Value::Null, |raw| parse_json(raw)),
        progress: fields
            .get("progress")
            .map(|raw| Progress::from_raw(raw))
            .unwrap_or_default(),
        created_at: parse_ms(fields, "timestamp").unwrap_or(0),
        processed_at: parse_ms(fields, "processedOn"),
        finished_at: parse_ms(fields, "finishedOn"),
        failure_reason: fields.get("failedReason").filter(|s| !s.is_empty()).cloned(),
        stack_frames,
        attempts_made,
        attempts_allowed,
        state,
        return_value,
    }
}

/// Newest first; numeric ids break ties so that order is stable
pub(crate) fn sort_newest_first(jobs: &mut [JobSnapshot]) {
    jobs.sort_by(|a, b| {
        b.created_at.cmp(&a.created_at).then_with(|| {
            let (ai, bi) = (a.id.parse::<u64>().ok(), b.id.parse::<u64>().ok());
            bi.cmp(&ai).then_with(|| b.id.cmp(&a.id))
        })
    });
}

#[async_trait]
impl JobGateway for RedisJobGateway {
    async fn list_jobs(
        &self,
        queue: &str,
        filter: StateFilter,
        start: usize,
        end: usize,
    ) -> GatewayResult<Vec<JobSnapshot>> {
        let page = end.saturating_sub(start) + 1;
        let mut candidates: Vec<(String, JobState)> = Vec::new();
        let mut seen = HashSet::new();
        for state in filter.states() {
            for id in self.ids_in_state(queue, state, start, end).await? {
                if seen.insert(id.clone()) {
                    candidates.push((id, state));
                }
            }
        }
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for (id, _) in &candidates {
            pipe.hgetall(self.keys.job(queue, id));
        }
        let mut conn = self.conn.clone();
        let hashes: Vec<HashMap<String, String>> = pipe.query_async(&mut conn).await?;

        let mut jobs: Vec<JobSnapshot> = candidates
            .iter()
            .zip(hashes)
            // Removed between the range and the fetch
            .filter(|(_, fields)| !fields.is_empty())
            .map(|((id, state), fields)| job_from_hash(id, *state, &fields))
            .collect();
        sort_newest_first(&mut jobs);

        // Waiting spans several keys, keep one page per state
        let mut per_state: HashMap<JobState, usize> = HashMap::new();
        jobs.retain(|job| {
            let n = per_state.entry(job.state).or_insert(0);
            *n += 1;
            *n <= page
        });

        debug!(queue, filter = %filter, count = jobs.len(), "Listed jobs");
        Ok(jobs)
    }

    async fn get_by_id(&self, queue: &str, id: &str) -> GatewayResult<Option<JobSnapshot>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(self.keys.job(queue, id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        let state = match self.state_of(queue, id).await? {
            Some(state) => state,
            None if fields.contains_key("failedReason") => JobState::Failed,
            None if fields.contains_key("finishedOn") => JobState::Completed,
            None => JobState::Waiting,
        };
        Ok(Some(job_from_hash(id, state, &fields)))
    }

    async fn add(
        &self,
        queue: &str,
        job_name: &str,
        payload: Value,
        opts: AddJobOptions,
    ) -> GatewayResult<String> {
        let queue = validate_queue_name(queue)?;
        let delay = opts.delay_ms.unwrap_or(0);
        let priority = opts.priority.unwrap_or(0);

        let mut stored_opts = json!({
            "attempts": opts.max_attempts,
            "backoff": opts.backoff,
        });
        if delay > 0 {
            stored_opts["delay"] = json!(delay);
        }
        if priority > 0 {
            stored_opts["priority"] = json!(priority);
        }

        let mut conn = self.conn.clone();
        let k = |suffix: &str| self.keys.key(queue, suffix);
        let id: String = ADD_SCRIPT
            .key(k("id"))
            .key(self.keys.meta(queue))
            .key(k("wait"))
            .key(k("paused"))
            .key(k("delayed"))
            .key(k("prioritized"))
            .key(k("pc"))
            .key(k("marker"))
            .key(k("events"))
            .arg(self.keys.queue_prefix(queue))
            .arg(job_name)
            .arg(serde_json::to_string(&payload)?)
            .arg(serde_json::to_string(&stored_opts)?)
            .arg(chrono::Utc::now().timestamp_millis())
            .arg(delay)
            .arg(priority)
            .invoke_async(&mut conn)
            .await?;

        info!(queue, job = job_name, id = %id, delay, priority, "Added job");
        Ok(id)
    }

    async fn retry(&self, queue: &str, id: &str) -> GatewayResult<bool> {
        let mut conn = self.conn.clone();
        let outcome: i64 = RETRY_SCRIPT
            .key(self.keys.job(queue, id))
            .key(self.keys.key(queue, "failed"))
            .key(self.keys.key(queue, "wait"))
            .key(self.keys.key(queue, "paused"))
            .key(self.keys.meta(queue))
            .key(self.keys.key(queue, "marker"))
            .key(self.keys.key(queue, "events"))
            .arg(id)
            .invoke_async(&mut conn)
            .await?;

        match outcome {
            0 => Ok(false),
            -1 => {
                let state = self
                    .state_of(queue, id)
                    .await?
                    .map_or("unknown", JobState::as_str);
                Err(GatewayError::NotRetryable {
                    id: id.to_string(),
                    state: state.to_string(),
                })
            }
            _ => {
                info!(queue, id, "Retried job");
                Ok(true)
            }
        }
    }

    async fn remove(&self, queue: &str, id: &str) -> GatewayResult<bool> {
        let mut conn = self.conn.clone();
        let k = |suffix: &str| self.keys.key(queue, suffix);
        let outcome: i64 = REMOVE_SCRIPT
            .key(self.keys.job(queue, id))
            .key(self.keys.job_lock(queue, id))
            .key(self.keys.job_logs(queue, id))
            .key(k("wait"))
            .key(k("paused"))
            .key(k("active"))
            .key(k("prioritized"))
            .key(k("delayed"))
            .key(k("completed"))
            .key(k("failed"))
            .arg(id)
            .invoke_async(&mut conn)
            .await?;

        match outcome {
            0 => Ok(false),
            -1 => Err(GatewayError::Locked(id.to_string())),
            _ => {
                info!(queue, id, "Removed job");
                Ok(true)
            }
        }
    }

    async fn get_logs(
        &self,
        queue: &str,
        id: &str,
        start: usize,
        end: usize,
    ) -> GatewayResult<Vec<String>> {
        if end <= start {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        // Logs are appended on the right; count back from the newest line
        let from = -(end as isize);
        let to = -(start as isize) - 1;
        let lines: Vec<String> = conn.lrange(self.keys.job_logs(queue, id), from, to).await?;
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hash(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn parses_failed_job_hash() {
        let fields = hash(&[
            ("name", "send-email"),
            ("data", r#"{"to":"a@b.com"}"#),
            ("opts", r#"{"attempts":3,"backoff":{"type":"exponential","delay":2000}}"#),
            ("timestamp", "1700000000000"),
            ("processedOn", "1700000000500"),
            ("finishedOn", "1700000001000"),
            ("failedReason", "smtp timeout"),
            ("stacktrace", r#"["Error: smtp timeout\n    at send (mail.js:10)"]"#),
            ("atm", "2"),
            ("progress", "40"),
        ]);
        let job = job_from_hash("7", JobState::Failed, &fields);
        assert_eq!(job.name, "send-email");
        assert_eq!(job.data, json!({"to": "a@b.com"}));
        assert_eq!(job.attempts_allowed, 3);
        assert_eq!(job.attempts_made, 2);
        assert_eq!(job.created_at, 1_700_000_000_000);
        assert_eq!(job.finished_at, Some(1_700_000_001_000));
        assert_eq!(job.failure_reason.as_deref(), Some("smtp timeout"));
        assert_eq!(job.stack_frames.len(), 1);
        assert_eq!(job.progress, Progress::Number(40.0));
        assert_eq!(job.return_value, None);
    }

    #[test]
    fn tolerates_sparse_hash() {
        let job = job_from_hash("1", JobState::Waiting, &hash(&[("name", "x")]));
        assert_eq!(job.attempts_allowed, 0);
        assert_eq!(job.progress, Progress::Number(0.0));
        assert_eq!(job.data, Value::Null);
        assert!(job.stack_frames.is_empty());
    }

    #[test]
    fn keeps_non_json_data_verbatim() {
        let job = job_from_hash("1", JobState::Waiting, &hash(&[("data", "plain")]));
        assert_eq!(job.data, Value::String("plain".into()));
    }

    #[test]
    fn sorts_by_creation_then_numeric_id() {
        let mut jobs: Vec<JobSnapshot> = [("2", 10), ("10", 10), ("3", 30)]
            .into_iter()
            .map(|(id, ts)| {
                let mut job = job_from_hash(id, JobState::Waiting, &HashMap::new());
                job.created_at = ts;
                job
            })
            .collect();
        sort_newest_first(&mut jobs);
        let ids: Vec<&str> = jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "10", "2"]);
    }
}
