//! Queue gateway backed by Redis
//!
//! Multi-key mutations run as Lua scripts so that a worker polling the same
//! keys never observes a half-applied change.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::{debug, info};

use super::keys::{KeyKind, QueueKeys};
use super::{CLEAN_LIMIT, CleanTarget, GatewayResult, QueueGateway, validate_queue_name};
use crate::model::{JobState, QueueSnapshot, StateCounts};

/// Keys fetched per SCAN round trip
const SCAN_COUNT: usize = 500;

/// Oldest members examined per structure when cleaning
const CLEAN_SCAN_WINDOW: isize = 10_000;

// KEYS: meta, wait, paused. ARGV[1]: "1" to pause, "0" to resume.
static PAUSE_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local src, dst
if ARGV[1] == "1" then
  redis.call("HSET", KEYS[1], "paused", 1)
  src, dst = KEYS[2], KEYS[3]
else
  redis.call("HDEL", KEYS[1], "paused")
  src, dst = KEYS[3], KEYS[2]
end
if redis.call("EXISTS", dst) == 0 then
  if redis.call("EXISTS", src) == 1 then
    redis.call("RENAME", src, dst)
  end
else
  while redis.call("RPOPLPUSH", src, dst) do end
end
return 0
"#,
    )
});

// KEYS: wait, paused, prioritized. ARGV[1]: job key prefix ending in ':'.
static DRAIN_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local removed = 0
local function purge(ids)
  for _, id in ipairs(ids) do
    redis.call("DEL", ARGV[1] .. id, ARGV[1] .. id .. ":logs")
    removed = removed + 1
  end
end
purge(redis.call("LRANGE", KEYS[1], 0, -1))
purge(redis.call("LRANGE", KEYS[2], 0, -1))
purge(redis.call("ZRANGE", KEYS[3], 0, -1))
redis.call("DEL", KEYS[1], KEYS[2], KEYS[3])
return removed
"#,
    )
});

/// [`QueueGateway`] over a shared Redis connection
pub struct RedisQueueGateway {
    conn: ConnectionManager,
    keys: QueueKeys,
}

impl RedisQueueGateway {
    #[must_use]
    pub fn new(conn: ConnectionManager, keys: QueueKeys) -> Self {
        Self { conn, keys }
    }

    async fn llen(&self, key: String) -> GatewayResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.llen(key).await?;
        Ok(len)
    }

    async fn zcard(&self, key: String) -> GatewayResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.zcard(key).await?;
        Ok(len)
    }

    async fn is_paused(&self, name: &str) -> GatewayResult<bool> {
        let mut conn = self.conn.clone();
        let paused: bool = conn.hexists(self.keys.meta(name), "paused").await?;
        Ok(paused)
    }

    async fn set_paused(&self, name: &str, paused: bool) -> GatewayResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = PAUSE_SCRIPT
            .key(self.keys.meta(name))
            .key(self.keys.key(name, "wait"))
            .key(self.keys.key(name, "paused"))
            .arg(if paused { "1" } else { "0" })
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Job ids of one structure, oldest first, bounded by the scan window
    async fn oldest_ids(&self, key: &str, kind: KeyKind) -> GatewayResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = match kind {
            KeyKind::SortedSet => conn.zrange(key, 0, CLEAN_SCAN_WINDOW - 1).await?,
            KeyKind::List => {
                // New jobs are pushed on the left, so the oldest sit on the right
                let mut ids: Vec<String> = conn.lrange(key, -CLEAN_SCAN_WINDOW, -1).await?;
                ids.reverse();
                ids
            }
        };
        Ok(ids)
    }
}

/// Escape glob metacharacters for use in a SCAN pattern
fn escape_glob(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl QueueGateway for RedisQueueGateway {
    async fn list_queue_names(&self) -> GatewayResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let pattern = self.keys.meta_pattern();
        let mut names = BTreeSet::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;

            names.extend(
                batch
                    .iter()
                    .filter_map(|key| self.keys.queue_from_meta(key))
                    .map(str::to_string),
            );

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(count = names.len(), "Discovered queues");
        Ok(names.into_iter().collect())
    }

    async fn get_stats(&self, name: &str) -> GatewayResult<QueueSnapshot> {
        let k = |suffix: &str| self.keys.key(name, suffix);

        let (wait, paused_list, prioritized, active, completed, failed, delayed, paused) =
            tokio::try_join!(
                self.llen(k("wait")),
                self.llen(k("paused")),
                self.zcard(k("prioritized")),
                self.llen(k("active")),
                self.zcard(k("completed")),
                self.zcard(k("failed")),
                self.zcard(k("delayed")),
                self.is_paused(name),
            )?;

        Ok(QueueSnapshot {
            name: name.to_string(),
            counts: StateCounts {
                waiting: wait + paused_list + prioritized,
                active,
                completed,
                failed,
                delayed,
            },
            paused,
        })
    }

    async fn create(&self, name: &str) -> GatewayResult<()> {
        let name = validate_queue_name(name)?;
        let mut conn = self.conn.clone();
        let created: bool = conn
            .hset_nx(self.keys.meta(name), "opts.maxLenEvents", 10_000)
            .await?;
        info!(queue = name, created, "Create queue");
        Ok(())
    }

    async fn pause(&self, name: &str) -> GatewayResult<()> {
        self.set_paused(name, true).await?;
        info!(queue = name, "Paused queue");
        Ok(())
    }

    async fn resume(&self, name: &str) -> GatewayResult<()> {
        self.set_paused(name, false).await?;
        info!(queue = name, "Resumed queue");
        Ok(())
    }

    async fn drain(&self, name: &str) -> GatewayResult<()> {
        let mut conn = self.conn.clone();
        let removed: i64 = DRAIN_SCRIPT
            .key(self.keys.key(name, "wait"))
            .key(self.keys.key(name, "paused"))
            .key(self.keys.key(name, "prioritized"))
            .arg(self.keys.queue_prefix(name))
            .invoke_async(&mut conn)
            .await?;
        info!(queue = name, removed, "Drained queue");
        Ok(())
    }

    async fn clean(&self, name: &str, target: CleanTarget, grace_ms: u64) -> GatewayResult<u64> {
        let state = match target {
            CleanTarget::Completed => JobState::Completed,
            CleanTarget::Failed => JobState::Failed,
            CleanTarget::Delayed => JobState::Delayed,
            CleanTarget::Waiting => JobState::Waiting,
            CleanTarget::Active => JobState::Active,
        };
        let by_finish = matches!(state, JobState::Completed | JobState::Failed);
        let cutoff = now_ms().saturating_sub(i64::try_from(grace_ms).unwrap_or(i64::MAX));
        let mut conn = self.conn.clone();
        let mut removed: u64 = 0;

        for state_key in self.keys.state_keys(name, state) {
            let remaining = CLEAN_LIMIT.saturating_sub(removed as usize);
            if remaining == 0 {
                break;
            }

            let ids = self.oldest_ids(&state_key.key, state_key.kind).await?;
            if ids.is_empty() {
                continue;
            }

            let mut lookup = redis::pipe();
            for id in &ids {
                lookup
                    .hget(self.keys.job(name, id), "timestamp")
                    .hget(self.keys.job(name, id), "finishedOn")
                    .exists(self.keys.job_lock(name, id));
            }
            let fields: Vec<(Option<i64>, Option<i64>, bool)> = lookup.query_async(&mut conn).await?;

            let victims: Vec<&String> = ids
                .iter()
                .zip(fields)
                .filter(|(_, (created, finished, locked))| {
                    let at = if by_finish { *finished } else { *created };
                    !*locked && at.unwrap_or(0) <= cutoff
                })
                .map(|(id, _)| id)
                .take(remaining)
                .collect();

            if victims.is_empty() {
                continue;
            }

            let mut purge = redis::pipe();
            purge.atomic();
            for id in &victims {
                match state_key.kind {
                    KeyKind::List => purge.lrem(&state_key.key, 0, id.as_str()).ignore(),
                    KeyKind::SortedSet => purge.zrem(&state_key.key, id.as_str()).ignore(),
                };
                purge
                    .del(self.keys.job(name, id))
                    .ignore()
                    .del(self.keys.job_logs(name, id))
                    .ignore();
            }
            let _: () = purge.query_async(&mut conn).await?;
            removed += victims.len() as u64;
        }

        info!(queue = name, target = target.as_str(), grace_ms, removed, "Cleaned queue");
        Ok(removed)
    }

    async fn delete(&self, name: &str) -> GatewayResult<()> {
        let name = validate_queue_name(name)?;
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", escape_glob(&self.keys.queue_prefix(name)));
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;

            if !batch.is_empty() {
                let n: u64 = redis::cmd("UNLINK").arg(&batch).query_async(&mut conn).await?;
                removed += n;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        info!(queue = name, keys = removed, "Deleted queue");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_glob_metacharacters() {
        assert_eq!(escape_glob("bull:orders:"), "bull:orders:");
        assert_eq!(escape_glob("bull:a*b?[c]:"), "bull:a\\*b\\?\\[c\\]:");
    }
}
