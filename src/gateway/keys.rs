//! Redis key naming for the BullMQ layout
//!
//! `{prefix}:{queue}:{suffix}` for queue-level keys and
//! `{prefix}:{queue}:{job_id}` for job hashes.

use crate::model::JobState;

/// Key builder for one key prefix
#[derive(Debug, Clone)]
pub struct QueueKeys {
    prefix: String,
}

impl QueueKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key of a queue-level structure, e.g. `bull:orders:wait`
    #[must_use]
    pub fn key(&self, queue: &str, suffix: &str) -> String {
        format!("{}:{queue}:{suffix}", self.prefix)
    }

    #[must_use]
    pub fn meta(&self, queue: &str) -> String {
        self.key(queue, "meta")
    }

    #[must_use]
    pub fn job(&self, queue: &str, id: &str) -> String {
        self.key(queue, id)
    }

    #[must_use]
    pub fn job_logs(&self, queue: &str, id: &str) -> String {
        format!("{}:logs", self.job(queue, id))
    }

    #[must_use]
    pub fn job_lock(&self, queue: &str, id: &str) -> String {
        format!("{}:lock", self.job(queue, id))
    }

    /// Prefix shared by every key of one queue, used for glob matching
    #[must_use]
    pub fn queue_prefix(&self, queue: &str) -> String {
        format!("{}:{queue}:", self.prefix)
    }

    /// Glob that matches the meta hash of every queue
    #[must_use]
    pub fn meta_pattern(&self) -> String {
        format!("{}:*:meta", self.prefix)
    }

    /// Extract the queue name from a meta key found by [`Self::meta_pattern`]
    #[must_use]
    pub fn queue_from_meta<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.prefix.as_str())?
            .strip_prefix(':')?
            .strip_suffix(":meta")
            .filter(|name| !name.is_empty())
    }

    /// Keys holding jobs of one state
    ///
    /// Waiting jobs live in three structures depending on whether the queue
    /// is paused or the job carries a priority.
    #[must_use]
    pub fn state_keys(&self, queue: &str, state: JobState) -> Vec<StateKey> {
        match state {
            JobState::Waiting => vec![
                StateKey::list(self.key(queue, "wait")),
                StateKey::list(self.key(queue, "paused")),
                StateKey::zset(self.key(queue, "prioritized")),
            ],
            JobState::Active => vec![StateKey::list(self.key(queue, "active"))],
            JobState::Completed => vec![StateKey::zset(self.key(queue, "completed"))],
            JobState::Failed => vec![StateKey::zset(self.key(queue, "failed"))],
            JobState::Delayed => vec![StateKey::zset(self.key(queue, "delayed"))],
        }
    }
}

/// Redis type of a state key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    List,
    SortedSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateKey {
    pub key: String,
    pub kind: KeyKind,
}

impl StateKey {
    fn list(key: String) -> Self {
        Self {
            key,
            kind: KeyKind::List,
        }
    }

    fn zset(key: String) -> Self {
        Self {
            key,
            kind: KeyKind::SortedSet,
        }
    }
}
