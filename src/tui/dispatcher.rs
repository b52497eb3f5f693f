//! Queue and job mutations issued from the dashboard
//!
//! Each [`Mutation`] maps to one gateway call. The outcome carries the
//! notification to show and the poll domains that should refresh.

use serde_json::Value;
use tracing::{info, warn};

use crate::gateway::{AddJobOptions, CleanTarget, Gateways};
use crate::poller::PollDomain;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Mutation {
    CreateQueue {
        name: String,
    },
    PauseQueue {
        name: String,
    },
    ResumeQueue {
        name: String,
    },
    DrainQueue {
        name: String,
    },
    CleanQueue {
        name: String,
        target: CleanTarget,
        grace_ms: u64,
    },
    DeleteQueue {
        name: String,
    },
    AddJob {
        queue: String,
        name: String,
        payload: Value,
        opts: AddJobOptions,
    },
    RetryJob {
        queue: String,
        id: String,
    },
    RemoveJob {
        queue: String,
        id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MutationKind {
    CreateQueue,
    PauseQueue,
    ResumeQueue,
    DrainQueue,
    CleanQueue,
    DeleteQueue,
    AddJob,
    RetryJob,
    RemoveJob,
}

impl Mutation {
    pub(crate) const fn kind(&self) -> MutationKind {
        match self {
            Mutation::CreateQueue { .. } => MutationKind::CreateQueue,
            Mutation::PauseQueue { .. } => MutationKind::PauseQueue,
            Mutation::ResumeQueue { .. } => MutationKind::ResumeQueue,
            Mutation::DrainQueue { .. } => MutationKind::DrainQueue,
            Mutation::CleanQueue { .. } => MutationKind::CleanQueue,
            Mutation::DeleteQueue { .. } => MutationKind::DeleteQueue,
            Mutation::AddJob { .. } => MutationKind::AddJob,
            Mutation::RetryJob { .. } => MutationKind::RetryJob,
            Mutation::RemoveJob { .. } => MutationKind::RemoveJob,
        }
    }

    /// Short description used in failure messages, e.g. `pause 'orders'`
    pub(crate) fn describe(&self) -> String {
        match self {
            Mutation::CreateQueue { name } => format!("create '{name}'"),
            Mutation::PauseQueue { name } => format!("pause '{name}'"),
            Mutation::ResumeQueue { name } => format!("resume '{name}'"),
            Mutation::DrainQueue { name } => format!("drain '{name}'"),
            Mutation::CleanQueue { name, .. } => format!("clean '{name}'"),
            Mutation::DeleteQueue { name } => format!("delete '{name}'"),
            Mutation::AddJob { queue, .. } => format!("add job to '{queue}'"),
            Mutation::RetryJob { id, .. } => format!("retry job {id}"),
            Mutation::RemoveJob { id, .. } => format!("remove job {id}"),
        }
    }

    fn refresh(&self) -> Vec<PollDomain> {
        match self.kind() {
            MutationKind::CreateQueue => vec![PollDomain::Queues],
            _ => vec![PollDomain::Queues, PollDomain::Jobs],
        }
    }
}

/// How a notification is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatusLevel {
    Info,
    Success,
    Error,
}

/// Result of one mutation, reported back to the dashboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ActionOutcome {
    pub kind: MutationKind,
    pub level: StatusLevel,
    pub message: String,
    /// Domains to re-poll; empty on failure
    pub refresh: Vec<PollDomain>,
}

impl ActionOutcome {
    pub(crate) fn ok(&self) -> bool {
        self.level != StatusLevel::Error
    }

    /// Failure for a mutation whose task ended without reporting
    pub(crate) fn abandoned(kind: MutationKind, description: &str) -> Self {
        Self {
            kind,
            level: StatusLevel::Error,
            message: format!("Failed to {description}: task ended abnormally"),
            refresh: Vec::new(),
        }
    }
}

/// Run a mutation against the gateways
pub(crate) async fn execute(gateways: &Gateways, mutation: Mutation) -> ActionOutcome {
    let kind = mutation.kind();
    let description = mutation.describe();
    let refresh = mutation.refresh();
    let queues = gateways.queues.as_ref();
    let jobs = gateways.jobs.as_ref();

    let result = match mutation {
        Mutation::CreateQueue { name } => queues
            .create(&name)
            .await
            .map(|()| (StatusLevel::Success, format!("Queue '{}' created", name.trim()))),
        Mutation::PauseQueue { name } => queues
            .pause(&name)
            .await
            .map(|()| (StatusLevel::Success, format!("Paused {name}"))),
        Mutation::ResumeQueue { name } => queues
            .resume(&name)
            .await
            .map(|()| (StatusLevel::Success, format!("Resumed {name}"))),
        Mutation::DrainQueue { name } => queues
            .drain(&name)
            .await
            .map(|()| (StatusLevel::Success, format!("Drained {name}"))),
        Mutation::CleanQueue {
            name,
            target,
            grace_ms,
        } => queues.clean(&name, target, grace_ms).await.map(|n| {
            (
                StatusLevel::Success,
                format!("Cleaned {n} {} jobs", target.as_str()),
            )
        }),
        Mutation::DeleteQueue { name } => queues
            .delete(&name)
            .await
            .map(|()| (StatusLevel::Success, format!("Deleted {name}"))),
        Mutation::AddJob {
            queue,
            name,
            payload,
            opts,
        } => jobs
            .add(&queue, &name, payload, opts)
            .await
            .map(|id| (StatusLevel::Success, format!("Job '{id}' added"))),
        Mutation::RetryJob { queue, id } => jobs.retry(&queue, &id).await.map(|found| {
            if found {
                (StatusLevel::Success, format!("Retried job {id}"))
            } else {
                (StatusLevel::Info, format!("Job {id} not found"))
            }
        }),
        Mutation::RemoveJob { queue, id } => jobs.remove(&queue, &id).await.map(|found| {
            if found {
                (StatusLevel::Success, format!("Removed job {id}"))
            } else {
                (StatusLevel::Info, format!("Job {id} not found"))
            }
        }),
    };

    match result {
        Ok((level, message)) => {
            info!(action = %description, %message, "Mutation done");
            ActionOutcome {
                kind,
                level,
                message,
                refresh,
            }
        }
        Err(e) => {
            warn!(action = %description, error = %e, "Mutation failed");
            ActionOutcome {
                kind,
                level: StatusLevel::Error,
                message: format!("Failed to {description}: {e}"),
                refresh: Vec::new(),
            }
        }
    }
}
