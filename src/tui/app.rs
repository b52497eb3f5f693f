//! TUI application state machine
//!
//! `App` owns every piece of navigation state. Input handlers mutate it
//! directly; background results arrive as [`AppUpdate`] messages and go
//! through [`App::apply_update`], which decides whether they are still
//! relevant before touching anything.

use std::time::{Duration, Instant};
use throbber_widgets_tui::ThrobberState;
use tokio::sync::mpsc::{Sender, UnboundedReceiver, error::TrySendError};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::dispatcher::{ActionOutcome, Mutation, MutationKind, StatusLevel};
use super::forms::{JobForm, QueueForm};
use crate::config::Config;
use crate::connection::ConnectionStatus;
use crate::model::{JobSnapshot, QueueSnapshot, StateFilter, WorkerSnapshot};
use crate::poller::{JobQuery, PollDomain, PollUpdate};

/// Focusable panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Panel {
    #[default]
    Queues,
    Jobs,
}

impl Panel {
    pub(crate) const fn other(self) -> Self {
        match self {
            Panel::Queues => Panel::Jobs,
            Panel::Jobs => Panel::Queues,
        }
    }
}

/// Overlay capturing all input while open
#[derive(Debug, Default)]
pub(crate) enum Modal {
    #[default]
    None,
    QueueForm(QueueForm),
    JobForm(JobForm),
}

impl Modal {
    pub(crate) const fn is_open(&self) -> bool {
        !matches!(self, Modal::None)
    }
}

/// Messages sent from background tasks to the UI
#[derive(Debug)]
pub(crate) enum AppUpdate {
    Poll(PollUpdate),
    /// Log lines for the inspection identified by `token`
    JobLogs {
        token: u64,
        result: Result<Vec<String>, String>,
    },
    ActionResult(ActionOutcome),
}

/// Commands sent from the UI to the background worker
///
/// These may be dropped when the queue is full. What the worker must always
/// follow travels over [`Targets`] instead.
#[derive(Debug)]
pub(crate) enum BgCommand {
    Refresh(PollDomain),
    Mutate(Mutation),
}

/// Log fetch the detail panel is waiting for
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LogRequest {
    pub token: u64,
    pub queue: String,
    pub job_id: String,
}

/// UI side of the target channels; a newer value replaces an unread one
pub(crate) struct Targets {
    pub jobs: watch::Sender<Option<JobQuery>>,
    pub logs: watch::Sender<Option<LogRequest>>,
}

/// Worker side of [`Targets`]
pub(crate) struct TargetWatch {
    pub jobs: watch::Receiver<Option<JobQuery>>,
    pub logs: watch::Receiver<Option<LogRequest>>,
}

pub(crate) fn target_channels() -> (Targets, TargetWatch) {
    let (jobs_tx, jobs_rx) = watch::channel(None);
    let (logs_tx, logs_rx) = watch::channel(None);
    (
        Targets {
            jobs: jobs_tx,
            logs: logs_tx,
        },
        TargetWatch {
            jobs: jobs_rx,
            logs: logs_rx,
        },
    )
}

/// Ephemeral notification shown in the footer
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StatusMessage {
    pub text: String,
    pub level: StatusLevel,
    pub expires_at: Instant,
}

/// Last error per poll domain; `None` once the domain polls cleanly again
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DomainErrors {
    pub queues: Option<String>,
    pub jobs: Option<String>,
    pub workers: Option<String>,
}

impl DomainErrors {
    fn slot(&mut self, domain: PollDomain) -> &mut Option<String> {
        match domain {
            PollDomain::Queues => &mut self.queues,
            PollDomain::Jobs => &mut self.jobs,
            PollDomain::Workers => &mut self.workers,
        }
    }

    pub(crate) fn any(&self) -> bool {
        self.queues.is_some() || self.jobs.is_some() || self.workers.is_some()
    }
}

/// Read-only projection consumed by the renderers
pub(crate) struct DashboardView<'a> {
    pub queues: &'a [QueueSnapshot],
    pub selected_queue: usize,
    pub jobs: &'a [JobSnapshot],
    pub selected_job: usize,
    pub job_filter: StateFilter,
    pub inspected_job: Option<&'a JobSnapshot>,
    pub inspected_stale: bool,
    pub job_logs: &'a [String],
    pub logs_loading: bool,
    pub log_error: Option<&'a str>,
    pub workers: &'a [WorkerSnapshot],
    pub panel: Panel,
    pub modal: &'a Modal,
    pub status: Option<&'a StatusMessage>,
    pub connection: ConnectionStatus,
    pub target: &'a str,
    pub errors: &'a DomainErrors,
    pub pending_actions: usize,
}

pub(crate) struct App {
    /// Channel sender to send commands to background worker (bounded, non-blocking `try_send`)
    pub bg_cmd_tx: Option<Sender<BgCommand>>,
    /// Job query and log request the worker follows (set by run())
    pub targets: Option<Targets>,
    /// Channel receiver to accept background updates (set by run())
    pub bg_update_rx: Option<UnboundedReceiver<AppUpdate>>,

    pub should_quit: bool,
    /// Whether the UI needs to be redrawn
    pub dirty: bool,

    pub panel: Panel,
    pub modal: Modal,

    pub queues: Vec<QueueSnapshot>,
    pub selected_queue: usize,
    pub jobs: Vec<JobSnapshot>,
    pub selected_job: usize,
    pub job_filter: StateFilter,
    /// Query the job poll currently answers; `None` without a selected queue
    pub job_query: Option<JobQuery>,
    pub workers: Vec<WorkerSnapshot>,

    pub inspected: Option<JobSnapshot>,
    /// The inspected job was missing from the latest job poll
    pub inspected_stale: bool,
    pub job_logs: Vec<String>,
    pub logs_loading: bool,
    pub log_error: Option<String>,
    /// Bumped on every inspection change; log results carry the token they answer
    pub log_token: u64,
    /// Inspect the selected job as soon as the job list is non-empty
    pub pending_auto_inspect: bool,

    pub status: Option<StatusMessage>,
    pub status_ttl: Duration,
    /// Mutations dispatched but not yet reported back
    pub pending_actions: usize,

    pub errors: DomainErrors,
    last_seq: [u64; 3],
    pub connection: ConnectionStatus,
    /// `host:port/db` shown in the header
    pub target: String,

    pub page_size: usize,
    throbber_state: ThrobberState,
}

const fn seq_slot(domain: PollDomain) -> usize {
    match domain {
        PollDomain::Queues => 0,
        PollDomain::Jobs => 1,
        PollDomain::Workers => 2,
    }
}

impl App {
    pub(crate) fn new(config: &Config, target: impl Into<String>) -> Self {
        Self {
            bg_cmd_tx: None,
            targets: None,
            bg_update_rx: None,
            should_quit: false,
            dirty: true,
            panel: Panel::Queues,
            modal: Modal::None,
            queues: Vec::new(),
            selected_queue: 0,
            jobs: Vec::new(),
            selected_job: 0,
            job_filter: StateFilter::All,
            job_query: None,
            workers: Vec::new(),
            inspected: None,
            inspected_stale: false,
            job_logs: Vec::new(),
            logs_loading: false,
            log_error: None,
            log_token: 0,
            pending_auto_inspect: false,
            status: None,
            status_ttl: config.settings.status_ttl,
            pending_actions: 0,
            errors: DomainErrors::default(),
            last_seq: [0; 3],
            connection: ConnectionStatus::Connecting,
            target: target.into(),
            page_size: config.polling.job_page_size,
            throbber_state: ThrobberState::default(),
        }
    }

    pub(crate) fn throbber_state_mut(&mut self) -> &mut ThrobberState {
        &mut self.throbber_state
    }

    /// Send a command to the background worker without blocking
    ///
    /// Returns `false` if the command could not be queued.
    pub(crate) fn send(&self, cmd: BgCommand) -> bool {
        let Some(tx) = &self.bg_cmd_tx else {
            return false;
        };
        match tx.try_send(cmd) {
            Ok(()) => true,
            Err(TrySendError::Full(cmd)) => {
                warn!(?cmd, "Background command queue full, dropping command");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    fn publish_job_query(&self, query: Option<JobQuery>) {
        if let Some(targets) = &self.targets {
            targets.jobs.send_replace(query);
        }
    }

    fn publish_log_request(&self, request: Option<LogRequest>) {
        if let Some(targets) = &self.targets {
            targets.logs.send_replace(request);
        }
    }

    // ------------------------------------------------------------------
    // Status line
    // ------------------------------------------------------------------

    pub(crate) fn set_status(&mut self, text: impl Into<String>, level: StatusLevel) {
        self.status = Some(StatusMessage {
            text: text.into(),
            level,
            expires_at: Instant::now() + self.status_ttl,
        });
        self.dirty = true;
    }

    pub(crate) fn clear_status(&mut self) {
        if self.status.take().is_some() {
            self.dirty = true;
        }
    }

    /// Drop the status message once its time is up
    pub(crate) fn expire_status(&mut self, now: Instant) {
        if self.status.as_ref().is_some_and(|s| now >= s.expires_at) {
            self.clear_status();
        }
    }

    pub(crate) fn quit(&mut self) {
        self.should_quit = true;
        self.dirty = true;
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    pub(crate) fn selected_queue(&self) -> Option<&QueueSnapshot> {
        self.queues.get(self.selected_queue)
    }

    pub(crate) fn selected_queue_name(&self) -> Option<&str> {
        self.selected_queue().map(|q| q.name.as_str())
    }

    pub(crate) fn selected_job(&self) -> Option<&JobSnapshot> {
        self.jobs.get(self.selected_job)
    }

    /// Move the queue cursor and react if a different queue ends up selected
    pub(crate) fn select_queue(&mut self, index: usize) {
        let before = self.selected_queue_name().map(str::to_string);
        self.selected_queue = index;
        self.clamp_queue_selection();
        if self.selected_queue_name() != before.as_deref() {
            self.on_queue_changed();
        }
        self.dirty = true;
    }

    fn clamp_queue_selection(&mut self) {
        self.selected_queue = self.selected_queue.min(self.queues.len().saturating_sub(1));
    }

    fn clamp_job_selection(&mut self) {
        self.selected_job = self.selected_job.min(self.jobs.len().saturating_sub(1));
    }

    /// A different queue (or none) is now selected
    fn on_queue_changed(&mut self) {
        debug!(queue = ?self.selected_queue_name(), "Selected queue changed");
        self.selected_job = 0;
        self.clear_inspection();
        self.sync_job_query();
    }

    /// Cycle the job state filter
    pub(crate) fn set_filter(&mut self, filter: StateFilter) {
        if filter == self.job_filter {
            return;
        }
        self.job_filter = filter;
        self.selected_job = 0;
        self.sync_job_query();
        self.dirty = true;
    }

    fn desired_job_query(&self) -> Option<JobQuery> {
        self.selected_queue_name()
            .map(|queue| JobQuery::first_page(queue, self.job_filter, self.page_size))
    }

    /// Retarget the job poll if selection or filter changed its query
    fn sync_job_query(&mut self) {
        let desired = self.desired_job_query();
        if desired == self.job_query {
            return;
        }
        // Jobs of the previous query must not be shown under the new one
        self.jobs.clear();
        self.selected_job = 0;
        self.errors.jobs = None;
        self.job_query.clone_from(&desired);
        self.publish_job_query(desired);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Show the job under the cursor in the detail panel
    pub(crate) fn inspect_selected(&mut self) {
        let Some(job) = self.selected_job().cloned() else {
            return;
        };
        let Some(queue) = self.selected_queue_name().map(str::to_string) else {
            return;
        };
        let same = self.inspected.as_ref().is_some_and(|j| j.id == job.id);
        let job_id = job.id.clone();
        self.inspected = Some(job);
        self.inspected_stale = false;
        self.dirty = true;
        if same {
            return;
        }
        self.log_token += 1;
        self.job_logs.clear();
        self.log_error = None;
        self.logs_loading = true;
        self.publish_log_request(Some(LogRequest {
            token: self.log_token,
            queue,
            job_id,
        }));
    }

    pub(crate) fn clear_inspection(&mut self) {
        let had_inspection = self.inspected.is_some() || self.logs_loading;
        self.inspected = None;
        self.inspected_stale = false;
        self.job_logs.clear();
        self.log_error = None;
        self.logs_loading = false;
        if had_inspection {
            self.log_token += 1;
            self.publish_log_request(None);
        }
        self.dirty = true;
    }

    /// Inspect now if jobs are known, otherwise once they arrive
    pub(crate) fn arm_auto_inspect(&mut self) {
        if self.jobs.is_empty() {
            self.pending_auto_inspect = true;
        } else {
            self.pending_auto_inspect = false;
            self.inspect_selected();
        }
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Queue a mutation; reports a busy status if the worker is saturated
    pub(crate) fn dispatch(&mut self, mutation: Mutation) -> bool {
        debug!(?mutation, "Dispatching mutation");
        if self.send(BgCommand::Mutate(mutation)) {
            self.pending_actions += 1;
            self.dirty = true;
            true
        } else {
            self.set_status("Busy, try again", StatusLevel::Error);
            false
        }
    }

    /// Out-of-cycle poll of every domain
    pub(crate) fn refresh_all(&mut self) {
        for domain in PollDomain::ALL {
            self.send(BgCommand::Refresh(domain));
        }
        self.set_status("Refreshed", StatusLevel::Info);
    }

    // ------------------------------------------------------------------
    // Background results
    // ------------------------------------------------------------------

    /// Single entry point for everything background tasks report
    pub(crate) fn apply_update(&mut self, update: AppUpdate) {
        match update {
            AppUpdate::Poll(poll) => self.apply_poll(poll),
            AppUpdate::JobLogs { token, result } => {
                if token != self.log_token {
                    debug!(token, current = self.log_token, "Dropping superseded logs");
                    return;
                }
                self.logs_loading = false;
                match result {
                    Ok(lines) => {
                        self.job_logs = lines;
                        self.log_error = None;
                    }
                    Err(e) => {
                        self.job_logs.clear();
                        self.log_error = Some(e);
                    }
                }
            }
            AppUpdate::ActionResult(outcome) => self.apply_outcome(outcome),
        }
        self.dirty = true;
    }

    fn apply_poll(&mut self, poll: PollUpdate) {
        let domain = poll.domain();
        let seq = poll.seq();
        let slot = seq_slot(domain);
        if seq <= self.last_seq[slot] {
            debug!(domain = domain.as_str(), seq, "Dropping out-of-order poll result");
            return;
        }

        match poll {
            PollUpdate::Queues { result, .. } => {
                self.last_seq[slot] = seq;
                match result {
                    Ok(queues) => {
                        self.errors.queues = None;
                        self.apply_queues(queues);
                    }
                    Err(e) => *self.errors.slot(domain) = Some(e.to_string()),
                }
            }
            PollUpdate::Jobs { query, result, .. } => {
                if self.job_query.as_ref() != Some(&query) {
                    debug!(
                        queue = %query.queue,
                        filter = %query.filter,
                        "Dropping job poll for old query"
                    );
                    return;
                }
                self.last_seq[slot] = seq;
                match result {
                    Ok(jobs) => {
                        self.errors.jobs = None;
                        self.apply_jobs(jobs);
                    }
                    Err(e) => *self.errors.slot(domain) = Some(e.to_string()),
                }
            }
            PollUpdate::Workers { result, .. } => {
                self.last_seq[slot] = seq;
                match result {
                    Ok(workers) => {
                        self.errors.workers = None;
                        self.workers = workers;
                    }
                    Err(e) => *self.errors.slot(domain) = Some(e.to_string()),
                }
            }
        }
        self.update_connection();
    }

    fn apply_queues(&mut self, queues: Vec<QueueSnapshot>) {
        let before = self.selected_queue_name().map(str::to_string);
        self.queues = queues;
        self.clamp_queue_selection();
        if self.selected_queue_name() != before.as_deref() {
            self.on_queue_changed();
        } else {
            self.sync_job_query();
        }
    }

    fn apply_jobs(&mut self, jobs: Vec<JobSnapshot>) {
        self.jobs = jobs;
        self.clamp_job_selection();

        if let Some(inspected_id) = self.inspected.as_ref().map(|j| j.id.clone()) {
            match self.jobs.iter().find(|j| j.id == inspected_id) {
                Some(fresh) => {
                    self.inspected = Some(fresh.clone());
                    self.inspected_stale = false;
                }
                None => self.inspected_stale = true,
            }
        }

        if self.pending_auto_inspect && self.panel == Panel::Jobs && !self.jobs.is_empty() {
            self.pending_auto_inspect = false;
            self.inspect_selected();
        }
    }

    fn apply_outcome(&mut self, outcome: ActionOutcome) {
        self.pending_actions = self.pending_actions.saturating_sub(1);

        // The form that issued this mutation stays open until its outcome arrives
        let form_state = match &mut self.modal {
            Modal::QueueForm(form) if outcome.kind == MutationKind::CreateQueue => {
                Some((&mut form.submitting, &mut form.error))
            }
            Modal::JobForm(form) if outcome.kind == MutationKind::AddJob => {
                Some((&mut form.submitting, &mut form.error))
            }
            _ => None,
        };
        let mut close_form = false;
        if let Some((submitting, error)) = form_state
            && *submitting
        {
            *submitting = false;
            if outcome.ok() {
                close_form = true;
            } else {
                *error = Some(outcome.message.clone());
            }
        }
        if close_form {
            self.modal = Modal::None;
        }
        if outcome.ok() && outcome.kind == MutationKind::DeleteQueue {
            self.select_queue(0);
        }

        for domain in &outcome.refresh {
            self.send(BgCommand::Refresh(*domain));
        }
        self.set_status(outcome.message, outcome.level);
    }

    fn update_connection(&mut self) {
        self.connection = if self.errors.any() {
            ConnectionStatus::Degraded
        } else if self.last_seq.iter().any(|s| *s > 0) {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Connecting
        };
    }

    pub(crate) fn total_jobs(&self) -> u64 {
        self.queues.iter().map(|q| q.counts.total()).sum()
    }

    pub(crate) fn view(&self) -> DashboardView<'_> {
        DashboardView {
            queues: &self.queues,
            selected_queue: self.selected_queue,
            jobs: &self.jobs,
            selected_job: self.selected_job,
            job_filter: self.job_filter,
            inspected_job: self.inspected.as_ref(),
            inspected_stale: self.inspected_stale,
            job_logs: &self.job_logs,
            logs_loading: self.logs_loading,
            log_error: self.log_error.as_deref(),
            workers: &self.workers,
            panel: self.panel,
            modal: &self.modal,
            status: self.status.as_ref(),
            connection: self.connection,
            target: &self.target,
            errors: &self.errors,
            pending_actions: self.pending_actions,
        }
    }
}
