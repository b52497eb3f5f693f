//! TUI subsystem integration tests
//!
//! This directory exists for TUI integration tests that need access to `pub(crate)` internals.
//!
//! ## Why not top-level `tests/` directory?
//!
//! Tests in `tests/` are compiled as separate crates and can ONLY access public (`pub`) items.
//! The dashboard keeps its state machine and background messaging `pub(crate)`:
//!
//! - `App` and its `apply_update()` entry point
//! - `BgCommand`, `AppUpdate`, `Targets` - Internal async message types
//! - `run_worker()`, `DetailLoader` - Background tasks driven by those messages
//!
//! ## When to use this directory vs `tests/`:
//!
//! **Use `src/tui/tests/` when:**
//! - Testing navigation and selection against simulated poll results
//! - Testing internal async message passing with the in-memory gateway
//!
//! **Use top-level `tests/` when:**
//! - Testing public API behavior (CLI commands, config loading, Redis gateways)
//! - Writing smoke tests or end-to-end tests
//!
//! See: <https://doc.rust-lang.org/book/ch11-03-test-organization.html#integration-tests>

mod navigation_tests;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tokio::sync::mpsc::{Receiver, channel};

use crate::config::Config;
use crate::gateway::GatewayError;
use crate::model::{JobSnapshot, QueueSnapshot, StateCounts, StateFilter};
use crate::poller::{JobQuery, PollUpdate};
use crate::tui::app::{App, AppUpdate, BgCommand, LogRequest, TargetWatch, target_channels};

/// Worker side of every channel the app writes to
pub(super) struct Outbox {
    pub cmds: Receiver<BgCommand>,
    pub targets: TargetWatch,
}

impl Outbox {
    /// Commands queued since the last call
    pub(super) fn sent(&mut self) -> Vec<BgCommand> {
        let mut out = Vec::new();
        while let Ok(cmd) = self.cmds.try_recv() {
            out.push(cmd);
        }
        out
    }

    /// Job query published since the last call, if any
    pub(super) fn job_target(&mut self) -> Option<Option<JobQuery>> {
        let rx = &mut self.targets.jobs;
        rx.has_changed()
            .unwrap_or(false)
            .then(|| rx.borrow_and_update().clone())
    }

    /// Log request published since the last call, if any
    pub(super) fn log_target(&mut self) -> Option<Option<LogRequest>> {
        let rx = &mut self.targets.logs;
        rx.has_changed()
            .unwrap_or(false)
            .then(|| rx.borrow_and_update().clone())
    }

    /// Forget everything published so far
    pub(super) fn drain(&mut self) {
        self.sent();
        self.job_target();
        self.log_target();
    }

    /// Nothing was queued or published since the last call
    pub(super) fn is_quiet(&mut self) -> bool {
        let cmds = self.sent();
        let jobs = self.job_target();
        let logs = self.log_target();
        cmds.is_empty() && jobs.is_none() && logs.is_none()
    }
}

/// App wired to channels the test can inspect
pub(super) fn app_with_commands() -> (App, Outbox) {
    app_with_command_queue(64)
}

pub(super) fn app_with_command_queue(capacity: usize) -> (App, Outbox) {
    let mut app = App::new(&Config::default(), "localhost:6379/0");
    let (tx, cmds) = channel(capacity);
    let (targets, watch) = target_channels();
    app.bg_cmd_tx = Some(tx);
    app.targets = Some(targets);
    (
        app,
        Outbox {
            cmds,
            targets: watch,
        },
    )
}

pub(super) fn queue(name: &str) -> QueueSnapshot {
    QueueSnapshot {
        name: name.to_string(),
        counts: StateCounts::default(),
        paused: false,
    }
}

pub(super) fn queues_poll(seq: u64, names: &[&str]) -> AppUpdate {
    AppUpdate::Poll(PollUpdate::Queues {
        seq,
        result: Ok(names.iter().map(|n| queue(n)).collect()),
    })
}

pub(super) fn failed_queues_poll(seq: u64) -> AppUpdate {
    AppUpdate::Poll(PollUpdate::Queues {
        seq,
        result: Err(GatewayError::Timeout),
    })
}

pub(super) fn jobs_poll(seq: u64, query: JobQuery, jobs: Vec<JobSnapshot>) -> AppUpdate {
    AppUpdate::Poll(PollUpdate::Jobs {
        seq,
        query,
        result: Ok(jobs),
    })
}

/// Query the app would issue for `queue` under `filter`
pub(super) fn query_for(app: &App, queue: &str, filter: StateFilter) -> JobQuery {
    JobQuery::first_page(queue, filter, app.page_size)
}

pub(super) fn press(app: &mut App, code: KeyCode) {
    crate::tui::input::handle_key(app, KeyEvent::new(code, KeyModifiers::NONE));
}

pub(super) fn type_text(app: &mut App, text: &str) {
    for c in text.chars() {
        press(app, KeyCode::Char(c));
    }
}
