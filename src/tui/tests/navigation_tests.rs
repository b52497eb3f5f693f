use crossterm::event::KeyCode;
use pretty_assertions::assert_eq;

use super::{
    app_with_command_queue, app_with_commands, failed_queues_poll, jobs_poll, press, query_for,
    queues_poll, type_text,
};
use crate::connection::ConnectionStatus;
use crate::gateway::fake::job;
use crate::model::{JobState, StateFilter};
use crate::poller::PollDomain;
use crate::tui::app::{AppUpdate, BgCommand, LogRequest, Modal, Panel};
use crate::tui::dispatcher::{ActionOutcome, Mutation, MutationKind, StatusLevel};

fn mutations(cmds: &[BgCommand]) -> Vec<Mutation> {
    cmds.iter()
        .filter_map(|c| match c {
            BgCommand::Mutate(m) => Some(m.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn first_queue_poll_selects_first_queue_and_targets_its_jobs() {
    let (mut app, mut out) = app_with_commands();
    app.apply_update(queues_poll(1, &["emails", "orders"]));

    assert_eq!(app.selected_queue_name(), Some("emails"));
    let expected = query_for(&app, "emails", StateFilter::All);
    assert_eq!(out.job_target(), Some(Some(expected)));
    assert_eq!(app.connection, ConnectionStatus::Connected);
}

#[test]
fn moving_down_switches_queue_and_resets_jobs() {
    let (mut app, mut out) = app_with_commands();
    app.apply_update(queues_poll(1, &["emails", "orders"]));
    let emails = query_for(&app, "emails", StateFilter::All);
    app.apply_update(jobs_poll(1, emails, vec![job("1", JobState::Waiting, 10)]));
    assert_eq!(app.jobs.len(), 1);
    out.drain();

    press(&mut app, KeyCode::Down);

    assert_eq!(app.selected_queue_name(), Some("orders"));
    assert!(app.jobs.is_empty());
    assert_eq!(app.selected_job, 0);
    let orders = query_for(&app, "orders", StateFilter::All);
    assert_eq!(out.job_target(), Some(Some(orders)));
}

#[test]
fn shrinking_queue_list_clamps_selection() {
    let (mut app, mut out) = app_with_commands();
    app.apply_update(queues_poll(1, &["a", "b", "c"]));
    app.select_queue(2);
    assert_eq!(app.selected_queue_name(), Some("c"));
    out.drain();

    app.apply_update(queues_poll(2, &["a", "b"]));

    assert_eq!(app.selected_queue, 1);
    assert_eq!(app.selected_queue_name(), Some("b"));
    let b = query_for(&app, "b", StateFilter::All);
    assert_eq!(out.job_target(), Some(Some(b)));
}

#[test]
fn queue_list_emptying_stops_job_polling() {
    let (mut app, mut out) = app_with_commands();
    app.apply_update(queues_poll(1, &["a"]));
    out.drain();

    app.apply_update(queues_poll(2, &[]));

    assert_eq!(app.selected_queue_name(), None);
    assert_eq!(out.job_target(), Some(None));
}

#[test]
fn empty_store_navigation_is_inert() {
    let (mut app, mut out) = app_with_commands();
    app.apply_update(queues_poll(1, &[]));
    out.drain();

    for code in [
        KeyCode::Up,
        KeyCode::Down,
        KeyCode::Enter,
        KeyCode::Char('p'),
        KeyCode::Char('d'),
        KeyCode::Char('c'),
        KeyCode::Char('x'),
    ] {
        press(&mut app, code);
    }
    assert!(out.is_quiet());
    assert_eq!(app.panel, Panel::Queues);

    press(&mut app, KeyCode::Tab);
    for code in [KeyCode::Up, KeyCode::Down, KeyCode::Enter, KeyCode::Char('r')] {
        press(&mut app, code);
    }
    assert!(out.is_quiet());
    assert!(app.inspected.is_none());
}

#[test]
fn add_opens_queue_form_without_queues() {
    let (mut app, _out) = app_with_commands();
    press(&mut app, KeyCode::Char('a'));
    assert!(matches!(app.modal, Modal::QueueForm(_)));
}

#[test]
fn filter_cycles_and_retargets() {
    let (mut app, mut out) = app_with_commands();
    app.apply_update(queues_poll(1, &["emails"]));
    out.drain();

    press(&mut app, KeyCode::Right);
    assert_eq!(app.job_filter, StateFilter::Only(JobState::Waiting));
    let waiting = query_for(&app, "emails", StateFilter::Only(JobState::Waiting));
    assert_eq!(out.job_target(), Some(Some(waiting)));

    press(&mut app, KeyCode::Left);
    press(&mut app, KeyCode::Left);
    assert_eq!(app.job_filter, StateFilter::Only(JobState::Delayed));
    let delayed = query_for(&app, "emails", StateFilter::Only(JobState::Delayed));
    assert_eq!(out.job_target(), Some(Some(delayed)));
}

#[test]
fn filter_change_resets_job_cursor() {
    let (mut app, _out) = app_with_commands();
    app.apply_update(queues_poll(1, &["emails"]));
    let q = query_for(&app, "emails", StateFilter::All);
    app.apply_update(jobs_poll(
        1,
        q,
        vec![job("2", JobState::Failed, 20), job("1", JobState::Waiting, 10)],
    ));
    app.panel = Panel::Jobs;
    press(&mut app, KeyCode::Down);
    assert_eq!(app.selected_job, 1);

    press(&mut app, KeyCode::Char('l'));

    assert_eq!(app.selected_job, 0);
    assert!(app.jobs.is_empty());
}

#[test]
fn enter_on_queue_inspects_once_jobs_arrive() {
    let (mut app, mut out) = app_with_commands();
    app.apply_update(queues_poll(1, &["emails"]));
    press(&mut app, KeyCode::Enter);
    assert_eq!(app.panel, Panel::Jobs);
    assert!(app.pending_auto_inspect);
    out.drain();

    let q = query_for(&app, "emails", StateFilter::All);
    app.apply_update(jobs_poll(1, q, vec![job("7", JobState::Active, 70)]));

    assert_eq!(app.inspected.as_ref().map(|j| j.id.as_str()), Some("7"));
    assert!(!app.pending_auto_inspect);
    assert!(app.logs_loading);
    assert_eq!(
        out.log_target(),
        Some(Some(LogRequest {
            token: app.log_token,
            queue: "emails".into(),
            job_id: "7".into(),
        }))
    );
}

#[test]
fn escape_clears_inspection_then_returns_to_queues() {
    let (mut app, mut out) = app_with_commands();
    app.apply_update(queues_poll(1, &["emails"]));
    let q = query_for(&app, "emails", StateFilter::All);
    app.apply_update(jobs_poll(1, q, vec![job("1", JobState::Waiting, 1)]));
    press(&mut app, KeyCode::Enter);
    assert!(app.inspected.is_some());
    out.drain();

    press(&mut app, KeyCode::Esc);
    assert!(app.inspected.is_none());
    assert_eq!(app.panel, Panel::Jobs);
    assert_eq!(out.log_target(), Some(None));

    press(&mut app, KeyCode::Esc);
    assert_eq!(app.panel, Panel::Queues);
}

#[test]
fn invalid_queue_form_dispatches_nothing() {
    let (mut app, mut out) = app_with_commands();
    press(&mut app, KeyCode::Char('a'));
    press(&mut app, KeyCode::Enter);

    let Modal::QueueForm(form) = &app.modal else {
        panic!("queue form should stay open");
    };
    assert_eq!(form.error.as_deref(), Some("Queue name is required"));
    assert!(mutations(&out.sent()).is_empty());
    assert_eq!(app.pending_actions, 0);
}

#[test]
fn invalid_job_payload_dispatches_nothing() {
    let (mut app, mut out) = app_with_commands();
    app.apply_update(queues_poll(1, &["emails"]));
    app.panel = Panel::Jobs;
    press(&mut app, KeyCode::Char('a'));
    type_text(&mut app, "send");
    press(&mut app, KeyCode::Tab);
    press(&mut app, KeyCode::Backspace);
    type_text(&mut app, "oops");
    press(&mut app, KeyCode::Enter);

    let Modal::JobForm(form) = &app.modal else {
        panic!("job form should stay open");
    };
    assert!(form.error.as_deref().is_some_and(|e| e.starts_with("Invalid JSON")));
    assert!(mutations(&out.sent()).is_empty());
}

#[test]
fn queue_form_submits_and_closes_on_success() {
    let (mut app, mut out) = app_with_commands();
    press(&mut app, KeyCode::Char('a'));
    type_text(&mut app, "emails");
    press(&mut app, KeyCode::Enter);

    assert_eq!(
        mutations(&out.sent()),
        vec![Mutation::CreateQueue {
            name: "emails".into()
        }]
    );
    assert_eq!(app.pending_actions, 1);
    let Modal::QueueForm(form) = &app.modal else {
        panic!("form stays open while submitting");
    };
    assert!(form.submitting);

    app.apply_update(AppUpdate::ActionResult(ActionOutcome {
        kind: MutationKind::CreateQueue,
        level: StatusLevel::Success,
        message: "Queue 'emails' created".into(),
        refresh: vec![PollDomain::Queues],
    }));

    assert!(!app.modal.is_open());
    assert_eq!(app.pending_actions, 0);
    assert_eq!(
        app.status.as_ref().map(|s| s.text.as_str()),
        Some("Queue 'emails' created")
    );
    assert!(
        out.sent()
            .iter()
            .any(|c| matches!(c, BgCommand::Refresh(PollDomain::Queues)))
    );
}

#[test]
fn failed_create_keeps_form_open_with_error() {
    let (mut app, _out) = app_with_commands();
    press(&mut app, KeyCode::Char('a'));
    type_text(&mut app, "emails");
    press(&mut app, KeyCode::Enter);

    app.apply_update(AppUpdate::ActionResult(ActionOutcome {
        kind: MutationKind::CreateQueue,
        level: StatusLevel::Error,
        message: "Failed to create 'emails': request timed out".into(),
        refresh: Vec::new(),
    }));

    let Modal::QueueForm(form) = &app.modal else {
        panic!("form should stay open after failure");
    };
    assert!(!form.submitting);
    assert_eq!(
        form.error.as_deref(),
        Some("Failed to create 'emails': request timed out")
    );
}

#[test]
fn queue_actions_dispatch_for_selected_queue() {
    let (mut app, mut out) = app_with_commands();
    app.apply_update(queues_poll(1, &["emails"]));
    out.drain();

    press(&mut app, KeyCode::Char('p'));
    press(&mut app, KeyCode::Char('d'));

    assert_eq!(
        mutations(&out.sent()),
        vec![
            Mutation::PauseQueue {
                name: "emails".into()
            },
            Mutation::DrainQueue {
                name: "emails".into()
            },
        ]
    );
    assert_eq!(app.pending_actions, 2);
}

#[test]
fn full_command_queue_reports_busy() {
    let (mut app, _out) = app_with_commands();
    let (tx, _small_rx) = tokio::sync::mpsc::channel(1);
    app.apply_update(queues_poll(1, &["emails"]));
    app.bg_cmd_tx = Some(tx);

    press(&mut app, KeyCode::Char('p'));
    press(&mut app, KeyCode::Char('p'));

    assert_eq!(app.pending_actions, 1);
    assert_eq!(
        app.status.as_ref().map(|s| s.text.as_str()),
        Some("Busy, try again")
    );
}

#[test]
fn failed_poll_degrades_until_next_success() {
    let (mut app, _out) = app_with_commands();
    assert_eq!(app.connection, ConnectionStatus::Connecting);

    app.apply_update(failed_queues_poll(1));
    assert_eq!(app.connection, ConnectionStatus::Degraded);
    assert_eq!(app.errors.queues.as_deref(), Some("request timed out"));

    app.apply_update(queues_poll(2, &["emails"]));
    assert_eq!(app.connection, ConnectionStatus::Connected);
    assert!(app.errors.queues.is_none());
}

#[test]
fn ctrl_c_quits_from_a_modal() {
    let (mut app, _out) = app_with_commands();
    press(&mut app, KeyCode::Char('a'));
    crate::tui::input::handle_key(
        &mut app,
        crossterm::event::KeyEvent::new(
            KeyCode::Char('c'),
            crossterm::event::KeyModifiers::CONTROL,
        ),
    );
    assert!(app.should_quit);
}

#[test]
fn shrinking_job_list_clamps_job_cursor() {
    let (mut app, _out) = app_with_commands();
    app.apply_update(queues_poll(1, &["emails"]));
    let q = query_for(&app, "emails", StateFilter::All);
    let five = (1..=5)
        .rev()
        .map(|i| job(&i.to_string(), JobState::Waiting, i))
        .collect();
    app.apply_update(jobs_poll(1, q.clone(), five));
    app.panel = Panel::Jobs;
    for _ in 0..4 {
        press(&mut app, KeyCode::Down);
    }
    assert_eq!(app.selected_job, 4);

    app.apply_update(jobs_poll(
        2,
        q.clone(),
        vec![job("2", JobState::Waiting, 2), job("1", JobState::Waiting, 1)],
    ));
    assert_eq!(app.selected_job, 1);

    app.apply_update(jobs_poll(3, q, Vec::new()));
    assert_eq!(app.selected_job, 0);
    assert!(app.selected_job().is_none());
}

#[test]
fn retarget_reaches_worker_with_full_command_queue() {
    let (mut app, mut out) = app_with_command_queue(1);
    app.apply_update(queues_poll(1, &["a", "b"]));
    out.drain();
    assert!(app.send(BgCommand::Refresh(PollDomain::Queues)));
    assert!(!app.send(BgCommand::Refresh(PollDomain::Jobs)));

    press(&mut app, KeyCode::Down);

    let b = query_for(&app, "b", StateFilter::All);
    assert_eq!(app.job_query.as_ref(), Some(&b));
    assert_eq!(out.job_target(), Some(Some(b.clone())));
    app.apply_update(jobs_poll(1, b, vec![job("1", JobState::Waiting, 1)]));
    assert_eq!(app.jobs.len(), 1);
}

#[test]
fn log_request_reaches_worker_with_full_command_queue() {
    let (mut app, mut out) = app_with_command_queue(1);
    app.apply_update(queues_poll(1, &["emails"]));
    let q = query_for(&app, "emails", StateFilter::All);
    app.apply_update(jobs_poll(1, q, vec![job("3", JobState::Failed, 3)]));
    out.drain();
    assert!(app.send(BgCommand::Refresh(PollDomain::Queues)));

    app.panel = Panel::Jobs;
    press(&mut app, KeyCode::Enter);

    assert!(app.logs_loading);
    let request = out.log_target().flatten().expect("log request published");
    assert_eq!(request.job_id, "3");
    app.apply_update(AppUpdate::JobLogs {
        token: request.token,
        result: Ok(vec!["attempt 1".into()]),
    });
    assert!(!app.logs_loading);
    assert_eq!(app.job_logs, vec!["attempt 1".to_string()]);
}

#[test]
fn failed_delete_keeps_selection() {
    let (mut app, mut out) = app_with_commands();
    app.apply_update(queues_poll(1, &["a", "b", "c"]));
    app.select_queue(2);
    out.drain();

    press(&mut app, KeyCode::Char('x'));
    assert_eq!(
        mutations(&out.sent()),
        vec![Mutation::DeleteQueue { name: "c".into() }]
    );
    assert_eq!(app.selected_queue_name(), Some("c"));

    app.apply_update(AppUpdate::ActionResult(ActionOutcome {
        kind: MutationKind::DeleteQueue,
        level: StatusLevel::Error,
        message: "Failed to delete 'c': connection refused".into(),
        refresh: Vec::new(),
    }));

    assert_eq!(app.selected_queue_name(), Some("c"));
    assert_eq!(out.job_target(), None);
}

#[test]
fn successful_delete_selects_first_queue() {
    let (mut app, mut out) = app_with_commands();
    app.apply_update(queues_poll(1, &["a", "b", "c"]));
    app.select_queue(2);
    press(&mut app, KeyCode::Char('x'));
    out.drain();

    app.apply_update(AppUpdate::ActionResult(ActionOutcome {
        kind: MutationKind::DeleteQueue,
        level: StatusLevel::Success,
        message: "Deleted c".into(),
        refresh: vec![PollDomain::Queues, PollDomain::Jobs],
    }));

    assert_eq!(app.selected_queue_name(), Some("a"));
    let a = query_for(&app, "a", StateFilter::All);
    assert_eq!(out.job_target(), Some(Some(a)));
}
