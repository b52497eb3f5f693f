//! Input handling for keyboard events
//!
//! Raw keys are first mapped to a [`KeyAction`] by [`keymap`], which knows
//! nothing about application state beyond the focused panel and whether a
//! modal is open. [`handle_action`] then applies the action to the [`App`].

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use super::app::{App, Modal, Panel};
use super::dispatcher::Mutation;
use super::forms::{JobForm, QueueForm};
use crate::gateway::{AddJobOptions, CleanTarget};

/// Semantic actions the dashboard understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyAction {
    NextPanel,
    Confirm,
    Cancel,
    FilterNext,
    FilterPrev,
    Add,
    PauseToggle,
    Drain,
    Clean,
    Delete,
    Refresh,
    Quit,
    Up,
    Down,
    Retry,
    /// Text editing inside a modal
    Edit(KeyEvent),
}

/// Map a key press to an action
pub(crate) fn keymap(key: KeyEvent, modal_open: bool) -> Option<KeyAction> {
    // Ctrl+C quits from anywhere, modals included
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(KeyAction::Quit);
    }

    if modal_open {
        return Some(match key.code {
            KeyCode::Esc => KeyAction::Cancel,
            KeyCode::Enter => KeyAction::Confirm,
            KeyCode::Tab | KeyCode::BackTab => KeyAction::NextPanel,
            _ => KeyAction::Edit(key),
        });
    }

    if key.modifiers.contains(KeyModifiers::CONTROL) || key.modifiers.contains(KeyModifiers::ALT) {
        return None;
    }

    let action = match key.code {
        KeyCode::Char('q') => KeyAction::Quit,
        KeyCode::Tab | KeyCode::BackTab => KeyAction::NextPanel,
        KeyCode::Enter => KeyAction::Confirm,
        KeyCode::Esc => KeyAction::Cancel,
        KeyCode::Up | KeyCode::Char('k') => KeyAction::Up,
        KeyCode::Down | KeyCode::Char('j') => KeyAction::Down,
        KeyCode::Right | KeyCode::Char('l') => KeyAction::FilterNext,
        KeyCode::Left | KeyCode::Char('h') => KeyAction::FilterPrev,
        KeyCode::Char('a') => KeyAction::Add,
        KeyCode::Char('p') => KeyAction::PauseToggle,
        KeyCode::Char('d') => KeyAction::Drain,
        KeyCode::Char('c') => KeyAction::Clean,
        KeyCode::Char('x') | KeyCode::Delete => KeyAction::Delete,
        KeyCode::Char('r') => KeyAction::Retry,
        KeyCode::Char('R') | KeyCode::F(5) => KeyAction::Refresh,
        _ => return None,
    };
    Some(action)
}

/// Handle a terminal event
pub(crate) fn handle_event(app: &mut App, event: &Event) {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(app, *key),
        Event::Resize(_, _) => app.dirty = true,
        _ => {}
    }
}

/// Handle a key press
pub(crate) fn handle_key(app: &mut App, key: KeyEvent) {
    if let Some(action) = keymap(key, app.modal.is_open()) {
        handle_action(app, action);
    }
}

/// Apply an action to the application state
pub(crate) fn handle_action(app: &mut App, action: KeyAction) {
    if action == KeyAction::Quit {
        app.quit();
        return;
    }
    if app.modal.is_open() {
        handle_modal_action(app, action);
        return;
    }

    match action {
        KeyAction::NextPanel => switch_panel(app),
        KeyAction::Refresh => app.refresh_all(),
        KeyAction::FilterNext => app.set_filter(app.job_filter.next()),
        KeyAction::FilterPrev => app.set_filter(app.job_filter.prev()),
        _ => match app.panel {
            Panel::Queues => handle_queues_action(app, action),
            Panel::Jobs => handle_jobs_action(app, action),
        },
    }
}

fn switch_panel(app: &mut App) {
    app.panel = app.panel.other();
    if app.panel == Panel::Jobs {
        app.arm_auto_inspect();
    } else {
        app.pending_auto_inspect = false;
    }
    app.dirty = true;
}

fn handle_queues_action(app: &mut App, action: KeyAction) {
    if action == KeyAction::Add {
        app.modal = Modal::QueueForm(QueueForm::default());
        app.dirty = true;
        return;
    }
    if action == KeyAction::Cancel {
        app.clear_status();
        return;
    }

    let Some(queue) = app.selected_queue().cloned() else {
        return;
    };
    let name = queue.name;

    match action {
        KeyAction::Up => app.select_queue(app.selected_queue.saturating_sub(1)),
        KeyAction::Down => app.select_queue(app.selected_queue + 1),
        KeyAction::Confirm => {
            app.panel = Panel::Jobs;
            app.arm_auto_inspect();
            app.dirty = true;
        }
        KeyAction::PauseToggle => {
            let mutation = if queue.paused {
                Mutation::ResumeQueue { name }
            } else {
                Mutation::PauseQueue { name }
            };
            app.dispatch(mutation);
        }
        KeyAction::Drain => {
            app.dispatch(Mutation::DrainQueue { name });
        }
        KeyAction::Clean => {
            app.dispatch(Mutation::CleanQueue {
                name,
                target: CleanTarget::Completed,
                grace_ms: 0,
            });
        }
        KeyAction::Delete => {
            app.dispatch(Mutation::DeleteQueue { name });
        }
        _ => {}
    }
}

fn handle_jobs_action(app: &mut App, action: KeyAction) {
    match action {
        KeyAction::Up => {
            if !app.jobs.is_empty() {
                app.selected_job = app.selected_job.saturating_sub(1);
                app.inspect_selected();
            }
        }
        KeyAction::Down => {
            if app.selected_job + 1 < app.jobs.len() {
                app.selected_job += 1;
                app.inspect_selected();
            }
        }
        KeyAction::Confirm => app.inspect_selected(),
        KeyAction::Cancel => {
            if app.inspected.is_some() {
                app.clear_inspection();
            } else {
                app.panel = Panel::Queues;
                app.pending_auto_inspect = false;
                app.dirty = true;
            }
        }
        KeyAction::Add => {
            if let Some(queue) = app.selected_queue_name().map(str::to_string) {
                app.modal = Modal::JobForm(JobForm::new(queue));
                app.dirty = true;
            }
        }
        KeyAction::Retry | KeyAction::Delete => {
            let (Some(queue), Some(job)) = (app.selected_queue_name(), app.selected_job()) else {
                return;
            };
            let (queue, id) = (queue.to_string(), job.id.clone());
            let mutation = if action == KeyAction::Retry {
                Mutation::RetryJob { queue, id }
            } else {
                Mutation::RemoveJob { queue, id }
            };
            app.dispatch(mutation);
        }
        _ => {}
    }
}

fn handle_modal_action(app: &mut App, action: KeyAction) {
    match action {
        KeyAction::Cancel => {
            app.modal = Modal::None;
        }
        KeyAction::Confirm => submit_modal(app),
        KeyAction::NextPanel => {
            if let Modal::JobForm(form) = &mut app.modal {
                form.next_field();
            }
        }
        KeyAction::Edit(key) => match &mut app.modal {
            Modal::QueueForm(form) => form.handle_key(key),
            Modal::JobForm(form) => form.handle_key(key),
            Modal::None => {}
        },
        _ => {}
    }
    app.dirty = true;
}

fn submit_modal(app: &mut App) {
    let mutation = match &mut app.modal {
        Modal::QueueForm(form) if !form.submitting => match form.validate() {
            Ok(name) => Mutation::CreateQueue { name },
            Err(message) => {
                form.error = Some(message);
                return;
            }
        },
        Modal::JobForm(form) if !form.submitting => match form.validate() {
            Ok((name, payload)) => Mutation::AddJob {
                queue: form.queue.clone(),
                name,
                payload,
                opts: AddJobOptions::default(),
            },
            Err(message) => {
                form.error = Some(message);
                return;
            }
        },
        _ => return,
    };

    if !app.dispatch(mutation) {
        return;
    }
    match &mut app.modal {
        Modal::QueueForm(form) => {
            form.submitting = true;
            form.error = None;
        }
        Modal::JobForm(form) => {
            form.submitting = true;
            form.error = None;
        }
        Modal::None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[rstest]
    #[case(KeyCode::Tab, KeyAction::NextPanel)]
    #[case(KeyCode::Enter, KeyAction::Confirm)]
    #[case(KeyCode::Esc, KeyAction::Cancel)]
    #[case(KeyCode::Char('j'), KeyAction::Down)]
    #[case(KeyCode::Up, KeyAction::Up)]
    #[case(KeyCode::Char('l'), KeyAction::FilterNext)]
    #[case(KeyCode::Left, KeyAction::FilterPrev)]
    #[case(KeyCode::Char('p'), KeyAction::PauseToggle)]
    #[case(KeyCode::Char('x'), KeyAction::Delete)]
    #[case(KeyCode::Char('r'), KeyAction::Retry)]
    #[case(KeyCode::Char('R'), KeyAction::Refresh)]
    #[case(KeyCode::Char('q'), KeyAction::Quit)]
    fn keymap_outside_modal(#[case] code: KeyCode, #[case] expected: KeyAction) {
        assert_eq!(keymap(press(code), false), Some(expected));
    }

    #[test]
    fn modal_routes_letters_to_editing() {
        let key = press(KeyCode::Char('q'));
        assert_eq!(keymap(key, true), Some(KeyAction::Edit(key)));
        assert_eq!(keymap(press(KeyCode::Esc), true), Some(KeyAction::Cancel));
        assert_eq!(keymap(press(KeyCode::Tab), true), Some(KeyAction::NextPanel));
    }

    #[test]
    fn ctrl_c_quits_even_in_modal() {
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(keymap(key, true), Some(KeyAction::Quit));
        assert_eq!(keymap(key, false), Some(KeyAction::Quit));
    }

    #[test]
    fn unbound_keys_map_to_nothing() {
        assert_eq!(keymap(press(KeyCode::Char('z')), false), None);
        let ctrl_a = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::CONTROL);
        assert_eq!(keymap(ctrl_a, false), None);
    }
}
