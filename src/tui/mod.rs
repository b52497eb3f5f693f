//! Terminal User Interface (TUI) for bullview
//!
//! Interactive dashboard over the queues of one Redis instance: queue list
//! with counts, jobs of the selected queue filtered by state, the inspected
//! job with its logs, and connected workers.

use crate::config::Config;
use crate::connection::{ConnectionStatus, RedisHandle};
use crate::gateway::Gateways;
use crate::style::colors;
use crate::tui::app::{AppUpdate, BgCommand, Modal, Panel, target_channels};
use color_eyre::eyre::{Result, WrapErr};
use crossterm::cursor::Show;
use crossterm::event::EventStream;
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use futures_util::StreamExt;
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};
use std::io;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::unbounded_channel;

mod app;
mod background;
mod detail_loader;
mod dispatcher;
mod forms;
mod input;
mod screens;
mod widgets;

#[cfg(test)]
mod tests;

use app::App;
use dispatcher::StatusLevel;
use input::handle_event;
use screens::{
    render_detail, render_job_form, render_jobs, render_queue_form, render_queues, render_workers,
};

/// Bounded size of the UI to worker command queue
const COMMAND_QUEUE: usize = 64;
/// Rows given to the workers panel under the queue list
const WORKERS_PANEL_HEIGHT: u16 = 9;

/// Run the dashboard until the user quits
///
/// # Errors
/// Returns an error if terminal setup or drawing fails.
pub async fn run(config: &Config, handle: &RedisHandle) -> Result<()> {
    // Restore the terminal before color-eyre prints a panic report
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(std::io::stdout(), LeaveAlternateScreen, Show);
        original_hook(info);
    }));

    enable_raw_mode().wrap_err("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).wrap_err("Failed to enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).wrap_err("Failed to create terminal")?;

    struct TerminalGuard;
    impl Drop for TerminalGuard {
        fn drop(&mut self) {
            let _ = disable_raw_mode();
            let _ = execute!(std::io::stdout(), LeaveAlternateScreen, Show);
        }
    }
    let _term_guard = TerminalGuard;

    let mut app = App::new(config, handle.config().target());

    let (update_tx, update_rx) = unbounded_channel::<AppUpdate>();
    let (cmd_tx, cmd_rx) = tokio::sync::mpsc::channel::<BgCommand>(COMMAND_QUEUE);
    app.bg_update_rx = Some(update_rx);
    app.bg_cmd_tx = Some(cmd_tx);
    let (targets, target_watch) = target_channels();
    app.targets = Some(targets);

    let worker = tokio::spawn(background::run_worker(
        Gateways::redis(handle),
        config.polling,
        cmd_rx,
        target_watch,
        update_tx,
    ));

    let result = run_app(&mut terminal, &mut app).await;

    disable_raw_mode().wrap_err("Failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .wrap_err("Failed to leave alternate screen")?;
    terminal.show_cursor().wrap_err("Failed to show cursor")?;

    // Dropping the sender is the worker's shutdown signal
    app.bg_cmd_tx = None;
    app.targets = None;
    app.bg_update_rx = None;
    if let Err(e) = worker.await {
        tracing::warn!("Background worker ended abnormally: {e}");
    }

    result
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut sig) => {
            sig.recv().await;
        }
        Err(e) => {
            tracing::warn!("Cannot listen for SIGTERM: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await;
}

/// Main application loop
async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> Result<()> {
    const TARGET_FPS: u64 = 60;
    const MIN_FRAME_TIME_MS: u64 = 1000 / TARGET_FPS;
    const ANIM_MS: u64 = 120;

    let mut last_frame = Instant::now();
    let mut last_anim = Instant::now();
    app.dirty = true;

    let mut tick = tokio::time::interval(Duration::from_millis(MIN_FRAME_TIME_MS));
    let mut events = EventStream::new();
    let terminate = terminate_signal();
    tokio::pin!(terminate);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let now = Instant::now();
                if app.pending_actions > 0
                    && now.duration_since(last_anim).as_millis() >= u128::from(ANIM_MS)
                {
                    app.throbber_state_mut().calc_next();
                    last_anim = now;
                    app.dirty = true;
                }
                app.expire_status(now);
            }
            Some(Ok(event)) = events.next() => {
                handle_event(app, &event);
            }
            maybe_update = async {
                if let Some(rx) = &mut app.bg_update_rx { rx.recv().await } else { None }
            } => {
                if let Some(update) = maybe_update {
                    app.apply_update(update);
                }
            }
            () = &mut terminate => {
                tracing::info!("SIGTERM received, leaving dashboard");
                app.quit();
            }
        }

        if app.dirty {
            let now = Instant::now();
            if now.duration_since(last_frame).as_millis() >= u128::from(MIN_FRAME_TIME_MS) {
                #[cfg(debug_assertions)]
                {
                    let start = Instant::now();
                    terminal.draw(|frame| render_ui(frame, app))?;
                    let run_ms = start.elapsed().as_millis();
                    if run_ms > u128::from(MIN_FRAME_TIME_MS) {
                        tracing::debug!(
                            run_ms,
                            queues = app.queues.len(),
                            jobs = app.jobs.len(),
                            "slow frame (exceeds 16ms target)"
                        );
                    }
                }
                #[cfg(not(debug_assertions))]
                {
                    terminal.draw(|frame| render_ui(frame, app))?;
                }

                app.dirty = false;
                last_frame = now;
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// Render the complete UI
fn render_ui(frame: &mut Frame, app: &mut App) {
    let size = frame.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(size);

    render_header(frame, chunks[0], app);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(chunks[1]);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(WORKERS_PANEL_HEIGHT)])
        .split(body[0]);
    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(body[1]);

    {
        let view = app.view();
        render_queues(frame, left[0], &view);
        render_workers(frame, left[1], &view);
        render_jobs(frame, right[0], &view);
        render_detail(frame, right[1], &view);
    }

    render_footer(frame, chunks[2], app);

    match &app.modal {
        Modal::None => {}
        Modal::QueueForm(form) => render_queue_form(frame, size, form),
        Modal::JobForm(form) => render_job_form(frame, size, form),
    }
}

const fn connection_color(status: ConnectionStatus) -> ratatui::style::Color {
    match status {
        ConnectionStatus::Connecting => colors::UI_WARNING,
        ConnectionStatus::Connected => colors::UI_SUCCESS,
        ConnectionStatus::Degraded => colors::UI_ERROR,
    }
}

/// Render the header with totals and connection state
fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let version = crate::version_string();
    let stat = |label: &'static str, value: String| {
        vec![
            Span::styled(label, Style::default().fg(colors::UI_SECONDARY)),
            Span::styled(
                value,
                Style::default()
                    .fg(colors::UI_STAT)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw("   "),
        ]
    };

    let mut spans = Vec::new();
    spans.extend(stat("Queues: ", app.queues.len().to_string()));
    spans.extend(stat("Jobs: ", app.total_jobs().to_string()));
    spans.extend(stat("Workers: ", app.workers.len().to_string()));

    let status_line = Line::from(vec![
        Span::styled("● ", Style::default().fg(connection_color(app.connection))),
        Span::styled(
            app.connection.label(),
            Style::default().fg(connection_color(app.connection)),
        ),
        Span::raw("  "),
        Span::styled(app.target.clone(), Style::default().fg(colors::UI_SECONDARY)),
        Span::raw(" "),
    ])
    .alignment(Alignment::Right);

    let block = Block::default()
        .borders(Borders::ALL)
        .title(Line::from(vec![Span::raw("bullview "), Span::raw(version)]))
        .title_top(status_line);
    frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn panel_hints(panel: Panel) -> Line<'static> {
    match panel {
        Panel::Queues => widgets::key_hints(&[
            ("[↑↓]", " Select  "),
            ("[Enter]", " Jobs  "),
            ("[a]", " New  "),
            ("[p]", " Pause/Resume  "),
            ("[d]", " Drain  "),
            ("[c]", " Clean  "),
            ("[x]", " Delete  "),
            ("[R]", " Refresh  "),
            ("[q]", " Quit"),
        ]),
        Panel::Jobs => widgets::key_hints(&[
            ("[↑↓]", " Inspect  "),
            ("[←→]", " Filter  "),
            ("[a]", " Add  "),
            ("[r]", " Retry  "),
            ("[x]", " Remove  "),
            ("[Esc]", " Back  "),
            ("[R]", " Refresh  "),
            ("[q]", " Quit"),
        ]),
    }
}

const fn status_color(level: StatusLevel) -> ratatui::style::Color {
    match level {
        StatusLevel::Info => colors::UI_TEXT,
        StatusLevel::Success => colors::UI_SUCCESS,
        StatusLevel::Error => colors::UI_ERROR,
    }
}

/// Render the footer: throbber while actions run, then status or key hints
fn render_footer(frame: &mut Frame, area: Rect, app: &mut App) {
    use throbber_widgets_tui::Throbber;

    let text_area = if app.pending_actions > 0 {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(3), Constraint::Min(0)])
            .split(area);
        let throb = Throbber::default().style(Style::default().fg(colors::UI_WARNING));
        frame.render_stateful_widget(throb, chunks[0], app.throbber_state_mut());
        chunks[1]
    } else {
        area
    };

    let line = match &app.status {
        Some(msg) => Line::from(vec![
            Span::styled("● ", Style::default().fg(status_color(msg.level))),
            Span::styled(msg.text.clone(), Style::default().fg(status_color(msg.level))),
        ]),
        None if app.pending_actions > 0 => Line::from("Working..."),
        None => panel_hints(app.panel),
    };
    frame.render_widget(Paragraph::new(line), text_area);
}
