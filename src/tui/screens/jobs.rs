//! Job list with state filter tabs, and the job detail panel

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs, Wrap},
};

use crate::model::{JobSnapshot, Progress, StateFilter, format_timestamp};
use crate::style::{colors, state_color};
use crate::tui::app::{DashboardView, Panel};
use crate::tui::widgets::{focus_border_style, truncate};

/// Stack frames shown under a failure reason
const STACK_FRAMES_SHOWN: usize = 3;
/// Log lines shown before collapsing into "+N more"
const LOG_LINES_SHOWN: usize = 5;
/// Lines of pretty-printed payload shown
const DATA_LINES_SHOWN: usize = 8;

fn progress_span(progress: &Progress) -> Span<'static> {
    match progress {
        Progress::Number(_) => {
            let pct = progress.percent().unwrap_or(0.0);
            let filled = ((pct / 10.0).round() as usize).min(10);
            Span::styled(
                format!("{}{} {pct:>3.0}%", "█".repeat(filled), "░".repeat(10 - filled)),
                Style::default().fg(colors::UI_STAT),
            )
        }
        Progress::Flag(true) => Span::styled("done", Style::default().fg(colors::UI_SUCCESS)),
        Progress::Flag(false) => Span::styled("pending", Style::default().fg(colors::UI_SECONDARY)),
        Progress::Text(_) | Progress::Structured(_) => Span::styled(
            truncate(&progress.label(), 40),
            Style::default().fg(colors::UI_TEXT),
        ),
    }
}

fn job_item(job: &JobSnapshot, selected: bool) -> ListItem<'static> {
    let name_style = if selected {
        Style::default()
            .fg(colors::UI_SELECTED)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(colors::UI_TEXT)
    };
    ListItem::new(Line::from(vec![
        Span::styled(
            format!("#{:<6} ", job.id),
            Style::default().fg(colors::UI_SECONDARY),
        ),
        Span::styled(
            format!("{:<10}", job.state.as_str()),
            Style::default().fg(state_color(job.state)),
        ),
        Span::styled(truncate(&job.name, 30), name_style),
        Span::styled(
            format!("  {}", format_timestamp(job.created_at)),
            Style::default().fg(colors::UI_SECONDARY),
        ),
    ]))
}

fn filter_tabs(current: StateFilter) -> Tabs<'static> {
    let titles: Vec<Line> = StateFilter::CYCLE
        .iter()
        .map(|f| Line::from(f.label()))
        .collect();
    let selected = StateFilter::CYCLE
        .iter()
        .position(|f| *f == current)
        .unwrap_or(0);
    Tabs::new(titles)
        .select(selected)
        .style(Style::default().fg(colors::UI_SECONDARY))
        .highlight_style(
            Style::default()
                .fg(colors::UI_HIGHLIGHT)
                .add_modifier(Modifier::BOLD),
        )
}

/// Render the job list for the selected queue
pub(crate) fn render_jobs(frame: &mut Frame, area: Rect, view: &DashboardView<'_>) {
    let focused = view.panel == Panel::Jobs && !view.modal.is_open();
    let queue = view
        .queues
        .get(view.selected_queue)
        .map_or("none", |q| q.name.as_str());
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(focus_border_style(focused))
        .title(format!(" Jobs: {queue} ({}) ", view.jobs.len()));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(inner);
    frame.render_widget(filter_tabs(view.job_filter), chunks[0]);

    if view.jobs.is_empty() {
        let text = match &view.errors.jobs {
            Some(err) => Span::styled(
                format!("Failed to load jobs: {err}"),
                Style::default().fg(colors::UI_ERROR),
            ),
            None if view.queues.is_empty() => Span::styled(
                "No queue selected",
                Style::default().fg(colors::UI_SECONDARY),
            ),
            None => Span::styled(
                format!("No {} jobs", view.job_filter.label()),
                Style::default().fg(colors::UI_SECONDARY),
            ),
        };
        frame.render_widget(
            Paragraph::new(Line::from(text)).wrap(Wrap { trim: true }),
            chunks[1],
        );
        return;
    }

    let items: Vec<ListItem> = view
        .jobs
        .iter()
        .enumerate()
        .map(|(i, j)| job_item(j, focused && i == view.selected_job))
        .collect();
    let list = List::new(items)
        .highlight_style(Style::default().bg(colors::UI_SELECTED_BG))
        .highlight_symbol("> ");
    let mut state = ListState::default().with_selected(Some(view.selected_job));
    frame.render_stateful_widget(list, chunks[1], &mut state);
}

fn label(text: &'static str) -> Span<'static> {
    Span::styled(text, Style::default().fg(colors::UI_SECONDARY))
}

fn optional_timestamp(ms: Option<i64>) -> String {
    ms.map_or_else(|| "n/a".to_string(), format_timestamp)
}

fn pretty_json_lines(value: &serde_json::Value, max_lines: usize) -> Vec<Line<'static>> {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    let total = pretty.lines().count();
    let mut lines: Vec<Line> = pretty
        .lines()
        .take(max_lines)
        .map(|l| Line::from(format!("  {l}")))
        .collect();
    if total > max_lines {
        lines.push(Line::from(Span::styled(
            format!("  ... {} more lines", total - max_lines),
            Style::default().fg(colors::UI_SECONDARY),
        )));
    }
    lines
}

fn detail_lines(view: &DashboardView<'_>, job: &JobSnapshot) -> Vec<Line<'static>> {
    let mut header = vec![
        Span::styled(
            format!("#{} ", job.id),
            Style::default()
                .fg(colors::UI_TEXT)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(job.name.clone(), Style::default().fg(colors::UI_TEXT)),
        Span::raw("  "),
        Span::styled(
            job.state.as_str().to_uppercase(),
            Style::default()
                .fg(state_color(job.state))
                .add_modifier(Modifier::BOLD),
        ),
    ];
    if view.inspected_stale {
        header.push(Span::styled(
            "  [stale]",
            Style::default().fg(colors::UI_WARNING),
        ));
    }

    let mut lines = vec![
        Line::from(header),
        Line::from(vec![
            label("Attempts: "),
            Span::raw(format!("{}/{}", job.attempts_made, job.attempts_allowed)),
            label("   Progress: "),
            progress_span(&job.progress),
        ]),
        Line::from(vec![
            label("Created: "),
            Span::raw(format_timestamp(job.created_at)),
            label("  Processed: "),
            Span::raw(optional_timestamp(job.processed_at)),
            label("  Finished: "),
            Span::raw(optional_timestamp(job.finished_at)),
        ]),
        Line::from(label("Data:")),
    ];
    lines.extend(pretty_json_lines(&job.data, DATA_LINES_SHOWN));

    if let Some(reason) = &job.failure_reason {
        lines.push(Line::from(vec![
            Span::styled("Error: ", Style::default().fg(colors::UI_ERROR)),
            Span::styled(reason.clone(), Style::default().fg(colors::UI_ERROR)),
        ]));
        for frame in job.stack_frames.iter().take(STACK_FRAMES_SHOWN) {
            lines.push(Line::from(Span::styled(
                format!("  {}", frame.lines().next().unwrap_or_default().trim()),
                Style::default().fg(colors::UI_SECONDARY),
            )));
        }
    }

    if let Some(value) = &job.return_value {
        lines.push(Line::from(label("Result:")));
        lines.extend(pretty_json_lines(value, DATA_LINES_SHOWN));
    }

    lines.push(Line::from(label("Logs:")));
    if view.logs_loading {
        lines.push(Line::from(label("  loading...")));
    } else if let Some(err) = view.log_error {
        lines.push(Line::from(Span::styled(
            format!("  {err}"),
            Style::default().fg(colors::UI_ERROR),
        )));
    } else if view.job_logs.is_empty() {
        lines.push(Line::from(label("  (none)")));
    } else {
        for log in view.job_logs.iter().take(LOG_LINES_SHOWN) {
            lines.push(Line::from(format!("  {log}")));
        }
        let hidden = view.job_logs.len().saturating_sub(LOG_LINES_SHOWN);
        if hidden > 0 {
            lines.push(Line::from(Span::styled(
                format!("  +{hidden} more"),
                Style::default().fg(colors::UI_SECONDARY),
            )));
        }
    }
    lines
}

/// Render the inspected job
pub(crate) fn render_detail(frame: &mut Frame, area: Rect, view: &DashboardView<'_>) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(focus_border_style(false))
        .title(" Detail ");

    let Some(job) = view.inspected_job else {
        let hint = Paragraph::new(Line::from(label("Select a job to inspect"))).block(block);
        frame.render_widget(hint, area);
        return;
    };

    let paragraph = Paragraph::new(detail_lines(view, job))
        .block(block)
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}
