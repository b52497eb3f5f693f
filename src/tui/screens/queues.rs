//! Queue list and worker panel

use ratatui::{
    Frame,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};

use crate::model::{JobState, QueueSnapshot, format_age};
use crate::style::{colors, state_color};
use crate::tui::app::{DashboardView, Panel};
use crate::tui::widgets::{focus_border_style, truncate};

/// Workers listed before collapsing into "+N more"
const MAX_WORKERS_SHOWN: usize = 6;
const WORKER_NAME_WIDTH: usize = 20;

fn count_span(state: JobState, count: u64) -> Span<'static> {
    let label = match state {
        JobState::Waiting => "w",
        JobState::Active => "a",
        JobState::Completed => "c",
        JobState::Failed => "f",
        JobState::Delayed => "d",
    };
    let style = if count == 0 {
        Style::default().fg(colors::UI_SECONDARY)
    } else {
        Style::default().fg(state_color(state))
    };
    Span::styled(format!("{label}:{count} "), style)
}

fn queue_item(queue: &QueueSnapshot, selected: bool) -> ListItem<'static> {
    let name_style = if selected {
        Style::default()
            .fg(colors::UI_SELECTED)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(colors::UI_TEXT)
    };

    let mut title = vec![Span::styled(queue.name.clone(), name_style)];
    if queue.paused {
        title.push(Span::styled(
            " [paused]",
            Style::default().fg(colors::UI_WARNING),
        ));
    }

    let counts: Vec<Span<'static>> = JobState::ALL
        .iter()
        .map(|s| count_span(*s, queue.counts.get(*s)))
        .collect();
    let mut detail = vec![Span::raw("  ")];
    detail.extend(counts);

    ListItem::new(vec![Line::from(title), Line::from(detail)])
}

/// Render the queue list
pub(crate) fn render_queues(frame: &mut Frame, area: Rect, view: &DashboardView<'_>) {
    let focused = view.panel == Panel::Queues && !view.modal.is_open();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(focus_border_style(focused))
        .title(format!(" Queues ({}) ", view.queues.len()));

    if view.queues.is_empty() {
        let text = match &view.errors.queues {
            Some(err) => Line::from(Span::styled(
                format!("Failed to load queues: {err}"),
                Style::default().fg(colors::UI_ERROR),
            )),
            None => Line::from(vec![
                Span::styled("No queues found. Press ", Style::default().fg(colors::UI_SECONDARY)),
                Span::styled("[a]", Style::default().fg(colors::UI_HIGHLIGHT)),
                Span::styled(" to create one.", Style::default().fg(colors::UI_SECONDARY)),
            ]),
        };
        frame.render_widget(
            Paragraph::new(text).block(block).wrap(Wrap { trim: true }),
            area,
        );
        return;
    }

    let items: Vec<ListItem> = view
        .queues
        .iter()
        .enumerate()
        .map(|(i, q)| queue_item(q, i == view.selected_queue))
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(colors::UI_SELECTED_BG))
        .highlight_symbol("> ");
    let mut state = ListState::default().with_selected(Some(view.selected_queue));
    frame.render_stateful_widget(list, area, &mut state);
}

/// Render connected workers
pub(crate) fn render_workers(frame: &mut Frame, area: Rect, view: &DashboardView<'_>) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(focus_border_style(false))
        .title(format!(" Workers ({}) ", view.workers.len()));

    let mut lines: Vec<Line> = Vec::new();
    if let Some(err) = &view.errors.workers {
        lines.push(Line::from(Span::styled(
            truncate(err, 60),
            Style::default().fg(colors::UI_ERROR),
        )));
    }
    if view.workers.is_empty() {
        lines.push(Line::from(Span::styled(
            "No workers connected",
            Style::default().fg(colors::UI_SECONDARY),
        )));
    }

    for worker in view.workers.iter().take(MAX_WORKERS_SHOWN) {
        let name = if worker.name.is_empty() {
            worker.id.as_str()
        } else {
            worker.name.as_str()
        };
        lines.push(Line::from(vec![
            Span::styled("● ", Style::default().fg(colors::UI_SUCCESS)),
            Span::styled(
                format!("{:<width$}", truncate(name, WORKER_NAME_WIDTH), width = WORKER_NAME_WIDTH),
                Style::default().fg(colors::UI_TEXT),
            ),
            Span::styled(
                format!(" {:>4}", format_age(worker.age_seconds)),
                Style::default().fg(colors::UI_SECONDARY),
            ),
        ]));
    }

    let hidden = view.workers.len().saturating_sub(MAX_WORKERS_SHOWN);
    if hidden > 0 {
        lines.push(Line::from(Span::styled(
            format!("+{hidden} more"),
            Style::default().fg(colors::UI_SECONDARY),
        )));
    }

    frame.render_widget(Paragraph::new(lines).block(block), area);
}
