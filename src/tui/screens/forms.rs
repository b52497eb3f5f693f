//! Modal forms for creating queues and adding jobs

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};

use crate::style::colors;
use crate::tui::forms::{JobField, JobForm, QueueForm};
use crate::tui::widgets::{centered_modal, modal_help_line, modal_size, render_input};

fn message_line(error: Option<&str>, submitting: bool) -> Line<'static> {
    match error {
        Some(err) => Line::from(Span::styled(
            err.to_string(),
            Style::default().fg(colors::UI_ERROR),
        )),
        None if submitting => Line::from(Span::styled(
            "Submitting...",
            Style::default().fg(colors::UI_WARNING),
        )),
        None => Line::from(""),
    }
}

/// Render the new-queue modal
pub(crate) fn render_queue_form(frame: &mut Frame, area: Rect, form: &QueueForm) {
    let popup = centered_modal(modal_size::SMALL, area);
    frame.render_widget(Clear, popup);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(colors::UI_HIGHLIGHT))
        .title(" New Queue ");
    let inner = block.inner(popup);
    frame.render_widget(block, popup);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(inner);

    render_input(frame, chunks[0], "Name", &form.name, true);
    frame.render_widget(
        Paragraph::new(message_line(form.error.as_deref(), form.submitting)),
        chunks[1],
    );
    frame.render_widget(
        Paragraph::new(modal_help_line(&[("Enter", "Create"), ("Esc", "Cancel")])),
        chunks[3],
    );
}

/// Render the add-job modal
pub(crate) fn render_job_form(frame: &mut Frame, area: Rect, form: &JobForm) {
    let popup = centered_modal(modal_size::MEDIUM, area);
    frame.render_widget(Clear, popup);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(colors::UI_HIGHLIGHT))
        .title(format!(" Add Job to {} ", form.queue));
    let inner = block.inner(popup);
    frame.render_widget(block, popup);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(inner);

    render_input(
        frame,
        chunks[0],
        "Job name",
        &form.name,
        form.focused == JobField::Name,
    );
    render_input(
        frame,
        chunks[1],
        "Payload (JSON object)",
        &form.payload,
        form.focused == JobField::Payload,
    );
    frame.render_widget(
        Paragraph::new(message_line(form.error.as_deref(), form.submitting)),
        chunks[2],
    );
    frame.render_widget(
        Paragraph::new(modal_help_line(&[
            ("Tab", "Next field"),
            ("Enter", "Add"),
            ("Esc", "Cancel"),
        ])),
        chunks[4],
    );
}
