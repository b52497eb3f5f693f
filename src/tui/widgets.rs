//! Shared TUI widget helpers

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};
use tui_input::Input;

use crate::style::colors;

/// Helper to create centered rect for modals
///
/// Creates a centered rectangle with the given percentage of screen width/height.
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

/// Standard modal sizes (width%, height%)
pub mod modal_size {
    /// Queue form (50%x30%)
    pub(crate) const SMALL: (u16, u16) = (50, 30);
    /// Job form (70%x45%)
    pub(crate) const MEDIUM: (u16, u16) = (70, 45);
}

/// Helper to create centered modal with standard size
pub(crate) fn centered_modal(size: (u16, u16), r: Rect) -> Rect {
    centered_rect(size.0, size.1, r)
}

/// Get focus-aware border style
///
/// Returns cyan border for focused elements, dark gray for unfocused.
pub(crate) const fn focus_border_style(focused: bool) -> Style {
    if focused {
        Style::new().fg(colors::UI_HIGHLIGHT)
    } else {
        Style::new().fg(Color::DarkGray)
    }
}

/// Render a text input field with a block and correct scrolling/cursor
pub(crate) fn render_input(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    input: &Input,
    focused: bool,
) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(focus_border_style(focused))
        .title(title);

    let inner_area = block.inner(area);
    frame.render_widget(block, area);

    let width = inner_area.width.max(1) as usize;
    let scroll = input.visual_scroll(width);

    let scroll_u16 = u16::try_from(scroll).unwrap_or(u16::MAX);
    let p = Paragraph::new(input.value()).scroll((0, scroll_u16));
    frame.render_widget(p, inner_area);

    if focused {
        let cursor_offset = input.visual_cursor().max(scroll) - scroll;
        let cursor_offset_u16 = u16::try_from(cursor_offset).unwrap_or(u16::MAX);
        frame.set_cursor_position((inner_area.x + cursor_offset_u16, inner_area.y));
    }
}

/// Build a key hint line in `[key] action | [key] action` format
pub(crate) fn modal_help_line(items: &[(&'static str, &'static str)]) -> Line<'static> {
    let mut spans = Vec::new();
    for (i, (key, action)) in items.iter().enumerate() {
        if i > 0 {
            spans.push(Span::styled(" | ", Style::default().fg(Color::DarkGray)));
        }
        spans.push(Span::styled("[", Style::default().fg(colors::UI_HIGHLIGHT)));
        spans.push(Span::styled(*key, Style::default().fg(colors::UI_HIGHLIGHT)));
        spans.push(Span::styled("]", Style::default().fg(colors::UI_HIGHLIGHT)));
        spans.push(Span::raw(" "));
        spans.push(Span::raw(*action));
    }
    Line::from(spans)
}

/// Key hints for the footer: `[key] action  [key] action`
pub(crate) fn key_hints(items: &[(&'static str, &'static str)]) -> Line<'static> {
    let mut spans = Vec::with_capacity(items.len() * 2);
    for (key, action) in items {
        spans.push(Span::styled(*key, Style::default().fg(colors::UI_HIGHLIGHT)));
        spans.push(Span::raw(*action));
    }
    Line::from(spans)
}

/// Truncate to `max_chars` characters, appending `...` when shortened
///
/// Counts chars rather than bytes so multi-byte names never split mid-character.
pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= 3 {
        return text.chars().take(max_chars).collect();
    }
    let mut out: String = text.chars().take(max_chars - 3).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is long", 8), "this ...");
        assert_eq!(truncate("abc", 3), "abc");
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("ääääää", 5), "ää...");
    }

    #[test]
    fn help_line_separates_items() {
        let line = modal_help_line(&[("Enter", "Submit"), ("Esc", "Cancel")]);
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "[Enter] Submit | [Esc] Cancel");
    }
}
