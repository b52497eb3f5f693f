//! Terminal styling utilities
//!
//! One colour vocabulary for the one-shot CLI commands and the TUI:
//! - Semantic colors for status (green/yellow/red)
//! - A fixed colour per job state
//! - Cyan for headers and technical terms

use crossterm::style::Stylize;

use crate::model::JobState;

/// Extension trait for consistent bullview styling
///
/// Use these methods instead of direct color calls in CLI output.
///
/// # Examples
///
/// ```
/// use bullview::style::BullviewStyle;
///
/// println!("{}", "Queues".header());
/// println!("{}", "paused".warning());
/// println!("{}", "bull:orders:meta".technical());
/// ```
pub trait BullviewStyle: Stylize {
    /// Section headers (cyan bold)
    fn header(self) -> <<Self as Stylize>::Styled as Stylize>::Styled
    where
        Self: Sized,
        <Self as Stylize>::Styled: Stylize,
    {
        self.cyan().bold()
    }

    /// Positive states: running queues, completed jobs
    fn success(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.green()
    }

    /// Problems: failed jobs, connection errors
    fn error(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.red()
    }

    /// Partial states: paused queues, delayed jobs
    fn warning(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.yellow()
    }

    /// Technical terms and identifiers: keys, ids, addresses
    fn technical(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.cyan()
    }
}

impl<T: Stylize> BullviewStyle for T {}

/// Semantic color palette for TUI use with ratatui
#[cfg(feature = "tui")]
pub mod colors {
    use ratatui::style::Color;

    /// Color for focused panel borders and key hints
    pub const UI_HIGHLIGHT: Color = Color::Cyan;

    /// Color for selected rows (use with bold)
    pub const UI_SELECTED: Color = Color::Cyan;

    /// Background for selected rows
    pub const UI_SELECTED_BG: Color = Color::DarkGray;

    /// Color for counters in the header
    pub const UI_STAT: Color = Color::Yellow;

    pub const UI_SUCCESS: Color = Color::Green;

    pub const UI_ERROR: Color = Color::Red;

    pub const UI_WARNING: Color = Color::Yellow;

    /// Color for secondary/dimmed text
    pub const UI_SECONDARY: Color = Color::Gray;

    pub const UI_TEXT: Color = Color::White;

    pub const STATE_WAITING: Color = Color::Blue;
    pub const STATE_ACTIVE: Color = Color::Cyan;
    pub const STATE_COMPLETED: Color = Color::Green;
    pub const STATE_FAILED: Color = Color::Red;
    pub const STATE_DELAYED: Color = Color::Yellow;
}

/// Ratatui color for a job state
#[cfg(feature = "tui")]
#[must_use]
pub const fn state_color(state: JobState) -> ratatui::style::Color {
    match state {
        JobState::Waiting => colors::STATE_WAITING,
        JobState::Active => colors::STATE_ACTIVE,
        JobState::Completed => colors::STATE_COMPLETED,
        JobState::Failed => colors::STATE_FAILED,
        JobState::Delayed => colors::STATE_DELAYED,
    }
}

/// Print a job state with its CLI colour
#[must_use]
pub fn styled_state(state: JobState) -> String {
    let label = state.as_str();
    match state {
        JobState::Waiting => label.blue().to_string(),
        JobState::Active => label.cyan().to_string(),
        JobState::Completed => label.success().to_string(),
        JobState::Failed => label.error().to_string(),
        JobState::Delayed => label.warning().to_string(),
    }
}
