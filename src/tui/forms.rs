//! Modal form state for creating queues and adding jobs

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde_json::Value;
use tui_input::{Input, InputRequest};

use crate::gateway::validate_queue_name;

/// Apply an editing key to a text input
///
/// Returns `true` if the key was consumed.
pub(crate) fn edit_input(input: &mut Input, key: KeyEvent) -> bool {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let request = match key.code {
        KeyCode::Char('u') if ctrl => InputRequest::DeleteLine,
        KeyCode::Char('w') if ctrl => InputRequest::DeletePrevWord,
        KeyCode::Char(c) if !ctrl => InputRequest::InsertChar(c),
        KeyCode::Backspace if ctrl => InputRequest::DeletePrevWord,
        KeyCode::Backspace => InputRequest::DeletePrevChar,
        KeyCode::Delete => InputRequest::DeleteNextChar,
        KeyCode::Left if ctrl => InputRequest::GoToPrevWord,
        KeyCode::Right if ctrl => InputRequest::GoToNextWord,
        KeyCode::Left => InputRequest::GoToPrevChar,
        KeyCode::Right => InputRequest::GoToNextChar,
        KeyCode::Home => InputRequest::GoToStart,
        KeyCode::End => InputRequest::GoToEnd,
        _ => return false,
    };
    input.handle(request);
    true
}

/// New-queue form
#[derive(Debug, Default)]
pub(crate) struct QueueForm {
    pub name: Input,
    /// Inline validation or submission error
    pub error: Option<String>,
    /// Set while the create call is in flight
    pub submitting: bool,
}

impl QueueForm {
    pub(crate) fn handle_key(&mut self, key: KeyEvent) {
        if edit_input(&mut self.name, key) {
            self.error = None;
        }
    }

    /// Trimmed queue name, or the message to show inline
    pub(crate) fn validate(&self) -> Result<String, String> {
        if self.name.value().trim().is_empty() {
            return Err("Queue name is required".to_string());
        }
        validate_queue_name(self.name.value())
            .map(str::to_string)
            .map_err(|_| "Queue name may not contain ':' or spaces".to_string())
    }
}

/// Focusable fields of the job form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum JobField {
    #[default]
    Name,
    Payload,
}

/// Add-job form, bound to the queue selected when it was opened
#[derive(Debug)]
pub(crate) struct JobForm {
    pub queue: String,
    pub name: Input,
    pub payload: Input,
    pub focused: JobField,
    pub error: Option<String>,
    pub submitting: bool,
}

impl JobForm {
    pub(crate) fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            name: Input::default(),
            payload: Input::new("{}".to_string()),
            focused: JobField::Name,
            error: None,
            submitting: false,
        }
    }

    pub(crate) fn next_field(&mut self) {
        self.focused = match self.focused {
            JobField::Name => JobField::Payload,
            JobField::Payload => JobField::Name,
        };
    }

    pub(crate) fn handle_key(&mut self, key: KeyEvent) {
        let input = match self.focused {
            JobField::Name => &mut self.name,
            JobField::Payload => &mut self.payload,
        };
        if edit_input(input, key) {
            self.error = None;
        }
    }

    /// Job name and payload object, or the message to show inline
    pub(crate) fn validate(&self) -> Result<(String, Value), String> {
        let name = self.name.value().trim();
        if name.is_empty() {
            return Err("Job name is required".to_string());
        }
        let payload = match self.payload.value().trim() {
            "" => Value::Object(serde_json::Map::new()),
            raw => serde_json::from_str::<Value>(raw).map_err(|e| format!("Invalid JSON: {e}"))?,
        };
        if !payload.is_object() {
            return Err("Invalid JSON: payload must be an object".to_string());
        }
        Ok((name.to_string(), payload))
    }
}
