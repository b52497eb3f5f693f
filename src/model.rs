//! Snapshot types shared by the gateways, the poller and the dashboard
//!
//! Every snapshot is immutable once fetched. A poll cycle replaces them
//! wholesale rather than patching them in place.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
}

impl JobState {
    /// All states in display order
    pub const ALL: [JobState; 5] = [
        JobState::Waiting,
        JobState::Active,
        JobState::Completed,
        JobState::Failed,
        JobState::Delayed,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Delayed => "delayed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown state name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job state '{0}' (expected waiting, active, completed, failed or delayed)")]
pub struct ParseStateError(pub String);

impl FromStr for JobState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "waiting" | "wait" => Ok(JobState::Waiting),
            "active" => Ok(JobState::Active),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            "delayed" => Ok(JobState::Delayed),
            _ => Err(ParseStateError(s.to_string())),
        }
    }
}

/// Job counts for one queue, one per state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
}

impl StateCounts {
    #[must_use]
    pub const fn get(&self, state: JobState) -> u64 {
        match state {
            JobState::Waiting => self.waiting,
            JobState::Active => self.active,
            JobState::Completed => self.completed,
            JobState::Failed => self.failed,
            JobState::Delayed => self.delayed,
        }
    }

    #[must_use]
    pub const fn total(&self) -> u64 {
        self.waiting + self.active + self.completed + self.failed + self.delayed
    }
}

/// One discovered queue as seen by the last poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub name: String,
    pub counts: StateCounts,
    pub paused: bool,
}

/// Progress reported by a worker
///
/// Workers may report a percentage, a free-form string, an arbitrary JSON
/// object or a boolean, so the value is kept tagged.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Progress {
    Number(f64),
    Text(String),
    Structured(Value),
    Flag(bool),
}

impl Default for Progress {
    fn default() -> Self {
        Progress::Number(0.0)
    }
}

impl Progress {
    /// Decode the raw `progress` field of a job hash
    ///
    /// Values that are not valid JSON are kept verbatim as text.
    #[must_use]
    pub fn from_raw(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::from_json(value),
            Err(_) => Progress::Text(raw.to_string()),
        }
    }

    #[must_use]
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Number(n) => Progress::Number(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => Progress::Text(s),
            Value::Bool(b) => Progress::Flag(b),
            Value::Null => Progress::default(),
            other => Progress::Structured(other),
        }
    }

    /// Percentage in `0..=100` when the progress is numeric
    #[must_use]
    pub fn percent(&self) -> Option<f64> {
        match self {
            Progress::Number(n) => Some(n.clamp(0.0, 100.0)),
            _ => None,
        }
    }

    /// Short human-readable label
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Progress::Number(n) => format!("{n}%"),
            Progress::Text(s) => s.clone(),
            Progress::Structured(v) => v.to_string(),
            Progress::Flag(true) => "done".to_string(),
            Progress::Flag(false) => "pending".to_string(),
        }
    }
}

/// A job as returned by one fetch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub id: String,
    pub name: String,
    pub data: Value,
    pub progress: Progress,
    /// Creation time in milliseconds since the Unix epoch
    pub created_at: i64,
    pub processed_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub failure_reason: Option<String>,
    pub stack_frames: Vec<String>,
    pub attempts_made: u32,
    /// Configured attempts; 0 when the job carries no retry policy
    pub attempts_allowed: u32,
    pub state: JobState,
    pub return_value: Option<Value>,
}

/// A connected worker, derived from the Redis client list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerSnapshot {
    pub id: String,
    pub name: String,
    pub address: String,
    pub age_seconds: u64,
    pub idle_seconds: u64,
}

/// State filter applied to the job list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StateFilter {
    #[default]
    All,
    Only(JobState),
}

impl StateFilter {
    /// Filters in cycle order
    pub const CYCLE: [StateFilter; 6] = [
        StateFilter::All,
        StateFilter::Only(JobState::Waiting),
        StateFilter::Only(JobState::Active),
        StateFilter::Only(JobState::Completed),
        StateFilter::Only(JobState::Failed),
        StateFilter::Only(JobState::Delayed),
    ];

    fn position(self) -> usize {
        Self::CYCLE.iter().position(|f| *f == self).unwrap_or(0)
    }

    #[must_use]
    pub fn next(self) -> Self {
        Self::CYCLE[(self.position() + 1) % Self::CYCLE.len()]
    }

    #[must_use]
    pub fn prev(self) -> Self {
        let len = Self::CYCLE.len();
        Self::CYCLE[(self.position() + len - 1) % len]
    }

    /// States covered by this filter
    #[must_use]
    pub fn states(self) -> Vec<JobState> {
        match self {
            StateFilter::All => JobState::ALL.to_vec(),
            StateFilter::Only(state) => vec![state],
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            StateFilter::All => "all",
            StateFilter::Only(state) => state.as_str(),
        }
    }
}

impl fmt::Display for StateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for StateFilter {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            Ok(StateFilter::All)
        } else {
            s.parse().map(StateFilter::Only)
        }
    }
}

/// Local wall-clock time for a millisecond Unix timestamp
#[must_use]
pub fn format_timestamp(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms).map_or_else(
        || "-".to_string(),
        |utc| {
            utc.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        },
    )
}

/// Compact age such as `42s`, `5m`, `3h` or `2d`
#[must_use]
pub fn format_age(seconds: u64) -> String {
    match seconds {
        0..60 => format!("{seconds}s"),
        60..3600 => format!("{}m", seconds / 60),
        3600..86_400 => format!("{}h", seconds / 3600),
        _ => format!("{}d", seconds / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn filter_cycle_forward_has_period_six() {
        let mut filter = StateFilter::All;
        for _ in 0..6 {
            filter = filter.next();
        }
        assert_eq!(filter, StateFilter::All);
    }

    #[test]
    fn filter_cycle_backward_wraps_to_delayed() {
        assert_eq!(
            StateFilter::All.prev(),
            StateFilter::Only(JobState::Delayed)
        );
    }

    #[test]
    fn filter_next_then_prev_is_identity() {
        for filter in StateFilter::CYCLE {
            assert_eq!(filter.next().prev(), filter);
        }
    }

    #[rstest]
    #[case("42", Progress::Number(42.0))]
    #[case("\"halfway\"", Progress::Text("halfway".into()))]
    #[case("true", Progress::Flag(true))]
    #[case("{\"step\":2}", Progress::Structured(json!({"step": 2})))]
    #[case("not json", Progress::Text("not json".into()))]
    #[case("null", Progress::Number(0.0))]
    fn progress_decodes_each_variant(#[case] raw: &str, #[case] expected: Progress) {
        assert_eq!(Progress::from_raw(raw), expected);
    }

    #[test]
    fn progress_percent_only_for_numbers() {
        assert_eq!(Progress::Number(150.0).percent(), Some(100.0));
        assert_eq!(Progress::Text("50".into()).percent(), None);
        assert_eq!(Progress::Flag(true).label(), "done");
    }

    #[rstest]
    #[case("wait", JobState::Waiting)]
    #[case("Failed", JobState::Failed)]
    #[case("delayed", JobState::Delayed)]
    fn state_parses_aliases(#[case] raw: &str, #[case] expected: JobState) {
        assert_eq!(raw.parse::<JobState>(), Ok(expected));
    }

    #[test]
    fn filter_parses_all_and_states() {
        assert_eq!("ALL".parse::<StateFilter>(), Ok(StateFilter::All));
        assert_eq!(
            "active".parse::<StateFilter>(),
            Ok(StateFilter::Only(JobState::Active))
        );
        assert!("bogus".parse::<StateFilter>().is_err());
    }

    #[rstest]
    #[case(0, "0s")]
    #[case(59, "59s")]
    #[case(60, "1m")]
    #[case(7200, "2h")]
    #[case(200_000, "2d")]
    fn age_formatting(#[case] seconds: u64, #[case] expected: &str) {
        assert_eq!(format_age(seconds), expected);
    }

    #[test]
    fn timestamp_formatting_has_fixed_width() {
        assert_eq!(format_timestamp(1_700_000_000_000).len(), 19);
    }

    #[test]
    fn counts_total_sums_all_states() {
        let counts = StateCounts {
            waiting: 1,
            active: 2,
            completed: 3,
            failed: 4,
            delayed: 5,
        };
        assert_eq!(counts.total(), 15);
        assert_eq!(counts.get(JobState::Failed), 4);
    }
}
