use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque 128-bit job identifier, unique per process.
pub type JobId = Uuid;

/// Job lifecycle status. Transitions are monotonic: `Pending -> Running ->
/// {Completed, Failed}`. A job reaches a terminal state exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Rank used to reject back-transitions; equal status is always allowed
    /// (re-applying the same state is a no-op, not an error).
    fn rank(self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Running => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `self -> next` is a legal forward move (or a same-state no-op).
    pub fn allows_transition_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            // A job transitions to a terminal state exactly once; further
            // attempts (including a different terminal status) are no-ops.
            return next == self;
        }
        next.rank() >= self.rank()
    }
}

/// Per-item status. `Waiting -> Processing -> {Success, Failed}`, with one
/// documented exception: `Processing -> Failed` on retry is allowed even
/// though it does not advance through `Success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Waiting,
    Processing,
    Success,
    Failed,
}

/// `{platform, code}` unit of work, fixed at job creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub platform: String,
    pub code: String,
    pub item_status: ItemStatus,
}

impl WorkItem {
    pub fn new(platform: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            code: code.into(),
            item_status: ItemStatus::Waiting,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Debug,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub ts: DateTime<Utc>,
    pub level: LogLevel,
    pub msg: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, msg: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            level,
            msg: msg.into(),
        }
    }

    pub fn info(msg: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, msg)
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, msg)
    }
}

/// A job as owned by the job store (C1). Never destroyed within the
/// process's lifetime; readers always get a cloned snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// `0..=100`, monotonic non-decreasing.
    pub progress: u8,
    pub items: Vec<WorkItem>,
    pub logs: Vec<LogEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(items: Vec<WorkItem>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            progress: 0,
            items,
            logs: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Last `n` log entries, in insertion order. `n == 0` returns everything
    /// (matches the HTTP `tail` query contract: absent/non-positive -> all).
    pub fn tail_logs(&self, n: usize) -> &[LogEntry] {
        if n == 0 || n >= self.logs.len() {
            &self.logs
        } else {
            &self.logs[self.logs.len() - n..]
        }
    }
}

/// A non-empty subset of fields to apply atomically to one job. Constructed
/// with the `with_*` builder methods so call sites stay terse.
#[derive(Debug, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub log: Option<LogEntry>,
    pub progress_delta: Option<u32>,
    /// Set `items[start..end)` to `status`, e.g. the prefix of items a new
    /// beacon count just marked done.
    pub item_status_range: Option<(usize, usize, ItemStatus)>,
}

impl JobPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_log(mut self, log: LogEntry) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_progress_delta(mut self, delta: u32) -> Self {
        self.progress_delta = Some(delta);
        self
    }

    pub fn with_item_status_range(mut self, start: usize, end: usize, status: ItemStatus) -> Self {
        self.item_status_range = Some((start, end, status));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_allows_forward_transitions_only() {
        assert!(JobStatus::Pending.allows_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.allows_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Running.allows_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Completed.allows_transition_to(JobStatus::Running));
    }

    #[test]
    fn terminal_reapplication_of_same_status_is_a_no_op_not_an_error() {
        assert!(JobStatus::Completed.allows_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Completed.allows_transition_to(JobStatus::Failed));
    }

    #[test]
    fn tail_logs_clamps_to_available_entries() {
        let mut job = Job::new(vec![WorkItem::new("instagram", "A")]);
        for i in 0..10 {
            job.logs.push(LogEntry::info(format!("line {i}")));
        }
        assert_eq!(job.tail_logs(3).len(), 3);
        assert_eq!(job.tail_logs(3)[0].msg, "line 7");
        assert_eq!(job.tail_logs(0).len(), 10);
        assert_eq!(job.tail_logs(1000).len(), 10);
    }
}
