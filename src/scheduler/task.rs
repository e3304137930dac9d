use serde::{Deserialize, Serialize};

/// Unique task identifier, allocated by the scheduler.
pub type TaskId = u64;

/// The four task lifecycle pools. A task belongs to exactly one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    /// Progressing and counted against the attention budget.
    Active,
    /// Previously active, paused, then unpaused; admitted before pending.
    Resumed,
    /// Newly created, waiting for first admission.
    Pending,
    /// Frozen: neither progressing nor counted against the budget.
    Paused,
}

impl PoolKind {
    pub const ALL: [PoolKind; 4] = [
        PoolKind::Active,
        PoolKind::Resumed,
        PoolKind::Pending,
        PoolKind::Paused,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolKind::Active => "active",
            PoolKind::Resumed => "resumed",
            PoolKind::Pending => "pending",
            PoolKind::Paused => "paused",
        }
    }
}

impl std::fmt::Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A long-running game task.
///
/// `cost` weighs against the attention budget while the task is active;
/// `duration_ms` is how long it must progress before completing. The two
/// are independent. The scheduler never interprets `kind` or `payload`;
/// both are handed back verbatim on completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: String,
    pub cost: u32,
    pub duration_ms: u64,
    pub elapsed_ms: u64,
    pub payload: serde_json::Value,
}

impl Task {
    pub fn is_complete(&self) -> bool {
        self.elapsed_ms >= self.duration_ms
    }

    /// Fraction of the task's duration already progressed, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.duration_ms == 0 {
            return 1.0;
        }
        (self.elapsed_ms as f64 / self.duration_ms as f64).min(1.0)
    }
}

/// What a caller supplies to create a task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    pub kind: String,
    pub cost: u32,
    pub duration_ms: u64,
    pub payload: serde_json::Value,
}

impl TaskSpec {
    pub fn new(kind: impl Into<String>, cost: u32, duration_ms: u64) -> Self {
        Self {
            kind: kind.into(),
            cost,
            duration_ms,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub(crate) fn into_task(self, id: TaskId) -> Task {
        Task {
            id,
            kind: self.kind,
            cost: self.cost,
            duration_ms: self.duration_ms,
            elapsed_ms: 0,
            payload: self.payload,
        }
    }
}
