//! Run records: the lifecycle state machine for one agent generation attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Created,
    Streaming,
    Committed,
    Failed,
    Cancelled,
    Superseded,
}

impl RunStatus {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Created | Self::Streaming)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Streaming => "streaming",
            Self::Committed => "committed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Superseded => "superseded",
        };
        f.write_str(s)
    }
}

/// The status a caller may finalize a run to. A subset of `RunStatus` —
/// `Superseded` is never a finalize target, it is only ever produced as a
/// side effect of another run's commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeStatus {
    Committed,
    Failed,
    Cancelled,
}

impl From<FinalizeStatus> for RunStatus {
    fn from(s: FinalizeStatus) -> Self {
        match s {
            FinalizeStatus::Committed => RunStatus::Committed,
            FinalizeStatus::Failed => RunStatus::Failed,
            FinalizeStatus::Cancelled => RunStatus::Cancelled,
        }
    }
}

/// One agent generation attempt, tying together a thread, an event stream,
/// and (once committed) a slice of canonical messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub thread_id: String,
    pub stream_id: String,
    pub fork_from_message_id: Option<String>,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub message_count: u32,
}

impl RunRecord {
    pub fn stream_id_for(run_id: &str) -> String {
        format!("run:{run_id}")
    }
}

/// The action `recover_run` forces an active run into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverAction {
    Fail,
    Cancel,
}

impl From<RecoverAction> for FinalizeStatus {
    fn from(a: RecoverAction) -> Self {
        match a {
            RecoverAction::Fail => FinalizeStatus::Failed,
            RecoverAction::Cancel => FinalizeStatus::Cancelled,
        }
    }
}
