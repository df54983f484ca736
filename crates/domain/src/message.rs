//! Canonical messages: the immutable, branch-aware transcript unit the
//! accumulator produces and the ledger persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
    System,
}

/// One content unit inside a canonical message. Adjacent `Text` deltas are
/// coalesced by the accumulator before a part ever lands here — a
/// `CanonicalPart::Text` is already the fully-assembled string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CanonicalPart {
    Text {
        text: String,
    },
    Reasoning {
        text: String,
    },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        output: Value,
        is_error: bool,
    },
    File {
        mime_type: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

/// The schema version stamped into every message's metadata. Bumped only
/// when the shape of `CanonicalMessage`/`CanonicalPart` changes in a way
/// that isn't backward-readable; this crate does not implement migration,
/// it only refuses to read a row whose `schema_version` is missing.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalMessage {
    pub id: String,
    pub run_id: String,
    pub thread_id: String,
    pub parent_message_id: Option<String>,
    pub role: Role,
    pub parts: Vec<CanonicalPart>,
    pub created_at: DateTime<Utc>,
    /// Insertion ordinal within the run — used to break ties at fork points
    /// ("most recent insertion wins").
    pub order: u64,
    pub metadata: Value,
}

impl CanonicalPart {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Reasoning { .. } => "reasoning",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::File { .. } => "file",
        }
    }
}

impl CanonicalMessage {
    /// `true` if the message carries no content and should be discarded by
    /// the accumulator rather than committed.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn schema_version(&self) -> Option<u64> {
        self.metadata.get("schema_version").and_then(Value::as_u64)
    }
}
