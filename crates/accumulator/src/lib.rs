//! Accumulator reducer: folds an open-world stream of events into an
//! ordered sequence of immutable [`CanonicalMessage`]s.
//!
//! Dispatch is tagged-variant-by-`kind`, not a closed enum match, so a host
//! may extend the event-kind space without touching this reducer — unknown
//! kinds are ignored rather than rejected.

use std::collections::HashMap;

use chrono::Utc;
use sa_domain::{CanonicalMessage, CanonicalPart, IdGenerator, Role, StoredEvent};

const METADATA_STEP_KEY: &str = "step";
const METADATA_ERROR_KEY: &str = "error";

struct PendingToolCall {
    tool_name: String,
    #[allow(dead_code)]
    input: serde_json::Value,
}

/// Stateless across runs: construct a fresh `Accumulator` per finalize.
pub struct Accumulator<'a> {
    id_gen: &'a dyn IdGenerator,
    run_id: String,
    thread_id: String,
    completed: Vec<CanonicalMessage>,
    current: Option<CanonicalMessage>,
    text_buffer: String,
    pending_tool_calls: HashMap<String, PendingToolCall>,
    last_message_id: Option<String>,
    next_order: u64,
}

impl<'a> Accumulator<'a> {
    pub fn new(
        id_gen: &'a dyn IdGenerator,
        run_id: impl Into<String>,
        thread_id: impl Into<String>,
        parent_message_id: Option<String>,
    ) -> Self {
        Self {
            id_gen,
            run_id: run_id.into(),
            thread_id: thread_id.into(),
            completed: Vec::new(),
            current: None,
            text_buffer: String::new(),
            pending_tool_calls: HashMap::new(),
            last_message_id: parent_message_id,
            next_order: 0,
        }
    }

    /// Folds `events` in order, then flushes any in-progress message.
    pub fn fold(mut self, events: &[StoredEvent]) -> Vec<CanonicalMessage> {
        for event in events {
            self.apply(event);
        }
        self.flush_text();
        self.commit_current();
        self.completed
    }

    fn apply(&mut self, event: &StoredEvent) {
        match event.event.kind.as_str() {
            "step-started" => {
                self.flush_text();
                self.ensure_current(Role::Assistant);
            }
            "text-delta" => {
                if let Some(delta) = event.event.payload.get("delta").and_then(|v| v.as_str()) {
                    self.ensure_current(Role::Assistant);
                    self.text_buffer.push_str(delta);
                }
            }
            "reasoning" => {
                self.flush_text();
                self.ensure_current(Role::Assistant);
                if let Some(text) = event.event.payload.get("text").and_then(|v| v.as_str()) {
                    self.push_part(CanonicalPart::Reasoning {
                        text: text.to_string(),
                    });
                }
            }
            "tool-call" => {
                self.flush_text();
                self.ensure_current(Role::Assistant);
                let tool_call_id = str_field(&event.event.payload, "tool_call_id");
                let tool_name = str_field(&event.event.payload, "tool_name");
                let input = event
                    .event
                    .payload
                    .get("input")
                    .cloned()
                    .unwrap_or(serde_json::Value::Null);
                self.push_part(CanonicalPart::ToolCall {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                    input: input.clone(),
                });
                self.pending_tool_calls
                    .insert(tool_call_id, PendingToolCall { tool_name, input });
            }
            "tool-result" => {
                self.flush_text();
                self.commit_current();
                let tool_call_id = str_field(&event.event.payload, "tool_call_id");
                let tool_name = event
                    .event
                    .payload
                    .get("tool_name")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .or_else(|| {
                        self.pending_tool_calls
                            .get(&tool_call_id)
                            .map(|p| p.tool_name.clone())
                    })
                    .unwrap_or_else(|| "unknown".to_string());
                let output = event
                    .event
                    .payload
                    .get("output")
                    .cloned()
                    .unwrap_or(serde_json::Value::Null);
                let is_error = event
                    .event
                    .payload
                    .get("is_error")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                self.pending_tool_calls.remove(&tool_call_id);

                self.ensure_current(Role::Tool);
                self.push_part(CanonicalPart::ToolResult {
                    tool_call_id,
                    tool_name,
                    output,
                    is_error,
                });
                self.commit_current();
            }
            "file" => {
                self.flush_text();
                self.ensure_current(Role::Assistant);
                let mime_type = str_field(&event.event.payload, "mime_type");
                let url = str_field(&event.event.payload, "url");
                let name = event
                    .event
                    .payload
                    .get("name")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                self.push_part(CanonicalPart::File {
                    mime_type,
                    url,
                    name,
                });
            }
            "step-finished" => {
                self.flush_text();
                if let Some(current) = &mut self.current {
                    merge_metadata(current, METADATA_STEP_KEY, &event.event.payload);
                }
                self.commit_current();
            }
            "error" => {
                self.ensure_current(Role::Assistant);
                if let Some(current) = &mut self.current {
                    merge_metadata(current, METADATA_ERROR_KEY, &event.event.payload);
                }
            }
            _ => {
                tracing::debug!(kind = %event.event.kind, "accumulator: ignoring unknown event kind");
            }
        }
    }

    fn ensure_current(&mut self, role: Role) {
        if self.current.is_none() {
            self.current = Some(CanonicalMessage {
                id: self.id_gen.next_id(),
                run_id: self.run_id.clone(),
                thread_id: self.thread_id.clone(),
                parent_message_id: self.last_message_id.clone(),
                role,
                parts: Vec::new(),
                created_at: Utc::now(),
                order: self.next_order,
                metadata: serde_json::json!({"schema_version": sa_domain::CURRENT_SCHEMA_VERSION}),
            });
            self.next_order += 1;
        }
    }

    fn push_part(&mut self, part: CanonicalPart) {
        if let Some(current) = &mut self.current {
            current.parts.push(part);
        }
    }

    fn flush_text(&mut self) {
        if self.text_buffer.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.text_buffer);
        self.push_part(CanonicalPart::Text { text });
    }

    /// Commits `current`, assigning it a fresh identity in `completed`.
    /// Empty messages (no parts) are discarded without consuming an id.
    fn commit_current(&mut self) {
        let Some(mut message) = self.current.take() else {
            return;
        };
        if message.is_empty() {
            return;
        }
        message.parent_message_id = self.last_message_id.clone();
        self.last_message_id = Some(message.id.clone());
        self.completed.push(message);
    }
}

fn str_field(payload: &serde_json::Value, key: &str) -> String {
    payload
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn merge_metadata(message: &mut CanonicalMessage, key: &str, payload: &serde_json::Value) {
    if payload.is_null() {
        return;
    }
    if let Some(obj) = message.metadata.as_object_mut() {
        obj.insert(key.to_string(), payload.clone());
    }
}
