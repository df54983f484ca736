use serde::Serialize;

/// Structured trace events for the handful of high-value lifecycle
/// transitions, greppable as one-line JSON independent of the
/// human-readable `tracing` span text that accompanies each call site.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    RunCommitted {
        run_id: String,
        thread_id: String,
        message_count: u32,
        superseded_run_ids: Vec<String>,
    },
    RunFinalized {
        run_id: String,
        status: String,
    },
    RunSuperseded {
        run_id: String,
        superseded_by: String,
        fork_from_message_id: String,
    },
    StaleRunRecovered {
        run_id: String,
        age_ms: u64,
        action: String,
    },
    SubscriptionOverflow {
        stream_id: String,
        connection_id: String,
        buffered: usize,
    },
    HeartbeatTimeout {
        connection_id: String,
    },
    ReplayFailed {
        stream_id: String,
        connection_id: String,
        error: String,
    },
    FaultInjected {
        checkpoint: String,
        run_id: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sa_event");
    }
}
