use serde::Serialize;

/// Structured trace events emitted across the orchestrator crates. Each
/// variant is logged as a single `tracing::info!` call carrying the
/// serialized event, so the whole pipeline can be reconstructed from logs
/// without bespoke per-call log lines.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionResolved {
        session_id: String,
        is_new: bool,
    },
    TaskContextSwitch {
        task_id: String,
        created: bool,
    },
    PlanGenerated {
        task_id: String,
        step_count: usize,
    },
    StepAttemptStarted {
        task_id: String,
        step_id: u32,
        attempt_number: u32,
    },
    StepAttemptFinished {
        task_id: String,
        step_id: u32,
        attempt_number: u32,
        status: char,
    },
    PlanFinished {
        task_id: String,
        status: char,
    },
    ToolInvoked {
        tool_name: String,
        duration_ms: u64,
        is_error: bool,
    },
    LlmRoleResolved {
        role: String,
        provider: String,
        model: String,
        fallback: bool,
    },
    Cancelled {
        session_id: String,
        task_id: Option<String>,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "ao_event");
    }
}
