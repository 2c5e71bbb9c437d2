//! Shared application state (§4-5): one instance per process, cloned
//! (cheaply, via `Arc` fields) into every websocket connection handler.

use std::sync::Arc;

use ao_domain::cancel::CancelMap;
use ao_domain::config::Config;
use ao_pipeline::{DirectQaExecutor, PlanExecutor};
use ao_providers::ProviderRegistry;
use ao_store::Store;
use ao_tools::ToolRegistry;
use ao_workspace::WorkspaceManager;

/// Fields grouped by concern:
/// - **Core services** — config, persistence, workspace, LLM registry
/// - **Pipeline** — tool registry and the two pipeline entry points
/// - **Runtime** — per-session cancellation
#[derive(Clone)]
pub struct AppState {
    // ── Core services ────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub workspace: Arc<WorkspaceManager>,
    pub llm: Arc<ProviderRegistry>,

    // ── Pipeline ─────────────────────────────────────────────────────
    pub tools: Arc<ToolRegistry>,
    pub plan_executor: Arc<PlanExecutor>,
    pub direct_qa: Arc<DirectQaExecutor>,

    // ── Runtime ──────────────────────────────────────────────────────
    pub cancel_map: Arc<CancelMap>,
}
