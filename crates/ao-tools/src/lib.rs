//! Tool registry (§4.4): yields, per task, the set of tool handles an
//! executor may invoke. Stateless tools are always available; task-scoped
//! tools are bound to the task's resolved workspace.

pub mod file_ops;
pub mod query_files;
pub mod shell;
pub mod stateless;

use ao_domain::cancel::CancelToken;
use ao_domain::config::ToolsConfig;
use ao_domain::error::Result;
use ao_workspace::WorkspaceManager;
use serde_json::Value;
use std::sync::Arc;

/// Success sentinel returned by `write_file`; the orchestrator recognizes
/// this prefix to emit an `artifact_generated` persistence event and a
/// `trigger_artifact_refresh` stream event.
pub const WRITE_FILE_SUCCESS_PREFIX: &str = "SUCCESS::write_file:::";

#[async_trait::async_trait]
pub trait ToolHandle: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    async fn invoke(&self, args: Value, cancel: CancelToken) -> Result<String>;
}

pub struct ToolRegistry {
    workspace: WorkspaceManager,
    tools_config: ToolsConfig,
}

impl ToolRegistry {
    pub fn new(workspace: WorkspaceManager, tools_config: ToolsConfig) -> Self {
        Self { workspace, tools_config }
    }

    /// Stateless tools (search, fetch, installer, PubMed, REPL) are returned
    /// unconditionally. Task-scoped tools (read_file, write_file,
    /// workspace_shell, query_files, critique_document) are returned only
    /// when `task_id` is non-empty, bound to that task's resolved
    /// workspace. Name uniqueness is enforced by construction below.
    pub async fn tools_for_task(&self, task_id: Option<&str>) -> Result<Vec<Arc<dyn ToolHandle>>> {
        let mut tools: Vec<Arc<dyn ToolHandle>> = vec![
            Arc::new(stateless::SearchTool),
            Arc::new(stateless::FetchTool::new(self.tools_config.timeout_for("fetch"))),
            Arc::new(stateless::InstallerTool::new(self.tools_config.timeout_for("installer"), self.tools_config.output_cap_for("installer"))),
            Arc::new(stateless::PubmedSearchTool),
            Arc::new(stateless::PythonReplTool::new(self.tools_config.timeout_for("python_repl"))),
        ];

        if let Some(task_id) = task_id.filter(|t| !t.is_empty()) {
            let task_dir = self.workspace.resolve(task_id, true).await?;
            let cap = self.tools_config.output_cap_for("workspace_shell");
            let timeout = self.tools_config.timeout_for("workspace_shell");

            tools.push(Arc::new(file_ops::ReadFileTool::new(task_dir.clone())));
            tools.push(Arc::new(file_ops::WriteFileTool::new(task_dir.clone())));
            tools.push(Arc::new(shell::WorkspaceShellTool::new(task_dir.clone(), timeout, cap)));
            tools.push(Arc::new(query_files::QueryFilesTool::new(task_dir.clone())));
            tools.push(Arc::new(file_ops::CritiqueDocumentTool::new(task_dir)));
        }

        debug_assert_unique_names(&tools);
        Ok(tools)
    }
}

fn debug_assert_unique_names(tools: &[Arc<dyn ToolHandle>]) {
    #[cfg(debug_assertions)]
    {
        let mut seen = std::collections::HashSet::new();
        for tool in tools {
            assert!(seen.insert(tool.name().to_string()), "duplicate tool name: {}", tool.name());
        }
    }
}
