use crate::ToolHandle;
use ao_domain::cancel::CancelToken;
use ao_domain::error::{Error, Result};
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Validate a task-relative path: reject absolute paths and raw `..`
/// components, then confirm the resolved path stays under the workspace.
fn validate_relative_path(task_dir: &Path, requested: &str) -> Result<PathBuf> {
    let requested_path = Path::new(requested);
    if requested_path.is_absolute() {
        return Err(Error::UnsafePath(format!(
            "absolute paths are not allowed; use a path relative to the task workspace (got '{requested}')"
        )));
    }
    for component in requested_path.components() {
        if matches!(component, Component::ParentDir) {
            return Err(Error::UnsafePath("path must not contain '..' components".into()));
        }
    }
    let candidate = task_dir.join(requested_path);
    if !candidate.starts_with(task_dir) {
        return Err(Error::UnsafePath(format!("path '{requested}' escapes the task workspace")));
    }
    Ok(candidate)
}

pub struct ReadFileTool {
    task_dir: PathBuf,
}

impl ReadFileTool {
    pub fn new(task_dir: PathBuf) -> Self {
        Self { task_dir }
    }
}

#[async_trait::async_trait]
impl ToolHandle for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file from the task workspace, relative to its root."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"]
        })
    }

    async fn invoke(&self, args: Value, _cancel: CancelToken) -> Result<String> {
        let path = args["path"].as_str().ok_or_else(|| Error::Other("read_file: missing 'path'".into()))?;
        let resolved = validate_relative_path(&self.task_dir, path)?;
        let content = tokio::fs::read_to_string(&resolved).await?;
        Ok(content)
    }
}

pub struct WriteFileTool {
    task_dir: PathBuf,
}

impl WriteFileTool {
    pub fn new(task_dir: PathBuf) -> Self {
        Self { task_dir }
    }
}

#[async_trait::async_trait]
impl ToolHandle for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write (overwrite) a text file in the task workspace, relative to its root."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "content": { "type": "string" }
            },
            "required": ["path", "content"]
        })
    }

    async fn invoke(&self, args: Value, _cancel: CancelToken) -> Result<String> {
        let path = args["path"].as_str().ok_or_else(|| Error::Other("write_file: missing 'path'".into()))?;
        let content = args["content"].as_str().ok_or_else(|| Error::Other("write_file: missing 'content'".into()))?;
        let resolved = validate_relative_path(&self.task_dir, path)?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(&resolved).await?;
        file.write_all(content.as_bytes()).await?;
        Ok(format!("{}{}", crate::WRITE_FILE_SUCCESS_PREFIX, path))
    }
}

/// A light heuristic critique: word/line counts and a few structural
/// observations. The orchestrator's contract with this tool is just
/// "string in, string out" — the actual critique quality is out of scope.
pub struct CritiqueDocumentTool {
    task_dir: PathBuf,
}

impl CritiqueDocumentTool {
    pub fn new(task_dir: PathBuf) -> Self {
        Self { task_dir }
    }
}

#[async_trait::async_trait]
impl ToolHandle for CritiqueDocumentTool {
    fn name(&self) -> &str {
        "critique_document"
    }

    fn description(&self) -> &str {
        "Produce a short structural critique of a document in the task workspace."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"]
        })
    }

    async fn invoke(&self, args: Value, _cancel: CancelToken) -> Result<String> {
        let path = args["path"].as_str().ok_or_else(|| Error::Other("critique_document: missing 'path'".into()))?;
        let resolved = validate_relative_path(&self.task_dir, path)?;
        let content = tokio::fs::read_to_string(&resolved).await?;

        let lines = content.lines().count();
        let words = content.split_whitespace().count();
        let headings = content.lines().filter(|l| l.trim_start().starts_with('#')).count();

        Ok(format!(
            "Document '{path}': {lines} lines, {words} words, {headings} heading(s). \
             {}",
            if words < 50 {
                "Consider expanding; the document reads as a stub."
            } else if headings == 0 {
                "No headings found; consider adding section structure."
            } else {
                "Structure looks reasonable."
            }
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ao_domain::cancel::CancelToken;
    use ao_workspace::WorkspaceManager;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let root = tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let task_dir = manager.resolve("t1", true).await.unwrap();

        let writer = WriteFileTool::new(task_dir.clone());
        let result = writer
            .invoke(serde_json::json!({"path": "out.md", "content": "hello"}), CancelToken::new())
            .await
            .unwrap();
        assert_eq!(result, "SUCCESS::write_file:::out.md");

        let reader = ReadFileTool::new(task_dir);
        let content = reader.invoke(serde_json::json!({"path": "out.md"}), CancelToken::new()).await.unwrap();
        assert_eq!(content, "hello");
    }

    #[tokio::test]
    async fn write_file_rejects_parent_traversal() {
        let root = tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let task_dir = manager.resolve("t1", true).await.unwrap();
        let writer = WriteFileTool::new(task_dir);
        let err = writer
            .invoke(serde_json::json!({"path": "../escape.txt", "content": "x"}), CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsafePath(_)));
    }

    #[tokio::test]
    async fn write_file_rejects_absolute_path() {
        let root = tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let task_dir = manager.resolve("t1", true).await.unwrap();
        let writer = WriteFileTool::new(task_dir);
        let err = writer
            .invoke(serde_json::json!({"path": "/etc/passwd", "content": "x"}), CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsafePath(_)));
    }
}
