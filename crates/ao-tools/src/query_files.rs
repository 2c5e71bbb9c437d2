//! query_files: list and grep the task workspace so a model can orient
//! itself without reading every file in full.

use crate::ToolHandle;
use ao_domain::cancel::CancelToken;
use ao_domain::error::{Error, Result};
use serde_json::Value;
use std::path::PathBuf;

pub struct QueryFilesTool {
    task_dir: PathBuf,
}

impl QueryFilesTool {
    pub fn new(task_dir: PathBuf) -> Self {
        Self { task_dir }
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let mut stack = vec![self.task_dir.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = std::fs::read_dir(&dir)?;
            while let Some(entry) = entries.next().transpose()? {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.task_dir) {
                    out.push(relative.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        out.sort();
        Ok(out)
    }

    fn grep(&self, pattern: &str) -> Result<Vec<String>> {
        let mut matches = Vec::new();
        for relative in self.list_files()? {
            let full = self.task_dir.join(&relative);
            let Ok(content) = std::fs::read_to_string(&full) else {
                continue;
            };
            for (lineno, line) in content.lines().enumerate() {
                if line.contains(pattern) {
                    matches.push(format!("{relative}:{}: {}", lineno + 1, line.trim()));
                }
            }
        }
        Ok(matches)
    }
}

#[async_trait::async_trait]
impl ToolHandle for QueryFilesTool {
    fn name(&self) -> &str {
        "query_files"
    }

    fn description(&self) -> &str {
        "List files in the task workspace, or grep them for a substring."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "mode": { "type": "string", "enum": ["list", "grep"] },
                "pattern": { "type": "string" }
            },
            "required": ["mode"]
        })
    }

    async fn invoke(&self, args: Value, _cancel: CancelToken) -> Result<String> {
        let mode = args["mode"].as_str().unwrap_or("list");
        match mode {
            "list" => {
                let files = self.list_files()?;
                if files.is_empty() {
                    Ok("(workspace is empty)".to_string())
                } else {
                    Ok(files.join("\n"))
                }
            }
            "grep" => {
                let pattern = args["pattern"]
                    .as_str()
                    .ok_or_else(|| Error::Other("query_files: grep mode requires 'pattern'".into()))?;
                let matches = self.grep(pattern)?;
                if matches.is_empty() {
                    Ok(format!("no matches for '{pattern}'"))
                } else {
                    Ok(matches.join("\n"))
                }
            }
            other => Err(Error::Other(format!("query_files: unknown mode '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ao_workspace::WorkspaceManager;
    use tempfile::tempdir;

    #[tokio::test]
    async fn lists_files_relative_to_task_root() {
        let root = tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let task_dir = manager.resolve("t1", true).await.unwrap();
        std::fs::write(task_dir.join("a.txt"), "hello world").unwrap();
        std::fs::create_dir(task_dir.join("sub")).unwrap();
        std::fs::write(task_dir.join("sub/b.txt"), "needle here").unwrap();

        let tool = QueryFilesTool::new(task_dir);
        let listed = tool.invoke(serde_json::json!({"mode": "list"}), CancelToken::new()).await.unwrap();
        assert!(listed.contains("a.txt"));
        assert!(listed.contains("sub/b.txt"));
    }

    #[tokio::test]
    async fn greps_file_contents_for_pattern() {
        let root = tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let task_dir = manager.resolve("t1", true).await.unwrap();
        std::fs::write(task_dir.join("a.txt"), "hello needle world").unwrap();

        let tool = QueryFilesTool::new(task_dir);
        let result = tool
            .invoke(serde_json::json!({"mode": "grep", "pattern": "needle"}), CancelToken::new())
            .await
            .unwrap();
        assert!(result.contains("a.txt:1"));
    }

    #[tokio::test]
    async fn grep_without_pattern_is_an_error() {
        let root = tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let task_dir = manager.resolve("t1", true).await.unwrap();
        let tool = QueryFilesTool::new(task_dir);
        let err = tool.invoke(serde_json::json!({"mode": "grep"}), CancelToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::Other(_)));
    }
}
