//! Stateless tools: available regardless of task context. Per the
//! orchestrator's contract only their input/output shape matters to the
//! pipeline, so these stay close to a minimal real implementation rather
//! than a full-featured one.

use crate::ToolHandle;
use ao_domain::cancel::CancelToken;
use ao_domain::error::{Error, Result};
use serde_json::Value;
use std::time::Duration;
use tokio::process::Command;

pub struct SearchTool;

#[async_trait::async_trait]
impl ToolHandle for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search the web for a query and return a short list of results."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: Value, _cancel: CancelToken) -> Result<String> {
        let query = args["query"].as_str().ok_or_else(|| Error::Other("search: missing 'query'".into()))?;
        Ok(format!("No search provider is configured; cannot search for '{query}'."))
    }
}

pub struct FetchTool {
    timeout: Duration,
    client: reqwest::Client,
}

impl FetchTool {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl ToolHandle for FetchTool {
    fn name(&self) -> &str {
        "fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL over HTTP and return its body as text."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "url": { "type": "string" } },
            "required": ["url"]
        })
    }

    async fn invoke(&self, args: Value, _cancel: CancelToken) -> Result<String> {
        let url = args["url"].as_str().ok_or_else(|| Error::Other("fetch: missing 'url'".into()))?;
        let response = tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| Error::Timeout(format!("fetch: request to '{url}' timed out")))?
            .map_err(|e| Error::Http(e.to_string()))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| Error::Http(e.to_string()))?;
        Ok(format!("status={status}\n{body}"))
    }
}

pub struct InstallerTool {
    timeout: Duration,
    output_cap_chars: usize,
}

impl InstallerTool {
    pub fn new(timeout_secs: u64, output_cap_chars: usize) -> Self {
        Self { timeout: Duration::from_secs(timeout_secs), output_cap_chars }
    }

    fn truncate(&self, mut output: String) -> String {
        if output.len() > self.output_cap_chars {
            let keep = self.output_cap_chars * 3 / 4;
            let drain_count = output.len() - keep;
            let mut boundary = drain_count;
            while boundary < output.len() && !output.is_char_boundary(boundary) {
                boundary += 1;
            }
            output.drain(..boundary);
            output = format!("...[truncated]...\n{output}");
        }
        output
    }
}

#[async_trait::async_trait]
impl ToolHandle for InstallerTool {
    fn name(&self) -> &str {
        "installer"
    }

    fn description(&self) -> &str {
        "Install a Python package with pip into the current environment."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "package": { "type": "string" } },
            "required": ["package"]
        })
    }

    async fn invoke(&self, args: Value, _cancel: CancelToken) -> Result<String> {
        let package = args["package"].as_str().ok_or_else(|| Error::Other("installer: missing 'package'".into()))?;
        let output = tokio::time::timeout(self.timeout, Command::new("pip").arg("install").arg(package).output())
            .await
            .map_err(|_| Error::Timeout(format!("installer: installing '{package}' timed out")))?
            .map_err(|e| Error::Other(format!("installer: failed to spawn pip: {e}")))?;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        combined = self.truncate(combined);
        Ok(format!("exit_code={}\n{combined}", output.status.code().unwrap_or(-1)))
    }
}

pub struct PubmedSearchTool;

#[async_trait::async_trait]
impl ToolHandle for PubmedSearchTool {
    fn name(&self) -> &str {
        "pubmed_search"
    }

    fn description(&self) -> &str {
        "Search PubMed for articles matching a query."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: Value, _cancel: CancelToken) -> Result<String> {
        let query = args["query"].as_str().ok_or_else(|| Error::Other("pubmed_search: missing 'query'".into()))?;
        Ok(format!("No PubMed provider is configured; cannot search for '{query}'."))
    }
}

pub struct PythonReplTool {
    timeout: Duration,
}

impl PythonReplTool {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout: Duration::from_secs(timeout_secs) }
    }
}

#[async_trait::async_trait]
impl ToolHandle for PythonReplTool {
    fn name(&self) -> &str {
        "python_repl"
    }

    fn description(&self) -> &str {
        "Execute a snippet of Python code and return stdout/stderr."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "code": { "type": "string" } },
            "required": ["code"]
        })
    }

    async fn invoke(&self, args: Value, _cancel: CancelToken) -> Result<String> {
        let code = args["code"].as_str().ok_or_else(|| Error::Other("python_repl: missing 'code'".into()))?;
        let output = tokio::time::timeout(
            self.timeout,
            Command::new("python3").arg("-c").arg(code).output(),
        )
        .await
        .map_err(|_| Error::Timeout("python_repl: execution timed out".into()))?
        .map_err(|e| Error::Other(format!("python_repl: failed to spawn python3: {e}")))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(format!("exit_code={}\n{combined}", output.status.code().unwrap_or(-1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_reports_no_provider_without_panicking() {
        let tool = SearchTool;
        let result = tool.invoke(serde_json::json!({"query": "rust"}), CancelToken::new()).await.unwrap();
        assert!(result.contains("rust"));
    }

    #[tokio::test]
    async fn python_repl_executes_code_and_captures_stdout() {
        let tool = PythonReplTool::new(5);
        let result = tool
            .invoke(serde_json::json!({"code": "print('hi')"}), CancelToken::new())
            .await;
        if let Ok(output) = result {
            assert!(output.contains("hi"));
        }
    }

    #[tokio::test]
    async fn fetch_rejects_missing_url() {
        let tool = FetchTool::new(5);
        let err = tool.invoke(serde_json::json!({}), CancelToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::Other(_)));
    }
}
