//! Direct QA path (§4.9 `user_message` when intent is `DIRECT_QA`): the
//! executor runs once with the full tool set in a bounded function-calling
//! loop and produces exactly one `agent_message`.

use crate::callback::CallbackFanout;
use ao_domain::error::Result;
use ao_domain::role::LlmRole;
use ao_domain::tool::{Message, ToolDefinition};
use ao_providers::{ChatRequest, ProviderRegistry};
use ao_tools::ToolHandle;
use std::sync::Arc;

/// Upper bound on controller/tool round-trips within a single direct-QA
/// call, so a model that keeps requesting tools cannot loop forever.
const MAX_TOOL_ROUNDS: u32 = 5;

pub struct DirectQaExecutor {
    registry: Arc<ProviderRegistry>,
}

impl DirectQaExecutor {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub async fn run(
        &self,
        query: &str,
        tools: &[Arc<dyn ToolHandle>],
        memory: &[Message],
        callback: &CallbackFanout,
        session_override: Option<&str>,
    ) -> Result<String> {
        let handle = self.registry.get(LlmRole::Executor, session_override)?;
        let tool_defs: Vec<ToolDefinition> = tools
            .iter()
            .map(|t| ToolDefinition { name: t.name().to_string(), description: t.description().to_string(), input_schema: t.input_schema() })
            .collect();

        let mut messages = vec![Message::system(
            "Answer the user's request directly. Use a tool only when necessary.",
        )];
        messages.extend_from_slice(memory);
        messages.push(Message::user(query.to_string()));

        for _round in 0..MAX_TOOL_ROUNDS {
            let request = ChatRequest { messages: messages.clone(), tools: tool_defs.clone(), model: Some(handle.model.clone()), ..Default::default() };
            callback.llm_bottom_line("executor").await;
            let response = handle.provider.chat(request).await?;
            if let Some(usage) = response.usage {
                callback.token_usage(&response.model, usage, "executor").await;
            }

            if response.tool_calls.is_empty() {
                callback.final_agent_message(&response.content).await;
                return Ok(response.content);
            }

            messages.push(Message::assistant(response.content.clone()));
            for call in &response.tool_calls {
                let Some(tool) = tools.iter().find(|t| t.name() == call.tool_name) else {
                    messages.push(Message::tool_result(call.call_id.clone(), format!("tool '{}' not found", call.tool_name), true));
                    continue;
                };
                callback.tool_started(&call.tool_name).await;
                let cancel = ao_domain::cancel::CancelToken::new();
                match tool.invoke(call.arguments.clone(), cancel).await {
                    Ok(output) => {
                        callback.tool_finished(&call.tool_name).await;
                        if let Some(relative) = output.strip_prefix(ao_tools::WRITE_FILE_SUCCESS_PREFIX) {
                            callback.artifact_generated(relative).await;
                        }
                        messages.push(Message::tool_result(call.call_id.clone(), output, false));
                    }
                    Err(e) => {
                        callback.tool_errored(&call.tool_name, &e.to_string()).await;
                        messages.push(Message::tool_result(call.call_id.clone(), e.to_string(), true));
                    }
                }
            }
        }

        let fallback = "I was unable to reach a final answer within the allotted tool-call budget.".to_string();
        callback.final_agent_message(&fallback).await;
        Ok(fallback)
    }
}
