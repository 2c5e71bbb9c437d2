//! Session runtime (§4.8): per-connection state. Confined to the
//! connection's own receive loop, so no locking is needed beyond what the
//! persistence store and cancel map already provide.

use std::collections::{HashMap, VecDeque};

use ao_domain::role::LlmRole;
use ao_domain::tool::Message;

/// One entry per user/assistant turn kept for LLM context. The window holds
/// `2 * memory_window` messages (one user + one assistant per turn).
pub struct SessionRuntime {
    pub session_id: String,
    pub current_task_id: Option<String>,
    pub memory: VecDeque<Message>,
    pub memory_window: usize,
    pub role_overrides: HashMap<LlmRole, String>,
    /// The query a displayed-for-confirmation plan was generated from,
    /// consumed by `execute_confirmed_plan` (the client echoes back the
    /// edited steps, not the original question).
    pub pending_user_query: Option<String>,
}

impl SessionRuntime {
    pub fn new(session_id: String, memory_window: usize) -> Self {
        Self {
            session_id,
            current_task_id: None,
            memory: VecDeque::new(),
            memory_window,
            role_overrides: HashMap::new(),
            pending_user_query: None,
        }
    }

    /// Cancel-map key for this connection. Stable for the connection's
    /// lifetime; the cancel map tracks at most one in-flight pipeline task
    /// per session at a time (§4.9's concurrency invariant).
    pub fn cancel_key(&self) -> &str {
        &self.session_id
    }

    pub fn memory_slice(&self) -> Vec<Message> {
        self.memory.iter().cloned().collect()
    }

    pub fn clear_memory(&mut self) {
        self.memory.clear();
    }

    pub fn push_turn(&mut self, user: Message, assistant: Message) {
        self.memory.push_back(user);
        self.memory.push_back(assistant);
        while self.memory.len() > self.memory_window * 2 {
            self.memory.pop_front();
        }
    }

    pub fn push_user_only(&mut self, user: Message) {
        self.memory.push_back(user);
        while self.memory.len() > self.memory_window * 2 {
            self.memory.pop_front();
        }
    }

    pub fn session_override(&self, role: LlmRole) -> Option<&str> {
        self.role_overrides.get(&role).map(String::as_str)
    }

    /// `set_llm` adjusts the executor role's override; `""` resets to
    /// default (removes the override).
    pub fn set_llm(&mut self, model_id: &str) {
        set_or_clear(&mut self.role_overrides, LlmRole::Executor, model_id);
    }

    pub fn set_role_llm(&mut self, role: LlmRole, model_id: &str) {
        set_or_clear(&mut self.role_overrides, role, model_id);
    }
}

fn set_or_clear(overrides: &mut HashMap<LlmRole, String>, role: LlmRole, model_id: &str) {
    if model_id.is_empty() {
        overrides.remove(&role);
    } else {
        overrides.insert(role, model_id.to_string());
    }
}

pub fn parse_role(s: &str) -> Option<LlmRole> {
    LlmRole::ALL.into_iter().find(|r| r.as_str() == s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_window_caps_at_2k_messages() {
        let mut session = SessionRuntime::new("s1".into(), 2);
        for i in 0..5 {
            session.push_turn(Message::user(format!("u{i}")), Message::assistant(format!("a{i}")));
        }
        assert_eq!(session.memory.len(), 4);
        assert_eq!(session.memory.front().unwrap().content.text().unwrap(), "u3");
    }

    #[test]
    fn set_llm_empty_string_resets_to_default() {
        let mut session = SessionRuntime::new("s1".into(), 5);
        session.set_llm("gpt-4o-mini");
        assert_eq!(session.session_override(LlmRole::Executor), Some("gpt-4o-mini"));
        session.set_llm("");
        assert_eq!(session.session_override(LlmRole::Executor), None);
    }

    #[test]
    fn parse_role_accepts_all_known_roles() {
        for role in LlmRole::ALL {
            assert_eq!(parse_role(role.as_str()), Some(role));
        }
        assert_eq!(parse_role("not-a-role"), None);
    }
}
