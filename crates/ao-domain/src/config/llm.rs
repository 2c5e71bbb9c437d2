use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model id used when a role has no explicit override.
    #[serde(default = "d_default_model")]
    pub default_model_id: String,
    /// Per-role model id overrides, keyed by `LlmRole::as_str()`.
    #[serde(default)]
    pub role_model_ids: HashMap<String, String>,
    /// Registered LLM providers (data-driven: adding a provider = adding config).
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default = "d_timeout_ms")]
    pub default_timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_model_id: d_default_model(),
            role_model_ids: HashMap::new(),
            providers: Vec::new(),
            default_timeout_ms: d_timeout_ms(),
        }
    }
}

/// One registered provider and the models it exposes. `available_models`
/// drives the `available_models` outbound message (§6) as-is; it is not
/// validated against the provider's live catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub available_models: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Environment variable holding the API key. Absent means no auth header
    /// is sent (local/dev providers).
    #[serde(default)]
    pub env: Option<String>,
}

fn d_default_model() -> String {
    "gpt-4o-mini".into()
}
fn d_timeout_ms() -> u64 {
    60_000
}
