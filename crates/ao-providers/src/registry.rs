//! LLM role registry (§4.3).
//!
//! Resolves a model handle for a role using, in order: a session override
//! for that role, the process-wide default configured for that role, and
//! finally the global system default. Each candidate model id must be
//! declared in some provider's `available_models` list. A resolution
//! failure is allowed exactly one fallback to the global default before
//! the call fails.

use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;
use ao_domain::config::LlmConfig;
use ao_domain::error::{Error, Result};
use ao_domain::role::LlmRole;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A resolved (provider, model) pair ready to drive a `ChatRequest`.
#[derive(Clone)]
pub struct LlmHandle {
    pub provider: Arc<dyn LlmProvider>,
    pub model: String,
}

pub struct ProviderRegistry {
    providers: Vec<Arc<dyn LlmProvider>>,
    role_model_ids: HashMap<String, String>,
    default_model_id: String,
    handle_cache: Mutex<HashMap<(String, String), Arc<LlmHandle>>>,
}

impl ProviderRegistry {
    /// Build the registry from the application's `LlmConfig`. Providers
    /// that fail to initialize are logged and skipped; the registry itself
    /// never fails to construct (unresolvable roles surface errors lazily,
    /// at call time, per the role-registry's own fallback contract).
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut providers: Vec<Arc<dyn LlmProvider>> = Vec::new();

        for pc in &config.providers {
            match OpenAiCompatProvider::from_config(pc) {
                Ok(p) => {
                    tracing::info!(provider_id = %pc.id, "registered LLM provider");
                    providers.push(Arc::new(p));
                }
                Err(e) => {
                    tracing::warn!(provider_id = %pc.id, error = %e, "failed to initialize LLM provider, skipping");
                }
            }
        }

        Ok(Self {
            providers,
            role_model_ids: config.role_model_ids.clone(),
            default_model_id: config.default_model_id.clone(),
            handle_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Build a registry from already-constructed providers. Used by tests
    /// and embedders that need to inject a non-HTTP provider.
    pub fn with_providers(providers: Vec<Arc<dyn LlmProvider>>, role_model_ids: HashMap<String, String>, default_model_id: String) -> Self {
        Self { providers, role_model_ids, default_model_id, handle_cache: Mutex::new(HashMap::new()) }
    }

    fn provider_for_model(&self, model_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers
            .iter()
            .find(|p| p.available_models().iter().any(|m| m == model_id))
            .cloned()
    }

    fn handle_for(&self, model_id: &str) -> Option<Arc<LlmHandle>> {
        let provider = self.provider_for_model(model_id)?;
        let key = (provider.provider_id().to_string(), model_id.to_string());
        let mut cache = self.handle_cache.lock();
        if let Some(h) = cache.get(&key) {
            return Some(h.clone());
        }
        let handle = Arc::new(LlmHandle {
            provider,
            model: model_id.to_string(),
        });
        cache.insert(key, handle.clone());
        Some(handle)
    }

    /// Resolve a handle for `role`, honoring `session_override` first.
    ///
    /// Precedence: session override -> process-default for the role ->
    /// global system default. If the winning candidate has no provider,
    /// exactly one fallback to the global default is attempted; a second
    /// failure is fatal for the call.
    pub fn get(&self, role: LlmRole, session_override: Option<&str>) -> Result<Arc<LlmHandle>> {
        let candidate = session_override
            .map(|s| s.to_string())
            .or_else(|| self.role_model_ids.get(role.as_str()).cloned())
            .unwrap_or_else(|| self.default_model_id.clone());

        if let Some(handle) = self.handle_for(&candidate) {
            return Ok(handle);
        }

        tracing::warn!(
            role = %role,
            requested_model = %candidate,
            "no provider declares requested model, falling back to system default"
        );

        if candidate == self.default_model_id {
            return Err(Error::Provider {
                provider: "registry".into(),
                message: format!("no provider declares model \"{candidate}\" (system default)"),
            });
        }

        self.handle_for(&self.default_model_id).ok_or_else(|| Error::Provider {
            provider: "registry".into(),
            message: format!(
                "no provider declares requested model \"{candidate}\" or fallback default \"{}\"",
                self.default_model_id
            ),
        })
    }

    /// `{provider_id: [model_ids]}` view used by the `available_models`
    /// outbound message (§6).
    pub fn available_models_by_provider(&self) -> HashMap<String, Vec<String>> {
        self.providers
            .iter()
            .map(|p| (p.provider_id().to_string(), p.available_models().to_vec()))
            .collect()
    }

    pub fn default_model_id(&self) -> &str {
        &self.default_model_id
    }

    pub fn role_model_ids(&self) -> &HashMap<String, String> {
        &self.role_model_ids
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ao_domain::config::{AuthConfig, ProviderConfig};

    fn cfg_with_models(models: &[&str]) -> LlmConfig {
        LlmConfig {
            default_model_id: models.first().map(|s| s.to_string()).unwrap_or_default(),
            role_model_ids: HashMap::new(),
            providers: vec![ProviderConfig {
                id: "test-provider".into(),
                base_url: "http://localhost:9999".into(),
                auth: AuthConfig { env: None },
                available_models: models.iter().map(|s| s.to_string()).collect(),
            }],
            default_timeout_ms: 1000,
        }
    }

    #[test]
    fn resolves_global_default_when_no_overrides() {
        let cfg = cfg_with_models(&["model-a"]);
        let registry = ProviderRegistry::from_config(&cfg).unwrap();
        let handle = registry.get(LlmRole::Planner, None).unwrap();
        assert_eq!(handle.model, "model-a");
    }

    #[test]
    fn session_override_wins_over_role_and_default() {
        let mut cfg = cfg_with_models(&["model-a", "model-b"]);
        cfg.role_model_ids.insert("planner".into(), "model-b".into());
        let registry = ProviderRegistry::from_config(&cfg).unwrap();
        let handle = registry.get(LlmRole::Planner, Some("model-a")).unwrap();
        assert_eq!(handle.model, "model-a");
    }

    #[test]
    fn role_default_wins_over_global_default() {
        let mut cfg = cfg_with_models(&["model-a", "model-b"]);
        cfg.role_model_ids.insert("planner".into(), "model-b".into());
        let registry = ProviderRegistry::from_config(&cfg).unwrap();
        let handle = registry.get(LlmRole::Planner, None).unwrap();
        assert_eq!(handle.model, "model-b");
    }

    #[test]
    fn unresolvable_candidate_falls_back_to_default_once() {
        let cfg = cfg_with_models(&["model-a"]);
        let registry = ProviderRegistry::from_config(&cfg).unwrap();
        let handle = registry.get(LlmRole::Controller, Some("nonexistent")).unwrap();
        assert_eq!(handle.model, "model-a");
    }

    #[test]
    fn unresolvable_default_is_fatal() {
        let cfg = cfg_with_models(&[]);
        let registry = ProviderRegistry::from_config(&cfg).unwrap();
        assert!(registry.get(LlmRole::Controller, Some("nonexistent")).is_err());
    }
}
