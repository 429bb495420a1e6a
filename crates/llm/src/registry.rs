//! Builds the gateway's `Arc<dyn ChatClient>` from `LlmConfig`.
//!
//! Only the first configured provider is wired up — the supervisor engine
//! holds exactly one `ChatClient`, and spec.md scopes concrete LLM provider
//! selection/fallback out of the orchestration engine entirely. A registry
//! exists at all (rather than inlining this in the gateway's bootstrap) so
//! `startup_policy` stays testable in isolation, mirroring the reference
//! gateway's `ProviderRegistry::from_config`.

use std::sync::Arc;

use foreman_domain::config::{LlmConfig, LlmStartupPolicy};
use foreman_domain::Result;
use foreman_supervisor::ChatClient;

use crate::openai_compat::OpenAiCompatClient;

/// Construct the primary chat client from the first configured provider.
///
/// Returns `Ok(None)` when no providers are configured and
/// `startup_policy` is `AllowNone`; returns `Err` when construction fails
/// and `startup_policy` is `RequireOne`, or when there are no providers
/// at all under `RequireOne`.
pub fn build_chat_client(config: &LlmConfig) -> Result<Option<Arc<dyn ChatClient>>> {
    let Some(primary) = config.providers.first() else {
        return match config.startup_policy {
            LlmStartupPolicy::RequireOne => Err(foreman_domain::Error::Config(
                "llm.startup_policy = require_one but no providers are configured".into(),
            )),
            LlmStartupPolicy::AllowNone => Ok(None),
        };
    };

    match OpenAiCompatClient::from_config(primary, config.default_timeout_ms) {
        Ok(client) => {
            tracing::info!(provider_id = %client.id(), "registered LLM provider");
            Ok(Some(Arc::new(client) as Arc<dyn ChatClient>))
        }
        Err(e) => match config.startup_policy {
            LlmStartupPolicy::RequireOne => Err(e),
            LlmStartupPolicy::AllowNone => {
                tracing::warn!(provider_id = %primary.id, error = %e, "LLM provider failed to initialize, continuing without one");
                Ok(None)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foreman_domain::config::{AuthConfig, ProviderConfig, ProviderKind};

    fn provider(id: &str) -> ProviderConfig {
        ProviderConfig {
            id: id.into(),
            kind: ProviderKind::OpenaiCompat,
            base_url: "https://api.example.com/v1".into(),
            auth: AuthConfig { key: Some("sk-test".into()), ..Default::default() },
            default_model: None,
        }
    }

    #[test]
    fn no_providers_allow_none_returns_none() {
        let config = LlmConfig { startup_policy: LlmStartupPolicy::AllowNone, ..Default::default() };
        assert!(build_chat_client(&config).unwrap().is_none());
    }

    #[test]
    fn no_providers_require_one_errors() {
        let config = LlmConfig { startup_policy: LlmStartupPolicy::RequireOne, ..Default::default() };
        assert!(build_chat_client(&config).is_err());
    }

    #[test]
    fn valid_provider_builds_client() {
        let config = LlmConfig { providers: vec![provider("primary")], ..Default::default() };
        let client = build_chat_client(&config).unwrap();
        assert!(client.is_some());
    }

    #[test]
    fn unsupported_kind_with_allow_none_degrades_gracefully() {
        let mut p = provider("anthropic");
        p.kind = ProviderKind::Anthropic;
        let config = LlmConfig { providers: vec![p], startup_policy: LlmStartupPolicy::AllowNone, ..Default::default() };
        assert!(build_chat_client(&config).unwrap().is_none());
    }

    #[test]
    fn unsupported_kind_with_require_one_errors() {
        let mut p = provider("anthropic");
        p.kind = ProviderKind::Anthropic;
        let config = LlmConfig { providers: vec![p], startup_policy: LlmStartupPolicy::RequireOne, ..Default::default() };
        assert!(build_chat_client(&config).is_err());
    }
}
