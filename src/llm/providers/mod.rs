//! LLM provider implementations.
//!
//! `build(config)` is the factory: called once at startup. It constructs one
//! provider per [`AdapterKind`] and loads the model routing table.

pub mod chat_completions;
pub mod dummy;
pub mod inference;
mod wire;

use crate::config::Config;
use crate::llm::registry::ProviderRegistry;
use crate::llm::{AdapterKind, LlmProvider, ProviderError};

/// Construct the provider registry from config.
///
/// Credentials are already resolved from the environment; a missing key does
/// not fail here, the affected provider reports it per call instead.
pub fn build(config: &Config) -> Result<ProviderRegistry, ProviderError> {
    let mut registry = ProviderRegistry::new(config.routing.default);

    registry.register(
        AdapterKind::ChatCompletions,
        LlmProvider::ChatCompletions(chat_completions::ChatCompletionsProvider::new(
            &config.providers.chat_completions,
        )?),
    );
    registry.register(
        AdapterKind::Inference,
        LlmProvider::Inference(inference::InferenceProvider::new(&config.providers.inference)?),
    );
    registry.register(AdapterKind::Dummy, LlmProvider::Dummy(dummy::DummyProvider::default()));

    for (model, kind) in &config.routing.models {
        registry.route(model.clone(), *kind);
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_routes_configured_models() {
        let config = Config::test_default();
        let registry = build(&config).unwrap();
        assert_eq!(registry.select("grok-3-mini"), AdapterKind::Inference);
        assert_eq!(registry.select("gpt-4o-mini"), AdapterKind::ChatCompletions);
        assert_eq!(
            registry.resolve("grok-3-mini").unwrap().1.kind(),
            AdapterKind::Inference
        );
    }

    #[test]
    fn every_kind_has_a_provider() {
        let registry = build(&Config::test_default()).unwrap();
        for kind in [AdapterKind::ChatCompletions, AdapterKind::Inference, AdapterKind::Dummy] {
            assert_eq!(registry.get(kind).unwrap().kind(), kind);
        }
    }
}
