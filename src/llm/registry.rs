//! Model routing table.
//!
//! Maps a requested model identifier to an [`AdapterKind`], and each kind to
//! the [`LlmProvider`] instance that serves it. Unlisted models fall back to
//! the default kind, so call sites never branch on model names.

use std::collections::HashMap;

use super::{AdapterKind, LlmProvider, ProviderError};

#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    default_kind: AdapterKind,
    routes: HashMap<String, AdapterKind>,
    providers: HashMap<AdapterKind, LlmProvider>,
}

impl ProviderRegistry {
    pub fn new(default_kind: AdapterKind) -> Self {
        Self {
            default_kind,
            routes: HashMap::new(),
            providers: HashMap::new(),
        }
    }

    /// Route `model` to `kind`. A later call for the same model replaces it.
    pub fn route(&mut self, model: impl Into<String>, kind: AdapterKind) {
        self.routes.insert(model.into(), kind);
    }

    /// Install `provider` as the implementation behind `kind`.
    ///
    /// The provider does not have to be of the same variant as `kind`; tests
    /// put a recording dummy behind the restricted kinds.
    pub fn register(&mut self, kind: AdapterKind, provider: LlmProvider) {
        self.providers.insert(kind, provider);
    }

    /// Pure lookup: routed kind for `model`, or the default kind.
    pub fn select(&self, model: &str) -> AdapterKind {
        self.routes.get(model).copied().unwrap_or(self.default_kind)
    }

    pub fn get(&self, kind: AdapterKind) -> Result<&LlmProvider, ProviderError> {
        self.providers
            .get(&kind)
            .ok_or_else(|| ProviderError::UnknownProvider(kind.to_string()))
    }

    /// Kind and provider serving `model`.
    pub fn resolve(&self, model: &str) -> Result<(AdapterKind, &LlmProvider), ProviderError> {
        let kind = self.select(model);
        self.get(kind).map(|p| (kind, p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::dummy::DummyProvider;

    fn registry() -> ProviderRegistry {
        let mut r = ProviderRegistry::new(AdapterKind::ChatCompletions);
        r.route("grok-3-mini", AdapterKind::Inference);
        r
    }

    #[test]
    fn routed_model_selects_its_kind() {
        assert_eq!(registry().select("grok-3-mini"), AdapterKind::Inference);
    }

    #[test]
    fn unlisted_model_selects_default() {
        let r = registry();
        assert_eq!(r.select("gpt-4o-mini"), AdapterKind::ChatCompletions);
        assert_eq!(r.select(""), AdapterKind::ChatCompletions);
    }

    #[test]
    fn select_is_case_sensitive() {
        assert_eq!(registry().select("GROK-3-MINI"), AdapterKind::ChatCompletions);
    }

    #[test]
    fn resolve_without_provider_errors() {
        let err = registry().resolve("grok-3-mini").unwrap_err();
        assert!(matches!(err, ProviderError::UnknownProvider(ref k) if k == "inference"));
    }

    #[test]
    fn resolve_returns_registered_provider() {
        let mut r = registry();
        r.register(AdapterKind::Inference, LlmProvider::Dummy(DummyProvider::default()));
        let (kind, provider) = r.resolve("grok-3-mini").unwrap();
        assert_eq!(kind, AdapterKind::Inference);
        assert_eq!(provider.kind(), AdapterKind::Dummy);
    }
}
