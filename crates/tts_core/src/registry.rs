//! Provider lookup table

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::GeneratedError;
use crate::ports::TtsProvider;
use crate::providers;
use crate::types::ProviderId;

/// Maps each provider id to its implementation
///
/// Built once and shared read-only. Entries can be replaced before the
/// registry is handed to a client, e.g. to substitute a test double.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<ProviderId, Arc<dyn TtsProvider>>,
}

impl ProviderRegistry {
    /// Registry without any provider
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding every built-in provider
    #[must_use]
    pub fn with_defaults() -> Self {
        let providers = ProviderId::ALL
            .into_iter()
            .map(|id| (id, providers::builtin(id)))
            .collect();
        Self { providers }
    }

    /// Add or replace the implementation for `id`
    pub fn register(&mut self, id: ProviderId, provider: Arc<dyn TtsProvider>) -> &mut Self {
        self.providers.insert(id, provider);
        self
    }

    /// Builder form of [`register`](Self::register)
    #[must_use]
    pub fn with(mut self, id: ProviderId, provider: Arc<dyn TtsProvider>) -> Self {
        self.register(id, provider);
        self
    }

    /// Implementation for `id`
    ///
    /// # Errors
    ///
    /// Returns a `validation_error` if nothing is registered under `id`.
    pub fn get(&self, id: ProviderId) -> Result<Arc<dyn TtsProvider>, GeneratedError> {
        self.providers.get(&id).cloned().ok_or_else(|| {
            GeneratedError::validation(format!("No provider registered for {id}")).with_provider(id)
        })
    }

    /// Implementation for a provider given by name
    ///
    /// # Errors
    ///
    /// Returns a `validation_error` for an unknown name or an unregistered
    /// provider.
    pub fn get_by_name(&self, name: &str) -> Result<Arc<dyn TtsProvider>, GeneratedError> {
        let id = name.parse::<ProviderId>().map_err(GeneratedError::validation)?;
        self.get(id)
    }

    /// Registered ids in canonical order
    #[must_use]
    pub fn ids(&self) -> Vec<ProviderId> {
        self.providers.keys().copied().collect()
    }
}
