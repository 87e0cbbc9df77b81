//! Static mapping from jurisdiction to the providers authorized for it.

use std::collections::HashMap;
use std::sync::Arc;

use ibp_core::{Jurisdiction, ProviderSettings};
use thiserror::Error;
use tracing::{info, warn};

use crate::http::ProviderError;
use crate::{FbopProvider, Provider, TdcjProvider};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no providers registered for jurisdiction {0}")]
    Unsupported(Jurisdiction),
}

/// Ordered providers per jurisdiction: primary first, then fallbacks.
#[derive(Clone, Default)]
pub struct JurisdictionRegistry {
    providers: HashMap<Jurisdiction, Vec<Arc<dyn Provider>>>,
}

impl JurisdictionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the TDCJ and FBOP providers built from settings.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let mut registry = Self::new();
        registry
            .register(
                Jurisdiction::Texas,
                Arc::new(TdcjProvider::new(&settings.tdcj_url)?),
            )
            .register(
                Jurisdiction::Federal,
                Arc::new(FbopProvider::new(
                    &settings.fbop_url,
                    &settings.federal_facilities,
                )?),
            );
        info!(
            jurisdictions = registry.providers.len(),
            "provider registry ready"
        );
        Ok(registry)
    }

    /// Append a provider to the jurisdiction's list.
    ///
    /// A provider serving a different jurisdiction is refused.
    pub fn register(&mut self, jurisdiction: Jurisdiction, provider: Arc<dyn Provider>) -> &mut Self {
        if provider.jurisdiction() != jurisdiction {
            warn!(
                provider = provider.name(),
                serves = %provider.jurisdiction(),
                requested = %jurisdiction,
                "refusing provider registered under the wrong jurisdiction"
            );
            return self;
        }
        self.providers.entry(jurisdiction).or_default().push(provider);
        self
    }

    pub fn with_provider(mut self, jurisdiction: Jurisdiction, provider: Arc<dyn Provider>) -> Self {
        self.register(jurisdiction, provider);
        self
    }

    pub fn providers_for(&self, jurisdiction: Jurisdiction) -> Result<&[Arc<dyn Provider>], RegistryError> {
        match self.providers.get(&jurisdiction) {
            Some(list) if !list.is_empty() => Ok(list),
            _ => Err(RegistryError::Unsupported(jurisdiction)),
        }
    }

    /// Jurisdictions with at least one provider, in a stable order.
    pub fn jurisdictions(&self) -> Vec<Jurisdiction> {
        let mut list: Vec<Jurisdiction> = self
            .providers
            .iter()
            .filter(|(_, providers)| !providers.is_empty())
            .map(|(j, _)| *j)
            .collect();
        list.sort();
        list
    }
}

impl std::fmt::Debug for JurisdictionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for j in self.jurisdictions() {
            let names: Vec<&str> = self.providers[&j].iter().map(|p| p.name()).collect();
            map.entry(&j, &names);
        }
        map.finish()
    }
}
