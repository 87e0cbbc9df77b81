//! Resolution pipeline.
//!
//! ```text
//! canonicalize id ─▶ cache ─hit──────────────────────────────┐
//!                      │ miss (single flight)                │
//!                      ▼                                     ▼
//!              providers in order ─▶ normalize ─▶ store ─▶ overlay last contact ─▶ warnings
//!                      │ all transient
//!                      ▼
//!               ProviderUnavailable (not stored)
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use ibp_cache::{Fill, LookupCache};
use ibp_core::{InmateRecord, Jurisdiction, LookupConfig, Warning, WarningThresholds};
use ibp_providers::{FailureReason, FetchOutcome, JurisdictionRegistry, Provider, ProviderError};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::contacts::{ContactHistory, NoContactHistory};
use crate::error::{ProviderFailure, ResolveError};

type LookupKey = (Jurisdiction, String);

/// What the cache keeps per key.
type Settled = Result<Lookup, ResolveError>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Lookup {
    Found(Arc<InmateRecord>),
    NotFound { checked_at: DateTime<Utc> },
}

/// Whether a result was served from the cache or fetched for this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Cached,
    Fetched,
}

/// A canonical record with the warnings computed for this call.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRecord {
    pub record: Arc<InmateRecord>,
    pub warnings: Vec<Warning>,
    pub freshness: Freshness,
}

impl ResolvedRecord {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Definitive answer for an (jurisdiction, identifier) pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found(ResolvedRecord),
    /// The sources were reachable and have no such inmate.
    NotFound {
        jurisdiction: Jurisdiction,
        identifier: String,
        checked_at: DateTime<Utc>,
        freshness: Freshness,
    },
}

impl Resolution {
    pub fn record(&self) -> Option<&ResolvedRecord> {
        match self {
            Self::Found(found) => Some(found),
            Self::NotFound { .. } => None,
        }
    }

    pub fn freshness(&self) -> Freshness {
        match self {
            Self::Found(found) => found.freshness,
            Self::NotFound { freshness, .. } => *freshness,
        }
    }
}

/// Name search results. Failures in one jurisdiction don't hide matches in another.
#[derive(Debug, Clone, Default)]
pub struct NameSearch {
    pub records: Vec<ResolvedRecord>,
    pub errors: Vec<(Jurisdiction, ResolveError)>,
}

/// Tunables for the resolver, usually taken from [`LookupConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverSettings {
    /// Budget for each provider call.
    pub timeout: Duration,
    pub ttl: Duration,
    pub negative_ttl: Duration,
    pub rejected_ttl: Duration,
    pub max_entries: usize,
    pub thresholds: WarningThresholds,
}

impl From<&LookupConfig> for ResolverSettings {
    fn from(config: &LookupConfig) -> Self {
        Self {
            timeout: config.providers.timeout(),
            ttl: config.cache.ttl(),
            negative_ttl: config.cache.negative_ttl(),
            rejected_ttl: config.cache.rejected_ttl(),
            max_entries: config.cache.max_entries,
            thresholds: config.warnings,
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from(&LookupConfig::default())
    }
}

struct Shared {
    registry: JurisdictionRegistry,
    cache: LookupCache<LookupKey, Settled>,
    settings: ResolverSettings,
}

/// The single entry point for inmate lookups.
///
/// Cheap to clone; clones share the registry and the cache.
#[derive(Clone)]
pub struct Resolver {
    shared: Arc<Shared>,
    contacts: Arc<dyn ContactHistory>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("registry", &self.shared.registry)
            .field("settings", &self.shared.settings)
            .field("cached", &self.shared.cache.len())
            .finish()
    }
}

impl Resolver {
    pub fn new(registry: JurisdictionRegistry, settings: ResolverSettings) -> Self {
        let cache = LookupCache::new(settings.ttl, settings.max_entries);
        Self {
            shared: Arc::new(Shared {
                registry,
                cache,
                settings,
            }),
            contacts: Arc::new(NoContactHistory),
        }
    }

    /// Resolver over the TDCJ and FBOP providers.
    pub fn from_config(config: &LookupConfig) -> Result<Self, ProviderError> {
        let registry = JurisdictionRegistry::from_settings(&config.providers)?;
        Ok(Self::new(registry, ResolverSettings::from(config)))
    }

    pub fn with_contact_history(mut self, contacts: Arc<dyn ContactHistory>) -> Self {
        self.contacts = contacts;
        self
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.shared.settings
    }

    pub fn registry(&self) -> &JurisdictionRegistry {
        &self.shared.registry
    }

    // ── Identifier lookup ──

    /// Resolve against today's date.
    pub async fn resolve(
        &self,
        jurisdiction: Jurisdiction,
        identifier: &str,
    ) -> Result<Resolution, ResolveError> {
        self.resolve_at(jurisdiction, identifier, Utc::now().date_naive())
            .await
    }

    /// Jurisdiction given by name or alias, e.g. `"State"` or `"FBOP"`.
    pub async fn resolve_str(
        &self,
        jurisdiction: &str,
        identifier: &str,
    ) -> Result<Resolution, ResolveError> {
        let jurisdiction: Jurisdiction = jurisdiction
            .parse()
            .map_err(|_| ResolveError::UnsupportedJurisdiction(jurisdiction.to_string()))?;
        self.resolve(jurisdiction, identifier).await
    }

    /// Resolve with warnings evaluated as of `today`.
    pub async fn resolve_at(
        &self,
        jurisdiction: Jurisdiction,
        identifier: &str,
        today: NaiveDate,
    ) -> Result<Resolution, ResolveError> {
        let identifier = jurisdiction.format_identifier(identifier)?;
        let providers = self.providers(jurisdiction)?;

        let key = (jurisdiction, identifier.clone());
        let settings = self.shared.settings.clone();
        let flight_id = identifier.clone();
        let (settled, origin) = self
            .shared
            .cache
            .resolve_single_flight(key, move || {
                dispatch(providers, settings, jurisdiction, flight_id)
            })
            .await
            .map_err(|_| ResolveError::Aborted)?;

        let freshness = if origin.is_cached() {
            Freshness::Cached
        } else {
            Freshness::Fetched
        };

        match settled? {
            Lookup::Found(record) => Ok(Resolution::Found(
                self.finish(record, freshness, today),
            )),
            Lookup::NotFound { checked_at } => Ok(Resolution::NotFound {
                jurisdiction,
                identifier,
                checked_at,
                freshness,
            }),
        }
    }

    /// Whether a live result for this pair is cached.
    pub fn is_cached(&self, jurisdiction: Jurisdiction, identifier: &str) -> bool {
        match jurisdiction.format_identifier(identifier) {
            Ok(id) => self.shared.cache.get(&(jurisdiction, id)).is_some(),
            Err(_) => false,
        }
    }

    /// Forget any cached result for this pair.
    pub fn invalidate(&self, jurisdiction: Jurisdiction, identifier: &str) -> bool {
        match jurisdiction.format_identifier(identifier) {
            Ok(id) => self.shared.cache.invalidate(&(jurisdiction, id)),
            Err(_) => false,
        }
    }

    /// Drop expired cache entries; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.shared.cache.purge_expired()
    }

    // ── Name search ──

    pub async fn search_by_name(
        &self,
        first: &str,
        last: &str,
        jurisdictions: &[Jurisdiction],
    ) -> NameSearch {
        self.search_by_name_at(first, last, jurisdictions, Utc::now().date_naive())
            .await
    }

    /// Search every listed jurisdiction concurrently; an empty list means all
    /// registered jurisdictions. Results are not cached.
    pub async fn search_by_name_at(
        &self,
        first: &str,
        last: &str,
        jurisdictions: &[Jurisdiction],
        today: NaiveDate,
    ) -> NameSearch {
        let mut targets = if jurisdictions.is_empty() {
            self.shared.registry.jurisdictions()
        } else {
            jurisdictions.to_vec()
        };
        targets.sort();
        targets.dedup();

        let searches = targets
            .into_iter()
            .map(|jurisdiction| self.search_jurisdiction(jurisdiction, first, last));
        let mut out = NameSearch::default();
        for (jurisdiction, results) in join_all(searches).await {
            for result in results {
                match result {
                    Ok(record) => {
                        debug!(
                            %jurisdiction,
                            name = %record.full_name(),
                            id = %record.id,
                            "name search match"
                        );
                        out.records
                            .push(self.finish(Arc::new(record), Freshness::Fetched, today));
                    }
                    Err(e) => out.errors.push((jurisdiction, e)),
                }
            }
        }
        info!(
            first,
            last,
            matches = out.records.len(),
            errors = out.errors.len(),
            "name search finished"
        );
        out
    }

    async fn search_jurisdiction(
        &self,
        jurisdiction: Jurisdiction,
        first: &str,
        last: &str,
    ) -> (Jurisdiction, Vec<Result<InmateRecord, ResolveError>>) {
        let providers = match self.providers(jurisdiction) {
            Ok(providers) => providers,
            Err(e) => return (jurisdiction, vec![Err(e)]),
        };
        let budget = self.shared.settings.timeout;
        let mut failures = Vec::new();

        for provider in providers {
            let answer =
                match tokio::time::timeout(budget, provider.search_by_name(first, last, budget))
                    .await
                {
                    Ok(answer) => answer,
                    Err(_) => Err(FailureReason::Timeout(budget)),
                };
            match answer {
                Ok(raws) => {
                    let normalizer = provider.normalizer();
                    let records = raws
                        .iter()
                        .map(|raw| {
                            normalizer.normalize(raw).map_err(|malformed| {
                                error!(
                                    provider = malformed.provider,
                                    reason = %malformed.reason,
                                    payload = %malformed.payload,
                                    "failed to normalize name search result"
                                );
                                ResolveError::MalformedUpstreamData(malformed)
                            })
                        })
                        .collect();
                    return (jurisdiction, records);
                }
                Err(reason) => {
                    warn!(provider = provider.name(), %reason, "name search failed, trying next provider");
                    failures.push(ProviderFailure {
                        provider: provider.name(),
                        reason,
                    });
                }
            }
        }

        (
            jurisdiction,
            vec![Err(ResolveError::ProviderUnavailable {
                jurisdiction,
                failures,
            })],
        )
    }

    // ── Helpers ──

    fn providers(&self, jurisdiction: Jurisdiction) -> Result<Vec<Arc<dyn Provider>>, ResolveError> {
        self.shared
            .registry
            .providers_for(jurisdiction)
            .map(|providers| providers.to_vec())
            .map_err(|_| ResolveError::UnsupportedJurisdiction(jurisdiction.to_string()))
    }

    /// Overlay the last contact date, then evaluate warnings.
    fn finish(
        &self,
        record: Arc<InmateRecord>,
        freshness: Freshness,
        today: NaiveDate,
    ) -> ResolvedRecord {
        let contact = self.contacts.last_contact(record.jurisdiction, &record.id);
        let record = if contact.is_some() && contact != record.last_contact {
            Arc::new(record.with_last_contact(contact))
        } else {
            record
        };
        let warnings = self.shared.settings.thresholds.evaluate(&record, today);
        ResolvedRecord {
            record,
            warnings,
            freshness,
        }
    }
}

/// Try each provider in order until one gives a definitive answer.
async fn dispatch(
    providers: Vec<Arc<dyn Provider>>,
    settings: ResolverSettings,
    jurisdiction: Jurisdiction,
    identifier: String,
) -> Fill<Settled> {
    let budget = settings.timeout;
    let mut failures = Vec::new();

    for provider in providers {
        let name = provider.name();
        let outcome = match tokio::time::timeout(budget, provider.fetch(&identifier, budget)).await
        {
            Ok(outcome) => outcome,
            Err(_) => FetchOutcome::TransientFailure(FailureReason::Timeout(budget)),
        };

        match outcome {
            FetchOutcome::Found(raw) => {
                return match provider.normalizer().normalize(&raw) {
                    Ok(record) => {
                        info!(provider = name, %jurisdiction, %identifier, "inmate found");
                        Fill::Store {
                            value: Ok(Lookup::Found(Arc::new(record))),
                            ttl: settings.ttl,
                        }
                    }
                    Err(malformed) => {
                        error!(
                            provider = name,
                            %identifier,
                            reason = %malformed.reason,
                            payload = %malformed.payload,
                            "failed to normalize provider record"
                        );
                        Fill::Store {
                            value: Err(ResolveError::MalformedUpstreamData(malformed)),
                            ttl: settings.rejected_ttl,
                        }
                    }
                };
            }
            FetchOutcome::NotFound => {
                info!(provider = name, %jurisdiction, %identifier, "no such inmate");
                return Fill::Store {
                    value: Ok(Lookup::NotFound {
                        checked_at: Utc::now(),
                    }),
                    ttl: settings.negative_ttl,
                };
            }
            FetchOutcome::PermanentFailure(reason) => {
                warn!(provider = name, %identifier, %reason, "lookup rejected");
                return Fill::Store {
                    value: Err(ResolveError::Rejected {
                        provider: name,
                        reason,
                    }),
                    ttl: settings.rejected_ttl,
                };
            }
            FetchOutcome::TransientFailure(reason) => {
                warn!(provider = name, %identifier, %reason, "provider failed, trying next");
                failures.push(ProviderFailure {
                    provider: name,
                    reason,
                });
            }
        }
    }

    error!(
        %jurisdiction,
        %identifier,
        attempts = failures.len(),
        "all providers unavailable"
    );
    Fill::Skip(Err(ResolveError::ProviderUnavailable {
        jurisdiction,
        failures,
    }))
}
