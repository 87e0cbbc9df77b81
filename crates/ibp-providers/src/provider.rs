//! The provider capability and its tagged outcomes.
//!
//! A provider fetches raw data from one external source. It never returns
//! canonical records itself: its paired [`Normalizer`] turns a [`RawRecord`]
//! into an [`InmateRecord`], so a source-format change is contained to one
//! normalizer.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ibp_core::{InmateRecord, Jurisdiction};
use thiserror::Error;
use tracing::error;

/// Why a provider call did not produce a definitive answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The call exceeded its budget.
    Timeout(Duration),
    /// Connecting to or talking with the source failed.
    Connection(String),
    /// The source answered with a non-success HTTP status.
    Status(u16),
    /// The response did not have the expected shape.
    UnexpectedResponse(String),
    /// The identifier is not valid for this source.
    InvalidIdentifier(String),
}

impl FailureReason {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(budget) => write!(f, "timed out after {:.1}s", budget.as_secs_f64()),
            Self::Connection(msg) => write!(f, "connection failed: {msg}"),
            Self::Status(code) => write!(f, "source returned HTTP {code}"),
            Self::UnexpectedResponse(msg) => write!(f, "unexpected response: {msg}"),
            Self::InvalidIdentifier(msg) => write!(f, "invalid identifier: {msg}"),
        }
    }
}

/// Outcome of a single identifier fetch.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Found(RawRecord),
    /// The identifier does not exist in this source.
    NotFound,
    /// Retryable: timeouts, connection errors, unexpected response shapes.
    TransientFailure(FailureReason),
    /// Terminal: the source rejected the request itself.
    PermanentFailure(FailureReason),
}

/// Loosely structured payload from one source, opaque outside its normalizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Name of the provider that produced this record.
    pub provider: &'static str,
    pub fields: BTreeMap<String, String>,
    pub fetched_at: DateTime<Utc>,
}

impl RawRecord {
    pub fn new(provider: &'static str, fields: BTreeMap<String, String>) -> Self {
        Self {
            provider,
            fields,
            fetched_at: Utc::now(),
        }
    }

    /// Trimmed, non-empty field value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn require(&self, key: &str) -> Result<&str, MalformedData> {
        self.get(key)
            .ok_or_else(|| MalformedData::new(self, format!("missing field '{key}'")))
    }

    /// Compact reference used when logging a payload that failed to normalize.
    pub fn reference(&self) -> String {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(k, v)| format!("{k}={v:?}"))
            .collect();
        format!(
            "{}@{} {{{}}}",
            self.provider,
            self.fetched_at.to_rfc3339(),
            fields.join(", ")
        )
    }
}

/// The source's response shape no longer matches its normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed {provider} record: {reason}")]
pub struct MalformedData {
    pub provider: &'static str,
    pub reason: String,
    /// See [`RawRecord::reference`].
    pub payload: String,
}

impl MalformedData {
    pub fn new(raw: &RawRecord, reason: impl Into<String>) -> Self {
        Self {
            provider: raw.provider,
            reason: reason.into(),
            payload: raw.reference(),
        }
    }
}

/// Pure transformation from one source's raw records to canonical records.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, raw: &RawRecord) -> Result<InmateRecord, MalformedData>;
}

/// One external inmate data source.
///
/// Implementations hold no mutable state shared across calls; concurrent
/// fetches are independent.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short, stable name used in logs and errors.
    fn name(&self) -> &'static str;

    fn jurisdiction(&self) -> Jurisdiction;

    /// Fetch one inmate by identifier within `budget`.
    async fn fetch(&self, identifier: &str, budget: Duration) -> FetchOutcome;

    /// Best-effort name search. Sources without name search return no matches.
    async fn search_by_name(
        &self,
        _first: &str,
        _last: &str,
        _budget: Duration,
    ) -> Result<Vec<RawRecord>, FailureReason> {
        Ok(Vec::new())
    }

    fn normalizer(&self) -> &dyn Normalizer;
}

/// Collapse an identifier query's matches into a single outcome.
pub(crate) fn single_match(
    provider: &'static str,
    identifier: &str,
    mut matches: Vec<RawRecord>,
) -> FetchOutcome {
    match matches.len() {
        0 => FetchOutcome::NotFound,
        1 => FetchOutcome::Found(matches.remove(0)),
        n => {
            error!(
                provider,
                identifier,
                count = n,
                "multiple results were returned for an ID query"
            );
            FetchOutcome::Found(matches.remove(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> RawRecord {
        RawRecord::new(
            "test",
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn get_trims_and_skips_blank_values() {
        let r = raw(&[("a", "  x "), ("b", "   ")]);
        assert_eq!(r.get("a"), Some("x"));
        assert_eq!(r.get("b"), None);
        assert_eq!(r.get("c"), None);
    }

    #[test]
    fn require_reports_missing_field() {
        let r = raw(&[("a", "1")]);
        let err = r.require("Name").unwrap_err();
        assert_eq!(err.provider, "test");
        assert_eq!(err.to_string(), "malformed test record: missing field 'Name'");
        assert!(err.payload.contains("a=\"1\""));
    }

    #[test]
    fn single_match_takes_first_of_many() {
        let first = raw(&[("id", "1")]);
        let second = raw(&[("id", "2")]);
        match single_match("test", "1", vec![first.clone(), second]) {
            FetchOutcome::Found(r) => assert_eq!(r, first),
            other => panic!("expected Found, got {other:?}"),
        }
        assert!(matches!(
            single_match("test", "1", Vec::new()),
            FetchOutcome::NotFound
        ));
    }

    #[test]
    fn failure_reason_display() {
        assert_eq!(
            FailureReason::Timeout(Duration::from_secs(5)).to_string(),
            "timed out after 5.0s"
        );
        assert_eq!(FailureReason::Status(503).to_string(), "source returned HTTP 503");
        assert!(FailureReason::Timeout(Duration::ZERO).is_timeout());
        assert!(!FailureReason::Status(500).is_timeout());
    }
}
