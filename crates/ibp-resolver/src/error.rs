use ibp_core::{IdentifierError, Jurisdiction};
use ibp_providers::{FailureReason, MalformedData};
use thiserror::Error;

/// A transient failure from one provider, kept for diagnosis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub provider: &'static str,
    pub reason: FailureReason,
}

/// Why a resolution produced no record.
///
/// "No such inmate" is not an error; see `Resolution::NotFound`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("unsupported jurisdiction '{0}'")]
    UnsupportedJurisdiction(String),

    #[error(transparent)]
    InvalidIdentifier(#[from] IdentifierError),

    /// The source refused the lookup itself. Cached briefly.
    #[error("{provider} rejected the lookup: {reason}")]
    Rejected {
        provider: &'static str,
        reason: FailureReason,
    },

    /// The source answered in a shape its normalizer no longer understands.
    #[error(transparent)]
    MalformedUpstreamData(MalformedData),

    /// Every provider failed transiently. Never cached; safe to retry.
    #[error("temporarily unable to check {jurisdiction} records ({})", summarize(.failures))]
    ProviderUnavailable {
        jurisdiction: Jurisdiction,
        failures: Vec<ProviderFailure>,
    },

    #[error("lookup was aborted before completing")]
    Aborted,
}

impl ResolveError {
    /// True when every provider ran out of its time budget.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::ProviderUnavailable { failures, .. } => {
                !failures.is_empty() && failures.iter().all(|f| f.reason.is_timeout())
            }
            _ => false,
        }
    }

    /// True when retrying immediately could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable { .. } | Self::Aborted)
    }
}

fn summarize(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return "no providers answered".to_string();
    }
    failures
        .iter()
        .map(|f| format!("{}: {}", f.provider, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn unavailable_reads_as_temporary() {
        let err = ResolveError::ProviderUnavailable {
            jurisdiction: Jurisdiction::Federal,
            failures: vec![ProviderFailure {
                provider: "fbop",
                reason: FailureReason::Timeout(Duration::from_secs(5)),
            }],
        };
        assert_eq!(
            err.to_string(),
            "temporarily unable to check Federal records (fbop: timed out after 5.0s)"
        );
        assert!(err.is_timeout());
        assert!(err.is_retryable());
    }

    #[test]
    fn mixed_failures_are_not_a_timeout() {
        let err = ResolveError::ProviderUnavailable {
            jurisdiction: Jurisdiction::Texas,
            failures: vec![
                ProviderFailure {
                    provider: "a",
                    reason: FailureReason::Timeout(Duration::from_secs(5)),
                },
                ProviderFailure {
                    provider: "b",
                    reason: FailureReason::Status(503),
                },
            ],
        };
        assert!(!err.is_timeout());
    }

    #[test]
    fn rejected_is_terminal() {
        let err = ResolveError::Rejected {
            provider: "tdcj",
            reason: FailureReason::Status(400),
        };
        assert!(!err.is_retryable());
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "tdcj rejected the lookup: source returned HTTP 400");
    }
}
