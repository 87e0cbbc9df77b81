//! HTTP plumbing shared by the locator providers.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode, Url};
use thiserror::Error;
use tracing::debug;

use crate::FailureReason;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("invalid provider URL '{url}': {reason}")]
    Url { url: String, reason: String },
}

/// HTTP client bound to one source endpoint.
#[derive(Debug, Clone)]
pub(crate) struct HttpSource {
    client: reqwest::Client,
    url: Url,
}

impl HttpSource {
    /// `ipv4_only` pins outbound connections to IPv4 for sites with broken
    /// IPv6 routes.
    pub(crate) fn new(url: &str, ipv4_only: bool) -> Result<Self, ProviderError> {
        let url = Url::parse(url).map_err(|e| ProviderError::Url {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("ibp-lookup/", env!("CARGO_PKG_VERSION")));
        if ipv4_only {
            builder = builder.local_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        }

        Ok(Self {
            client: builder.build()?,
            url,
        })
    }

    pub(crate) fn url(&self) -> &Url {
        &self.url
    }

    pub(crate) fn get(&self) -> RequestBuilder {
        self.client.get(self.url.clone())
    }

    pub(crate) fn post(&self) -> RequestBuilder {
        self.client.post(self.url.clone())
    }

    /// Send a request within `budget` and return the response body.
    ///
    /// Only 400 and 422 are permanent; everything else that goes wrong is
    /// transient.
    pub(crate) async fn send(
        &self,
        request: RequestBuilder,
        budget: Duration,
    ) -> Result<String, Failure> {
        debug!(url = %self.url, budget_secs = budget.as_secs_f64(), "sending provider request");
        let resp = request
            .timeout(budget)
            .send()
            .await
            .map_err(|e| Failure::Transient(classify(&e, budget)))?;

        let status = resp.status();
        if !status.is_success() {
            debug!(url = %self.url, %status, "provider returned an error status");
            return Err(classify_status(status));
        }

        resp.text()
            .await
            .map_err(|e| Failure::Transient(classify(&e, budget)))
    }
}

/// Failure split by retryability, mapped onto `FetchOutcome` by callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Failure {
    Transient(FailureReason),
    Permanent(FailureReason),
}

impl Failure {
    pub(crate) fn reason(self) -> FailureReason {
        match self {
            Self::Transient(r) | Self::Permanent(r) => r,
        }
    }
}

/// A rejected query stays rejected; blocks, rate limits, and outages pass.
fn classify_status(status: StatusCode) -> Failure {
    let reason = FailureReason::Status(status.as_u16());
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Failure::Permanent(reason),
        _ => Failure::Transient(reason),
    }
}

fn classify(err: &reqwest::Error, budget: Duration) -> FailureReason {
    if err.is_timeout() {
        FailureReason::Timeout(budget)
    } else if err.is_connect() || err.is_request() {
        FailureReason::Connection(err.to_string())
    } else {
        FailureReason::UnexpectedResponse(err.to_string())
    }
}
