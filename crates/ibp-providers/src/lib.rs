//! Provider layer: one adapter per external inmate locator, each paired with
//! the normalizer for its record format.

mod http;
pub mod fbop;
pub mod provider;
pub mod registry;
pub mod tdcj;

pub use fbop::{FbopNormalizer, FbopProvider};
pub use http::ProviderError;
pub use provider::{FailureReason, FetchOutcome, MalformedData, Normalizer, Provider, RawRecord};
pub use registry::{JurisdictionRegistry, RegistryError};
pub use tdcj::{TdcjNormalizer, TdcjProvider};
