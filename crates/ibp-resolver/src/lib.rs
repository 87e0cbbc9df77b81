//! Inmate lookup resolution.
//!
//! [`Resolver`] answers "who is inmate `id` in `jurisdiction`?" by consulting
//! the lookup cache, dispatching to the jurisdiction's providers on a miss,
//! normalizing the first definitive answer, and attaching warnings.

mod contacts;
pub use contacts::{ContactHistory, NoContactHistory};

mod error;
pub use error::{ProviderFailure, ResolveError};

mod resolver;
pub use resolver::{Freshness, NameSearch, Resolution, ResolvedRecord, Resolver, ResolverSettings};
