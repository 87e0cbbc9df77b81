//! Lookup cache: TTL entries, negative results, single-flight resolution.

mod error;
pub use error::CacheError;

mod lookup;
pub use lookup::{Fill, LookupCache, Origin};
