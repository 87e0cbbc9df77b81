use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The shared producer panicked before publishing a value.
    #[error("in-flight resolution was aborted before completing")]
    FlightAborted,
}
