pub mod config;
pub mod jurisdiction;
pub mod record;
pub mod warning;

pub use config::{CacheSettings, ConfigError, LookupConfig, ProviderSettings};
pub use jurisdiction::{IdentifierError, Jurisdiction, UnknownJurisdiction};
pub use record::{CustodyStatus, InmateRecord, UnitRef};
pub use warning::{RequestWarning, Warning, WarningThresholds};
