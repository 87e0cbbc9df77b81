//! Canonical inmate record shared by every provider.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::Jurisdiction;

/// Canonical custody status, mapped from each source's release vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustodyStatus {
    /// In custody with a known or pending release date.
    Incarcerated,
    /// The source reports an actual release.
    Released,
    LifeSentence,
    DeathSentence,
    /// The source gave no usable release information.
    Unknown,
}

impl CustodyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incarcerated => "incarcerated",
            Self::Released => "released",
            Self::LifeSentence => "life sentence",
            Self::DeathSentence => "death sentence",
            Self::Unknown => "unknown",
        }
    }
}

/// Reference to a unit/facility owned by the persistence layer.
///
/// Only the source's unit name or facility code is carried here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitRef(pub String);

impl UnitRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A normalized inmate record.
///
/// Records are never mutated after construction; a refresh or an attached
/// contact date produces a new instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InmateRecord {
    pub jurisdiction: Jurisdiction,
    /// Canonical identifier in the jurisdiction's namespace.
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub unit: UnitRef,
    pub race: Option<String>,
    pub sex: Option<String>,
    /// Detail page on the source site, when the source links one.
    pub url: Option<String>,
    /// `None` when unknown or for life/death sentences.
    pub release: Option<NaiveDate>,
    pub status: CustodyStatus,
    /// The source's raw release/status text.
    pub status_text: String,
    /// Postmark of the last filled request, supplied by the application.
    pub last_contact: Option<NaiveDate>,
    pub fetched_at: DateTime<Utc>,
}

impl InmateRecord {
    pub fn full_name(&self) -> String {
        match (self.first_name.is_empty(), self.last_name.is_empty()) {
            (false, false) => format!("{} {}", self.first_name, self.last_name),
            (true, false) => self.last_name.clone(),
            (false, true) => self.first_name.clone(),
            (true, true) => String::new(),
        }
    }

    /// Copy of this record with the last-contact date replaced.
    pub fn with_last_contact(&self, last_contact: Option<NaiveDate>) -> Self {
        Self {
            last_contact,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> InmateRecord {
        InmateRecord {
            jurisdiction: Jurisdiction::Texas,
            id: "00012345".into(),
            first_name: "JOHN".into(),
            last_name: "DOE".into(),
            unit: UnitRef("Ellis".into()),
            race: Some("W".into()),
            sex: Some("M".into()),
            url: None,
            release: NaiveDate::from_ymd_opt(2027, 1, 15),
            status: CustodyStatus::Incarcerated,
            status_text: "2027-01-15".into(),
            last_contact: None,
            fetched_at: DateTime::parse_from_rfc3339("2026-10-16T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[test]
    fn full_name_joins_parts() {
        let mut r = record();
        assert_eq!(r.full_name(), "JOHN DOE");
        r.first_name.clear();
        assert_eq!(r.full_name(), "DOE");
    }

    #[test]
    fn with_last_contact_leaves_original_untouched() {
        let original = record();
        let date = NaiveDate::from_ymd_opt(2026, 6, 1);
        let updated = original.with_last_contact(date);
        assert_eq!(updated.last_contact, date);
        assert!(original.last_contact.is_none());
        assert_eq!(updated.with_last_contact(None), original);
    }

    #[test]
    fn json_keeps_explicit_nulls() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["unit"], "Ellis");
        assert_eq!(json["status"], "incarcerated");
        assert!(json["last_contact"].is_null());
        assert!(json["url"].is_null());
        assert_eq!(json["release"], "2027-01-15");
    }
}
