//! Time-sensitive warnings derived from resolved records.
//!
//! Warnings are never stored: "today" moves, so they are recomputed on every
//! resolution. Evaluation is a pure function of `(record, today)` and the
//! configured thresholds.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::InmateRecord;

pub const DEFAULT_MIN_RELEASE_DAYS: i64 = 60;
pub const DEFAULT_MIN_POSTMARK_DAYS: i64 = 90;

/// A flag raised on a resolved record for volunteer attention.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Release is within the threshold. Zero or negative `days_remaining`
    /// means the release date has already passed.
    ImminentRelease {
        release: NaiveDate,
        days_remaining: i64,
        threshold_days: i64,
    },
    /// No recorded correspondence for at least the threshold.
    StaleContact {
        last_contact: NaiveDate,
        days_since: i64,
        threshold_days: i64,
    },
}

impl Warning {
    pub fn key(&self) -> &'static str {
        match self {
            Self::ImminentRelease { .. } => "release",
            Self::StaleContact { .. } => "contact",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::ImminentRelease {
                release,
                days_remaining,
                ..
            } if *days_remaining <= 0 => format!("marked as released ({release})"),
            Self::ImminentRelease {
                release,
                days_remaining,
                ..
            } => format!("{days_remaining} day(s) from release ({release})"),
            Self::StaleContact {
                last_contact,
                days_since,
                ..
            } => format!("no contact in {days_since} day(s) (last postmark {last_contact})"),
        }
    }
}

/// Warning raised against a new request's postmark date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestWarning {
    /// A filled request carries a later postmark than this one.
    PostmarkBeforeLast { last_filled: NaiveDate },
    /// Postmarked the same day as the last filled request.
    SamePostmark { last_filled: NaiveDate },
    TooSoon {
        last_filled: NaiveDate,
        days_since: i64,
        threshold_days: i64,
    },
}

impl RequestWarning {
    pub fn message(&self) -> String {
        match self {
            Self::PostmarkBeforeLast { .. } => {
                "There is a request with a postmark after this one.".to_string()
            }
            Self::SamePostmark { .. } => "No time has transpired since the last postmark.".to_string(),
            Self::TooSoon { days_since, .. } => {
                format!("Only {days_since} days since last postmark.")
            }
        }
    }
}

/// Thresholds for warning evaluation, in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarningThresholds {
    pub min_release_days: i64,
    pub min_postmark_days: i64,
}

impl Default for WarningThresholds {
    fn default() -> Self {
        Self {
            min_release_days: DEFAULT_MIN_RELEASE_DAYS,
            min_postmark_days: DEFAULT_MIN_POSTMARK_DAYS,
        }
    }
}

impl WarningThresholds {
    /// Evaluate record warnings as of `today`.
    ///
    /// Output order is fixed (release before contact). A missing release date
    /// or missing contact date never raises a warning.
    pub fn evaluate(&self, record: &InmateRecord, today: NaiveDate) -> Vec<Warning> {
        let mut warnings = Vec::with_capacity(2);

        if let Some(release) = record.release {
            let days_remaining = (release - today).num_days();
            if days_remaining <= self.min_release_days {
                warnings.push(Warning::ImminentRelease {
                    release,
                    days_remaining,
                    threshold_days: self.min_release_days,
                });
            }
        }

        if let Some(last_contact) = record.last_contact {
            let days_since = (today - last_contact).num_days();
            if days_since >= self.min_postmark_days {
                warnings.push(Warning::StaleContact {
                    last_contact,
                    days_since,
                    threshold_days: self.min_postmark_days,
                });
            }
        }

        warnings
    }

    /// Check a new request's postmark against the last filled request.
    pub fn evaluate_request(
        &self,
        last_filled: Option<NaiveDate>,
        postmark: NaiveDate,
    ) -> Option<RequestWarning> {
        let last_filled = last_filled?;
        let days_since = (postmark - last_filled).num_days();

        if days_since < 0 {
            Some(RequestWarning::PostmarkBeforeLast { last_filled })
        } else if days_since == 0 {
            Some(RequestWarning::SamePostmark { last_filled })
        } else if days_since < self.min_postmark_days {
            Some(RequestWarning::TooSoon {
                last_filled,
                days_since,
                threshold_days: self.min_postmark_days,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CustodyStatus, Jurisdiction, UnitRef};
    use chrono::{Days, Utc};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn record(release: Option<NaiveDate>, last_contact: Option<NaiveDate>) -> InmateRecord {
        InmateRecord {
            jurisdiction: Jurisdiction::Texas,
            id: "00012345".into(),
            first_name: "JOHN".into(),
            last_name: "DOE".into(),
            unit: UnitRef("Ellis".into()),
            race: None,
            sex: None,
            url: None,
            release,
            status: CustodyStatus::Incarcerated,
            status_text: String::new(),
            last_contact,
            fetched_at: Utc::now(),
        }
    }

    fn plus(days: u64) -> NaiveDate {
        today().checked_add_days(Days::new(days)).unwrap()
    }

    fn minus(days: u64) -> NaiveDate {
        today().checked_sub_days(Days::new(days)).unwrap()
    }

    #[test]
    fn release_in_thirty_days_and_stale_contact() {
        let r = record(Some(plus(30)), Some(minus(120)));
        let warnings = WarningThresholds::default().evaluate(&r, today());
        assert_eq!(
            warnings,
            vec![
                Warning::ImminentRelease {
                    release: plus(30),
                    days_remaining: 30,
                    threshold_days: 60,
                },
                Warning::StaleContact {
                    last_contact: minus(120),
                    days_since: 120,
                    threshold_days: 90,
                },
            ]
        );
    }

    #[test]
    fn missing_dates_raise_nothing() {
        let r = record(None, None);
        assert!(WarningThresholds::default().evaluate(&r, today()).is_empty());
    }

    #[test]
    fn thresholds_are_inclusive() {
        let t = WarningThresholds::default();
        let at_release = record(Some(plus(60)), None);
        assert_eq!(t.evaluate(&at_release, today()).len(), 1);
        let past_release = record(Some(plus(61)), None);
        assert!(t.evaluate(&past_release, today()).is_empty());

        let at_contact = record(None, Some(minus(90)));
        assert_eq!(t.evaluate(&at_contact, today()).len(), 1);
        let recent_contact = record(None, Some(minus(89)));
        assert!(t.evaluate(&recent_contact, today()).is_empty());
    }

    #[test]
    fn evaluation_is_deterministic() {
        let r = record(Some(plus(10)), Some(minus(200)));
        let t = WarningThresholds::default();
        assert_eq!(t.evaluate(&r, today()), t.evaluate(&r, today()));
    }

    #[test]
    fn warnings_accumulate_monotonically_as_time_passes() {
        let r = record(Some(plus(100)), Some(minus(50)));
        let t = WarningThresholds::default();
        let mut previous = 0;
        for offset in 0..120 {
            let count = t.evaluate(&r, plus(offset)).len();
            assert!(count >= previous, "warnings dropped at offset {offset}");
            previous = count;
        }
        assert_eq!(previous, 2);
    }

    #[test]
    fn past_release_reads_as_released() {
        let r = record(Some(minus(3)), None);
        let warnings = WarningThresholds::default().evaluate(&r, today());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].key(), "release");
        assert!(warnings[0].message().starts_with("marked as released"));
    }

    #[test]
    fn custom_thresholds_apply() {
        let t = WarningThresholds {
            min_release_days: 7,
            min_postmark_days: 30,
        };
        let r = record(Some(plus(30)), Some(minus(45)));
        let warnings = t.evaluate(&r, today());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].key(), "contact");
    }

    #[test]
    fn request_postmark_warnings() {
        let t = WarningThresholds::default();
        let last = minus(30);

        assert_eq!(t.evaluate_request(None, today()), None);
        assert_eq!(
            t.evaluate_request(Some(last), minus(40)),
            Some(RequestWarning::PostmarkBeforeLast { last_filled: last })
        );
        assert_eq!(
            t.evaluate_request(Some(last), last),
            Some(RequestWarning::SamePostmark { last_filled: last })
        );
        assert_eq!(
            t.evaluate_request(Some(last), today()),
            Some(RequestWarning::TooSoon {
                last_filled: last,
                days_since: 30,
                threshold_days: 90,
            })
        );
        assert_eq!(t.evaluate_request(Some(minus(90)), today()), None);
    }

    #[test]
    fn request_warning_messages() {
        let w = RequestWarning::TooSoon {
            last_filled: minus(12),
            days_since: 12,
            threshold_days: 90,
        };
        assert_eq!(w.message(), "Only 12 days since last postmark.");
    }
}
