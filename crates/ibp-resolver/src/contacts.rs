//! Seam to the application's correspondence history.

use std::collections::HashMap;

use chrono::NaiveDate;
use ibp_core::Jurisdiction;

/// Source of the last correspondence date for an inmate.
///
/// The persistence layer owns requests and their postmarks; the resolver only
/// asks for the latest filled request's postmark.
pub trait ContactHistory: Send + Sync {
    fn last_contact(&self, jurisdiction: Jurisdiction, inmate_id: &str) -> Option<NaiveDate>;
}

/// No recorded correspondence for anyone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContactHistory;

impl ContactHistory for NoContactHistory {
    fn last_contact(&self, _: Jurisdiction, _: &str) -> Option<NaiveDate> {
        None
    }
}

/// In-memory history keyed by jurisdiction and canonical inmate id.
impl ContactHistory for HashMap<(Jurisdiction, String), NaiveDate> {
    fn last_contact(&self, jurisdiction: Jurisdiction, inmate_id: &str) -> Option<NaiveDate> {
        self.get(&(jurisdiction, inmate_id.to_string())).copied()
    }
}
