//! Federal Bureau of Prisons inmate locator.
//!
//! The locator answers `output=json` queries with
//! `{"InmateLocator": [{...}, ...]}`; a response without the key has no
//! matches. Results are restricted to the configured facility codes, and
//! inmates whose release date has passed are dropped.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use ibp_core::{CustodyStatus, InmateRecord, Jurisdiction, UnitRef};
use serde_json::Value;
use tracing::debug;

use crate::http::{Failure, HttpSource, ProviderError};
use crate::provider::single_match;
use crate::{FailureReason, FetchOutcome, MalformedData, Normalizer, Provider, RawRecord};

pub const NAME: &str = "fbop";

const DATE_FORMAT: &str = "%m/%d/%Y";

/// FBOP inmate locator provider.
pub struct FbopProvider {
    http: HttpSource,
    facilities: HashSet<String>,
    normalizer: FbopNormalizer,
}

impl FbopProvider {
    /// `facilities` lists the facility codes to keep; empty keeps all.
    pub fn new(locator_url: &str, facilities: &[String]) -> Result<Self, ProviderError> {
        Ok(Self {
            http: HttpSource::new(locator_url, false)?,
            facilities: facilities.iter().map(|f| f.to_ascii_uppercase()).collect(),
            normalizer: FbopNormalizer,
        })
    }

    async fn query(
        &self,
        inmate_id: &str,
        first: &str,
        last: &str,
        budget: Duration,
    ) -> Result<Vec<RawRecord>, Failure> {
        let params = [
            ("age", ""),
            ("nameMiddle", ""),
            ("output", "json"),
            ("race", ""),
            ("sex", ""),
            ("todo", "query"),
            ("nameLast", last),
            ("nameFirst", first),
            ("inmateNum", inmate_id),
        ];
        let body = self.http.send(self.http.get().query(&params), budget).await?;
        let records = parse_locator_response(&body).map_err(Failure::Transient)?;
        let records = self.retain_facilities(records);
        Ok(retain_unreleased(records, Utc::now().date_naive()))
    }

    fn retain_facilities(&self, records: Vec<RawRecord>) -> Vec<RawRecord> {
        if self.facilities.is_empty() {
            return records;
        }
        records
            .into_iter()
            .filter(|r| {
                let keep = r
                    .get("faclCode")
                    .is_some_and(|code| self.facilities.contains(&code.to_ascii_uppercase()));
                if !keep {
                    debug!(provider = NAME, facility = ?r.get("faclCode"), "dropping result outside configured facilities");
                }
                keep
            })
            .collect()
    }
}

/// Drop entries released on or before `today`.
///
/// The actual release date wins over the projected one. Entries without a
/// parseable date (life sentences and the like) are kept.
fn retain_unreleased(records: Vec<RawRecord>, today: NaiveDate) -> Vec<RawRecord> {
    records
        .into_iter()
        .filter(|r| {
            let release = r
                .get("actRelDate")
                .and_then(parse_date)
                .or_else(|| r.get("projRelDate").and_then(parse_date));
            match release {
                Some(date) if date <= today => {
                    debug!(provider = NAME, inmate_num = ?r.get("inmateNum"), %date, "dropping released inmate");
                    false
                }
                _ => true,
            }
        })
        .collect()
}

#[async_trait]
impl Provider for FbopProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn jurisdiction(&self) -> Jurisdiction {
        Jurisdiction::Federal
    }

    async fn fetch(&self, identifier: &str, budget: Duration) -> FetchOutcome {
        let inmate_id = match Jurisdiction::Federal.format_identifier(identifier) {
            Ok(id) => id,
            Err(e) => {
                return FetchOutcome::PermanentFailure(FailureReason::InvalidIdentifier(
                    e.to_string(),
                ));
            }
        };

        debug!(provider = NAME, inmate_id = %inmate_id, "querying with ID");
        match self.query(&inmate_id, "", "", budget).await {
            Ok(matches) => single_match(NAME, &inmate_id, matches),
            Err(Failure::Transient(reason)) => FetchOutcome::TransientFailure(reason),
            Err(Failure::Permanent(reason)) => FetchOutcome::PermanentFailure(reason),
        }
    }

    async fn search_by_name(
        &self,
        first: &str,
        last: &str,
        budget: Duration,
    ) -> Result<Vec<RawRecord>, FailureReason> {
        debug!(provider = NAME, "querying with name '{last}, {first}'");
        let matches = self
            .query("", first, last, budget)
            .await
            .map_err(Failure::reason)?;
        debug!(provider = NAME, count = matches.len(), "name query returned");
        Ok(matches)
    }

    fn normalizer(&self) -> &dyn Normalizer {
        &self.normalizer
    }
}

// ── JSON parsing ──

/// Extract locator entries from a response body.
///
/// Invalid JSON or a non-array `InmateLocator` is an unexpected response.
pub fn parse_locator_response(body: &str) -> Result<Vec<RawRecord>, FailureReason> {
    let value: Value = serde_json::from_str(body.trim())
        .map_err(|e| FailureReason::UnexpectedResponse(format!("invalid JSON: {e}")))?;

    let Some(entries) = value.get("InmateLocator") else {
        return Ok(Vec::new());
    };
    let entries = entries.as_array().ok_or_else(|| {
        FailureReason::UnexpectedResponse("InmateLocator is not an array".to_string())
    })?;

    let mut records = Vec::with_capacity(entries.len());
    for entry in entries {
        let object = entry.as_object().ok_or_else(|| {
            FailureReason::UnexpectedResponse("InmateLocator entry is not an object".to_string())
        })?;
        let fields: BTreeMap<String, String> = object
            .iter()
            .filter_map(|(k, v)| match v {
                Value::Null => None,
                Value::String(s) => Some((k.clone(), s.clone())),
                other => Some((k.clone(), other.to_string())),
            })
            .collect();
        records.push(RawRecord::new(NAME, fields));
    }
    Ok(records)
}

// ── Normalization ──

/// Maps FBOP locator entries onto [`InmateRecord`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FbopNormalizer;

impl Normalizer for FbopNormalizer {
    fn normalize(&self, raw: &RawRecord) -> Result<InmateRecord, MalformedData> {
        let id = Jurisdiction::Federal
            .format_identifier(raw.require("inmateNum")?)
            .map_err(|e| MalformedData::new(raw, e.to_string()))?;
        let first_name = raw.require("nameFirst")?.to_string();
        let last_name = raw.require("nameLast")?.to_string();
        let unit = raw.require("faclCode")?;

        let actual_text = raw.get("actRelDate");
        let projected_text = raw.get("projRelDate");
        let actual = actual_text.and_then(parse_date);
        let projected = projected_text.and_then(parse_date);

        let status_text = projected_text.or(actual_text).unwrap_or_default();
        let status = match (actual, projected) {
            (Some(_), _) => CustodyStatus::Released,
            (None, Some(_)) => CustodyStatus::Incarcerated,
            (None, None) => status_from_text(status_text),
        };
        let release = actual.or(projected);
        if release.is_none() {
            debug!(provider = NAME, inmate_id = %id, "failed to retrieve any release date");
        }

        Ok(InmateRecord {
            jurisdiction: Jurisdiction::Federal,
            id,
            first_name,
            last_name,
            unit: UnitRef(unit.to_string()),
            race: raw.get("race").map(str::to_string),
            sex: raw.get("sex").or_else(|| raw.get("gender")).map(str::to_string),
            url: None,
            release,
            status,
            status_text: status_text.to_string(),
            last_contact: None,
            fetched_at: raw.fetched_at,
        })
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    match NaiveDate::parse_from_str(text, DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(_) => {
            debug!(provider = NAME, date = text, "failed to parse release date");
            None
        }
    }
}

fn status_from_text(text: &str) -> CustodyStatus {
    let upper = text.to_ascii_uppercase();
    if upper.contains("DEATH") {
        CustodyStatus::DeathSentence
    } else if upper.contains("LIFE") {
        CustodyStatus::LifeSentence
    } else {
        CustodyStatus::Unknown
    }
}
