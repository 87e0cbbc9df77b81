//! Texas Department of Criminal Justice inmate search.
//!
//! The search form answers with an HTML page whose `tdcj_table` holds one
//! header row of `<th>` cells and one `<td>` row per match. Each row becomes a
//! [`RawRecord`] keyed by the header text, plus a `url` field for the detail
//! link.

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use ibp_core::{CustodyStatus, InmateRecord, Jurisdiction, UnitRef};
use regex::{Captures, Regex};
use reqwest::Url;
use tracing::debug;

use crate::http::{Failure, HttpSource, ProviderError};
use crate::provider::single_match;
use crate::{FailureReason, FetchOutcome, MalformedData, Normalizer, Provider, RawRecord};

pub const NAME: &str = "tdcj";

const RELEASE_DATE_FORMAT: &str = "%Y-%m-%d";

static TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<table[^>]*class\s*=\s*"[^"]*\btdcj_table\b[^"]*"[^>]*>(.*?)</table>"#)
        .unwrap()
});
static ROW_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").unwrap());
static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<th\b[^>]*>(.*?)</th>").unwrap());
static CELL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<td\b[^>]*>(.*?)</td>").unwrap());
static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<a\b[^>]*href\s*=\s*"([^"]*)""#).unwrap());
static BR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static NUMERIC_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(?:[xX]([0-9a-fA-F]{1,6})|([0-9]{1,7}));").unwrap());

/// TDCJ inmate search provider.
pub struct TdcjProvider {
    http: HttpSource,
    normalizer: TdcjNormalizer,
}

impl TdcjProvider {
    pub fn new(search_url: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            http: HttpSource::new(search_url, true)?,
            normalizer: TdcjNormalizer,
        })
    }

    async fn query(
        &self,
        inmate_id: &str,
        first: &str,
        last: &str,
        budget: Duration,
    ) -> Result<Vec<RawRecord>, Failure> {
        let form = [
            ("btnSearch", "Search"),
            ("gender", "ALL"),
            ("race", "ALL"),
            ("tdcj", inmate_id),
            ("lastName", last),
            ("firstName", first),
            ("page", "index"),
            ("sid", ""),
        ];
        let html = self.http.send(self.http.post().form(&form), budget).await?;
        Ok(parse_search_results(&html, self.http.url()))
    }
}

#[async_trait]
impl Provider for TdcjProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn jurisdiction(&self) -> Jurisdiction {
        Jurisdiction::Texas
    }

    async fn fetch(&self, identifier: &str, budget: Duration) -> FetchOutcome {
        let inmate_id = match Jurisdiction::Texas.format_identifier(identifier) {
            Ok(id) => id,
            Err(e) => return FetchOutcome::PermanentFailure(FailureReason::InvalidIdentifier(e.to_string())),
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

// ── HTML parsing ──

/// Extract result rows from a TDCJ search page.
///
/// A page without a result table has no matches.
pub fn parse_search_results(html: &str, base: &Url) -> Vec<RawRecord> {
    let Some(table) = TABLE_RE.captures(html).and_then(|c| c.get(1)) else {
        return Vec::new();
    };

    let mut keys: Vec<String> = Vec::new();
    let mut records = Vec::new();

    for row in ROW_RE.captures_iter(table.as_str()) {
        let row = &row[1];

        if keys.is_empty() {
            let headers: Vec<String> = HEADER_RE
                .captures_iter(row)
                .map(|c| cell_text(&c[1]))
                .collect();
            if !headers.is_empty() {
                keys = headers;
            }
            continue;
        }

        let values: Vec<String> = CELL_RE.captures_iter(row).map(|c| cell_text(&c[1])).collect();
        if values.is_empty() {
            continue;
        }

        let mut fields: BTreeMap<String, String> = keys.iter().cloned().zip(values).collect();
        if let Some(href) = HREF_RE.captures(row).map(|c| decode_entities(&c[1]))
            && let Ok(url) = base.join(&href)
        {
            fields.insert("url".to_string(), url.to_string());
        }
        records.push(RawRecord::new(NAME, fields));
    }

    records
}

fn cell_text(html: &str) -> String {
    let spaced = BR_RE.replace_all(html, " ");
    let stripped = TAG_RE.replace_all(&spaced, "");
    decode_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// `&amp;` goes last so escaped entities stay literal.
fn decode_entities(s: &str) -> String {
    let numeric = NUMERIC_ENTITY_RE.replace_all(s, |caps: &Captures| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (_, Some(dec)) => dec.as_str().parse().ok(),
            _ => None,
        };
        match code.and_then(char::from_u32) {
            Some(c) => c.to_string(),
            None => caps[0].to_string(),
        }
    });
    numeric
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// ── Normalization ──

/// Maps TDCJ table rows onto [`InmateRecord`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TdcjNormalizer;

impl Normalizer for TdcjNormalizer {
    fn normalize(&self, raw: &RawRecord) -> Result<InmateRecord, MalformedData> {
        let id = Jurisdiction::Texas
            .format_identifier(raw.require("TDCJ Number")?)
            .map_err(|e| MalformedData::new(raw, e.to_string()))?;
        let (first_name, last_name) = split_name(raw.require("Name")?);
        let unit = raw.require("Unit of Assignment")?;
        let status_text = raw.get("Projected Release Date").unwrap_or_default();
        let (release, status) = parse_release(status_text);

        Ok(InmateRecord {
            jurisdiction: Jurisdiction::Texas,
            id,
            first_name,
            last_name,
            unit: UnitRef(unit.to_string()),
            race: raw.get("Race").map(str::to_string),
            sex: raw.get("Gender").map(str::to_string),
            url: raw.get("url").map(str::to_string),
            release,
            status,
            status_text: status_text.to_string(),
            last_contact: None,
            fetched_at: raw.fetched_at,
        })
    }
}

/// Split "LAST, FIRST MIDDLE" into `(first, last)`.
fn split_name(name: &str) -> (String, String) {
    if let Some((last, rest)) = name.split_once(',') {
        let first = rest.split_whitespace().next().unwrap_or_default();
        return (first.to_string(), last.trim().to_string());
    }
    let mut parts = name.split_whitespace();
    let first = parts.next().unwrap_or_default();
    let last = parts.next_back().unwrap_or_default();
    (first.to_string(), last.to_string())
}

fn parse_release(text: &str) -> (Option<NaiveDate>, CustodyStatus) {
    if let Ok(date) = NaiveDate::parse_from_str(text, RELEASE_DATE_FORMAT) {
        return (Some(date), CustodyStatus::Incarcerated);
    }
    debug!(provider = NAME, release = text, "failed to parse release date");
    let upper = text.to_ascii_uppercase();
    let status = if upper.contains("DEATH") {
        CustodyStatus::DeathSentence
    } else if upper.contains("LIFE") {
        CustodyStatus::LifeSentence
    } else if upper.contains("RELEASED") || upper.contains("DISCHARGED") {
        CustodyStatus::Released
    } else {
        CustodyStatus::Unknown
    };
    (None, status)
}
