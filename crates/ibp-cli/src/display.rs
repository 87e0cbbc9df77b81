//! Human-readable rendering of lookup results.
//!
//! A found record prints as a vertical card grouped into sections; name
//! search results print as one line per match.

use chrono::{DateTime, Utc};
use ibp_core::{InmateRecord, Jurisdiction, RequestWarning};
use ibp_resolver::{Freshness, NameSearch, ResolvedRecord};

const MAX_NAME_WIDTH: usize = 28;

// ── Public API ──

/// Print a resolved inmate as a card grouped by section.
pub fn print_inmate_card(found: &ResolvedRecord) {
    let record = &found.record;
    println!("=== {} ===", record.full_name());
    println!("{} #{}", record.jurisdiction, record.id);
    println!();

    print_section(
        "Identity",
        &[
            ("first_name", Some(record.first_name.clone())),
            ("last_name", Some(record.last_name.clone())),
            ("race", record.race.clone()),
            ("sex", record.sex.clone()),
        ],
    );
    print_section(
        "Custody",
        &[
            ("unit", Some(record.unit.as_str().to_string())),
            ("status", Some(record.status.as_str().to_string())),
            ("status_text", non_empty(&record.status_text)),
            ("release", record.release.map(|d| d.to_string())),
        ],
    );
    print_section(
        "Contact",
        &[("last_contact", record.last_contact.map(|d| d.to_string()))],
    );

    if found.has_warnings() {
        println!("Warnings");
        for warning in &found.warnings {
            println!("  {:<26} {}", warning.key(), warning.message());
        }
        println!();
    }

    print_section(
        "Provenance",
        &[
            ("source", record.url.clone()),
            ("fetched_at", Some(timestamp(record.fetched_at))),
            ("served_from", Some(freshness(found.freshness).to_string())),
        ],
    );
}

pub fn print_not_found(
    jurisdiction: Jurisdiction,
    identifier: &str,
    checked_at: DateTime<Utc>,
    served: Freshness,
) {
    println!("No {jurisdiction} inmate #{identifier}");
    println!(
        "  {:<26} {} ({})",
        "checked_at",
        timestamp(checked_at),
        freshness(served)
    );
}

/// Print one line per match, then any per-jurisdiction failures.
pub fn print_search_results(results: &NameSearch) {
    if results.records.is_empty() {
        println!("No matches");
    }
    for found in &results.records {
        print_match_line(&found.record);
        for warning in &found.warnings {
            println!("      ! {}", warning.message());
        }
    }
    if !results.errors.is_empty() {
        println!();
        for (jurisdiction, err) in &results.errors {
            println!("  {:<10} {}", jurisdiction.as_str(), err);
        }
    }
}

pub fn print_request_check(warning: Option<&RequestWarning>) {
    match warning {
        Some(warning) => println!("! {}", warning.message()),
        None => println!("Postmark OK"),
    }
}

// ── Helpers ──

fn print_section(header: &str, rows: &[(&str, Option<String>)]) {
    if rows.iter().all(|(_, value)| value.is_none()) {
        return;
    }
    println!("{header}");
    for (label, value) in rows {
        if let Some(value) = value {
            println!("  {:<26} {}", label, value);
        }
    }
    println!();
}

fn print_match_line(record: &InmateRecord) {
    let name = record.full_name();
    let name = if name.chars().count() > MAX_NAME_WIDTH {
        let short: String = name.chars().take(MAX_NAME_WIDTH - 3).collect();
        format!("{short}...")
    } else {
        name
    };
    print!(
        "  {:<8} {:<10} {:<width$}",
        record.jurisdiction.as_str(),
        record.id,
        name,
        width = MAX_NAME_WIDTH
    );
    print!("  {}", record.unit.as_str());
    if let Some(release) = record.release {
        print!("  release {}", release);
    }
    println!();
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn freshness(served: Freshness) -> &'static str {
    match served {
        Freshness::Cached => "cache",
        Freshness::Fetched => "live",
    }
}
