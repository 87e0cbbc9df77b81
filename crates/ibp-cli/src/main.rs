mod display;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use ibp_core::{Jurisdiction, LookupConfig};
use ibp_resolver::{ContactHistory, Resolution, ResolvedRecord, Resolver};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ibp")]
#[command(about = "Look up inmates in state and federal custody")]
#[command(version)]
struct Cli {
    /// TOML config file (defaults apply when omitted)
    #[arg(long, global = true, env = "IBP_CONFIG")]
    config: Option<PathBuf>,

    /// Per-provider timeout in seconds, overriding the config
    #[arg(long, global = true)]
    timeout: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Look up one inmate by jurisdiction and inmate number
    Lookup {
        /// Texas (alias: state, tdcj) or Federal (alias: fbop)
        jurisdiction: String,
        id: String,
        /// Date of the last filled request, for the contact warning
        #[arg(long)]
        last_contact: Option<NaiveDate>,
        /// Evaluate warnings as of this date instead of today
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
    },

    /// Search by name across jurisdictions
    Search {
        #[arg(long)]
        first: String,
        #[arg(long)]
        last: String,
        /// Repeatable; all jurisdictions when omitted
        #[arg(short, long = "jurisdiction")]
        jurisdictions: Vec<String>,
        #[arg(long)]
        json: bool,
    },

    /// Check a request postmark against the last filled request
    Postmark {
        postmark: NaiveDate,
        #[arg(long)]
        last_filled: Option<NaiveDate>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Command::Lookup {
            jurisdiction,
            id,
            last_contact,
            as_of,
            json,
        } => lookup(&config, &jurisdiction, &id, last_contact, as_of, json).await,
        Command::Search {
            first,
            last,
            jurisdictions,
            json,
        } => search(&config, &first, &last, &jurisdictions, json).await,
        Command::Postmark {
            postmark,
            last_filled,
        } => {
            let warning = config.warnings.evaluate_request(last_filled, postmark);
            display::print_request_check(warning.as_ref());
            Ok(())
        }
        Command::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> Result<LookupConfig> {
    let mut config = match &cli.config {
        Some(path) => LookupConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => LookupConfig::default(),
    };
    if let Some(secs) = cli.timeout {
        config.providers.timeout_secs = secs;
        config.validate().context("--timeout")?;
    }
    Ok(config)
}

async fn lookup(
    config: &LookupConfig,
    jurisdiction: &str,
    id: &str,
    last_contact: Option<NaiveDate>,
    as_of: Option<NaiveDate>,
    json: bool,
) -> Result<()> {
    let jurisdiction: Jurisdiction = jurisdiction.parse()?;
    let mut resolver = Resolver::from_config(config).context("building providers")?;
    if let Some(date) = last_contact {
        let canonical = jurisdiction.format_identifier(id)?;
        let history: HashMap<(Jurisdiction, String), NaiveDate> =
            HashMap::from([((jurisdiction, canonical), date)]);
        resolver = resolver.with_contact_history(Arc::new(history) as Arc<dyn ContactHistory>);
    }

    let today = as_of.unwrap_or_else(|| Utc::now().date_naive());
    let resolution = resolver.resolve_at(jurisdiction, id, today).await?;

    match (resolution, json) {
        (Resolution::Found(found), true) => {
            println!("{}", serde_json::to_string_pretty(&found_json(&found))?);
        }
        (Resolution::Found(found), false) => display::print_inmate_card(&found),
        (
            Resolution::NotFound {
                jurisdiction,
                identifier,
                checked_at,
                freshness,
            },
            true,
        ) => {
            let out = json!({
                "status": "not_found",
                "jurisdiction": jurisdiction,
                "id": identifier,
                "checked_at": checked_at,
                "freshness": freshness,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        (
            Resolution::NotFound {
                jurisdiction,
                identifier,
                checked_at,
                freshness,
            },
            false,
        ) => display::print_not_found(jurisdiction, &identifier, checked_at, freshness),
    }
    Ok(())
}

async fn search(
    config: &LookupConfig,
    first: &str,
    last: &str,
    jurisdictions: &[String],
    json: bool,
) -> Result<()> {
    let jurisdictions = jurisdictions
        .iter()
        .map(|j| j.parse::<Jurisdiction>())
        .collect::<Result<Vec<_>, _>>()?;
    let resolver = Resolver::from_config(config).context("building providers")?;
    let results = resolver.search_by_name(first, last, &jurisdictions).await;

    if json {
        let out = json!({
            "records": results.records.iter().map(found_json).collect::<Vec<_>>(),
            "errors": results
                .errors
                .iter()
                .map(|(jurisdiction, err)| json!({
                    "jurisdiction": jurisdiction,
                    "error": err.to_string(),
                    "retryable": err.is_retryable(),
                }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        display::print_search_results(&results);
    }
    Ok(())
}

fn found_json(found: &ResolvedRecord) -> serde_json::Value {
    json!({
        "status": "found",
        "record": &*found.record,
        "warnings": found
            .warnings
            .iter()
            .map(|w| json!({ "warning": w, "message": w.message() }))
            .collect::<Vec<_>>(),
        "freshness": found.freshness,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lookup_with_alias_and_flags() {
        let cli = Cli::try_parse_from([
            "ibp",
            "lookup",
            "state",
            "12345",
            "--last-contact",
            "2026-01-02",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Command::Lookup {
                jurisdiction,
                id,
                last_contact,
                json,
                ..
            } => {
                assert_eq!(jurisdiction, "state");
                assert_eq!(id, "12345");
                assert_eq!(last_contact, NaiveDate::from_ymd_opt(2026, 1, 2));
                assert!(json);
            }
            _ => panic!("expected lookup"),
        }
    }

    #[test]
    fn search_takes_repeated_jurisdictions() {
        let cli = Cli::try_parse_from([
            "ibp", "search", "--first", "John", "--last", "Doe", "-j", "Texas", "-j", "fbop",
        ])
        .unwrap();
        match cli.command {
            Command::Search { jurisdictions, .. } => {
                assert_eq!(jurisdictions, vec!["Texas", "fbop"]);
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn timeout_override_is_validated() {
        let cli = Cli::try_parse_from(["ibp", "--timeout", "0", "config"]).unwrap();
        assert!(load_config(&cli).is_err());

        let cli = Cli::try_parse_from(["ibp", "--timeout", "1e30", "config"]).unwrap();
        assert!(load_config(&cli).is_err());

        let cli = Cli::try_parse_from(["ibp", "--timeout", "2.5", "config"]).unwrap();
        assert_eq!(load_config(&cli).unwrap().providers.timeout_secs, 2.5);
    }
}
