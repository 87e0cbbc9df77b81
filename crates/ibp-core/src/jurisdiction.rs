//! Jurisdictions and their inmate identifier namespaces.
//!
//! Each jurisdiction owns the format of its identifiers. Canonicalising an
//! identifier up front means `"12345"` and `"00012345"` share one cache key
//! and malformed input never reaches an external site.
//!
//! # Formats
//!
//! - Texas (TDCJ): up to 8 digits, zero-padded to 8 → `"00012345"`
//! - Federal (FBOP): up to 8 digits, dash optional, zero-padded and split
//!   5-3 → `"12345-678"`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The external system governing an inmate identifier's namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Jurisdiction {
    /// Texas Department of Criminal Justice.
    Texas,
    /// Federal Bureau of Prisons.
    Federal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("'{input}' is not a valid {jurisdiction} inmate number: {reason}")]
    Invalid {
        jurisdiction: Jurisdiction,
        input: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported jurisdiction '{0}'")]
pub struct UnknownJurisdiction(pub String);

impl Jurisdiction {
    pub const ALL: [Jurisdiction; 2] = [Jurisdiction::Texas, Jurisdiction::Federal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Texas => "Texas",
            Self::Federal => "Federal",
        }
    }

    /// Canonicalise a raw identifier into this jurisdiction's namespace.
    pub fn format_identifier(&self, raw: &str) -> Result<String, IdentifierError> {
        let invalid = |reason| IdentifierError::Invalid {
            jurisdiction: *self,
            input: raw.to_string(),
            reason,
        };

        let trimmed = raw.trim();
        let digits: String = match self {
            Self::Texas => trimmed.to_string(),
            Self::Federal => trimmed.replace('-', ""),
        };

        if digits.is_empty() {
            return Err(invalid("identifier is empty"));
        }
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("inmate ID must be a number"));
        }

        // Leading zeros don't count toward the 8-digit limit.
        let significant = digits.trim_start_matches('0');
        if significant.len() > 8 {
            return Err(invalid("inmate ID must be at most 8 digits"));
        }
        let padded = format!("{significant:0>8}");

        Ok(match self {
            Self::Texas => padded,
            Self::Federal => format!("{}-{}", &padded[..5], &padded[5..]),
        })
    }
}

impl fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Jurisdiction {
    type Err = UnknownJurisdiction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "texas" | "state" | "tx" | "tdcj" => Ok(Self::Texas),
            "federal" | "fbop" | "bop" => Ok(Self::Federal),
            _ => Err(UnknownJurisdiction(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!("Texas".parse::<Jurisdiction>(), Ok(Jurisdiction::Texas));
        assert_eq!("state".parse::<Jurisdiction>(), Ok(Jurisdiction::Texas));
        assert_eq!(" TDCJ ".parse::<Jurisdiction>(), Ok(Jurisdiction::Texas));
        assert_eq!("federal".parse::<Jurisdiction>(), Ok(Jurisdiction::Federal));
        assert_eq!("BOP".parse::<Jurisdiction>(), Ok(Jurisdiction::Federal));
    }

    #[test]
    fn unknown_jurisdiction_rejected() {
        let err = "Oklahoma".parse::<Jurisdiction>().unwrap_err();
        assert_eq!(err, UnknownJurisdiction("Oklahoma".into()));
        assert_eq!(err.to_string(), "unsupported jurisdiction 'Oklahoma'");
    }

    #[test]
    fn display_matches_as_str() {
        for j in Jurisdiction::ALL {
            assert_eq!(j.to_string(), j.as_str());
            assert_eq!(j.as_str().parse::<Jurisdiction>(), Ok(j));
        }
    }

    #[test]
    fn texas_ids_zero_padded() {
        let tx = Jurisdiction::Texas;
        assert_eq!(tx.format_identifier("12345").unwrap(), "00012345");
        assert_eq!(tx.format_identifier("00012345").unwrap(), "00012345");
        assert_eq!(tx.format_identifier(" 1 ").unwrap(), "00000001");
        assert_eq!(tx.format_identifier("87654321").unwrap(), "87654321");
    }

    #[test]
    fn federal_ids_split_five_three() {
        let fed = Jurisdiction::Federal;
        assert_eq!(fed.format_identifier("12345678").unwrap(), "12345-678");
        assert_eq!(fed.format_identifier("12345-678").unwrap(), "12345-678");
        assert_eq!(fed.format_identifier("345-678").unwrap(), "00345-678");
    }

    #[test]
    fn equivalent_spellings_share_canonical_form() {
        let fed = Jurisdiction::Federal;
        assert_eq!(
            fed.format_identifier("0012345678").unwrap(),
            fed.format_identifier("12345-678").unwrap()
        );
    }

    #[test]
    fn malformed_ids_rejected() {
        let tx = Jurisdiction::Texas;
        assert!(tx.format_identifier("").is_err());
        assert!(tx.format_identifier("12a45").is_err());
        assert!(tx.format_identifier("123456789").is_err());
        // Dashes are only part of the federal namespace.
        assert!(tx.format_identifier("123-45").is_err());

        let err = Jurisdiction::Federal
            .format_identifier("abc")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "'abc' is not a valid Federal inmate number: inmate ID must be a number"
        );
    }
}
