// src/models/filter.rs

//! Listing filters and match types understood by the CDX server.

use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, Result};

/// Field names the CDX server accepts in `filter=` expressions.
pub const KNOWN_FIELDS: [&str; 7] = [
    "urlkey",
    "timestamp",
    "original",
    "mimetype",
    "statuscode",
    "digest",
    "length",
];

const FILTER_FORM: &str = "[!]<FieldName>:<Expression>";

/// How the match URL is compared against archived URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchType {
    #[default]
    Exact,
    Prefix,
    Host,
    Domain,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Prefix => "prefix",
            MatchType::Host => "host",
            MatchType::Domain => "domain",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "exact" => Ok(MatchType::Exact),
            "prefix" => Ok(MatchType::Prefix),
            "host" => Ok(MatchType::Host),
            "domain" => Ok(MatchType::Domain),
            _ => Err(AppError::validation(format!(
                "Match type '{s}' is not valid. Expected one of [exact, prefix, host, domain]."
            ))),
        }
    }
}

/// A single `filter=` clause of a listing query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdxFilter {
    field: String,
    expression: String,
    negate: bool,
}

impl CdxFilter {
    /// Build a filter from its parts, validating the field and expression.
    pub fn new(field: &str, expression: &str, negate: bool) -> Result<Self> {
        let raw = format!("{}{field}:{expression}", if negate { "!" } else { "" });
        let field = field.to_lowercase();

        if !KNOWN_FIELDS.contains(&field.as_str()) {
            return Err(AppError::filter(
                raw,
                format!(
                    "field name is not a valid CDX field. Fields: {}",
                    KNOWN_FIELDS.join(", ")
                ),
            ));
        }

        if field == "statuscode" && expression.parse::<i32>().is_err() {
            return Err(AppError::filter(
                raw,
                "statuscode expression could not be parsed to a valid integer",
            ));
        }

        Ok(Self {
            field,
            expression: expression.to_string(),
            negate,
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn negate(&self) -> bool {
        self.negate
    }
}

impl FromStr for CdxFilter {
    type Err = AppError;

    /// Parse `[!]<FieldName>:<Expression>`.
    fn from_str(raw: &str) -> Result<Self> {
        if !raw.contains(':') {
            return Err(AppError::filter(
                raw,
                format!("could not find a ':'. The filter should be of the form {FILTER_FORM}"),
            ));
        }

        let parts: Vec<&str> = raw
            .split(':')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        if parts.len() > 2 {
            return Err(AppError::filter(
                raw,
                format!("multiple ':' characters found. The filter should be of the form {FILTER_FORM}"),
            ));
        }
        if parts.len() < 2 {
            return Err(AppError::filter(
                raw,
                format!("missing field name or expression. The filter should be of the form {FILTER_FORM}"),
            ));
        }

        let (field, negate) = match parts[0].strip_prefix('!') {
            Some(field) => (field, true),
            None => (parts[0], false),
        };

        Self::new(field, parts[1], negate)
    }
}

impl fmt::Display for CdxFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negate {
            f.write_str("!")?;
        }
        write!(f, "{}:{}", self.field, self.expression)
    }
}

/// Substring filters applied to downloaded page bodies.
///
/// Matching is ordinal and ignores case, so `A` equals `a` but `a` does not
/// equal `à`.
#[derive(Debug, Clone, Default)]
pub struct PageFilters {
    terms: Vec<String>,
}

impl PageFilters {
    pub fn new(terms: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            terms: terms
                .into_iter()
                .map(|t| Into::<String>::into(t).to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Whether any filter term is configured.
    pub fn any(&self) -> bool {
        !self.terms.is_empty()
    }

    /// Whether the page contains at least one of the filter terms.
    pub fn is_match(&self, page: &str) -> bool {
        let page = page.to_lowercase();
        self.terms.iter().any(|term| page.contains(term.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_filter() {
        let filter: CdxFilter = "mimetype:text/html".parse().unwrap();
        assert_eq!(filter.field(), "mimetype");
        assert_eq!(filter.expression(), "text/html");
        assert!(!filter.negate());
        assert_eq!(filter.to_string(), "mimetype:text/html");
    }

    #[test]
    fn parses_negated_filter_and_lowercases_field() {
        let filter: CdxFilter = "!StatusCode:404".parse().unwrap();
        assert!(filter.negate());
        assert_eq!(filter.to_string(), "!statuscode:404");
    }

    #[test]
    fn rejects_unknown_field() {
        assert!("colour:blue".parse::<CdxFilter>().is_err());
    }

    #[test]
    fn rejects_non_integer_status_code() {
        assert!("statuscode:2xx".parse::<CdxFilter>().is_err());
    }

    #[test]
    fn rejects_missing_or_repeated_colon() {
        assert!("statuscode200".parse::<CdxFilter>().is_err());
        assert!("original:http://a".parse::<CdxFilter>().is_err());
    }

    #[test]
    fn match_type_parses_case_insensitively() {
        assert_eq!("PREFIX".parse::<MatchType>().unwrap(), MatchType::Prefix);
        assert!("subdomain".parse::<MatchType>().is_err());
    }

    #[test]
    fn page_filter_matches_ignoring_case() {
        let filters = PageFilters::new(["world"]);
        assert!(filters.any());
        assert!(filters.is_match("Hello World"));
    }

    #[test]
    fn page_filter_rejects_missing_term() {
        let filters = PageFilters::new(["xyz"]);
        assert!(!filters.is_match("Hello World"));
    }

    #[test]
    fn page_filter_is_ordinal() {
        let filters = PageFilters::new(["a"]);
        assert!(!filters.is_match("à"));
        assert!(!PageFilters::new(Vec::<String>::new()).any());
    }
}
