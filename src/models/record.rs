// src/models/record.rs

//! Snapshot records returned by the CDX index.

use std::fmt;

/// Number of space separated fields in a CDX listing line.
pub const CDX_FIELD_COUNT: usize = 7;

/// One archived capture of a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdxRecord {
    /// Canonical SURT form used by the index to group captures
    pub url_key: String,
    /// Capture time in `yyyyMMddHHmmss` form
    pub timestamp: i64,
    /// URL as originally captured
    pub original: String,
    pub mime_type: String,
    pub status_code: i32,
    /// Content digest used to collapse duplicate captures
    pub digest: String,
    pub length: i64,
}

/// Reason a listing line was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordParseError {
    /// Line did not contain exactly seven fields
    FieldCount { actual: usize },
    /// A numeric field could not be parsed
    NumericField { field: &'static str },
}

impl fmt::Display for RecordParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldCount { actual } => write!(
                f,
                "expected {CDX_FIELD_COUNT} fields, got {actual}"
            ),
            Self::NumericField { field } => write!(f, "field '{field}' is not a number"),
        }
    }
}

impl CdxRecord {
    /// Parse a single line of the CDX listing.
    pub fn parse_line(line: &str) -> Result<Self, RecordParseError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != CDX_FIELD_COUNT {
            return Err(RecordParseError::FieldCount {
                actual: fields.len(),
            });
        }

        let timestamp = fields[1]
            .parse()
            .map_err(|_| RecordParseError::NumericField { field: "timestamp" })?;
        let status_code = fields[4]
            .parse()
            .map_err(|_| RecordParseError::NumericField { field: "statuscode" })?;
        let length = fields[6]
            .parse()
            .map_err(|_| RecordParseError::NumericField { field: "length" })?;

        Ok(Self {
            url_key: fields[0].to_string(),
            timestamp,
            original: fields[2].to_string(),
            mime_type: fields[3].to_string(),
            status_code,
            digest: fields[5].to_string(),
            length,
        })
    }

    /// Archive URL that serves the raw captured bytes of this record.
    pub fn archive_url(&self, archive_host: &str) -> String {
        format!(
            "{}/web/{}id_/{}",
            archive_host.trim_end_matches('/'),
            self.timestamp,
            self.original
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = "org,archive)/about 20000731030657 http://www.archive.org/about text/html 200 OXCFCQFVBEUULMT2CUOBYU4T42VH7MYM 338";

    #[test]
    fn parses_well_formed_line() {
        let record = CdxRecord::parse_line(LINE).unwrap();
        assert_eq!(record.url_key, "org,archive)/about");
        assert_eq!(record.timestamp, 20000731030657);
        assert_eq!(record.original, "http://www.archive.org/about");
        assert_eq!(record.mime_type, "text/html");
        assert_eq!(record.status_code, 200);
        assert_eq!(record.length, 338);
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert_eq!(
            CdxRecord::parse_line("a b c"),
            Err(RecordParseError::FieldCount { actual: 3 })
        );
    }

    #[test]
    fn rejects_non_numeric_status() {
        let line = "key 20000101000000 http://a.com/ text/html - DIGEST 12";
        assert_eq!(
            CdxRecord::parse_line(line),
            Err(RecordParseError::NumericField { field: "statuscode" })
        );
    }

    #[test]
    fn builds_raw_archive_url() {
        let record = CdxRecord::parse_line(LINE).unwrap();
        assert_eq!(
            record.archive_url("https://web.archive.org/"),
            "https://web.archive.org/web/20000731030657id_/http://www.archive.org/about"
        );
    }
}
