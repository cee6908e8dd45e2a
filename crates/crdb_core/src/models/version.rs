//! Server version banner parsing.
//!
//! `SELECT version()` on CockroachDB returns a banner such as
//! `CockroachDB CCL v23.1.11 (x86_64-pc-linux-gnu, built 2023/09/27 ...)`.
//! Only the calendar version (`YY.R.P`) is extracted.

use crate::error::CrdbError;
use serde::Serialize;

/// Parsed server version, or the reason it could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum VersionInfo {
    Parsed {
        raw: String,
        year: u32,
        release: u32,
        patch: u32,
    },
    /// `year`/`release` hold whatever was parsed before the failing step.
    Failed {
        raw: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        year: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        release: Option<u32>,
        error: String,
    },
}

impl VersionInfo {
    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed { .. })
    }

    /// Turn a failed parse into a `VersionParse` error naming the banner.
    pub fn into_result(self) -> Result<Self, CrdbError> {
        match self {
            Self::Failed { raw, error, .. } => Err(CrdbError::version_parse(raw, error)),
            parsed => Ok(parsed),
        }
    }
}

/// Parse a version banner into `(year, release, patch)`.
///
/// The banner is split on `.` into at most three segments. The year is the
/// last two characters of the first segment, the release is the whole second
/// segment, and the patch is the leading digits of the first
/// whitespace-delimited token of the third segment.
pub fn parse_version(raw: &str) -> VersionInfo {
    let mut segments = raw.splitn(3, '.');
    let mut year = None;
    let mut release = None;

    let fail = |year, release, error: String| VersionInfo::Failed {
        raw: raw.to_string(),
        year,
        release,
        error,
    };

    let first = segments.next().unwrap_or_default();
    let year_token = last_chars(first, 2);
    match parse_number(year_token) {
        Ok(value) => year = Some(value),
        Err(error) => return fail(year, release, error),
    }

    let Some(second) = segments.next() else {
        return fail(year, release, "missing release segment".to_string());
    };
    match parse_number(second) {
        Ok(value) => release = Some(value),
        Err(error) => return fail(year, release, error),
    }

    let Some(third) = segments.next() else {
        return fail(year, release, "missing patch segment".to_string());
    };
    let token = third.split_whitespace().next().unwrap_or_default();
    let digits_end = token.find(|c: char| !c.is_ascii_digit()).unwrap_or(token.len());
    let patch = match token[..digits_end].parse::<u32>() {
        Ok(value) => value,
        Err(_) => return fail(year, release, invalid_token(token)),
    };

    match (year, release) {
        (Some(year), Some(release)) => {
            VersionInfo::Parsed { raw: raw.to_string(), year, release, patch }
        }
        _ => fail(year, release, "incomplete version".to_string()),
    }
}

fn parse_number(token: &str) -> Result<u32, String> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid_token(token));
    }
    token.parse::<u32>().map_err(|_| invalid_token(token))
}

fn invalid_token(token: &str) -> String {
    format!("invalid numeric token '{token}'")
}

fn last_chars(s: &str, n: usize) -> &str {
    let start = s.char_indices().rev().nth(n - 1).map(|(idx, _)| idx).unwrap_or(0);
    &s[start..]
}
