// allotment-core/src/domain/conversion.rs

//! Legacy value conversion.
//!
//! The `parse_*` functions are pure and report why a value was rejected.
//! [`Converter`] wraps them into total conversions: a malformed value becomes
//! `None` and a [`ConversionIssue`] is recorded, so a transform can keep
//! converting the remaining columns of the row.

use std::fmt;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

#[allow(clippy::expect_used)]
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}$").expect("literal email pattern")
});

#[allow(clippy::expect_used)]
static LEGACY_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("literal key pattern"));

#[allow(clippy::expect_used)]
static PHONE_STRIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^+0-9\-\s()]").expect("literal phone pattern"));

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

// ISO first, then the German day-month-year notation of the legacy forms
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y"];

const TRUE_TOKENS: &[&str] = &["1", "Y", "J", "JA", "YES", "TRUE", "T", "X", "ON"];
const FALSE_TOKENS: &[&str] = &["0", "N", "NEIN", "NO", "FALSE", "F", "OFF"];

const MIN_PLAUSIBLE_YEAR: i32 = 1850;
const MAX_PLAUSIBLE_YEAR: i32 = 2100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    InvalidIdentifier,
    InvalidInteger,
    InvalidTimestamp,
    InvalidDate,
    ImplausibleDate,
    UnknownBoolean,
    InvalidEmail,
    InvalidPhone,
    InvalidPostalCode,
    UnresolvedReference,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InvalidIdentifier => "invalid identifier",
            Self::InvalidInteger => "invalid integer",
            Self::InvalidTimestamp => "invalid timestamp",
            Self::InvalidDate => "invalid date",
            Self::ImplausibleDate => "implausible date",
            Self::UnknownBoolean => "unknown boolean token",
            Self::InvalidEmail => "invalid e-mail address",
            Self::InvalidPhone => "invalid phone number",
            Self::InvalidPostalCode => "invalid postal code",
            Self::UnresolvedReference => "unresolved optional reference",
        };
        f.write_str(label)
    }
}

/// Diagnostic record for one rejected field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionIssue {
    pub field: String,
    pub value: String,
    pub kind: IssueKind,
}

impl fmt::Display for ConversionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}': {}", self.field, self.value, self.kind)
    }
}

fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

// --- PURE PARSERS ---

pub fn parse_identifier(raw: &str) -> Result<String, IssueKind> {
    let trimmed = raw.trim().trim_start_matches('{').trim_end_matches('}');
    if let Ok(uuid) = Uuid::parse_str(trimmed) {
        return Ok(uuid.hyphenated().to_string());
    }
    if LEGACY_KEY_RE.is_match(trimmed) {
        return Ok(trimmed.to_lowercase());
    }
    Err(IssueKind::InvalidIdentifier)
}

pub fn parse_integer(raw: &str) -> Result<i64, IssueKind> {
    let trimmed = raw.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Ok(i);
    }
    // Numeric exports sometimes carry a ".0" suffix
    match trimmed.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(f as i64),
        _ => Err(IssueKind::InvalidInteger),
    }
}

fn plausible(date: NaiveDate) -> bool {
    (MIN_PLAUSIBLE_YEAR..=MAX_PLAUSIBLE_YEAR).contains(&date.year())
}

pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, IssueKind> {
    let trimmed = raw.trim();
    let parsed = TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or(IssueKind::InvalidTimestamp)?;

    if plausible(parsed.date()) {
        Ok(parsed)
    } else {
        Err(IssueKind::ImplausibleDate)
    }
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, IssueKind> {
    let trimmed = raw.trim();
    let parsed = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        // Datetime exports of date-only columns
        .or_else(|| {
            TIMESTAMP_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
                .map(|ts| ts.date())
        })
        .ok_or(IssueKind::InvalidDate)?;

    if plausible(parsed) {
        Ok(parsed)
    } else {
        Err(IssueKind::ImplausibleDate)
    }
}

pub fn parse_boolean(raw: &str) -> Result<bool, IssueKind> {
    let token = raw.trim().to_uppercase();
    if TRUE_TOKENS.contains(&token.as_str()) {
        Ok(true)
    } else if FALSE_TOKENS.contains(&token.as_str()) {
        Ok(false)
    } else {
        Err(IssueKind::UnknownBoolean)
    }
}

pub fn parse_email(raw: &str) -> Result<String, IssueKind> {
    let email = raw.trim().to_lowercase();
    if EMAIL_RE.is_match(&email) {
        Ok(email)
    } else {
        Err(IssueKind::InvalidEmail)
    }
}

pub fn parse_phone(raw: &str) -> Result<String, IssueKind> {
    let stripped = PHONE_STRIP_RE.replace_all(raw, "");
    let phone = stripped.trim();
    let len = phone.chars().count();
    if (3..=50).contains(&len) && phone.chars().any(|c| c.is_ascii_digit()) {
        Ok(phone.to_string())
    } else {
        Err(IssueKind::InvalidPhone)
    }
}

pub fn parse_postal_code(raw: &str) -> Result<String, IssueKind> {
    let code = raw.trim();
    if code.len() == 5 && code.chars().all(|c| c.is_ascii_digit()) {
        Ok(code.to_string())
    } else {
        Err(IssueKind::InvalidPostalCode)
    }
}

// --- TOTAL CONVERSIONS ---

/// Collects conversion diagnostics for one staged row.
#[derive(Debug, Default)]
pub struct Converter {
    issues: Vec<ConversionIssue>,
}

impl Converter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issues(&self) -> &[ConversionIssue] {
        &self.issues
    }

    pub fn record(&mut self, field: &str, value: &str, kind: IssueKind) {
        self.issues.push(ConversionIssue {
            field: field.to_string(),
            value: value.to_string(),
            kind,
        });
    }

    fn convert<T>(
        &mut self,
        field: &str,
        raw: Option<&str>,
        parse: impl Fn(&str) -> Result<T, IssueKind>,
    ) -> Option<T> {
        let value = non_blank(raw)?;
        match parse(value) {
            Ok(v) => Some(v),
            Err(kind) => {
                self.record(field, value, kind);
                None
            }
        }
    }

    /// Trims; blank becomes absent. Never records an issue.
    pub fn to_text(&mut self, raw: Option<&str>) -> Option<String> {
        non_blank(raw).map(str::to_string)
    }

    pub fn to_identifier(&mut self, field: &str, raw: Option<&str>) -> Option<String> {
        self.convert(field, raw, parse_identifier)
    }

    pub fn to_integer(&mut self, field: &str, raw: Option<&str>) -> Option<i64> {
        self.convert(field, raw, parse_integer)
    }

    pub fn to_timestamp(&mut self, field: &str, raw: Option<&str>) -> Option<NaiveDateTime> {
        self.convert(field, raw, parse_timestamp)
    }

    pub fn to_date(&mut self, field: &str, raw: Option<&str>) -> Option<NaiveDate> {
        self.convert(field, raw, parse_date)
    }

    /// `None` means unknown: either blank or an unrecognized token.
    pub fn to_boolean(&mut self, field: &str, raw: Option<&str>) -> Option<bool> {
        self.convert(field, raw, parse_boolean)
    }

    pub fn validate_email(&mut self, field: &str, raw: Option<&str>) -> Option<String> {
        self.convert(field, raw, parse_email)
    }

    pub fn validate_phone(&mut self, field: &str, raw: Option<&str>) -> Option<String> {
        self.convert(field, raw, parse_phone)
    }

    pub fn validate_postal_code(&mut self, field: &str, raw: Option<&str>) -> Option<String> {
        self.convert(field, raw, parse_postal_code)
    }
}
