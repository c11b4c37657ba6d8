// allotment-core/src/domain/quality/rule.rs

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlparser::ast::Statement;
use sqlparser::dialect::DuckDbDialect;
use sqlparser::parser::Parser;
use validator::Validate;

use crate::domain::error::DomainError;
use crate::domain::severity::Severity;

#[allow(clippy::expect_used)]
static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("literal identifier pattern"));

pub fn is_identifier(name: &str) -> bool {
    IDENT_RE.is_match(name)
}

/// Double-quoted SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quoted SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    #[serde(alias = "not_null")]
    NotNull,
    #[serde(alias = "unique")]
    Unique,
    #[serde(alias = "range")]
    Range,
    #[serde(alias = "pattern")]
    Pattern,
    #[serde(alias = "reference")]
    Reference,
    #[serde(alias = "custom")]
    Custom,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotNull => "NOT_NULL",
            Self::Unique => "UNIQUE",
            Self::Range => "RANGE",
            Self::Pattern => "PATTERN",
            Self::Reference => "REFERENCE",
            Self::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NOT_NULL" => Ok(Self::NotNull),
            "UNIQUE" => Ok(Self::Unique),
            "RANGE" => Ok(Self::Range),
            "PATTERN" => Ok(Self::Pattern),
            "REFERENCE" => Ok(Self::Reference),
            "CUSTOM" => Ok(Self::Custom),
            _ => Err(DomainError::UnknownValue {
                kind: "rule type",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleParams {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub pattern: Option<String>,
    pub ref_table: Option<String>,
    pub ref_column: Option<String>,
    pub sql: Option<String>,
}

/// A rule as declared in `quality.yml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RuleDefinition {
    #[validate(length(min = 1, max = 100, message = "Rule name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(min = 1, message = "Table cannot be empty"))]
    pub table: String,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub params: RuleParams,
}

fn default_active() -> bool {
    true
}

/// Tagged predicate variant. Each one compiles to a query returning the
/// violating rows.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleCheck {
    NotNull {
        column: String,
    },
    Unique {
        column: String,
    },
    Range {
        column: String,
        min: Option<f64>,
        max: Option<f64>,
    },
    Pattern {
        column: String,
        pattern: String,
    },
    Reference {
        column: String,
        ref_table: String,
        ref_column: String,
    },
    Custom {
        sql: String,
    },
}

impl RuleCheck {
    pub fn violation_query(&self, table: &str) -> String {
        let t = quote_ident(table);
        match self {
            Self::NotNull { column } => {
                format!("SELECT * FROM {t} WHERE {} IS NULL", quote_ident(column))
            }
            Self::Unique { column } => {
                let c = quote_ident(column);
                format!(
                    "SELECT * FROM {t} WHERE {c} IN (SELECT {c} FROM {t} WHERE {c} IS NOT NULL GROUP BY {c} HAVING count(*) > 1)"
                )
            }
            Self::Range { column, min, max } => {
                let c = quote_ident(column);
                let mut bounds = Vec::new();
                if let Some(min) = min {
                    bounds.push(format!("{c} < {min}"));
                }
                if let Some(max) = max {
                    bounds.push(format!("{c} > {max}"));
                }
                format!("SELECT * FROM {t} WHERE {}", bounds.join(" OR "))
            }
            Self::Pattern { column, pattern } => {
                let c = quote_ident(column);
                format!(
                    "SELECT * FROM {t} WHERE {c} IS NOT NULL AND NOT regexp_full_match(CAST({c} AS VARCHAR), {})",
                    quote_literal(pattern)
                )
            }
            Self::Reference {
                column,
                ref_table,
                ref_column,
            } => {
                let c = quote_ident(column);
                format!(
                    "SELECT * FROM {t} AS src WHERE src.{c} IS NOT NULL AND NOT EXISTS (SELECT 1 FROM {} AS ref WHERE ref.{} = src.{c})",
                    quote_ident(ref_table),
                    quote_ident(ref_column)
                )
            }
            Self::Custom { sql } => sql.clone(),
        }
    }
}

/// A validated rule ready to be registered.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule {
    pub definition: RuleDefinition,
    pub check: RuleCheck,
    pub predicate: String,
}

impl RuleDefinition {
    fn invalid(&self, reason: impl Into<String>) -> DomainError {
        DomainError::InvalidRule {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn required_column(&self) -> Result<String, DomainError> {
        let column = self
            .column
            .as_deref()
            .ok_or_else(|| self.invalid(format!("{} rules need a column", self.rule_type)))?;
        if !is_identifier(column) {
            return Err(self.invalid(format!("'{}' is not a valid column name", column)));
        }
        Ok(column.to_string())
    }

    fn required_param<'a>(&self, value: &'a Option<String>, param: &str) -> Result<&'a str, DomainError> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| self.invalid(format!("{} rules need params.{}", self.rule_type, param)))
    }

    /// Validates the declaration and compiles its violation query.
    /// Configuration errors surface here and never reach execution.
    pub fn compile(&self) -> Result<CompiledRule, DomainError> {
        self.validate().map_err(|e| self.invalid(e.to_string()))?;
        if !is_identifier(&self.table) {
            return Err(self.invalid(format!("'{}' is not a valid table name", self.table)));
        }

        let check = match self.rule_type {
            RuleType::NotNull => RuleCheck::NotNull {
                column: self.required_column()?,
            },
            RuleType::Unique => RuleCheck::Unique {
                column: self.required_column()?,
            },
            RuleType::Range => {
                let column = self.required_column()?;
                let (min, max) = (self.params.min, self.params.max);
                if let Some(bound) = min.into_iter().chain(max).find(|b| !b.is_finite()) {
                    return Err(self.invalid(format!("range bound {} is not a finite number", bound)));
                }
                match (min, max) {
                    (None, None) => return Err(self.invalid("RANGE rules need params.min or params.max")),
                    (Some(lo), Some(hi)) if lo > hi => {
                        return Err(self.invalid(format!("min {} exceeds max {}", lo, hi)));
                    }
                    _ => {}
                }
                RuleCheck::Range { column, min, max }
            }
            RuleType::Pattern => {
                let column = self.required_column()?;
                let pattern = self.required_param(&self.params.pattern, "pattern")?;
                Regex::new(pattern).map_err(|e| self.invalid(format!("invalid pattern: {}", e)))?;
                RuleCheck::Pattern {
                    column,
                    pattern: pattern.to_string(),
                }
            }
            RuleType::Reference => {
                let column = self.required_column()?;
                let ref_table = self.required_param(&self.params.ref_table, "ref_table")?;
                let ref_column = self.required_param(&self.params.ref_column, "ref_column")?;
                if !is_identifier(ref_table) || !is_identifier(ref_column) {
                    return Err(self.invalid("reference target is not a valid identifier"));
                }
                RuleCheck::Reference {
                    column,
                    ref_table: ref_table.to_string(),
                    ref_column: ref_column.to_string(),
                }
            }
            RuleType::Custom => {
                let sql = self.required_param(&self.params.sql, "sql")?;
                let sql = sql.trim_end_matches(';').trim();
                let statements = Parser::parse_sql(&DuckDbDialect {}, sql)
                    .map_err(|e| self.invalid(format!("SQL does not parse: {}", e)))?;
                match statements.as_slice() {
                    [Statement::Query(_)] => {}
                    _ => return Err(self.invalid("CUSTOM sql must be exactly one SELECT statement")),
                }
                RuleCheck::Custom {
                    sql: sql.to_string(),
                }
            }
        };

        let predicate = check.violation_query(&self.table);
        Ok(CompiledRule {
            definition: self.clone(),
            check,
            predicate,
        })
    }
}

/// A registered rule as stored in the registry.
#[derive(Debug, Clone, Serialize)]
pub struct QualityRule {
    pub id: i64,
    pub name: String,
    pub table: String,
    pub column: Option<String>,
    pub rule_type: RuleType,
    pub predicate: String,
    pub severity: Severity,
    pub active: bool,
    pub description: Option<String>,
}
