// allotment-core/src/domain/monitoring/metric.rs

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricCategory {
    Performance,
    Availability,
    Capacity,
    Business,
    System,
}

impl MetricCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Performance => "PERFORMANCE",
            Self::Availability => "AVAILABILITY",
            Self::Capacity => "CAPACITY",
            Self::Business => "BUSINESS",
            Self::System => "SYSTEM",
        }
    }
}

impl fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricCategory {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PERFORMANCE" => Ok(Self::Performance),
            "AVAILABILITY" => Ok(Self::Availability),
            "CAPACITY" => Ok(Self::Capacity),
            "BUSINESS" => Ok(Self::Business),
            "SYSTEM" => Ok(Self::System),
            _ => Err(DomainError::UnknownValue {
                kind: "metric category",
                value: s.to_string(),
            }),
        }
    }
}

/// One sample of the append-only metric series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub name: String,
    pub category: MetricCategory,
    pub value: f64,
    pub unit: String,
    pub tags: BTreeMap<String, String>,
    pub timestamp: NaiveDateTime,
}

impl Metric {
    pub fn new(
        name: impl Into<String>,
        category: MetricCategory,
        value: f64,
        unit: impl Into<String>,
        timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            value,
            unit: unit.into(),
            tags: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}
