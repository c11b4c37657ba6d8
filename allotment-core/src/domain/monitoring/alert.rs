// allotment-core/src/domain/monitoring/alert.rs

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::error::DomainError;
use crate::domain::severity::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = ">", alias = "gt")]
    Gt,
    #[serde(rename = ">=", alias = "ge")]
    Ge,
    #[serde(rename = "<", alias = "lt")]
    Lt,
    #[serde(rename = "<=", alias = "le")]
    Le,
    #[serde(rename = "==", alias = "eq", alias = "=")]
    Eq,
    #[serde(rename = "!=", alias = "ne", alias = "<>")]
    Ne,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Ge => value >= threshold,
            Self::Lt => value < threshold,
            Self::Le => value <= threshold,
            Self::Eq => (value - threshold).abs() < f64::EPSILON,
            Self::Ne => (value - threshold).abs() >= f64::EPSILON,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            "==" | "=" => Ok(Self::Eq),
            "!=" | "<>" => Ok(Self::Ne),
            _ => Err(DomainError::UnknownValue {
                kind: "alert operator",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertState {
    Triggered,
    Resolved,
    Acknowledged,
}

impl AlertState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Triggered => "TRIGGERED",
            Self::Resolved => "RESOLVED",
            Self::Acknowledged => "ACKNOWLEDGED",
        }
    }
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "TRIGGERED" => Ok(Self::Triggered),
            "RESOLVED" => Ok(Self::Resolved),
            "ACKNOWLEDGED" => Ok(Self::Acknowledged),
            _ => Err(DomainError::UnknownValue {
                kind: "alert state",
                value: s.to_string(),
            }),
        }
    }
}

/// An alert rule as declared in `alerts.yml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct AlertRuleDefinition {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1))]
    pub metric_name: String,
    pub operator: Operator,
    pub threshold: f64,
    #[serde(default)]
    pub severity: Severity,
    /// Trailing window, in minutes, in which the latest sample is looked up.
    #[serde(default = "default_window")]
    #[validate(range(min = 1, max = 525_600))]
    pub window_minutes: i64,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_window() -> i64 {
    15
}

fn default_active() -> bool {
    true
}

impl AlertRuleDefinition {
    pub fn check(&self) -> Result<(), DomainError> {
        self.validate().map_err(|e| DomainError::InvalidAlertRule {
            name: self.name.clone(),
            reason: e.to_string(),
        })?;
        if !self.threshold.is_finite() {
            return Err(DomainError::InvalidAlertRule {
                name: self.name.clone(),
                reason: "threshold must be a finite number".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRule {
    pub id: i64,
    pub name: String,
    pub metric_name: String,
    pub operator: Operator,
    pub threshold: f64,
    pub severity: Severity,
    pub window_minutes: i64,
    pub active: bool,
}

impl AlertRule {
    pub fn describe(&self, value: f64) -> String {
        format!(
            "{}: {} = {} {} {}",
            self.name, self.metric_name, value, self.operator, self.threshold
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub id: i64,
    pub rule_id: i64,
    pub state: AlertState,
    pub value: f64,
    pub threshold: f64,
    pub message: Option<String>,
    pub triggered_at: NaiveDateTime,
    pub resolved_at: Option<NaiveDateTime>,
    pub acknowledged_at: Option<NaiveDateTime>,
    pub acknowledged_by: Option<String>,
}

impl AlertEvent {
    /// TRIGGERED and unresolved.
    pub fn is_open(&self) -> bool {
        self.state == AlertState::Triggered && self.resolved_at.is_none()
    }

    /// Unresolved, whether acknowledged or not. Suppresses re-triggering.
    pub fn is_active(&self) -> bool {
        self.state != AlertState::Resolved && self.resolved_at.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlertDecision {
    Trigger { value: f64 },
    Resolve { value: f64 },
    Unchanged,
}

/// Pure alert transition for one rule.
///
/// `latest` is the most recent sample inside the rule's window and `active`
/// the rule's unresolved event, if any. No sample leaves the state as is.
pub fn decide(rule: &AlertRule, latest: Option<f64>, active: Option<&AlertEvent>) -> AlertDecision {
    let Some(value) = latest else {
        return AlertDecision::Unchanged;
    };
    let holds = rule.operator.holds(value, rule.threshold);
    match (holds, active.is_some_and(AlertEvent::is_active)) {
        (true, false) => AlertDecision::Trigger { value },
        (false, true) => AlertDecision::Resolve { value },
        _ => AlertDecision::Unchanged,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AckOutcome {
    Acknowledged,
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> AlertRule {
        AlertRule {
            id: 1,
            name: "backlog".into(),
            metric_name: "applications_active".into(),
            operator: Operator::Gt,
            threshold: 100.0,
            severity: Severity::Warning,
            window_minutes: 15,
            active: true,
        }
    }

    fn event(state: AlertState) -> AlertEvent {
        AlertEvent {
            id: 9,
            rule_id: 1,
            state,
            value: 150.0,
            threshold: 100.0,
            message: None,
            triggered_at: NaiveDateTime::default(),
            resolved_at: None,
            acknowledged_at: None,
            acknowledged_by: None,
        }
    }

    #[test]
    fn test_sequence_triggers_once_then_resolves() {
        let r = rule();
        let mut open: Option<AlertEvent> = None;
        let mut decisions = Vec::new();

        for value in [150.0, 150.0, 80.0] {
            let d = decide(&r, Some(value), open.as_ref());
            match d {
                AlertDecision::Trigger { .. } => open = Some(event(AlertState::Triggered)),
                AlertDecision::Resolve { .. } => open = None,
                AlertDecision::Unchanged => {}
            }
            decisions.push(d);
        }

        assert_eq!(
            decisions,
            vec![
                AlertDecision::Trigger { value: 150.0 },
                AlertDecision::Unchanged,
                AlertDecision::Resolve { value: 80.0 },
            ]
        );
    }

    #[test]
    fn test_no_sample_keeps_state() {
        let open = event(AlertState::Triggered);
        assert_eq!(decide(&rule(), None, Some(&open)), AlertDecision::Unchanged);
        assert_eq!(decide(&rule(), None, None), AlertDecision::Unchanged);
    }

    #[test]
    fn test_acknowledged_suppresses_retrigger() {
        let acked = event(AlertState::Acknowledged);
        assert!(!acked.is_open());
        assert!(acked.is_active());
        assert_eq!(decide(&rule(), Some(170.0), Some(&acked)), AlertDecision::Unchanged);
        assert_eq!(
            decide(&rule(), Some(20.0), Some(&acked)),
            AlertDecision::Resolve { value: 20.0 }
        );
    }

    #[test]
    fn test_operators() -> anyhow::Result<()> {
        assert!(">=".parse::<Operator>()?.holds(100.0, 100.0));
        assert!(!"<".parse::<Operator>()?.holds(100.0, 100.0));
        assert!("==".parse::<Operator>()?.holds(0.0, 0.0));
        assert!("!=".parse::<Operator>()?.holds(1.0, 0.0));
        assert!("~".parse::<Operator>().is_err());
        Ok(())
    }

    #[test]
    fn test_rule_definition_from_yaml() -> anyhow::Result<()> {
        let def: AlertRuleDefinition = serde_yaml::from_str(
            "name: backlog\nmetric_name: applications_active\noperator: \">\"\nthreshold: 100\nseverity: ERROR\n",
        )?;
        def.check()?;
        assert_eq!(def.operator, Operator::Gt);
        assert_eq!(def.window_minutes, 15);

        let bad: AlertRuleDefinition = serde_yaml::from_str(
            "name: x\nmetric_name: m\noperator: \"<\"\nthreshold: 1\nwindow_minutes: 0\n",
        )?;
        assert!(bad.check().is_err());
        Ok(())
    }
}
