pub mod report;
pub mod rule;

pub use report::{CheckStatus, QualityCheckResult, QualityReport, SeveritySummary, order_results};
pub use rule::{CompiledRule, QualityRule, RuleCheck, RuleDefinition, RuleParams, RuleType};
