//! Region rules and the pure stay classification that sits on top of them.
//!
//! The resolver never touches storage: given the same rule table and inputs it always
//! yields the same [`ClassificationResult`], so every regional edge case belongs here.

mod import;
mod rules;

pub use import::RuleImportError;
pub use rules::RuleTable;

use serde::{Deserialize, Serialize};

/// Extended cap applied on the owner-occupied lodger branch when a rule does not carry its own.
pub const DEFAULT_EXTENDED_STAY_DAYS: u32 = 90;

const GENERIC_LODGER_STATUTE: &str =
    "Owner-occupied lodger exception (guest shares living quarters with the owner)";

/// Legal character of an occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StayClassification {
    Guest,
    Lodger,
    TenantRisk,
}

impl StayClassification {
    pub const fn label(self) -> &'static str {
        match self {
            StayClassification::Guest => "guest",
            StayClassification::Lodger => "lodger",
            StayClassification::TenantRisk => "tenant_risk",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const fn label(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    WithinLimit,
    ExceedsLimit,
}

/// Reference data describing one region's maximum-duration rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRule {
    pub region_code: String,
    pub max_stay_days: u32,
    pub classification: StayClassification,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub statute_reference: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub allow_extended_if_owner_occupied: bool,
    /// Overrides the resolver-wide extended cap for this region.
    #[serde(default)]
    pub extended_stay_days: Option<u32>,
    #[serde(default)]
    pub lodger_statute_reference: Option<String>,
}

/// Output of [`JurisdictionResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub region_code: String,
    pub classification: StayClassification,
    pub risk_level: RiskLevel,
    pub max_allowed_days: u32,
    pub stay_duration_days: i64,
    pub compliance_status: ComplianceStatus,
    pub statutes: Vec<String>,
    pub owner_occupied_exception: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ClassificationResult {
    pub fn is_within_limit(&self) -> bool {
        self.compliance_status == ComplianceStatus::WithinLimit
    }

    pub fn primary_statute(&self) -> Option<&str> {
        self.statutes.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("no jurisdiction rule configured for region '{0}'")]
    UnknownRegion(String),
}

/// Deterministic classifier over a seeded [`RuleTable`].
#[derive(Debug, Clone)]
pub struct JurisdictionResolver {
    table: RuleTable,
    extended_stay_days: u32,
}

impl Default for JurisdictionResolver {
    fn default() -> Self {
        Self::new(RuleTable::standard())
    }
}

impl JurisdictionResolver {
    pub fn new(table: RuleTable) -> Self {
        Self {
            table,
            extended_stay_days: DEFAULT_EXTENDED_STAY_DAYS,
        }
    }

    /// Replace the default extended cap; zero is ignored.
    pub fn with_extended_stay_days(mut self, days: u32) -> Self {
        if days > 0 {
            self.extended_stay_days = days;
        }
        self
    }

    pub fn extended_stay_days(&self) -> u32 {
        self.extended_stay_days
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    pub fn rule(&self, region_code: &str) -> Option<&RegionRule> {
        self.table.get(region_code)
    }

    pub fn resolve(
        &self,
        region_code: &str,
        stay_duration_days: i64,
        owner_occupied: bool,
    ) -> Result<ClassificationResult, ResolveError> {
        let rule = self
            .table
            .get(region_code)
            .ok_or_else(|| ResolveError::UnknownRegion(region_code.trim().to_string()))?;

        let mut statutes: Vec<String> = rule.statute_reference.iter().cloned().collect();
        let mut max_allowed_days = rule.max_stay_days;
        let mut classification = rule.classification;
        let exception = rule.allow_extended_if_owner_occupied && owner_occupied;

        if exception {
            max_allowed_days = rule.extended_stay_days.unwrap_or(self.extended_stay_days);
            classification = StayClassification::Lodger;
            statutes.push(
                rule.lodger_statute_reference
                    .clone()
                    .unwrap_or_else(|| GENERIC_LODGER_STATUTE.to_string()),
            );
        }

        let within = stay_duration_days <= i64::from(max_allowed_days);
        let message = if within {
            None
        } else {
            Some(format!(
                "Stay of {stay_duration_days} days exceeds the {max_allowed_days}-day limit for {}{}",
                rule.region_code,
                statutes
                    .first()
                    .map(|statute| format!(" ({statute})"))
                    .unwrap_or_default(),
            ))
        };

        Ok(ClassificationResult {
            region_code: rule.region_code.clone(),
            classification,
            risk_level: rule.risk_level,
            max_allowed_days,
            stay_duration_days,
            compliance_status: if within {
                ComplianceStatus::WithinLimit
            } else {
                ComplianceStatus::ExceedsLimit
            },
            statutes,
            owner_occupied_exception: exception,
            explanation: rule.explanation.clone(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(code: &str, max: u32, extended: bool) -> RegionRule {
        RegionRule {
            region_code: code.to_string(),
            max_stay_days: max,
            classification: StayClassification::Guest,
            risk_level: RiskLevel::Medium,
            statute_reference: Some(format!("{code} Stat. 1")),
            explanation: None,
            allow_extended_if_owner_occupied: extended,
            extended_stay_days: None,
            lodger_statute_reference: None,
        }
    }

    #[test]
    fn every_seeded_region_flips_at_its_limit() {
        let resolver = JurisdictionResolver::default();
        for rule in resolver.table().rules() {
            let max = i64::from(rule.max_stay_days);
            let at_limit = resolver
                .resolve(&rule.region_code, max, false)
                .expect("seeded region resolves");
            assert!(at_limit.is_within_limit(), "{} at limit", rule.region_code);
            assert!(at_limit.message.is_none());

            let over = resolver
                .resolve(&rule.region_code, max + 1, false)
                .expect("seeded region resolves");
            assert_eq!(over.compliance_status, ComplianceStatus::ExceedsLimit);
            assert_eq!(over.classification, rule.classification);
        }
    }

    #[test]
    fn owner_occupied_exception_switches_to_lodger_cap() {
        let resolver = JurisdictionResolver::new(RuleTable::from_rules(vec![rule("CA", 30, true)]));

        let result = resolver.resolve("ca", 75, true).expect("rule exists");
        assert_eq!(result.classification, StayClassification::Lodger);
        assert_eq!(result.max_allowed_days, DEFAULT_EXTENDED_STAY_DAYS);
        assert!(result.is_within_limit());
        assert!(result.owner_occupied_exception);
        assert_eq!(result.statutes.len(), 2);
        assert_eq!(result.statutes[1], GENERIC_LODGER_STATUTE);

        let not_occupied = resolver.resolve("CA", 75, false).expect("rule exists");
        assert_eq!(not_occupied.classification, StayClassification::Guest);
        assert_eq!(not_occupied.max_allowed_days, 30);
        assert!(!not_occupied.is_within_limit());
    }

    #[test]
    fn exception_ignored_when_rule_disallows_it() {
        let resolver = JurisdictionResolver::new(RuleTable::from_rules(vec![rule("TX", 30, false)]));
        let result = resolver.resolve("TX", 31, true).expect("rule exists");
        assert_eq!(result.max_allowed_days, 30);
        assert!(!result.owner_occupied_exception);
        assert_eq!(result.statutes, vec!["TX Stat. 1".to_string()]);
    }

    #[test]
    fn rule_level_extended_cap_wins_over_default() {
        let mut with_cap = rule("WA", 30, true);
        with_cap.extended_stay_days = Some(60);
        with_cap.lodger_statute_reference = Some("RCW 59.18.040".to_string());
        let resolver = JurisdictionResolver::new(RuleTable::from_rules(vec![with_cap]))
            .with_extended_stay_days(120);

        let result = resolver.resolve("WA", 61, true).expect("rule exists");
        assert_eq!(result.max_allowed_days, 60);
        assert_eq!(result.statutes[1], "RCW 59.18.040");
        let message = result.message.expect("exceeding stays carry a message");
        assert!(message.contains("61 days"));
        assert!(message.contains("60-day"));
    }

    #[test]
    fn unknown_region_is_reported() {
        let resolver = JurisdictionResolver::default();
        assert_eq!(
            resolver.resolve(" zz ", 3, false),
            Err(ResolveError::UnknownRegion("zz".to_string()))
        );
    }

    #[test]
    fn zero_extended_cap_is_ignored() {
        let resolver = JurisdictionResolver::default().with_extended_stay_days(0);
        assert_eq!(resolver.extended_stay_days(), DEFAULT_EXTENDED_STAY_DAYS);
    }
}
