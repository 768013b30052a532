use std::collections::BTreeMap;

use super::{RegionRule, RiskLevel, StayClassification};

/// Region rules keyed by upper-cased region code. Seeded once, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: BTreeMap<String, RegionRule>,
}

pub(crate) fn normalize_region(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

impl RuleTable {
    pub fn standard() -> Self {
        Self::from_rules(standard_rules())
    }

    /// Later rules for the same region replace earlier ones.
    pub fn from_rules<I>(rules: I) -> Self
    where
        I: IntoIterator<Item = RegionRule>,
    {
        let rules = rules
            .into_iter()
            .map(|mut rule| {
                rule.region_code = normalize_region(&rule.region_code);
                (rule.region_code.clone(), rule)
            })
            .collect();
        Self { rules }
    }

    pub fn get(&self, region_code: &str) -> Option<&RegionRule> {
        self.rules.get(&normalize_region(region_code))
    }

    pub fn rules(&self) -> impl Iterator<Item = &RegionRule> {
        self.rules.values()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn standard_rules() -> Vec<RegionRule> {
    vec![
        guest_rule(
            "NYC",
            29,
            RiskLevel::High,
            "NYC Admin Code § 26-521",
            "Occupying a dwelling for 30 consecutive days creates tenancy rights. Max 29 days.",
        ),
        guest_rule(
            "FL",
            30,
            RiskLevel::Medium,
            "FL Statute § 82.036 (HB 621)",
            "Sheriff may remove unauthorized person with signed affidavit; no lease.",
        ),
        RegionRule {
            allow_extended_if_owner_occupied: true,
            lodger_statute_reference: Some("CA Civil Code § 1946.5 (Single Lodger)".to_string()),
            ..guest_rule(
                "CA",
                29,
                RiskLevel::Medium,
                "CA Civil Code § 1940.1, AB 1482",
                "Transient occupancy; 30+ days creates tenancy. Lodger if owner lives in.",
            )
        },
        guest_rule(
            "TX",
            29,
            RiskLevel::Medium,
            "Texas Property Code § 92.001, Penal Code § 30.05",
            "Transient housing exempt from landlord-tenant; criminal trespass after notice.",
        ),
        guest_rule(
            "WA",
            29,
            RiskLevel::Medium,
            "RCW 9A.52.105",
            "Tenancy is fact-specific; owner declaration can assist police removal in defined cases.",
        ),
    ]
}

fn guest_rule(
    region_code: &str,
    max_stay_days: u32,
    risk_level: RiskLevel,
    statute: &str,
    explanation: &str,
) -> RegionRule {
    RegionRule {
        region_code: region_code.to_string(),
        max_stay_days,
        classification: StayClassification::Guest,
        risk_level,
        statute_reference: Some(statute.to_string()),
        explanation: Some(explanation.to_string()),
        allow_extended_if_owner_occupied: false,
        extended_stay_days: None,
        lodger_statute_reference: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let table = RuleTable::standard();
        assert!(table.get("nyc").is_some());
        assert!(table.get(" Fl ").is_some());
        assert!(table.get("ZZ").is_none());
    }

    #[test]
    fn from_rules_normalizes_codes_and_keeps_last_duplicate() {
        let mut first = standard_rules().remove(0);
        first.region_code = "nyc".to_string();
        let mut second = first.clone();
        second.max_stay_days = 14;

        let table = RuleTable::from_rules(vec![first, second]);
        assert_eq!(table.len(), 1);
        let rule = table.get("NYC").expect("normalized key");
        assert_eq!(rule.region_code, "NYC");
        assert_eq!(rule.max_stay_days, 14);
    }

    #[test]
    fn standard_table_seeds_five_regions() {
        let table = RuleTable::standard();
        let seeded: Vec<_> = table
            .rules()
            .map(|rule| (rule.region_code.as_str(), rule.max_stay_days, rule.risk_level))
            .collect();
        assert_eq!(
            seeded,
            vec![
                ("CA", 29, RiskLevel::Medium),
                ("FL", 30, RiskLevel::Medium),
                ("NYC", 29, RiskLevel::High),
                ("TX", 29, RiskLevel::Medium),
                ("WA", 29, RiskLevel::Medium),
            ]
        );

        let extended: Vec<_> = table
            .rules()
            .filter(|rule| rule.allow_extended_if_owner_occupied)
            .map(|rule| rule.region_code.as_str())
            .collect();
        assert_eq!(extended, vec!["CA"]);

        let ca = table.get("CA").expect("seeded");
        assert_eq!(
            ca.statute_reference.as_deref(),
            Some("CA Civil Code § 1940.1, AB 1482")
        );
        assert_eq!(
            ca.lodger_statute_reference.as_deref(),
            Some("CA Civil Code § 1946.5 (Single Lodger)")
        );
        assert_eq!(
            table.get("WA").and_then(|rule| rule.statute_reference.as_deref()),
            Some("RCW 9A.52.105")
        );
        assert!(table.get("NY").is_none());
        assert!(table.get("DC").is_none());
    }

    #[test]
    fn seeded_limits_reject_the_thirtieth_day() {
        let resolver = crate::compliance::JurisdictionResolver::default();
        for region in ["NYC", "CA", "TX", "WA"] {
            assert!(resolver.resolve(region, 29, false).expect("seeded").is_within_limit());
            assert!(!resolver.resolve(region, 30, false).expect("seeded").is_within_limit());
        }
        assert!(resolver.resolve("FL", 30, false).expect("seeded").is_within_limit());
    }
}
