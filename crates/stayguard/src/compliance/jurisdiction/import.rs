use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use super::rules::normalize_region;
use super::{RegionRule, RiskLevel, RuleTable, StayClassification};

#[derive(Debug)]
pub enum RuleImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidRule { region: String, reason: String },
    Empty,
}

impl std::fmt::Display for RuleImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleImportError::Io(err) => write!(f, "failed to read rule table: {}", err),
            RuleImportError::Csv(err) => write!(f, "invalid rule table CSV: {}", err),
            RuleImportError::InvalidRule { region, reason } => {
                write!(f, "rule for region '{}' is invalid: {}", region, reason)
            }
            RuleImportError::Empty => write!(f, "rule table contains no regions"),
        }
    }
}

impl std::error::Error for RuleImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RuleImportError::Io(err) => Some(err),
            RuleImportError::Csv(err) => Some(err),
            RuleImportError::InvalidRule { .. } | RuleImportError::Empty => None,
        }
    }
}

impl From<std::io::Error> for RuleImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for RuleImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl RuleTable {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, RuleImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Columns: `region_code,max_stay_days,classification,risk_level,statute_reference,
    /// explanation,allow_extended_if_owner_occupied,extended_stay_days,lodger_statute_reference`.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RuleImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut rules = Vec::new();

        for record in csv_reader.deserialize::<RuleRow>() {
            rules.push(record?.into_rule()?);
        }

        if rules.is_empty() {
            return Err(RuleImportError::Empty);
        }

        Ok(Self::from_rules(rules))
    }
}

#[derive(Debug, Deserialize)]
struct RuleRow {
    region_code: String,
    max_stay_days: u32,
    classification: StayClassification,
    risk_level: RiskLevel,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    statute_reference: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    explanation: Option<String>,
    #[serde(default)]
    allow_extended_if_owner_occupied: bool,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    extended_stay_days: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    lodger_statute_reference: Option<String>,
}

impl RuleRow {
    fn into_rule(self) -> Result<RegionRule, RuleImportError> {
        let region = normalize_region(&self.region_code);
        let invalid = |reason: &str| RuleImportError::InvalidRule {
            region: region.clone(),
            reason: reason.to_string(),
        };

        if region.is_empty() {
            return Err(invalid("region code is blank"));
        }
        if self.max_stay_days == 0 {
            return Err(invalid("max_stay_days must be greater than zero"));
        }

        let extended_stay_days = match self.extended_stay_days.as_deref() {
            Some(raw) => match raw.parse::<u32>() {
                Ok(days) if days > 0 => Some(days),
                _ => return Err(invalid("extended_stay_days must be a positive integer")),
            },
            None => None,
        };

        Ok(RegionRule {
            region_code: region,
            max_stay_days: self.max_stay_days,
            classification: self.classification,
            risk_level: self.risk_level,
            statute_reference: self.statute_reference,
            explanation: self.explanation,
            allow_extended_if_owner_occupied: self.allow_extended_if_owner_occupied,
            extended_stay_days,
            lodger_statute_reference: self.lodger_statute_reference,
        })
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "region_code,max_stay_days,classification,risk_level,statute_reference,explanation,allow_extended_if_owner_occupied,extended_stay_days,lodger_statute_reference\n";

    #[test]
    fn imports_rows_with_optional_columns() {
        let csv = format!(
            "{HEADER}wa,30,guest,medium,RCW 59.18.040,,true,60,\nOR,14,tenant_risk,high,,,false,,\n"
        );
        let table = RuleTable::from_reader(csv.as_bytes()).expect("rules import");

        assert_eq!(table.len(), 2);
        let wa = table.get("WA").expect("wa imported");
        assert_eq!(wa.extended_stay_days, Some(60));
        assert!(wa.allow_extended_if_owner_occupied);
        assert!(wa.explanation.is_none());
        assert!(wa.lodger_statute_reference.is_none());

        let or = table.get("or").expect("or imported");
        assert_eq!(or.classification, StayClassification::TenantRisk);
        assert!(or.statute_reference.is_none());
    }

    #[test]
    fn rejects_zero_day_rules() {
        let csv = format!("{HEADER}NV,0,guest,low,,,false,,\n");
        match RuleTable::from_reader(csv.as_bytes()) {
            Err(RuleImportError::InvalidRule { region, .. }) => assert_eq!(region, "NV"),
            other => panic!("expected invalid rule, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_classification() {
        let csv = format!("{HEADER}NV,10,visitor,low,,,false,,\n");
        assert!(matches!(
            RuleTable::from_reader(csv.as_bytes()),
            Err(RuleImportError::Csv(_))
        ));
    }

    #[test]
    fn header_only_table_is_empty_error() {
        assert!(matches!(
            RuleTable::from_reader(HEADER.as_bytes()),
            Err(RuleImportError::Empty)
        ));
    }
}
