//! Typed boundary for the external collaborators (health, classification, scenario analysis)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Health status reported by the health collaborator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    /// Critical blocks the HEALTH state
    pub fn is_failing(&self) -> bool {
        matches!(self, HealthStatus::Critical)
    }

    pub fn is_degraded(&self) -> bool {
        !matches!(self, HealthStatus::Healthy)
    }
}

/// Result of a health check
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub status: HealthStatus,
    #[serde(default)]
    pub detail: String,
}

/// Risk levels produced by the classifier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// HIGH and CRITICAL require operator approval
    pub fn requires_approval(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }

    pub fn name(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            other => Err(format!(
                "Invalid risk level: '{}'. Expected low, medium, high or critical",
                other
            )),
        }
    }
}

/// Classifier output. Inputs that cannot be classified are a value, not an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classification {
    Classified {
        level: RiskLevel,
        confidence: f64,
        #[serde(default)]
        reasoning: Vec<String>,
    },
    Unclassified {
        reason: String,
    },
}

/// Output of the scenario (CSI) analysis collaborator
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScenarioAnalysis {
    pub risk_score: f64,
    #[serde(default)]
    pub gaps: Vec<String>,
    #[serde(default)]
    pub scenarios: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_parse() {
        assert_eq!("critical".parse::<RiskLevel>().unwrap(), RiskLevel::Critical);
        assert_eq!(" High ".parse::<RiskLevel>().unwrap(), RiskLevel::High);
        assert!("unknown".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn test_risk_level_gate() {
        assert!(!RiskLevel::Low.requires_approval());
        assert!(!RiskLevel::Medium.requires_approval());
        assert!(RiskLevel::High.requires_approval());
        assert!(RiskLevel::Critical.requires_approval());
    }

    #[test]
    fn test_classification_serde_tag() {
        let c = Classification::Classified {
            level: RiskLevel::Critical,
            confidence: 0.99,
            reasoning: vec!["destructive command".to_string()],
        };
        let value = serde_json::to_value(&c).unwrap();
        assert_eq!(value["kind"], "classified");
        assert_eq!(value["level"], "CRITICAL");

        let back: Classification = serde_json::from_value(value).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_health_status() {
        assert!(HealthStatus::Critical.is_failing());
        assert!(!HealthStatus::Warning.is_failing());
        assert!(HealthStatus::Warning.is_degraded());
        assert!(!HealthStatus::Healthy.is_degraded());
    }
}
