use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Severity tag of a comment. Drives styling only.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Normal,
    Medium,
    High,
    Info,
}

/// How a risk level is presented: badge text, badge colour and pin icon.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct RiskDisplay {
    pub badge: &'static str,
    pub color: &'static str,
    pub icon: &'static str,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Normal,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Info,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Normal => "normal",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Info => "info",
        }
    }

    pub fn display(self) -> RiskDisplay {
        match self {
            RiskLevel::Normal => RiskDisplay {
                badge: "NORMAL RISK",
                color: "#0C8CE9",
                icon: "./data/icons/comments/normal_risk.svg",
            },
            RiskLevel::Medium => RiskDisplay {
                badge: "MEDIUM RISK",
                color: "#FFB54C",
                icon: "./data/icons/comments/medium_risk.svg",
            },
            RiskLevel::High => RiskDisplay {
                badge: "HIGH RISK",
                color: "#FF0000",
                icon: "./data/icons/comments/high_risk.svg",
            },
            RiskLevel::Info => RiskDisplay {
                badge: "INFO",
                color: "#22AA00",
                icon: "./data/icons/comments/info.svg",
            },
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRiskLevel(pub String);

impl fmt::Display for UnknownRiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown risk level {:?} (expected normal|medium|high|info)", self.0)
    }
}

impl std::error::Error for UnknownRiskLevel {}

impl FromStr for RiskLevel {
    type Err = UnknownRiskLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        RiskLevel::ALL
            .into_iter()
            .find(|r| r.as_str() == wanted)
            .ok_or_else(|| UnknownRiskLevel(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::RiskLevel;

    #[test]
    fn badges_match_levels() {
        let badges: Vec<_> = RiskLevel::ALL.iter().map(|r| r.display().badge).collect();
        assert_eq!(badges, vec!["NORMAL RISK", "MEDIUM RISK", "HIGH RISK", "INFO"]);
        assert_eq!(RiskLevel::High.display().color, "#FF0000");
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("High".parse::<RiskLevel>(), Ok(RiskLevel::High));
        assert_eq!(" info ".parse::<RiskLevel>(), Ok(RiskLevel::Info));
        assert!("critical".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&RiskLevel::Medium).expect("serialize");
        assert_eq!(json, "\"medium\"");
        let back: RiskLevel = serde_json::from_str("\"info\"").expect("deserialize");
        assert_eq!(back, RiskLevel::Info);
    }
}
