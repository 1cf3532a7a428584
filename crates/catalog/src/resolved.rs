use serde::{Deserialize, Serialize};

use crate::risk::RiskLevel;
use crate::store::CommentError;

/// An issue closed out on site, shown in a separate read-only list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedComment {
    pub title: String,
    pub description: String,
    #[serde(rename = "riskLevel")]
    pub risk_level: RiskLevel,
    pub location: String,
}

pub fn parse_resolved(payload: &str) -> Result<Vec<ResolvedComment>, CommentError> {
    serde_json::from_str(payload).map_err(|e| CommentError::Parse(e.to_string()))
}
