use foundation::math::Vec2;
use serde::{Deserialize, Serialize};

use crate::risk::RiskLevel;

/// A comment pinned to a panorama pixel.
///
/// Built-in comments have no `id` and `is_user == false`; user comments
/// always carry a generated id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub x: f64,
    pub y: f64,
    pub title: String,
    pub description: String,
    pub risk: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub is_user: bool,
}

impl CommentRecord {
    pub fn builtin(
        x: f64,
        y: f64,
        title: impl Into<String>,
        description: impl Into<String>,
        risk: RiskLevel,
    ) -> Self {
        Self {
            x,
            y,
            title: title.into(),
            description: description.into(),
            risk,
            id: None,
            is_user: false,
        }
    }

    pub fn pixel(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Fields supplied by a user when creating a comment.
#[derive(Debug, Clone, PartialEq)]
pub struct NewComment {
    pub pixel: Vec2,
    pub title: String,
    pub description: String,
    pub risk: RiskLevel,
}

impl NewComment {
    /// A comment whose first line becomes the title and whose full text is
    /// the description.
    pub fn from_text(pixel: Vec2, text: &str, risk: RiskLevel) -> Self {
        let text = text.trim();
        let title = text.lines().next().unwrap_or("").trim().to_string();
        Self {
            pixel,
            title,
            description: text.to_string(),
            risk,
        }
    }
}
