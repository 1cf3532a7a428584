use serde::{Deserialize, Serialize};

/// Identifier of a building floor (`"ground"`, `"3rd"`, `"roof"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FloorId(String);

impl FloorId {
    pub fn new(id: impl Into<String>) -> Self {
        FloorId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FloorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FloorId {
    fn from(s: &str) -> Self {
        FloorId::new(s)
    }
}

/// 1-based step index within a floor.
pub type Step = u32;
