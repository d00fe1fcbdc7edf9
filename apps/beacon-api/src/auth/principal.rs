use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The authenticated identity behind a request.
///
/// `info` carries arbitrary application metadata (avatar, role, ...) that
/// presence channels may expose to other members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub info: Value,
}

impl Principal {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            info: Value::Null,
        }
    }

    /// Default member payload exposed on presence channels when a guard
    /// grants access without custom member info.
    pub fn member_info(&self) -> Value {
        serde_json::json!({ "id": self.id, "name": self.name })
    }
}
