use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inventory object category a command, field selection, or cached result set
/// belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Device,
    User,
}

impl EntityKind {
    pub const ALL: [EntityKind; 2] = [EntityKind::Device, EntityKind::User];

    /// Singular keyword used in command text (`count device`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::User => "user",
        }
    }

    /// Plural form used in replies, file names, and REST paths.
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Device => "devices",
            Self::User => "users",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "device" | "devices" => Some(Self::Device),
            "user" | "users" => Some(Self::User),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural())
    }
}

/// Schema-less record returned by the inventory service.
///
/// Only counted and re-serialized; the one field ever read is the internal
/// identifier the label endpoints need.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(pub Value);

impl Row {
    pub const ID_FIELD: &'static str = "internal_axon_id";

    pub fn id(&self) -> Option<&str> {
        self.0.get(Self::ID_FIELD).and_then(Value::as_str)
    }
}

impl From<Value> for Row {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{EntityKind, Row};

    #[test]
    fn parse_accepts_singular_and_plural_keywords() {
        assert_eq!(EntityKind::parse("device"), Some(EntityKind::Device));
        assert_eq!(EntityKind::parse("users"), Some(EntityKind::User));
        assert_eq!(EntityKind::parse("Device"), None);
    }

    #[test]
    fn display_uses_plural_form() {
        assert_eq!(EntityKind::Device.to_string(), "devices");
        assert_eq!(EntityKind::User.to_string(), "users");
    }

    #[test]
    fn row_serializes_transparently_and_exposes_id() {
        let row = Row(json!({"internal_axon_id": "abc", "hostname": "h1"}));
        assert_eq!(row.id(), Some("abc"));
        let rendered = serde_json::to_value(&row).expect("serialize");
        assert_eq!(rendered, json!({"internal_axon_id": "abc", "hostname": "h1"}));
    }
}
