use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::domain::entity::{EntityKind, Row};
use crate::domain::fields::{FieldSelection, GENERIC_ADAPTER};
use crate::errors::InventoryError;

/// Live field schema for one entity kind.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(default)]
    pub generic: Vec<String>,
    #[serde(default)]
    pub specific: IndexMap<String, Vec<String>>,
}

impl FieldSchema {
    /// Generic marker followed by every specific adapter name.
    pub fn adapter_names(&self) -> Vec<String> {
        std::iter::once(GENERIC_ADAPTER.to_owned()).chain(self.specific.keys().cloned()).collect()
    }

    pub fn fields_for(&self, adapter: &str) -> Option<&[String]> {
        if adapter == GENERIC_ADAPTER {
            return Some(&self.generic);
        }
        self.specific.get(adapter).map(Vec::as_slice)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedQuery {
    pub name: String,
    pub filter: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Columns requested by a query: the session's live selection, or the flat
/// field list stored with a saved query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryFields {
    Selection(FieldSelection),
    Manual(Vec<String>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryRequest {
    pub filter: String,
    pub fields: QueryFields,
    pub min_results: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldLookup {
    pub adapter: String,
    pub field: String,
    pub value: String,
    pub is_regex: bool,
    pub min_results: usize,
}

impl FieldLookup {
    pub const REGEX_PREFIX: &'static str = "re=";

    /// Builds a lookup from a raw command value, honouring the `re=` switch.
    pub fn from_raw_value(adapter: &str, field: &str, raw_value: &str) -> Self {
        let trimmed = raw_value.trim();
        let regex_value = trimmed
            .get(..Self::REGEX_PREFIX.len())
            .filter(|prefix| prefix.eq_ignore_ascii_case(Self::REGEX_PREFIX))
            .map(|_| trimmed[Self::REGEX_PREFIX.len()..].trim());

        Self {
            adapter: adapter.to_owned(),
            field: field.to_owned(),
            value: regex_value.unwrap_or(trimmed).to_owned(),
            is_regex: regex_value.is_some(),
            min_results: 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelAction {
    Add,
    Delete,
}

impl LabelAction {
    pub fn past_tense(&self) -> &'static str {
        match self {
            Self::Add => "Added",
            Self::Delete => "Deleted",
        }
    }
}

/// Remote asset-inventory service.
///
/// Implementations own their own connection and timeout behaviour; every
/// transport or authentication failure is reported as
/// [`InventoryError::Remote`].
#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Base URL of the instance, shown to chat users.
    fn instance_url(&self) -> &str;

    async fn schema(&self, kind: EntityKind) -> Result<FieldSchema, InventoryError>;

    async fn count(&self, kind: EntityKind) -> Result<u64, InventoryError>;

    async fn query(
        &self,
        kind: EntityKind,
        request: &QueryRequest,
    ) -> Result<Vec<Row>, InventoryError>;

    async fn get_by_field(
        &self,
        kind: EntityKind,
        lookup: &FieldLookup,
        fields: &FieldSelection,
    ) -> Result<Vec<Row>, InventoryError>;

    async fn list_saved_queries(&self, kind: EntityKind)
        -> Result<Vec<SavedQuery>, InventoryError>;

    async fn get_saved_query(
        &self,
        kind: EntityKind,
        name: &str,
    ) -> Result<SavedQuery, InventoryError>;

    async fn add_labels(
        &self,
        kind: EntityKind,
        rows: &[Row],
        labels: &[String],
    ) -> Result<u64, InventoryError>;

    async fn delete_labels(
        &self,
        kind: EntityKind,
        rows: &[Row],
        labels: &[String],
    ) -> Result<u64, InventoryError>;

    async fn apply_labels(
        &self,
        action: LabelAction,
        kind: EntityKind,
        rows: &[Row],
        labels: &[String],
    ) -> Result<u64, InventoryError> {
        match action {
            LabelAction::Add => self.add_labels(kind, rows, labels).await,
            LabelAction::Delete => self.delete_labels(kind, rows, labels).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldLookup, FieldSchema};

    #[test]
    fn regex_prefix_switches_lookup_mode() {
        let lookup = FieldLookup::from_raw_value("generic", "hostname", "RE=^web-.*");
        assert!(lookup.is_regex);
        assert_eq!(lookup.value, "^web-.*");

        let literal = FieldLookup::from_raw_value("generic", "hostname", " web-01 ");
        assert!(!literal.is_regex);
        assert_eq!(literal.value, "web-01");
        assert_eq!(literal.min_results, 1);
    }

    #[test]
    fn short_or_multibyte_values_do_not_panic() {
        let lookup = FieldLookup::from_raw_value("generic", "username", "é");
        assert_eq!(lookup.value, "é");
        assert!(!lookup.is_regex);
    }

    #[test]
    fn schema_adapter_names_start_with_generic() {
        let mut schema = FieldSchema { generic: vec!["hostname".to_owned()], ..Default::default() };
        schema.specific.insert("aws_adapter".to_owned(), vec!["aws_device_type".to_owned()]);

        assert_eq!(schema.adapter_names(), vec!["generic", "aws_adapter"]);
        assert_eq!(schema.fields_for("generic"), Some(&["hostname".to_owned()][..]));
        assert!(schema.fields_for("missing").is_none());
    }
}
