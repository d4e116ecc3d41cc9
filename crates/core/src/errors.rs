use thiserror::Error;

use crate::domain::entity::EntityKind;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FieldSpecError {
    #[error("Need 'adapter_name:fields' in '{segment}'\n{example}")]
    MalformedFieldSet { segment: String, example: String },
    #[error("Need at least one field in '{segment}'\n{example}")]
    EmptyFieldList { segment: String, example: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No such adapter named '{adapter}', valid adapter names: {}", name_list(.known))]
    UnknownAdapter { adapter: String, known: Vec<String> },
    #[error(
        "No such field named '{field}' available in adapter '{adapter}', valid field names: {}",
        name_list(.known)
    )]
    UnknownField { field: String, adapter: String, known: Vec<String> },
    #[error("Error fetching {kind} fields: {source}")]
    Schema {
        kind: EntityKind,
        #[source]
        source: InventoryError,
    },
}

/// Failures surfaced by the inventory collaborator.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InventoryError {
    #[error("expected at least {required} {kind}, found {found}")]
    TooFewResults { kind: EntityKind, required: usize, found: usize },
    #[error("no saved query named '{name}' for {kind}")]
    SavedQueryNotFound { kind: EntityKind, name: String },
    #[error("remote call failed: {0}")]
    Remote(String),
}

/// Startup failure while turning a configured field spec into a live selection.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FieldInitError {
    #[error("invalid {kind} field spec: {source}")]
    Spec {
        kind: EntityKind,
        #[source]
        source: FieldSpecError,
    },
    #[error("could not resolve {kind} fields: {source}")]
    Resolve {
        kind: EntityKind,
        #[source]
        source: ResolveError,
    },
}

impl FieldInitError {
    /// True when the failure came from the remote service rather than the
    /// configured names themselves.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Resolve { source: ResolveError::Schema { .. }, .. })
    }
}

fn name_list(names: &[String]) -> String {
    names.iter().map(|name| format!("\n\t{name}")).collect()
}
