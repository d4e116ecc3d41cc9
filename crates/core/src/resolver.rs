//! Adapter and field name resolution against the live inventory schema.
//!
//! Users type loose names (`aws`, `HOSTNAME`, `host`); resolution maps them to
//! the canonical names the schema knows, or fails with the list of valid
//! choices so the user can correct the command.

use tracing::debug;

use crate::domain::entity::EntityKind;
use crate::domain::fields::{FieldSelection, GENERIC_ADAPTER};
use crate::errors::ResolveError;
use crate::inventory::{FieldSchema, InventoryClient};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedField {
    pub adapter: String,
    pub field: String,
}

pub struct FieldResolver<'a> {
    client: &'a dyn InventoryClient,
}

impl<'a> FieldResolver<'a> {
    pub fn new(client: &'a dyn InventoryClient) -> Self {
        Self { client }
    }

    /// Resolves one adapter/field pair. Reads the schema remotely; never
    /// touches any selection.
    pub async fn resolve(
        &self,
        kind: EntityKind,
        adapter: &str,
        field: &str,
    ) -> Result<ResolvedField, ResolveError> {
        let schema = self.schema(kind).await?;
        resolve_in_schema(&schema, adapter, field)
    }

    /// Resolves every pair of `requested` into a canonical selection. The
    /// first unresolvable pair aborts the whole build.
    pub async fn resolve_selection(
        &self,
        kind: EntityKind,
        requested: &FieldSelection,
    ) -> Result<FieldSelection, ResolveError> {
        let schema = self.schema(kind).await?;
        let mut resolved = FieldSelection::new();
        for (adapter, fields) in requested.iter() {
            for field in fields {
                let pair = resolve_in_schema(&schema, adapter, field)?;
                resolved.add(&pair.adapter, &pair.field);
            }
        }
        Ok(resolved)
    }

    async fn schema(&self, kind: EntityKind) -> Result<FieldSchema, ResolveError> {
        let schema =
            self.client.schema(kind).await.map_err(|source| ResolveError::Schema { kind, source })?;
        debug!(
            event_name = "fields.schema_loaded",
            entity = kind.plural(),
            specific_adapters = schema.specific.len(),
            generic_fields = schema.generic.len(),
            "loaded field schema"
        );
        Ok(schema)
    }
}

pub fn resolve_in_schema(
    schema: &FieldSchema,
    adapter: &str,
    field: &str,
) -> Result<ResolvedField, ResolveError> {
    let adapter = resolve_adapter(schema, adapter)?;
    let known_fields = schema.fields_for(&adapter).unwrap_or_default();
    let field =
        match_name(field, known_fields).ok_or_else(|| ResolveError::UnknownField {
            field: field.to_owned(),
            adapter: adapter.clone(),
            known: known_fields.to_vec(),
        })?;

    Ok(ResolvedField { adapter, field: field.to_owned() })
}

fn resolve_adapter(schema: &FieldSchema, adapter: &str) -> Result<String, ResolveError> {
    if adapter == GENERIC_ADAPTER {
        return Ok(GENERIC_ADAPTER.to_owned());
    }

    let specific = schema.specific.keys().cloned().collect::<Vec<_>>();
    match_name(adapter, &specific).map(str::to_owned).ok_or_else(|| {
        ResolveError::UnknownAdapter { adapter: adapter.to_owned(), known: schema.adapter_names() }
    })
}

/// Finds the single candidate `token` refers to: an exact match, then a
/// unique case-insensitive match, then a unique case-insensitive prefix.
pub fn match_name<'c>(token: &str, candidates: &'c [String]) -> Option<&'c str> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    if let Some(exact) = candidates.iter().find(|candidate| candidate.as_str() == token) {
        return Some(exact);
    }

    let lowered = token.to_lowercase();
    let folded =
        candidates.iter().filter(|candidate| candidate.to_lowercase() == lowered).collect::<Vec<_>>();
    match folded.as_slice() {
        [only] => return Some(only.as_str()),
        [] => {}
        _ => return None,
    }

    let prefixed = candidates
        .iter()
        .filter(|candidate| candidate.to_lowercase().starts_with(&lowered))
        .collect::<Vec<_>>();
    match prefixed.as_slice() {
        [only] => Some(only.as_str()),
        _ => None,
    }
}
