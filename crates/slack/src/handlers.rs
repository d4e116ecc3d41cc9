use std::sync::Arc;

use async_trait::async_trait;
use axonbot_core::{
    BotSession, EntityKind, FieldAddOutcome, FieldRemoveOutcome, FieldSelection, InventoryError,
    LabelAction, QueryFields, QueryRequest, Row,
};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::commands::{CommandRequest, CommandService, LookupKey};
use crate::replies::{self, Reply, ResultSet};

pub const NO_CACHED_RESULTS: &str =
    "No objects requested or objects have expired, get an object first!";
pub const MISSING_LABEL_COMMAND: &str = "Missing label command, supply one of: add, delete";
pub const NO_LABELS: &str = "No labels provided, provide a CSV list of labels!";

/// Command service backed by the shared bot session.
pub struct InventoryCommandService {
    session: Arc<BotSession>,
}

impl InventoryCommandService {
    pub fn new(session: Arc<BotSession>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &BotSession {
        &self.session
    }

    /// Turns a fetch outcome into a file reply. The rows travel with the
    /// reply and reach the cache only after the upload succeeds.
    fn deliver_rows(
        &self,
        kind: EntityKind,
        outcome: Result<Vec<Row>, InventoryError>,
        not_found: String,
        failure: String,
        request: &CommandRequest,
    ) -> Reply {
        let rows = match outcome {
            Ok(rows) if !rows.is_empty() => rows,
            Ok(_) | Err(InventoryError::TooFewResults { .. }) => {
                info!(
                    event_name = "command.fetch.empty",
                    correlation_id = %request.correlation_id,
                    thread_id = %request.thread_key,
                    entity = kind.plural(),
                    "fetch matched nothing"
                );
                return Reply::text(not_found);
            }
            Err(inventory_error) => {
                log_inventory_failure(&inventory_error, request, "fetch");
                return Reply::text(format!("{failure}: {inventory_error}"));
            }
        };

        let row_count = rows.len();
        match Reply::rows_file(kind, rows, Utc::now()) {
            Ok(reply) => {
                info!(
                    event_name = "command.fetch.completed",
                    correlation_id = %request.correlation_id,
                    thread_id = %request.thread_key,
                    entity = kind.plural(),
                    row_count,
                    "fetched result set"
                );
                reply
            }
            Err(encode_error) => {
                error!(
                    event_name = "command.fetch.encode_failed",
                    correlation_id = %request.correlation_id,
                    thread_id = %request.thread_key,
                    error = %encode_error,
                    "could not serialize result rows"
                );
                Reply::text(format!("{failure}: {encode_error}"))
            }
        }
    }

    fn field_reply(
        &self,
        kind: EntityKind,
        message: String,
        listing: &FieldSelection,
        request: &CommandRequest,
    ) -> Reply {
        info!(
            event_name = "fields.updated",
            correlation_id = %request.correlation_id,
            thread_id = %request.thread_key,
            entity = kind.plural(),
            adapters = listing.adapter_count(),
            "{message}"
        );
        Reply::text(format!("{message}\n\n{}", replies::fields_listing(kind, listing)))
    }
}

#[async_trait]
impl CommandService for InventoryCommandService {
    async fn hello(&self, _request: &CommandRequest) -> Reply {
        Reply::text(replies::hello(self.session.uptime(), self.session.client().instance_url()))
    }

    async fn count(&self, kind: EntityKind, request: &CommandRequest) -> Reply {
        match self.session.client().count(kind).await {
            Ok(total) => Reply::text(format!("Total {kind}: {total}")),
            Err(inventory_error) => {
                log_inventory_failure(&inventory_error, request, "count");
                Reply::text(format!("Error fetching {kind} count: {inventory_error}"))
            }
        }
    }

    async fn show_fields(&self, kind: EntityKind, _request: &CommandRequest) -> Reply {
        let fields = self.session.entity(kind).fields().await;
        Reply::text(replies::fields_listing(kind, &fields))
    }

    async fn add_field(
        &self,
        kind: EntityKind,
        adapter: &str,
        field: &str,
        request: &CommandRequest,
    ) -> Reply {
        let entity = self.session.entity(kind);
        let resolved = match entity.resolver().resolve(kind, adapter, field).await {
            Ok(resolved) => resolved,
            Err(resolve_error) => return Reply::text(resolve_error.to_string()),
        };

        let (outcome, listing) = entity.add_field(&resolved).await;
        let message = match outcome {
            FieldAddOutcome::Added => format!(
                "Added field '{}' for adapter '{}' for {kind}",
                resolved.field, resolved.adapter
            ),
            FieldAddOutcome::AlreadyPresent => format!(
                "Field '{}' for adapter '{}' for {kind} already exists",
                resolved.field, resolved.adapter
            ),
        };
        self.field_reply(kind, message, &listing, request)
    }

    async fn delete_field(
        &self,
        kind: EntityKind,
        adapter: &str,
        field: &str,
        request: &CommandRequest,
    ) -> Reply {
        let entity = self.session.entity(kind);
        let resolved = match entity.resolver().resolve(kind, adapter, field).await {
            Ok(resolved) => resolved,
            Err(resolve_error) => return Reply::text(resolve_error.to_string()),
        };

        let (outcome, listing) = entity.remove_field(&resolved).await;
        let message = match outcome {
            FieldRemoveOutcome::Removed { .. } => format!(
                "Removed field '{}' for adapter '{}' for {kind}",
                resolved.field, resolved.adapter
            ),
            FieldRemoveOutcome::AdapterNotPresent => {
                format!("Adapter '{}' is not in the current {kind} fields!", resolved.adapter)
            }
            FieldRemoveOutcome::FieldNotPresent => format!(
                "Field '{}' for adapter '{}' is not in the current {kind} fields!",
                resolved.field, resolved.adapter
            ),
        };
        self.field_reply(kind, message, &listing, request)
    }

    async fn fetch_by_query(
        &self,
        kind: EntityKind,
        filter: &str,
        request: &CommandRequest,
    ) -> Reply {
        let query = QueryRequest {
            filter: filter.to_owned(),
            fields: QueryFields::Selection(self.session.entity(kind).fields().await),
            min_results: 1,
        };
        let outcome = self.session.client().query(kind, &query).await;

        self.deliver_rows(
            kind,
            outcome,
            format!("No {kind} found using query '{filter}'"),
            format!("Error fetching {kind} using query '{filter}'"),
            request,
        )
    }

    async fn fetch_by_field(
        &self,
        key: LookupKey,
        value: &str,
        request: &CommandRequest,
    ) -> Reply {
        let kind = key.kind();
        let lookup = key.lookup(value);
        let fields = self.session.entity(kind).fields().await;
        let outcome = self.session.client().get_by_field(kind, &lookup, &fields).await;

        let value_name = key.value_name();
        self.deliver_rows(
            kind,
            outcome,
            format!("No {kind} matching {value_name} '{value}' found"),
            format!("Error fetching {kind} matching {value_name} '{value}'"),
            request,
        )
    }

    async fn list_saved_queries(&self, kind: EntityKind, request: &CommandRequest) -> Reply {
        match self.session.client().list_saved_queries(kind).await {
            Ok(queries) if queries.is_empty() => {
                Reply::text(format!("No saved queries for {kind} found"))
            }
            Ok(queries) => {
                let mut lines = vec![format!("Saved Queries for {kind}:")];
                lines.extend(queries.iter().map(|query| format!("\t- *{}*", query.name)));
                Reply::text(lines.join("\n"))
            }
            Err(inventory_error) => {
                log_inventory_failure(&inventory_error, request, "saved_queries");
                Reply::text(format!("Error fetching saved queries for {kind}: {inventory_error}"))
            }
        }
    }

    async fn fetch_saved_query(
        &self,
        kind: EntityKind,
        name: &str,
        request: &CommandRequest,
    ) -> Reply {
        let failure = format!("Error fetching {kind} using saved query '{name}'");
        let saved = match self.session.client().get_saved_query(kind, name).await {
            Ok(saved) => saved,
            Err(InventoryError::SavedQueryNotFound { .. }) => {
                return Reply::text(format!("No saved query {name} for {kind} found"));
            }
            Err(inventory_error) => {
                log_inventory_failure(&inventory_error, request, "saved_query");
                return Reply::text(format!("{failure}: {inventory_error}"));
            }
        };

        let query = QueryRequest {
            filter: saved.filter,
            fields: QueryFields::Manual(saved.fields),
            min_results: 1,
        };
        let outcome = self.session.client().query(kind, &query).await;

        self.deliver_rows(
            kind,
            outcome,
            format!("No {kind} found using saved query '{name}'"),
            failure,
            request,
        )
    }

    async fn change_labels(&self, args: &str, request: &CommandRequest) -> Reply {
        let Some(entry) = self.session.cache().get(&request.thread_key) else {
            return Reply::text(NO_CACHED_RESULTS);
        };

        let (action, rest) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
        let action = match action.to_ascii_lowercase().as_str() {
            "add" => LabelAction::Add,
            "delete" => LabelAction::Delete,
            _ => return Reply::text(MISSING_LABEL_COMMAND),
        };

        let labels = rest
            .split(',')
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(str::to_owned)
            .collect::<Vec<_>>();
        if labels.is_empty() {
            return Reply::text(NO_LABELS);
        }

        let kind = entry.kind;
        match self.session.client().apply_labels(action, kind, &entry.rows, &labels).await {
            Ok(changed) => {
                info!(
                    event_name = "command.labels.applied",
                    correlation_id = %request.correlation_id,
                    thread_id = %request.thread_key,
                    entity = kind.plural(),
                    action = ?action,
                    changed,
                    "updated labels on cached result set"
                );
                Reply::text(format!(
                    "{} labels '{}' on {changed} {kind}",
                    action.past_tense(),
                    labels.join(", ")
                ))
            }
            Err(inventory_error) => {
                log_inventory_failure(&inventory_error, request, "labels");
                Reply::text(format!("Error updating labels on {kind}: {inventory_error}"))
            }
        }
    }

    async fn results_delivered(&self, request: &CommandRequest, results: ResultSet) {
        self.session.cache().put(&request.thread_key, results.kind, results.rows);
    }
}

fn log_inventory_failure(inventory_error: &InventoryError, request: &CommandRequest, step: &str) {
    match inventory_error {
        InventoryError::Remote(_) => error!(
            event_name = "command.inventory.failed",
            correlation_id = %request.correlation_id,
            thread_id = %request.thread_key,
            step,
            error = %inventory_error,
            "inventory call failed"
        ),
        _ => warn!(
            event_name = "command.inventory.rejected",
            correlation_id = %request.correlation_id,
            thread_id = %request.thread_key,
            step,
            error = %inventory_error,
            "inventory call rejected"
        ),
    }
}
