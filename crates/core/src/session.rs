use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::info;

use crate::cache::ResultCache;
use crate::domain::entity::EntityKind;
use crate::domain::fields::{FieldAddOutcome, FieldRemoveOutcome, FieldSelection};
use crate::errors::FieldInitError;
use crate::fieldspec::{device_fields_example, parse_field_spec, user_fields_example};
use crate::inventory::InventoryClient;
use crate::resolver::{FieldResolver, ResolvedField};

/// Everything a handler needs to act on one entity kind.
pub struct EntityContext {
    kind: EntityKind,
    fields: RwLock<FieldSelection>,
    client: Arc<dyn InventoryClient>,
}

impl EntityContext {
    pub fn new(kind: EntityKind, fields: FieldSelection, client: Arc<dyn InventoryClient>) -> Self {
        Self { kind, fields: RwLock::new(fields), client }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn client(&self) -> &dyn InventoryClient {
        self.client.as_ref()
    }

    pub fn resolver(&self) -> FieldResolver<'_> {
        FieldResolver::new(self.client.as_ref())
    }

    /// Copy of the current selection; the lock is released before returning.
    pub async fn fields(&self) -> FieldSelection {
        self.fields.read().await.clone()
    }

    /// Applies an already-resolved add and returns the outcome with the
    /// selection as it stands afterwards.
    pub async fn add_field(&self, field: &ResolvedField) -> (FieldAddOutcome, FieldSelection) {
        let mut fields = self.fields.write().await;
        let outcome = fields.add(&field.adapter, &field.field);
        (outcome, fields.clone())
    }

    pub async fn remove_field(
        &self,
        field: &ResolvedField,
    ) -> (FieldRemoveOutcome, FieldSelection) {
        let mut fields = self.fields.write().await;
        let outcome = fields.remove(&field.adapter, &field.field);
        (outcome, fields.clone())
    }

    pub fn fields_example(&self) -> String {
        match self.kind {
            EntityKind::Device => device_fields_example(),
            EntityKind::User => user_fields_example(),
        }
    }
}

/// Top-level state shared by every in-flight command.
pub struct BotSession {
    devices: EntityContext,
    users: EntityContext,
    cache: ResultCache,
    started_at: Instant,
}

impl BotSession {
    pub fn new(devices: EntityContext, users: EntityContext, cache: ResultCache) -> Self {
        Self { devices, users, cache, started_at: Instant::now() }
    }

    /// Parses and resolves both configured field specs against the live
    /// schema. Any failure aborts; the bot cannot run without both selections.
    pub async fn initialize(
        client: Arc<dyn InventoryClient>,
        device_fields: &str,
        user_fields: &str,
        cache: ResultCache,
    ) -> Result<Self, FieldInitError> {
        let devices =
            build_context(EntityKind::Device, device_fields, &device_fields_example(), &client)
                .await?;
        let users =
            build_context(EntityKind::User, user_fields, &user_fields_example(), &client).await?;
        Ok(Self::new(devices, users, cache))
    }

    pub fn entity(&self, kind: EntityKind) -> &EntityContext {
        match kind {
            EntityKind::Device => &self.devices,
            EntityKind::User => &self.users,
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn client(&self) -> &dyn InventoryClient {
        self.devices.client()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

async fn build_context(
    kind: EntityKind,
    spec: &str,
    example: &str,
    client: &Arc<dyn InventoryClient>,
) -> Result<EntityContext, FieldInitError> {
    let requested =
        parse_field_spec(spec, example).map_err(|source| FieldInitError::Spec { kind, source })?;
    let resolved = FieldResolver::new(client.as_ref())
        .resolve_selection(kind, &requested)
        .await
        .map_err(|source| FieldInitError::Resolve { kind, source })?;

    info!(
        event_name = "fields.initialized",
        correlation_id = "bootstrap",
        entity = kind.plural(),
        adapters = resolved.adapter_count(),
        "resolved default field selection"
    );
    Ok(EntityContext::new(kind, resolved, client.clone()))
}
