pub mod cache;
pub mod config;
pub mod domain;
pub mod errors;
pub mod fieldspec;
pub mod inventory;
pub mod resolver;
pub mod session;

pub use cache::{CacheEntry, Clock, ResultCache, SystemClock};
pub use domain::entity::{EntityKind, Row};
pub use domain::fields::{FieldAddOutcome, FieldRemoveOutcome, FieldSelection, GENERIC_ADAPTER};
pub use errors::{FieldInitError, FieldSpecError, InventoryError, ResolveError};
pub use fieldspec::parse_field_spec;
pub use inventory::{
    FieldLookup, FieldSchema, InventoryClient, LabelAction, QueryFields, QueryRequest, SavedQuery,
};
pub use resolver::{FieldResolver, ResolvedField};
pub use session::{BotSession, EntityContext};
