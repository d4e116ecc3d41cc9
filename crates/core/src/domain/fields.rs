use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

pub const GENERIC_ADAPTER: &str = "generic";

/// Ordered adapter → field mapping controlling which columns a fetch returns.
///
/// Field names are unique per adapter, insertion order is display order, and
/// an adapter whose last field is removed disappears from the map.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSelection {
    adapters: IndexMap<String, IndexSet<String>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldAddOutcome {
    Added,
    AlreadyPresent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldRemoveOutcome {
    Removed { adapter_dropped: bool },
    AdapterNotPresent,
    FieldNotPresent,
}

impl FieldSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, adapter: &str, field: &str) -> FieldAddOutcome {
        let fields = self.adapters.entry(adapter.to_owned()).or_default();
        if fields.insert(field.to_owned()) {
            FieldAddOutcome::Added
        } else {
            FieldAddOutcome::AlreadyPresent
        }
    }

    pub fn remove(&mut self, adapter: &str, field: &str) -> FieldRemoveOutcome {
        let Some(fields) = self.adapters.get_mut(adapter) else {
            return FieldRemoveOutcome::AdapterNotPresent;
        };

        if !fields.shift_remove(field) {
            return FieldRemoveOutcome::FieldNotPresent;
        }

        let adapter_dropped = fields.is_empty();
        if adapter_dropped {
            self.adapters.shift_remove(adapter);
        }
        FieldRemoveOutcome::Removed { adapter_dropped }
    }

    pub fn contains(&self, adapter: &str, field: &str) -> bool {
        self.adapters.get(adapter).is_some_and(|fields| fields.contains(field))
    }

    pub fn fields(&self, adapter: &str) -> Option<impl Iterator<Item = &str>> {
        self.adapters.get(adapter).map(|fields| fields.iter().map(String::as_str))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Vec<&str>)> {
        self.adapters.iter().map(|(adapter, fields)| {
            (adapter.as_str(), fields.iter().map(String::as_str).collect::<Vec<_>>())
        })
    }

    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
