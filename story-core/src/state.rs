//! Narrative state snapshots and delta merging.

use crate::profile::DynamicState;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// World state after an episode.
///
/// `inventory` and `open_threads` behave as sets that remember insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub time: String,
    pub location_id: String,
    pub characters_present: Vec<String>,
    pub inventory: Vec<String>,
    pub open_threads: Vec<String>,
}

impl From<&DynamicState> for StateSnapshot {
    fn from(state: &DynamicState) -> Self {
        Self {
            time: state.current_time.clone(),
            location_id: state.current_location_id.clone(),
            characters_present: state.characters_present.clone(),
            inventory: state.inventory.clone(),
            open_threads: state.open_threads.clone(),
        }
    }
}

/// Inventory delta operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryOp {
    Add,
    Remove,
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryDelta {
    pub op: InventoryOp,
    #[serde(default)]
    pub owner_id: String,
    pub item: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenThreadsDelta {
    #[serde(default)]
    pub add: Vec<String>,
    #[serde(default)]
    pub resolve: Vec<String>,
}

/// Proposed change to a snapshot, as produced by episode generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub location_id: Option<String>,
    #[serde(default)]
    pub characters_present: Option<Vec<String>>,
    #[serde(default)]
    pub inventory_delta: Vec<InventoryDelta>,
    #[serde(default)]
    pub open_threads_delta: OpenThreadsDelta,
}

/// Apply `update` to `base`, producing the next snapshot.
///
/// Scalar fields and the cast list are replaced when the update carries them.
/// Inventory and thread deltas apply in list order; remove/update/resolve
/// act on the first matching entry. Empty item or thread names are skipped.
pub fn merge(base: &StateSnapshot, update: &StateUpdate) -> StateSnapshot {
    let mut inventory = base.inventory.clone();
    for delta in &update.inventory_delta {
        if delta.item.is_empty() {
            continue;
        }
        let position = inventory.iter().position(|i| *i == delta.item);
        match (delta.op, position) {
            (InventoryOp::Add, None) => inventory.push(delta.item.clone()),
            (InventoryOp::Add, Some(_)) => {}
            (InventoryOp::Remove, Some(index)) => {
                inventory.remove(index);
            }
            (InventoryOp::Remove, None) => {}
            (InventoryOp::Update, Some(index)) => inventory[index] = delta.item.clone(),
            (InventoryOp::Update, None) => inventory.push(delta.item.clone()),
        }
    }

    let mut open_threads = base.open_threads.clone();
    for thread in &update.open_threads_delta.add {
        if !thread.is_empty() && !open_threads.contains(thread) {
            open_threads.push(thread.clone());
        }
    }
    // A thread named twice in one delta is resolved once.
    let mut resolved = HashSet::new();
    for thread in &update.open_threads_delta.resolve {
        if !resolved.insert(thread.as_str()) {
            continue;
        }
        if let Some(index) = open_threads.iter().position(|t| t == thread) {
            open_threads.remove(index);
        }
    }

    StateSnapshot {
        time: update.time.clone().unwrap_or_else(|| base.time.clone()),
        location_id: update
            .location_id
            .clone()
            .unwrap_or_else(|| base.location_id.clone()),
        characters_present: update
            .characters_present
            .clone()
            .unwrap_or_else(|| base.characters_present.clone()),
        inventory,
        open_threads,
    }
}
