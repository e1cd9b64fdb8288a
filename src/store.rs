//! Persistence collaborator: row types, the [`KeepStore`] trait and an
//! in-memory implementation seedable from JSON.

use crate::error::StoreError;
use crate::types::{KeepId, KeepType, Realm, WorldPoint};
use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeepRow {
    pub keep_id: KeepId,
    pub name: String,
    pub level: u8,
    pub base_level: u8,
    pub realm: Realm,
    pub original_realm: Realm,
    #[serde(default)]
    pub keep_type: KeepType,
    /// Albion, Midgard, Hibernia.
    #[serde(default)]
    pub difficulty: [i32; 3],
    pub region: u16,
    pub position: WorldPoint,
    #[serde(default)]
    pub heading: u16,
    #[serde(default)]
    pub claimed_guild: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentRow {
    pub keep_id: KeepId,
    pub component_id: u16,
    pub skin: u8,
    /// Offset from the keep origin, in keep-local units.
    pub x: i32,
    pub y: i32,
    /// Rotation index of the component relative to the keep.
    #[serde(default)]
    pub heading: u16,
    /// Persisted health; `None` means full.
    #[serde(default)]
    pub health: Option<i32>,
    #[serde(default)]
    pub raized: bool,
}

/// Hookpoint geometry shared by every component with the same skin and height.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HookPointRow {
    pub skin: u8,
    pub height: u8,
    pub hookpoint_id: u8,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    #[serde(default)]
    pub heading: u16,
}

/// Slot reference data for one template at one height tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionRow {
    pub template_id: String,
    pub component_skin: u8,
    #[serde(default)]
    pub component_rotation: u16,
    pub height: u8,
    pub class_type: String,
    #[serde(default = "any_keep_type")]
    pub keep_type: KeepType,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    #[serde(default)]
    pub heading: u16,
}

fn any_keep_type() -> KeepType {
    KeepType::Any
}

/// Guard/banner template attached directly to a keep, reloaded on reset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeepObjectRow {
    pub keep_id: KeepId,
    pub template_id: String,
    pub class_type: String,
    /// `None` applies to every realm.
    #[serde(default)]
    pub realm: Option<Realm>,
    #[serde(default = "any_keep_type")]
    pub keep_type: KeepType,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    #[serde(default)]
    pub heading: u16,
}

/// Item (siege engine) persisted on a hookpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HookPointItemRow {
    pub keep_id: KeepId,
    pub component_id: u16,
    pub hookpoint_id: u8,
    pub class_type: String,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Bulk reads for startup, keyed writes at runtime.
pub trait KeepStore: Send + Sync {
    fn keeps(&self) -> Result<Vec<KeepRow>, StoreError>;
    fn components(&self) -> Result<Vec<ComponentRow>, StoreError>;
    fn hookpoints(&self) -> Result<Vec<HookPointRow>, StoreError>;
    fn positions(&self) -> Result<Vec<PositionRow>, StoreError>;
    fn keep_objects(&self, keep_id: KeepId) -> Result<Vec<KeepObjectRow>, StoreError>;

    fn save_keep(&self, row: &KeepRow) -> Result<(), StoreError>;
    fn save_component(&self, row: &ComponentRow) -> Result<(), StoreError>;
    fn delete_component(&self, keep_id: KeepId, component_id: u16) -> Result<(), StoreError>;
    fn delete_hookpoint_item(
        &self,
        keep_id: KeepId,
        component_id: u16,
        hookpoint_id: u8,
    ) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedData {
    pub keeps: Vec<KeepRow>,
    pub components: Vec<ComponentRow>,
    pub hookpoints: Vec<HookPointRow>,
    pub positions: Vec<PositionRow>,
    pub keep_objects: Vec<KeepObjectRow>,
    pub hookpoint_items: Vec<HookPointItemRow>,
}

#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<SeedData>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new(data: SeedData) -> Self {
        Self {
            data: RwLock::new(data),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, StoreError> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn from_path(path: &Path) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Copy of the current rows (inspection / export).
    pub fn snapshot(&self) -> SeedData {
        self.data.read().clone()
    }

    pub fn keep_row(&self, keep_id: KeepId) -> Option<KeepRow> {
        self.data
            .read()
            .keeps
            .iter()
            .find(|k| k.keep_id == keep_id)
            .cloned()
    }

    /// Number of write calls served so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn add_hookpoint_item(&self, row: HookPointItemRow) {
        self.data.write().hookpoint_items.push(row);
    }
}

impl KeepStore for MemoryStore {
    fn keeps(&self) -> Result<Vec<KeepRow>, StoreError> {
        Ok(self.data.read().keeps.clone())
    }

    fn components(&self) -> Result<Vec<ComponentRow>, StoreError> {
        Ok(self.data.read().components.clone())
    }

    fn hookpoints(&self) -> Result<Vec<HookPointRow>, StoreError> {
        Ok(self.data.read().hookpoints.clone())
    }

    fn positions(&self) -> Result<Vec<PositionRow>, StoreError> {
        Ok(self.data.read().positions.clone())
    }

    fn keep_objects(&self, keep_id: KeepId) -> Result<Vec<KeepObjectRow>, StoreError> {
        Ok(self
            .data
            .read()
            .keep_objects
            .iter()
            .filter(|o| o.keep_id == keep_id)
            .cloned()
            .collect())
    }

    fn save_keep(&self, row: &KeepRow) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut data = self.data.write();
        match data.keeps.iter_mut().find(|k| k.keep_id == row.keep_id) {
            Some(existing) => *existing = row.clone(),
            None => data.keeps.push(row.clone()),
        }
        debug!("Saved {}", row.keep_id);
        Ok(())
    }

    fn save_component(&self, row: &ComponentRow) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut data = self.data.write();
        match data
            .components
            .iter_mut()
            .find(|c| c.keep_id == row.keep_id && c.component_id == row.component_id)
        {
            Some(existing) => *existing = row.clone(),
            None => data.components.push(row.clone()),
        }
        Ok(())
    }

    fn delete_component(&self, keep_id: KeepId, component_id: u16) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut data = self.data.write();
        let before = data.components.len();
        data.components
            .retain(|c| !(c.keep_id == keep_id && c.component_id == component_id));
        if data.components.len() == before {
            return Err(StoreError::NotFound(format!(
                "component {} of {}",
                component_id, keep_id
            )));
        }
        Ok(())
    }

    fn delete_hookpoint_item(
        &self,
        keep_id: KeepId,
        component_id: u16,
        hookpoint_id: u8,
    ) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.data.write().hookpoint_items.retain(|h| {
            !(h.keep_id == keep_id && h.component_id == component_id && h.hookpoint_id == hookpoint_id)
        });
        Ok(())
    }
}
