//! World collaborator seam and the bundle of collaborators a keep runs with.

use crate::config::KeepConfig;
use crate::events::DeathWatch;
use crate::guild::GuildDirectory;
use crate::objects::{KeepObject, ObjectFactory};
use crate::protocol::{Audience, Notifier, Outbound};
use crate::store::KeepStore;
use crate::timer::{Clock, IdAllocator};
use crate::types::{EntityId, WorldPoint};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// The simulated world keep objects are placed into.
pub trait WorldView: Send + Sync {
    /// Place an object. Returns false if it was already present.
    fn add_object(&self, object: &KeepObject) -> bool;
    fn move_object(&self, id: EntityId, position: WorldPoint, heading: u16);
    fn remove_object(&self, id: EntityId);
    fn contains(&self, id: EntityId) -> bool;
    /// Kick whoever is operating a siege engine off it.
    fn release_siege_control(&self, engine: EntityId);
}

// ---------------------------------------------------------------------------
// In-memory world
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SimObject {
    pub label: String,
    pub position: WorldPoint,
    pub heading: u16,
}

#[derive(Default)]
pub struct SimWorld {
    objects: RwLock<HashMap<EntityId, SimObject>>,
    released: Mutex<Vec<EntityId>>,
}

impl SimWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register something the keep subsystem did not spawn (siege engines).
    pub fn insert(&self, id: EntityId, label: impl Into<String>, position: WorldPoint) {
        self.objects.write().insert(
            id,
            SimObject {
                label: label.into(),
                position,
                heading: 0,
            },
        );
    }

    pub fn get(&self, id: EntityId) -> Option<SimObject> {
        self.objects.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    pub fn released_controls(&self) -> Vec<EntityId> {
        self.released.lock().clone()
    }
}

impl WorldView for SimWorld {
    fn add_object(&self, object: &KeepObject) -> bool {
        let Some(position) = object.position else {
            return false;
        };
        let mut objects = self.objects.write();
        if objects.contains_key(&object.id) {
            return false;
        }
        objects.insert(
            object.id,
            SimObject {
                label: object.template_id.clone(),
                position,
                heading: object.heading,
            },
        );
        true
    }

    fn move_object(&self, id: EntityId, position: WorldPoint, heading: u16) {
        if let Some(obj) = self.objects.write().get_mut(&id) {
            obj.position = position;
            obj.heading = heading;
        }
    }

    fn remove_object(&self, id: EntityId) {
        self.objects.write().remove(&id);
    }

    fn contains(&self, id: EntityId) -> bool {
        self.objects.read().contains_key(&id)
    }

    fn release_siege_control(&self, engine: EntityId) {
        self.released.lock().push(engine);
    }
}

// ---------------------------------------------------------------------------
// Services bundle
// ---------------------------------------------------------------------------

/// Everything a keep needs from outside itself. Shared by every keep.
pub struct Services {
    pub config: KeepConfig,
    pub store: Arc<dyn KeepStore>,
    pub notifier: Arc<dyn Notifier>,
    pub world: Arc<dyn WorldView>,
    pub guilds: Arc<dyn GuildDirectory>,
    pub clock: Arc<dyn Clock>,
    pub factory: ObjectFactory,
    pub deaths: DeathWatch,
    pub ids: IdAllocator,
}

impl Services {
    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn send(&self, audience: Audience, message: Outbound) {
        self.notifier.send(audience, message);
    }

    pub fn next_entity_id(&self) -> EntityId {
        EntityId(self.ids.next())
    }
}
