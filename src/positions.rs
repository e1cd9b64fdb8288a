//! Slot resolution: which guard, banner, door or patrol stands where on a
//! component at its current height.

use crate::keep::Keep;
use crate::objects::{ClassTag, Collection, KeepObject, Patrol, SpawnRequest, PATROL_SIZE};
use crate::component::HEIGHT_TIERS;
use crate::error::FactoryError;
use crate::store::PositionRow;
use crate::types::{add_headings, KeepType, WorldPoint};
use log::{debug, warn};

/// One slot template at one height tier, relative to its component.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub template_id: String,
    pub height: u8,
    /// Raw class tag, parsed when the slot is filled.
    pub class_type: String,
    pub keep_type: KeepType,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub heading: u16,
}

impl From<&PositionRow> for Position {
    fn from(row: &PositionRow) -> Self {
        Self {
            template_id: row.template_id.clone(),
            height: row.height,
            class_type: row.class_type.clone(),
            keep_type: row.keep_type,
            x: row.x,
            y: row.y,
            z: row.z,
            heading: row.heading,
        }
    }
}

/// The highest defined tier at or below `height`.
pub fn select_tier(tiers: &[Option<Position>; HEIGHT_TIERS], height: u8) -> Option<&Position> {
    let top = (height as usize).min(HEIGHT_TIERS - 1);
    tiers[..=top].iter().rev().find_map(Option::as_ref)
}

impl Keep {
    /// Fill every slot of a component for its current height, then show or
    /// hide guards and banners according to their slot height.
    pub fn resolve_positions(&mut self, component_id: u16) -> crate::error::Result<()> {
        let idx = self.component_index(component_id)?;
        self.resolve_positions_at(idx);
        Ok(())
    }

    pub(crate) fn resolve_positions_at(&mut self, idx: usize) {
        let comp = &self.components[idx];
        let height = comp.height();
        let selected: Vec<Position> = comp
            .positions
            .values()
            .filter_map(|tiers| select_tier(tiers, height).cloned())
            .collect();

        for pos in &selected {
            self.fill_slot(idx, pos);
        }
        self.sweep_slot_heights(height);
    }

    fn slot_coordinates(&self, idx: usize, pos: &Position) -> (WorldPoint, u16) {
        let comp = &self.components[idx];
        let origin = comp.world_origin(self.position, self.heading);
        let rotation = comp.world_heading(self.heading);
        (
            origin.offset_rotated(pos.x, pos.y, pos.z, rotation),
            add_headings(pos.heading, rotation),
        )
    }

    fn slot_object_mut(&mut self, collection: Collection, template_id: &str) -> Option<&mut KeepObject> {
        match collection {
            Collection::Guards => self.guards.get_mut(template_id),
            Collection::Banners => self.banners.get_mut(template_id),
            Collection::Doors => self.doors.get_mut(template_id),
            Collection::TeleportStone => self
                .teleport_stone
                .as_mut()
                .filter(|s| s.template_id == template_id),
            Collection::Patrols => None,
        }
    }

    fn fill_slot(&mut self, idx: usize, pos: &Position) {
        let tag: ClassTag = match pos.class_type.parse() {
            Ok(tag) => tag,
            Err(e) => {
                warn!("{} slot '{}': {}", self.id, pos.template_id, e);
                return;
            }
        };
        let (at, heading) = self.slot_coordinates(idx, pos);
        let component_id = self.components[idx].id;

        if tag == ClassTag::Patrol {
            if pos.keep_type.admits(self.keep_type) {
                self.init_patrol(component_id, pos, at, heading);
            }
            return;
        }

        let world = self.services.world.clone();
        match self.slot_object_mut(tag.collection(), &pos.template_id) {
            None => {
                let mut object = match self.spawn_object(tag, &pos.template_id) {
                    Ok(object) => object,
                    Err(e) => {
                        warn!("{} slot '{}': {}", self.id, pos.template_id, e);
                        return;
                    }
                };
                object.component_id = Some(component_id);
                object.place(at, heading, pos.height);
                object.in_world = world.add_object(&object);
                self.insert_object(object);
            }
            Some(object) if !object.is_placed() => {
                object.component_id = Some(component_id);
                object.place(at, heading, pos.height);
                object.in_world = world.add_object(object) || world.contains(object.id);
            }
            Some(object) => {
                if tag.relocates() {
                    object.component_id = Some(component_id);
                    object.place(at, heading, pos.height);
                    if object.in_world {
                        world.move_object(object.id, at, heading);
                    }
                }
            }
        }
    }

    /// Build a patrol the first time its slot is filled; later fills move it.
    fn init_patrol(&mut self, component_id: u16, pos: &Position, at: WorldPoint, heading: u16) {
        let world = self.services.world.clone();
        if let Some(patrol) = self.patrols.get_mut(&pos.template_id) {
            patrol.origin = at;
            patrol.component_id = component_id;
            for key in &patrol.members {
                if let Some(guard) = self.guards.get_mut(key) {
                    guard.place(at, heading, pos.height);
                    if guard.in_world {
                        world.move_object(guard.id, at, heading);
                    }
                }
            }
            return;
        }

        let mut members = Vec::with_capacity(PATROL_SIZE);
        for i in 0..PATROL_SIZE {
            let key = Patrol::member_key(&pos.template_id, i);
            let mut guard = match self.spawn_object(ClassTag::GuardFighter, &key) {
                Ok(guard) => guard,
                Err(e) => {
                    warn!("{} patrol '{}': {}", self.id, pos.template_id, e);
                    continue;
                }
            };
            guard.component_id = Some(component_id);
            guard.place(at, heading, pos.height);
            guard.in_world = world.add_object(&guard);
            self.guards.insert(key.clone(), guard);
            members.push(key);
        }
        debug!("{} patrol '{}' with {} guards", self.id, pos.template_id, members.len());
        self.patrols.insert(
            pos.template_id.clone(),
            Patrol {
                template_id: pos.template_id.clone(),
                component_id,
                origin: at,
                members,
            },
        );
    }

    /// Guards and banners above the component height leave the world; those
    /// at or below it come back unless they are respawning.
    fn sweep_slot_heights(&mut self, height: u8) {
        let world = &self.services.world;
        for obj in self.guards.values_mut().chain(self.banners.values_mut()) {
            if obj.slot_height > height {
                if obj.in_world {
                    world.remove_object(obj.id);
                    obj.in_world = false;
                }
            } else if !obj.in_world && !obj.respawning && obj.is_placed() {
                obj.in_world = world.add_object(obj) || world.contains(obj.id);
            }
        }
    }

    pub(crate) fn spawn_object(&self, tag: ClassTag, template_id: &str) -> Result<KeepObject, FactoryError> {
        let request = SpawnRequest {
            id: self.services.next_entity_id(),
            keep_id: self.id,
            template_id: template_id.to_string(),
            realm: self.realm,
            guild: self.guild_name(),
            level: self.guard_level(),
        };
        self.services.factory.create_tagged(tag, &request)
    }
}
