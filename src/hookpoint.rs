//! Hookpoints: attachment spots for siege engines and other occupants.
//!
//! An occupant is evicted 30 minutes after it arrives. If it dies first the
//! eviction is pulled in to a 5 minute grace period so the wreck clears.

use crate::events::{DeathSubscription, DeathWatch, WatchTarget};
use crate::keep::Keep;
use crate::error::{KeepError, Result};
use crate::store::HookPointRow;
use crate::timer::Timer;
use crate::types::{add_headings, EntityId, KeepId, WorldPoint};
use crate::world::WorldView;
use log::{debug, warn};

pub const EVICTION_MS: u64 = 30 * 60 * 1000;
pub const GRACE_MS: u64 = 5 * 60 * 1000;

/// Siege-engine hookpoints every component gets when it has no geometry rows.
pub const SIEGE_HOOKPOINT_IDS: [u8; 3] = [0x41, 0x61, 0x81];
/// Ground grid hookpoints (ids `0..DEFAULT_GRID_SIZE`) in the same fallback.
pub const DEFAULT_GRID_SIZE: u8 = 38;
const DEFAULT_GRID_SPACING: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupant {
    pub entity: EntityId,
    pub siege_engine: bool,
    /// Removed from the world by the eviction timer, awaiting final clear.
    pub deleted: bool,
}

impl Occupant {
    pub fn siege_engine(entity: EntityId) -> Self {
        Self {
            entity,
            siege_engine: true,
            deleted: false,
        }
    }

    pub fn other(entity: EntityId) -> Self {
        Self {
            entity,
            siege_engine: false,
            deleted: false,
        }
    }
}

/// What an eviction firing did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eviction {
    Idle,
    Deleted,
    Cleared,
}

#[derive(Debug)]
pub struct HookPoint {
    pub id: u8,
    pub keep_id: KeepId,
    pub component_id: u16,
    pub position: WorldPoint,
    pub heading: u16,
    occupant: Option<Occupant>,
    pub(crate) eviction: Timer,
    watch: Option<DeathSubscription>,
}

impl HookPoint {
    pub fn new(keep_id: KeepId, component_id: u16, id: u8, position: WorldPoint, heading: u16) -> Self {
        Self {
            id,
            keep_id,
            component_id,
            position,
            heading,
            occupant: None,
            eviction: Timer::new(),
            watch: None,
        }
    }

    /// Place a hookpoint from geometry relative to its component.
    pub fn from_row(
        row: &HookPointRow,
        keep_id: KeepId,
        component_id: u16,
        origin: WorldPoint,
        heading: u16,
    ) -> Self {
        let position = origin.offset_rotated(row.x, row.y, row.z, heading);
        Self::new(
            keep_id,
            component_id,
            row.hookpoint_id,
            position,
            add_headings(row.heading, heading),
        )
    }

    /// Fallback set: a ground grid plus the siege-engine ids.
    pub fn default_set(keep_id: KeepId, component_id: u16, origin: WorldPoint, heading: u16) -> Vec<Self> {
        let grid = (0..DEFAULT_GRID_SIZE).map(|id| {
            let col = (id % 8) as i32 - 4;
            let row = (id / 8) as i32 - 2;
            let at = origin.offset_rotated(
                col * DEFAULT_GRID_SPACING,
                row * DEFAULT_GRID_SPACING,
                0,
                heading,
            );
            Self::new(keep_id, component_id, id, at, heading)
        });
        let siege = SIEGE_HOOKPOINT_IDS
            .iter()
            .map(|&id| Self::new(keep_id, component_id, id, origin, heading));
        grid.chain(siege).collect()
    }

    pub fn occupant(&self) -> Option<&Occupant> {
        self.occupant.as_ref()
    }

    pub fn is_free(&self) -> bool {
        self.occupant.is_none()
    }

    pub fn eviction_timer(&self) -> &Timer {
        &self.eviction
    }

    fn target(&self) -> WatchTarget {
        WatchTarget::HookPointOccupant {
            keep: self.keep_id,
            component: self.component_id,
            hookpoint: self.id,
        }
    }

    /// Set or clear the occupant. A free hookpoint that gains one starts its
    /// eviction countdown and watches the occupant for death.
    pub fn set_occupant(&mut self, occupant: Option<Occupant>, now: u64, deaths: &DeathWatch) {
        match occupant {
            Some(occ) => {
                if self.occupant.is_none() {
                    self.eviction.arm(now, EVICTION_MS);
                }
                self.watch = Some(deaths.subscribe(occ.entity, self.target()));
                self.occupant = Some(occ);
            }
            None => {
                self.occupant = None;
                self.watch = None;
                self.eviction.disarm();
            }
        }
    }

    /// The occupant died. Returns false if `entity` is not the occupant.
    pub fn on_occupant_death(&mut self, entity: EntityId, now: u64) -> bool {
        if self.occupant.map(|o| o.entity) != Some(entity) {
            return false;
        }
        self.watch = None;
        self.eviction.arm(now, GRACE_MS);
        true
    }

    /// Eviction firing: remove a live occupant and schedule the final clear,
    /// or clear an already removed one.
    pub fn evict(&mut self, now: u64, world: &dyn WorldView) -> Eviction {
        let Some(occ) = self.occupant.as_mut() else {
            return Eviction::Idle;
        };
        if occ.siege_engine {
            world.release_siege_control(occ.entity);
        }
        if occ.deleted {
            self.occupant = None;
            self.watch = None;
            return Eviction::Cleared;
        }
        world.remove_object(occ.entity);
        occ.deleted = true;
        self.watch = None;
        self.eviction.arm(now, GRACE_MS);
        Eviction::Deleted
    }
}

// ---------------------------------------------------------------------------
// Keep-level hookpoint operations
// ---------------------------------------------------------------------------

impl Keep {
    fn hookpoint_mut(&mut self, idx: usize, hookpoint: u8) -> Result<&mut HookPoint> {
        let (keep, component) = (self.id, self.components[idx].id);
        self.components[idx]
            .hookpoints
            .get_mut(&hookpoint)
            .ok_or(KeepError::HookPointNotFound {
                keep,
                component,
                hookpoint,
            })
    }

    pub fn set_hookpoint_occupant(
        &mut self,
        component_id: u16,
        hookpoint: u8,
        occupant: Option<Occupant>,
    ) -> Result<()> {
        let idx = self.component_index(component_id)?;
        let now = self.services.now();
        let deaths = self.services.deaths.clone();
        self.hookpoint_mut(idx, hookpoint)?
            .set_occupant(occupant, now, &deaths);
        Ok(())
    }

    /// Death notification for a hookpoint occupant.
    pub fn on_hookpoint_occupant_death(
        &mut self,
        component_id: u16,
        hookpoint: u8,
        entity: EntityId,
    ) -> Result<()> {
        let idx = self.component_index(component_id)?;
        let now = self.services.now();
        if !self.hookpoint_mut(idx, hookpoint)?.on_occupant_death(entity, now) {
            return Ok(());
        }
        debug!("{} hookpoint {}/{:#x}: occupant died", self.id, component_id, hookpoint);
        if let Err(e) = self
            .services
            .store
            .delete_hookpoint_item(self.id, component_id, hookpoint)
        {
            warn!("Failed to delete hookpoint item on {}: {}", self.id, e);
        }
        Ok(())
    }

    pub(crate) fn eviction_tick_at(&mut self, idx: usize, hookpoint: u8) {
        let world = self.services.world.clone();
        let now = self.services.now();
        let id = self.id;
        let comp = self.components[idx].id;
        if let Ok(hp) = self.hookpoint_mut(idx, hookpoint) {
            let outcome = hp.evict(now, world.as_ref());
            debug!("{} hookpoint {}/{:#x}: {:?}", id, comp, hookpoint, outcome);
        }
    }

    /// Remove every occupant of a component immediately (keep reset).
    pub(crate) fn destroy_hookpoint_occupants(&mut self, idx: usize, now: u64) {
        let world = self.services.world.clone();
        for hp in self.components[idx].hookpoints.values_mut() {
            if hp.occupant.as_ref().is_some_and(|o| !o.deleted) {
                hp.evict(now, world.as_ref());
            }
        }
    }
}
