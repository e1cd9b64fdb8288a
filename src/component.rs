//! Structural components: the walls and towers a keep is made of.
//!
//! Component health, height and status are derived from the owning keep's
//! level and kind, which the keep passes in. Anything that has to touch other
//! components or the keep's object collections (raize, repair, death) lives in
//! the `impl Keep` block at the bottom of this file.

use crate::config::KeepConfig;
use crate::error::Result;
use crate::hookpoint::HookPoint;
use crate::keep::Keep;
use crate::positions::Position;
use crate::protocol::{
    Audience, ChatKind, ComponentDetailUpdate, ComponentInfo, KeepEventKind, Outbound,
};
use crate::store::ComponentRow;
use crate::timer::Timer;
use crate::types::{add_headings, AttackData, Attacker, ComponentStatus, KeepId, KeepKind, WorldPoint};
use log::{debug, info, warn};
use std::collections::BTreeMap;

/// Slot height tiers, 0 (ground) to 3.
pub const HEIGHT_TIERS: usize = 4;

/// Percent of max health below which a raized tower stays raized.
pub const RAIZED_BELOW_PERCENT: u8 = 25;
/// Percent of max health below which a tower reads as broken.
pub const TOWER_BROKEN_BELOW_PERCENT: u8 = 35;

/// Damage mitigation granted per keep level, in percent.
const MITIGATION_PER_LEVEL: i32 = 5;

/// Height tier for a keep level.
pub fn height_for_level(level: u8) -> u8 {
    match level {
        8.. => 3,
        5..=7 => 2,
        2..=4 => 1,
        _ => 0,
    }
}

/// Level reported for a keep's components and guards.
pub fn combat_level(base_level: u8, keep_level: u8) -> i32 {
    base_level as i32 - 10 + 3 * keep_level as i32
}

/// Component max health: base plus 10% of base per level above 1.
pub fn max_health_for(base_health: i32, level: u8) -> i32 {
    let extra = level.saturating_sub(1) as i32;
    base_health + base_health * extra / 10
}

/// Slot templates keyed by template id, one entry per height tier.
pub type PositionTable = BTreeMap<String, [Option<Position>; HEIGHT_TIERS]>;

#[derive(Debug)]
pub struct StructuralComponent {
    pub id: u16,
    /// Back-reference by id only; the keep owns its components.
    pub keep_id: KeepId,
    pub skin: u8,
    /// Offset from the keep origin.
    pub x: i32,
    pub y: i32,
    /// Rotation index (0..4) relative to the keep heading.
    pub heading: u16,
    pub(crate) health: i32,
    pub(crate) max_health: i32,
    pub(crate) repaired_health: i32,
    pub(crate) raized: bool,
    pub(crate) height: u8,
    pub(crate) keep_level: u8,
    pub positions: PositionTable,
    pub hookpoints: BTreeMap<u8, HookPoint>,
    pub(crate) repair_timer: Timer,
}

impl StructuralComponent {
    pub fn from_row(row: &ComponentRow, keep_level: u8, base_health: i32) -> Self {
        let max_health = max_health_for(base_health, keep_level);
        let health = row.health.map_or(max_health, |h| h.clamp(0, max_health));
        Self {
            id: row.component_id,
            keep_id: row.keep_id,
            skin: row.skin,
            x: row.x,
            y: row.y,
            heading: row.heading,
            health,
            max_health,
            repaired_health: 0,
            raized: row.raized,
            height: height_for_level(keep_level),
            keep_level,
            positions: BTreeMap::new(),
            hookpoints: BTreeMap::new(),
            repair_timer: Timer::new(),
        }
    }

    pub fn to_row(&self) -> ComponentRow {
        ComponentRow {
            keep_id: self.keep_id,
            component_id: self.id,
            skin: self.skin,
            x: self.x,
            y: self.y,
            heading: self.heading,
            health: Some(self.health),
            raized: self.raized,
        }
    }

    pub fn health(&self) -> i32 {
        self.health
    }

    pub fn max_health(&self) -> i32 {
        self.max_health
    }

    pub fn repaired_health(&self) -> i32 {
        self.repaired_health
    }

    pub fn is_raized(&self) -> bool {
        self.raized
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    pub fn height(&self) -> u8 {
        self.height
    }

    pub fn repair_timer(&self) -> &Timer {
        &self.repair_timer
    }

    pub fn hookpoint(&self, id: u8) -> Option<&HookPoint> {
        self.hookpoints.get(&id)
    }

    pub fn health_percent(&self) -> u8 {
        if self.max_health <= 0 {
            return 0;
        }
        (self.health as i64 * 100 / self.max_health as i64).clamp(0, 100) as u8
    }

    /// Heading offset of this component relative to the keep, in heading units.
    pub fn rotation_units(&self) -> u16 {
        (self.heading % 4) * 1024
    }

    /// World position of the component origin.
    pub fn world_origin(&self, keep_position: WorldPoint, keep_heading: u16) -> WorldPoint {
        keep_position.offset_rotated(self.x, self.y, 0, keep_heading)
    }

    /// Total heading of the component in the world.
    pub fn world_heading(&self, keep_heading: u16) -> u16 {
        add_headings(keep_heading, self.rotation_units())
    }

    /// Recompute level-derived values. Health keeps its proportion of max.
    /// Returns true when the height tier changed.
    pub fn update_level(&mut self, keep_level: u8, base_health: i32) -> bool {
        let new_max = max_health_for(base_health, keep_level);
        if new_max != self.max_health && self.max_health > 0 {
            self.health = (self.health as i64 * new_max as i64 / self.max_health as i64) as i32;
        }
        self.max_health = new_max;
        self.health = self.health.clamp(0, new_max);
        self.keep_level = keep_level;
        let height = height_for_level(keep_level);
        let changed = height != self.height;
        self.height = height;
        changed
    }

    /// Apply keep-level mitigation, structure toughness and pet rules.
    pub fn modify_incoming_attack(&self, attack: &AttackData, config: &KeepConfig) -> AttackData {
        let mut out = *attack;
        let mitigation = MITIGATION_PER_LEVEL * self.keep_level as i32;
        let scale = |v: i32, pct: i32| (v as i64 * pct as i64 / 100) as i32;

        out.damage -= scale(out.damage, mitigation);
        out.style_damage -= scale(out.style_damage, mitigation);
        out.damage = scale(out.damage, config.structures_toughness_percent);
        out.style_damage = scale(out.style_damage, config.structures_toughness_percent);

        if let Attacker::Pet { owner_class, .. } = attack.attacker {
            if !config.allow_pet_siege_damage {
                out.damage = 0;
                out.style_damage = 0;
            } else {
                out.damage = scale(out.damage, config.pet_damage_multiplier_percent);
                out.style_damage = scale(out.style_damage, config.pet_damage_multiplier_percent);
                if owner_class.is_siege_summoner() {
                    out.damage = scale(out.damage, config.summoner_pet_multiplier_percent);
                    out.style_damage =
                        scale(out.style_damage, config.summoner_pet_multiplier_percent);
                }
            }
        }
        out.damage = out.damage.max(0);
        out.style_damage = out.style_damage.max(0);
        out
    }

    /// Status from health alone. A raized tower at or above the raize
    /// threshold is reported as if already un-raized.
    pub fn status(&self, kind: KeepKind) -> ComponentStatus {
        let pct = self.health_percent();
        match kind {
            KeepKind::Tower => {
                if self.raized && pct < RAIZED_BELOW_PERCENT {
                    ComponentStatus::Raized
                } else if pct < TOWER_BROKEN_BELOW_PERCENT {
                    ComponentStatus::Broken
                } else {
                    ComponentStatus::Normal
                }
            }
            KeepKind::Keep => {
                if self.health == 0 {
                    ComponentStatus::Broken
                } else {
                    ComponentStatus::Normal
                }
            }
        }
    }

    /// Subtract damage. Returns true on the transition to zero health.
    pub(crate) fn apply_damage(&mut self, amount: i32) -> bool {
        if amount <= 0 || self.health == 0 {
            return false;
        }
        self.health = (self.health - amount).max(0);
        self.health == 0
    }

    /// Heal by `amount`, capped at max. Returns the health actually gained.
    pub(crate) fn heal(&mut self, amount: i32) -> i32 {
        let before = self.health;
        self.health = (self.health + amount.max(0)).min(self.max_health);
        let gained = self.health - before;
        self.repaired_health += gained;
        gained
    }

    pub(crate) fn repair_full(&mut self) {
        self.health = self.max_health;
    }

    pub fn info(&self, kind: KeepKind) -> ComponentInfo {
        ComponentInfo {
            keep_id: self.keep_id,
            component_id: self.id,
            skin: self.skin,
            x: self.x,
            y: self.y,
            heading: self.heading,
            height: self.height,
            health_percent: self.health_percent(),
            status: self.status(kind).code(),
        }
    }

    pub fn detail_update(&self, kind: KeepKind) -> ComponentDetailUpdate {
        ComponentDetailUpdate {
            keep_id: self.keep_id,
            component_id: self.id,
            height: self.height,
            health_percent: self.health_percent(),
            status: self.status(kind).code(),
        }
    }
}

// ---------------------------------------------------------------------------
// Keep-level component operations
// ---------------------------------------------------------------------------

impl Keep {
    /// Current status of a component. A raized tower that has been repaired
    /// back above the raize threshold is un-raized as a side effect.
    pub fn component_status(&mut self, component_id: u16) -> Result<ComponentStatus> {
        let idx = self.component_index(component_id)?;
        Ok(self.component_status_at(idx))
    }

    pub(crate) fn component_status_at(&mut self, idx: usize) -> ComponentStatus {
        let comp = &self.components[idx];
        if self.is_tower() && comp.raized && comp.health_percent() >= RAIZED_BELOW_PERCENT {
            self.set_raized_at(idx, false);
        }
        self.components[idx].status(self.kind)
    }

    pub fn set_raized(&mut self, component_id: u16, raized: bool) -> Result<()> {
        let idx = self.component_index(component_id)?;
        self.set_raized_at(idx, raized);
        Ok(())
    }

    pub(crate) fn set_raized_at(&mut self, idx: usize, raized: bool) {
        let comp = &mut self.components[idx];
        comp.repaired_health = 0;
        comp.raized = raized;
        if raized {
            if self.level > 1 {
                self.change_level(1);
            }
        } else {
            self.resolve_positions_at(idx);
        }
    }

    /// Apply an attack to a component. Returns the damage actually dealt.
    pub fn take_damage(&mut self, component_id: u16, attack: &AttackData) -> Result<i32> {
        let idx = self.component_index(component_id)?;
        let mitigated = self.components[idx].modify_incoming_attack(attack, &self.services.config);
        let amount = mitigated.total();

        if attack.attacker.realm() != self.realm {
            self.last_attacked_ms = self.services.now();
        }

        let before = self.component_status_at(idx);
        let died = self.components[idx].apply_damage(amount);
        if died {
            self.on_component_death(idx);
            return Ok(amount);
        }
        let after = self.component_status_at(idx);
        if before != after {
            self.send_detail_update(idx);
        }
        Ok(amount)
    }

    fn on_component_death(&mut self, idx: usize) {
        let comp_id = self.components[idx].id;
        if self.is_tower() && !self.components[idx].raized && self.services.config.raize_enabled() {
            info!("{} component {} raized", self.id, comp_id);
            self.fire_event(KeepEventKind::Raized, self.realm);
            self.services.send(
                Audience::Realm { realm: self.realm },
                Outbound::chat(ChatKind::Important, format!("{} has been raized!", self.name)),
            );
            self.set_raized_at(idx, true);
            self.drop_guards_to_ground();
        } else {
            debug!("{} component {} destroyed", self.id, comp_id);
        }
        self.send_detail_update(idx);
    }

    /// Guards lose their wall slots and stand at the keep's ground level.
    fn drop_guards_to_ground(&mut self) {
        let ground = self.position.z;
        let world = &self.services.world;
        for guard in self.guards.values_mut() {
            let Some(mut at) = guard.position else {
                continue;
            };
            at.z = ground;
            guard.position = Some(at);
            guard.slot_height = 0;
            if guard.in_world {
                world.move_object(guard.id, at, guard.heading);
            }
        }
    }

    pub(crate) fn send_detail_update(&self, idx: usize) {
        self.services.send(
            Audience::Region {
                region: self.region,
            },
            Outbound::ComponentDetailUpdate(self.components[idx].detail_update(self.kind)),
        );
    }

    /// One repair step: heal a percentage of max health unless full or the
    /// keep is in combat.
    pub fn repair_tick(&mut self, component_id: u16) -> Result<()> {
        let idx = self.component_index(component_id)?;
        self.repair_tick_at(idx);
        Ok(())
    }

    pub(crate) fn repair_tick_at(&mut self, idx: usize) {
        {
            let comp = &self.components[idx];
            if comp.health >= comp.max_health || self.in_combat() {
                return;
            }
        }
        let before = self.component_status_at(idx);
        let amount = self.components[idx].max_health * self.services.config.repair_percent / 100;
        self.components[idx].heal(amount.max(1));
        let after = self.component_status_at(idx);

        if before != after {
            self.send_detail_update(idx);
        }
        if self.is_tower() && before == ComponentStatus::Raized && after != ComponentStatus::Raized {
            for i in 0..self.components.len() {
                self.resolve_positions_at(i);
            }
        }
        if let Err(e) = self
            .services
            .store
            .save_component(&self.components[idx].to_row())
        {
            warn!("Failed to save component {} of {}: {}", self.components[idx].id, self.id, e);
        }
    }

    /// Drop a component from the keep and delete its persisted row.
    pub fn remove_component(&mut self, component_id: u16) -> Result<()> {
        let idx = self.component_index(component_id)?;
        let comp = self.components.remove(idx);
        for hp in comp.hookpoints.values() {
            if let Some(occupant) = hp.occupant() {
                self.services.world.remove_object(occupant.entity);
            }
        }
        self.services.store.delete_component(self.id, component_id)?;
        self.broadcast_component_update(false);
        info!("{} removed component {}", self.id, component_id);
        Ok(())
    }
}
