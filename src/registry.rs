//! Keep registry: bulk load, spatial lookup, enemy policy and event routing.
//!
//! The registry's index is replaced wholesale under a write lock at the end
//! of [`KeepRegistry::load`], so readers see either the old set of keeps or
//! the new one, never a partial load. Every keep sits behind its own mutex.
//! Callers take handles out of the index and release the index lock before
//! locking a keep.

use crate::area::ProximityArea;
use crate::component::{StructuralComponent, HEIGHT_TIERS};
use crate::error::Result;
use crate::events::WatchTarget;
use crate::hookpoint::HookPoint;
use crate::keep::Keep;
use crate::positions::Position;
use crate::store::{HookPointRow, PositionRow};
use crate::types::{Combatant, EntityId, KeepId, KeepKind, PlayerId, Realm, Ruleset, WorldPoint};
use crate::world::Services;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

pub type KeepHandle = Arc<Mutex<Keep>>;

/// Immutable facts about a keep plus its handle, cheap to clone out of the
/// index.
#[derive(Clone)]
pub struct KeepEntry {
    pub id: KeepId,
    pub kind: KeepKind,
    pub region: u16,
    pub position: WorldPoint,
    pub handle: KeepHandle,
}

impl std::fmt::Debug for KeepEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeepEntry")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("region", &self.region)
            .field("position", &self.position)
            .finish()
    }
}

#[derive(Default)]
struct Index {
    keeps: BTreeMap<KeepId, KeepEntry>,
    areas: Vec<ProximityArea>,
}

type SlotTemplates = HashMap<(u8, u16), Vec<PositionRow>>;
type HookPointGeometry = HashMap<(u8, u8), Vec<HookPointRow>>;

pub struct KeepRegistry {
    services: Arc<Services>,
    index: RwLock<Index>,
    /// Areas each player is currently inside.
    presence: Mutex<HashMap<PlayerId, HashSet<KeepId>>>,
}

impl KeepRegistry {
    pub fn new(services: Arc<Services>) -> Self {
        Self {
            services,
            index: RwLock::new(Index::default()),
            presence: Mutex::new(HashMap::new()),
        }
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    // -----------------------------------------------------------------------
    // Load
    // -----------------------------------------------------------------------

    /// Build every keep from the store and swap them in. Returns the number
    /// of keeps loaded.
    pub fn load(&self) -> Result<usize> {
        let store = &self.services.store;
        let mut keeps: BTreeMap<KeepId, Keep> = BTreeMap::new();
        let mut claims: HashMap<KeepId, String> = HashMap::new();

        for row in store.keeps()? {
            if keeps.contains_key(&row.keep_id) {
                warn!("Duplicate keep row for {}; keeping the first", row.keep_id);
                continue;
            }
            if let Some(guild) = row.claimed_guild.clone() {
                claims.insert(row.keep_id, guild);
            }
            keeps.insert(row.keep_id, Keep::from_row(&row, self.services.clone()));
        }

        link_towers(&mut keeps);

        let mut slots: SlotTemplates = HashMap::new();
        for row in store.positions()? {
            slots
                .entry((row.component_skin, row.component_rotation))
                .or_default()
                .push(row);
        }
        let mut geometry: HookPointGeometry = HashMap::new();
        for row in store.hookpoints()? {
            geometry.entry((row.skin, row.height)).or_default().push(row);
        }

        for row in store.components()? {
            let Some(keep) = keeps.get_mut(&row.keep_id) else {
                warn!(
                    "Component {} references unknown {}; skipped",
                    row.component_id, row.keep_id
                );
                continue;
            };
            let comp = StructuralComponent::from_row(&row, keep.level(), keep.component_base_health());
            keep.attach_component(comp);
        }

        for keep in keeps.values_mut() {
            keep.sort_components();
            attach_reference_data(keep, &slots, &geometry);
            keep.finish_load(claims.get(&keep.id()).map(String::as_str));
        }

        let areas: Vec<ProximityArea> = keeps
            .values()
            .map(|k| ProximityArea::for_keep(k, &self.services.config))
            .collect();
        let entries: BTreeMap<KeepId, KeepEntry> = keeps
            .into_iter()
            .map(|(id, keep)| {
                let entry = KeepEntry {
                    id,
                    kind: keep.kind(),
                    region: keep.region(),
                    position: keep.position(),
                    handle: Arc::new(Mutex::new(keep)),
                };
                (id, entry)
            })
            .collect();

        let count = entries.len();
        {
            let mut index = self.index.write();
            index.keeps = entries;
            index.areas = areas;
        }
        self.presence.lock().clear();
        info!("Loaded {} keeps", count);
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    pub fn get(&self, id: KeepId) -> Option<KeepHandle> {
        self.index.read().keeps.get(&id).map(|e| e.handle.clone())
    }

    pub fn entries(&self) -> Vec<KeepEntry> {
        self.index.read().keeps.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.index.read().keeps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().keeps.is_empty()
    }

    pub fn areas(&self) -> Vec<ProximityArea> {
        self.index.read().areas.clone()
    }

    /// Every keep in `region` within `radius` of `point`.
    pub fn find_near(&self, region: u16, point: &WorldPoint, radius: i32) -> Vec<KeepEntry> {
        let r = radius as i64;
        self.index
            .read()
            .keeps
            .values()
            .filter(|e| e.region == region && e.position.distance_sq_2d(point) <= r * r)
            .cloned()
            .collect()
    }

    /// Nearest keep in `region` within `radius` of `point`.
    pub fn find_closest(&self, region: u16, point: &WorldPoint, radius: i32) -> Option<KeepEntry> {
        let r = radius as i64;
        self.index
            .read()
            .keeps
            .values()
            .filter(|e| e.region == region)
            .map(|e| (e.position.distance_sq_2d(point), e))
            .filter(|(d, _)| *d <= r * r)
            .min_by_key(|(d, _)| *d)
            .map(|(_, e)| e.clone())
    }

    fn count_held(&self, kind: KeepKind, realm: Realm) -> usize {
        let frontier = self.services.config.frontier_region;
        self.entries()
            .into_iter()
            .filter(|e| e.kind == kind && e.region == frontier)
            .filter(|e| e.handle.lock().realm() == realm)
            .count()
    }

    pub fn keep_count_by_realm(&self, realm: Realm) -> usize {
        self.count_held(KeepKind::Keep, realm)
    }

    pub fn tower_count_by_realm(&self, realm: Realm) -> usize {
        self.count_held(KeepKind::Tower, realm)
    }

    // -----------------------------------------------------------------------
    // Enemy policy
    // -----------------------------------------------------------------------

    /// Whether keep-side `actor` should treat `target` as hostile.
    pub fn is_enemy(&self, actor: &Combatant, target: &Combatant) -> bool {
        match self.services.config.ruleset {
            Ruleset::Pve => target.is_player,
            Ruleset::Pvp => {
                if target.privileged {
                    return false;
                }
                // Guildless combatants share the empty guild name.
                actor.guild.as_deref().unwrap_or("") != target.guild.as_deref().unwrap_or("")
            }
            Ruleset::Normal => {
                if target.privileged || target.realm == Realm::None {
                    return false;
                }
                actor.realm != target.realm
            }
        }
    }

    // -----------------------------------------------------------------------
    // Runtime
    // -----------------------------------------------------------------------

    /// Fire due timers on every keep. Returns the total number of firings.
    pub fn advance_all(&self) -> usize {
        self.entries()
            .iter()
            .map(|e| e.handle.lock().advance())
            .sum()
    }

    /// Route a death to whichever keeps are watching `entity`.
    pub fn on_entity_died(&self, entity: EntityId, killer_realm: Realm) {
        for target in self.services.deaths.watchers(entity) {
            let Some(handle) = self.get(target.keep()) else {
                continue;
            };
            let mut keep = handle.lock();
            match target {
                WatchTarget::Lord(_) => {
                    info!("Lord of {} killed by {}", keep.id(), killer_realm.name());
                    keep.on_lord_killed(killer_realm);
                }
                WatchTarget::HookPointOccupant {
                    component,
                    hookpoint,
                    ..
                } => {
                    if let Err(e) = keep.on_hookpoint_occupant_death(component, hookpoint, entity) {
                        warn!("{}", e);
                    }
                }
            }
        }
    }

    /// Send keep and component info for every keep in `region`.
    pub fn on_player_entered_region(&self, player: PlayerId, region: u16) {
        for entry in self.entries().into_iter().filter(|e| e.region == region) {
            entry.handle.lock().send_init(player);
        }
    }

    /// Track area presence and announce ownership on entry. Returns the keeps
    /// whose area the player just entered.
    pub fn on_player_moved(&self, player: PlayerId, region: u16, point: &WorldPoint) -> Vec<KeepId> {
        let inside: HashSet<KeepId> = self
            .areas()
            .iter()
            .filter(|a| a.contains(region, point))
            .map(|a| a.keep_id)
            .collect();

        let entered: Vec<KeepId> = {
            let mut presence = self.presence.lock();
            let previous = presence.entry(player).or_default();
            let entered: Vec<KeepId> = inside.difference(previous).copied().collect();
            *previous = inside;
            entered
        };

        let areas = self.areas();
        for id in &entered {
            let (Some(area), Some(handle)) = (areas.iter().find(|a| a.keep_id == *id), self.get(*id))
            else {
                continue;
            };
            let keep = handle.lock();
            area.on_enter(player, &keep, &self.services);
            debug!("{} entered area of {}", player, id);
        }
        entered
    }
}

fn link_towers(keeps: &mut BTreeMap<KeepId, Keep>) {
    let towers: Vec<KeepId> = keeps.keys().filter(|id| id.is_tower()).copied().collect();
    for tower in towers {
        let parent = tower.linked_keep_id();
        match keeps.get_mut(&parent) {
            Some(keep) => keep.towers.push(tower),
            None => {
                warn!("{} links to missing {}", tower, parent);
                continue;
            }
        }
        if let Some(t) = keeps.get_mut(&tower) {
            t.parent = Some(parent);
        }
    }
}

/// Give each component its slot templates and hookpoints.
fn attach_reference_data(keep: &mut Keep, slots: &SlotTemplates, geometry: &HookPointGeometry) {
    let (keep_id, keep_pos, keep_heading) = (keep.id(), keep.position(), keep.heading());
    for comp in &mut keep.components {
        if let Some(rows) = slots.get(&(comp.skin, comp.heading)) {
            for row in rows {
                let tier = (row.height as usize).min(HEIGHT_TIERS - 1);
                comp.positions
                    .entry(row.template_id.clone())
                    .or_insert_with(|| [None, None, None, None])[tier] = Some(Position::from(row));
            }
        }

        let origin = comp.world_origin(keep_pos, keep_heading);
        let heading = comp.world_heading(keep_heading);
        let hookpoints: Vec<HookPoint> = match geometry.get(&(comp.skin, comp.height())) {
            Some(rows) => rows
                .iter()
                .map(|r| HookPoint::from_row(r, keep_id, comp.id, origin, heading))
                .collect(),
            None => HookPoint::default_set(keep_id, comp.id, origin, heading),
        };
        comp.hookpoints = hookpoints.into_iter().map(|h| (h.id, h)).collect();
    }
}
