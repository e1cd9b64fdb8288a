//! Keep aggregate: ownership, claim economy, upgrades and capture.
//!
//! Every mutation of a keep (guild commands, combat damage, timer firings)
//! goes through `&mut Keep`, and keeps live behind one mutex each in the
//! [`crate::registry::KeepRegistry`]. That lock is the single mutator
//! discipline for level, guild and health.
//!
//! ```text
//! Unclaimed ──claim──► Claimed ──claim tick (shortfall)──► Unclaimed
//!     │                   │
//!     └──upgrade──► Upgrading ──upgrade tick × n──► level == target
//! any ──lord killed──► Captured ──reset──► Unclaimed (new realm)
//! ```

use crate::component::StructuralComponent;
use crate::error::{ClaimRejection, KeepError, Result, UpgradeRejection};
use crate::events::{DeathSubscription, WatchTarget};
use crate::guild::{GuildHandle, GuildPermission, Player};
use crate::objects::{ClassTag, Collection, KeepObject, Patrol};
use crate::protocol::{
    Audience, ChatKind, ClaimNotification, ComponentUpdate, ConfirmDialog, KeepEvent,
    KeepEventKind, KeepInfo, Outbound,
};
use crate::store::KeepRow;
use crate::timer::Timer;
use crate::types::{add_headings, KeepId, KeepKind, KeepType, PlayerId, Realm, WorldPoint};
use crate::world::Services;
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

pub const MIN_LEVEL: u8 = 1;
pub const MAX_LEVEL: u8 = 10;

/// Bounty points taken from the claiming guild per claim tick, by level.
/// Towers pay a tenth.
pub const CLAIM_BOUNTY_POINT_COST: [i64; 10] = [50, 50, 50, 50, 100, 200, 300, 400, 500, 1000];

/// Bounty points per keep level a guild must hold to keep its claim.
pub const CLAIM_UPKEEP_PER_LEVEL: i64 = 50;

/// Fixed per-level upgrade time for towers.
pub const TOWER_UPGRADE_MS: u64 = 12 * 60 * 1000;

/// Radius around the keep in which players see the claim banner go up.
const CLAIM_NOTICE_RADIUS: i32 = 6000;

/// Timer identities, in firing priority order for equal deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerRef {
    Claim,
    Upgrade,
    Repair(usize),
    Eviction(usize, u8),
}

/// Guard to stop a pathological zero-delay timer from spinning forever.
const MAX_FIRINGS_PER_ADVANCE: usize = 4096;

pub struct Keep {
    pub(crate) id: KeepId,
    pub(crate) name: String,
    pub(crate) kind: KeepKind,
    pub(crate) level: u8,
    pub(crate) base_level: u8,
    pub(crate) realm: Realm,
    pub(crate) original_realm: Realm,
    pub(crate) keep_type: KeepType,
    pub(crate) difficulty: [i32; 3],
    pub(crate) target_level: u8,
    pub(crate) region: u16,
    pub(crate) position: WorldPoint,
    pub(crate) heading: u16,

    /// Sorted by component id once loading finishes.
    pub(crate) components: Vec<StructuralComponent>,
    /// Keyed by template id; each key holds at most one object.
    pub(crate) doors: BTreeMap<String, KeepObject>,
    pub(crate) guards: BTreeMap<String, KeepObject>,
    pub(crate) banners: BTreeMap<String, KeepObject>,
    pub(crate) patrols: BTreeMap<String, Patrol>,
    pub(crate) teleport_stone: Option<KeepObject>,
    pub(crate) lord_watch: Option<DeathSubscription>,

    pub(crate) guild: Option<GuildHandle>,
    pending_claims: HashSet<PlayerId>,
    pub(crate) claim_timer: Timer,
    pub(crate) upgrade_timer: Timer,
    /// 0 = never attacked since the last reset.
    pub(crate) last_attacked_ms: u64,

    pub(crate) parent: Option<KeepId>,
    pub(crate) towers: Vec<KeepId>,

    pub(crate) services: Arc<Services>,
}

impl std::fmt::Debug for Keep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keep")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("level", &self.level)
            .field("realm", &self.realm)
            .field("guild", &self.guild_name())
            .finish()
    }
}

impl Keep {
    /// Build a keep from its persisted row. Components, hookpoints and
    /// objects are attached by the registry afterwards.
    pub fn from_row(row: &KeepRow, services: Arc<Services>) -> Self {
        let kind = if row.keep_id.is_tower() {
            KeepKind::Tower
        } else {
            KeepKind::Keep
        };
        Self {
            id: row.keep_id,
            name: row.name.clone(),
            kind,
            level: row.level.clamp(MIN_LEVEL, MAX_LEVEL),
            base_level: row.base_level,
            realm: row.realm,
            original_realm: row.original_realm,
            keep_type: row.keep_type,
            difficulty: row.difficulty,
            target_level: row.level.clamp(MIN_LEVEL, MAX_LEVEL),
            region: row.region,
            position: row.position,
            heading: row.heading,
            components: Vec::new(),
            doors: BTreeMap::new(),
            guards: BTreeMap::new(),
            banners: BTreeMap::new(),
            patrols: BTreeMap::new(),
            teleport_stone: None,
            lord_watch: None,
            guild: None,
            pending_claims: HashSet::new(),
            claim_timer: Timer::new(),
            upgrade_timer: Timer::new(),
            last_attacked_ms: 0,
            parent: None,
            towers: Vec::new(),
            services,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn id(&self) -> KeepId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> KeepKind {
        self.kind
    }

    pub fn is_tower(&self) -> bool {
        self.kind == KeepKind::Tower
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn base_level(&self) -> u8 {
        self.base_level
    }

    pub fn target_level(&self) -> u8 {
        self.target_level
    }

    pub fn realm(&self) -> Realm {
        self.realm
    }

    pub fn original_realm(&self) -> Realm {
        self.original_realm
    }

    pub fn keep_type(&self) -> KeepType {
        self.keep_type
    }

    pub fn region(&self) -> u16 {
        self.region
    }

    pub fn position(&self) -> WorldPoint {
        self.position
    }

    pub fn heading(&self) -> u16 {
        self.heading
    }

    pub fn parent(&self) -> Option<KeepId> {
        self.parent
    }

    pub fn towers(&self) -> &[KeepId] {
        &self.towers
    }

    pub fn guild(&self) -> Option<&GuildHandle> {
        self.guild.as_ref()
    }

    pub fn guild_name(&self) -> Option<String> {
        self.guild.as_ref().map(|g| g.lock().name.clone())
    }

    pub fn is_claimed(&self) -> bool {
        self.guild.is_some()
    }

    pub fn components(&self) -> &[StructuralComponent] {
        &self.components
    }

    pub fn component(&self, component_id: u16) -> Option<&StructuralComponent> {
        self.components.iter().find(|c| c.id == component_id)
    }

    pub fn guards(&self) -> &BTreeMap<String, KeepObject> {
        &self.guards
    }

    pub fn banners(&self) -> &BTreeMap<String, KeepObject> {
        &self.banners
    }

    pub fn doors(&self) -> &BTreeMap<String, KeepObject> {
        &self.doors
    }

    pub fn patrols(&self) -> &BTreeMap<String, Patrol> {
        &self.patrols
    }

    pub fn teleport_stone(&self) -> Option<&KeepObject> {
        self.teleport_stone.as_ref()
    }

    pub fn lord(&self) -> Option<&KeepObject> {
        self.guards.values().find(|g| g.tag == ClassTag::GuardLord)
    }

    pub fn claim_timer(&self) -> &Timer {
        &self.claim_timer
    }

    pub fn upgrade_timer(&self) -> &Timer {
        &self.upgrade_timer
    }

    /// Difficulty for the realm currently holding the keep.
    pub fn difficulty_level(&self) -> i32 {
        self.realm
            .index()
            .map(|i| self.difficulty[i])
            .unwrap_or_default()
    }

    pub fn in_combat(&self) -> bool {
        if self.last_attacked_ms == 0 {
            return false;
        }
        self.services.now().saturating_sub(self.last_attacked_ms)
            < self.services.config.in_combat_window_ms
    }

    pub fn is_portal_keep(&self) -> bool {
        (self.is_tower() && self.components.len() > 1) || self.base_level >= 100
    }

    pub(crate) fn component_index(&self, component_id: u16) -> Result<usize> {
        self.components
            .iter()
            .position(|c| c.id == component_id)
            .ok_or(KeepError::ComponentNotFound {
                keep: self.id,
                component: component_id,
            })
    }

    /// Base health of this keep's components at level 1.
    pub(crate) fn component_base_health(&self) -> i32 {
        match self.kind {
            KeepKind::Keep => self.services.config.keep_component_base_health,
            KeepKind::Tower => self.services.config.tower_component_base_health,
        }
    }

    pub(crate) fn guard_level(&self) -> u8 {
        crate::component::combat_level(self.base_level, self.level).clamp(1, 255) as u8
    }

    // -----------------------------------------------------------------------
    // Load
    // -----------------------------------------------------------------------

    pub(crate) fn attach_component(&mut self, component: StructuralComponent) {
        self.components.push(component);
    }

    pub(crate) fn sort_components(&mut self) {
        self.components.sort_by_key(|c| c.id);
    }

    /// Spawn template objects, fill slots, start repair timers and restore
    /// a persisted claim.
    pub(crate) fn finish_load(&mut self, claimed_guild: Option<&str>) {
        self.load_template_objects();
        for idx in 0..self.components.len() {
            self.resolve_positions_at(idx);
        }

        let now = self.services.now();
        let interval = self.services.config.repair_interval_ms;
        for comp in &mut self.components {
            comp.repair_timer.arm_repeating(now, interval, interval);
        }

        if let Some(name) = claimed_guild.filter(|n| !n.is_empty()) {
            match self.services.guilds.find(name) {
                Some(guild) if guild.lock().claimed_keep.is_some_and(|k| k != self.id) => {
                    warn!("'{}' already holds another keep; claim on {} dropped", name, self.id);
                }
                Some(guild) => {
                    guild.lock().claimed_keep = Some(self.id);
                    self.guild = Some(guild);
                    let interval = self.services.config.claim_interval_ms;
                    self.claim_timer.arm_repeating(now, interval, interval);
                    debug!("{} restored claim by '{}'", self.id, name);
                }
                None => warn!("{} was claimed by unknown guild '{}'", self.id, name),
            }
        }
    }

    /// (Re)build guards and banners from the keep's persisted templates.
    /// Doors and the teleport stone are only built once.
    pub(crate) fn load_template_objects(&mut self) {
        let rows = match self.services.store.keep_objects(self.id) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Failed to load objects of {}: {}", self.id, e);
                return;
            }
        };

        for row in rows {
            if row.realm.is_some_and(|r| r != self.realm) || !row.keep_type.admits(self.keep_type) {
                continue;
            }
            let tag: ClassTag = match row.class_type.parse() {
                Ok(tag) => tag,
                Err(e) => {
                    warn!("{} object '{}': {}", self.id, row.template_id, e);
                    continue;
                }
            };
            // Doors and the stone survive a reset and are reset in place.
            let tracked = match tag.collection() {
                Collection::Doors => self.doors.contains_key(&row.template_id),
                Collection::TeleportStone => self.teleport_stone.is_some(),
                _ => false,
            };
            if tracked {
                continue;
            }
            let mut object = match self.spawn_object(tag, &row.template_id) {
                Ok(object) => object,
                Err(e) => {
                    warn!("{} object '{}': {}", self.id, row.template_id, e);
                    continue;
                }
            };
            let at = self
                .position
                .offset_rotated(row.x, row.y, row.z, self.heading);
            object.place(at, add_headings(row.heading, self.heading), 0);
            object.in_world = self.services.world.add_object(&object);
            self.insert_object(object);
        }
    }

    /// Track an object in the collection its tag belongs to.
    pub(crate) fn insert_object(&mut self, object: KeepObject) {
        match object.tag.collection() {
            Collection::Guards => {
                if object.tag == ClassTag::GuardLord {
                    if let Some(old) = self.lord().map(|l| (l.template_id.clone(), l.id)) {
                        if old.0 != object.template_id {
                            warn!("{} already has a lord; replacing it", self.id);
                            self.services.world.remove_object(old.1);
                            self.guards.remove(&old.0);
                        }
                    }
                    self.lord_watch = Some(
                        self.services
                            .deaths
                            .subscribe(object.id, WatchTarget::Lord(self.id)),
                    );
                }
                self.guards.insert(object.template_id.clone(), object);
            }
            Collection::Banners => {
                self.banners.insert(object.template_id.clone(), object);
            }
            Collection::Doors => {
                self.doors.insert(object.template_id.clone(), object);
            }
            Collection::TeleportStone => {
                self.teleport_stone = Some(object);
            }
            Collection::Patrols => {
                warn!("{}: patrols are not stored as single objects", self.id);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Persistence & broadcast helpers
    // -----------------------------------------------------------------------

    pub fn to_row(&self) -> KeepRow {
        KeepRow {
            keep_id: self.id,
            name: self.name.clone(),
            level: self.level,
            base_level: self.base_level,
            realm: self.realm,
            original_realm: self.original_realm,
            keep_type: self.keep_type,
            difficulty: self.difficulty,
            region: self.region,
            position: self.position,
            heading: self.heading,
            claimed_guild: self.guild_name(),
        }
    }

    /// Write the keep and its components. Failures are logged, not raised.
    pub fn save(&self) {
        if let Err(e) = self.services.store.save_keep(&self.to_row()) {
            warn!("Failed to save {}: {}", self.id, e);
        }
        for comp in &self.components {
            if let Err(e) = self.services.store.save_component(&comp.to_row()) {
                warn!("Failed to save component {} of {}: {}", comp.id, self.id, e);
            }
        }
    }

    pub fn info(&self) -> KeepInfo {
        KeepInfo {
            keep_id: self.id,
            name: self.name.clone(),
            realm: self.realm,
            level: self.level,
            keep_type: self.keep_type,
            guild: self.guild_name(),
            position: self.position,
            heading: self.heading,
        }
    }

    /// Keep info followed by one component info per component.
    pub fn send_init(&self, player: PlayerId) {
        let audience = Audience::Player { id: player };
        self.services
            .send(audience.clone(), Outbound::KeepInfo(self.info()));
        for comp in &self.components {
            self.services.send(
                audience.clone(),
                Outbound::ComponentInfo(comp.info(self.kind)),
            );
        }
    }

    pub(crate) fn broadcast_component_update(&self, level_changed: bool) {
        self.services.send(
            Audience::Region {
                region: self.region,
            },
            Outbound::ComponentUpdate(ComponentUpdate {
                keep_id: self.id,
                realm: self.realm,
                level: self.level,
                level_changed,
            }),
        );
    }

    pub(crate) fn fire_event(&self, kind: KeepEventKind, realm: Realm) {
        self.services.send(
            Audience::All,
            Outbound::Event(KeepEvent {
                keep_id: self.id,
                kind,
                realm,
                level: self.level,
            }),
        );
    }

    fn tell(&self, player: PlayerId, kind: ChatKind, text: impl Into<String>) {
        self.services
            .send(Audience::Player { id: player }, Outbound::chat(kind, text));
    }

    fn tell_guild(&self, guild: &str, text: impl Into<String>) {
        self.services.send(
            Audience::Guild {
                name: guild.to_string(),
            },
            Outbound::chat(ChatKind::Guild, text),
        );
    }

    // -----------------------------------------------------------------------
    // Level
    // -----------------------------------------------------------------------

    /// Set the keep level and run every level-derived recalculation:
    /// component health/height, guard levels and slot occupancy.
    pub fn change_level(&mut self, level: u8) {
        let level = level.clamp(MIN_LEVEL, MAX_LEVEL);
        if level == self.level {
            return;
        }
        self.level = level;
        let base = self.component_base_health();
        let mut height_changed = false;
        for comp in &mut self.components {
            height_changed |= comp.update_level(level, base);
        }
        let guard_level = self.guard_level();
        for guard in self.guards.values_mut() {
            guard.level = guard_level;
        }
        if height_changed {
            for idx in 0..self.components.len() {
                self.resolve_positions_at(idx);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Claim
    // -----------------------------------------------------------------------

    /// Every condition a player must meet to claim this keep.
    pub fn claim_eligibility(&self, player: &Player) -> std::result::Result<(), ClaimRejection> {
        if player.realm != self.realm {
            return Err(ClaimRejection::WrongRealm);
        }
        let Some(guild) = player.guild.as_ref() else {
            return Err(ClaimRejection::NoGuild);
        };
        {
            let guild = guild.lock();
            if !guild.has_permission(player.id, GuildPermission::Claim) {
                return Err(ClaimRejection::NoPermission);
            }
            let required = self.services.config.claim_min_bounty_points;
            if guild.bounty_points < required {
                return Err(ClaimRejection::InsufficientBountyPoints { required });
            }
            if self.guild.is_some() {
                return Err(ClaimRejection::AlreadyClaimed);
            }
            if guild.claimed_keep.is_some() {
                return Err(ClaimRejection::GuildOwnsKeep);
            }
        }
        if self.is_tower() && !player.privileged {
            let required = self.services.config.tower_claim_group_size;
            if player.nearby_group_members < required {
                return Err(ClaimRejection::GroupTooSmall {
                    have: player.nearby_group_members,
                    required,
                });
            }
        }
        Ok(())
    }

    /// Boolean form: a refusal is told to the player.
    pub fn check_claim_eligibility(&self, player: &Player) -> bool {
        match self.claim_eligibility(player) {
            Ok(()) => true,
            Err(reason) => {
                self.tell(player.id, ChatKind::System, reason.to_string());
                false
            }
        }
    }

    /// First half of a claim: ask the player to confirm.
    pub fn request_claim(&mut self, player: &Player) -> bool {
        if !self.check_claim_eligibility(player) {
            return false;
        }
        self.pending_claims.insert(player.id);
        self.services.send(
            Audience::Player { id: player.id },
            Outbound::Dialog(ConfirmDialog {
                keep_id: self.id,
                text: format!("Do you want to claim {}?", self.name),
            }),
        );
        true
    }

    /// Second half of a claim: the player's answer to the dialog.
    pub fn confirm_claim(
        &mut self,
        player: &Player,
        accepted: bool,
    ) -> std::result::Result<(), ClaimRejection> {
        if !self.pending_claims.remove(&player.id) {
            return Err(ClaimRejection::NotPending);
        }
        if !accepted {
            return Ok(());
        }
        self.claim(player)
    }

    /// Hand the keep to the player's guild.
    pub fn claim(&mut self, player: &Player) -> std::result::Result<(), ClaimRejection> {
        if let Err(reason) = self.claim_eligibility(player) {
            self.tell(player.id, ChatKind::System, reason.to_string());
            return Err(reason);
        }
        let Some(guild) = player.guild.clone() else {
            return Err(ClaimRejection::NoGuild);
        };
        // Eligibility released the guild lock; re-check under the one we write with.
        let guild_name = {
            let mut g = guild.lock();
            if g.claimed_keep.is_some() {
                drop(g);
                let reason = ClaimRejection::GuildOwnsKeep;
                self.tell(player.id, ChatKind::System, reason.to_string());
                return Err(reason);
            }
            g.claimed_keep = Some(self.id);
            g.name.clone()
        };
        self.guild = Some(guild);
        self.pending_claims.clear();

        for obj in self.guards.values_mut().chain(self.banners.values_mut()) {
            obj.guild = Some(guild_name.clone());
        }

        if let Some(lord) = self.lord() {
            let text = format!("{} has accepted your request to claim the outpost.", lord.template_id);
            self.tell(player.id, ChatKind::Say, text);
        }
        self.services.send(
            Audience::Realm { realm: self.realm },
            Outbound::chat(
                ChatKind::Important,
                format!("{} has taken control of {}!", guild_name, self.name),
            ),
        );
        self.services.send(
            Audience::Radius {
                region: self.region,
                center: self.position,
                radius: CLAIM_NOTICE_RADIUS,
            },
            Outbound::Claim(ClaimNotification {
                keep_id: self.id,
                guild: guild_name.clone(),
                level: self.level,
            }),
        );
        self.fire_event(KeepEventKind::Claimed, self.realm);

        let now = self.services.now();
        let cfg = &self.services.config;
        self.claim_timer
            .arm_repeating(now, cfg.claim_first_tick_ms, cfg.claim_interval_ms);
        info!("{} claimed by '{}'", self.id, guild_name);
        self.save();
        Ok(())
    }

    /// Realm points the owning guild earns per claim tick.
    pub fn realm_points_per_tick(&self) -> i64 {
        match self.kind {
            KeepKind::Keep => 0,
            KeepKind::Tower => 100 * self.difficulty_level() as i64,
        }
    }

    /// Bounty points the owning guild pays per claim tick at the current level.
    pub fn claim_cost(&self) -> i64 {
        let cost = CLAIM_BOUNTY_POINT_COST[(self.level.clamp(MIN_LEVEL, MAX_LEVEL) - 1) as usize];
        match self.kind {
            KeepKind::Keep => cost,
            KeepKind::Tower => cost / 10,
        }
    }

    /// Periodic upkeep: pay bounty points for realm points, or lose the claim.
    pub fn claim_tick(&mut self) {
        let Some(guild) = self.guild.clone() else {
            self.claim_timer.disarm();
            return;
        };
        let upkeep = CLAIM_UPKEEP_PER_LEVEL * self.level as i64;
        if guild.lock().bounty_points < upkeep {
            info!("{}: guild cannot pay upkeep of {}; releasing", self.id, upkeep);
            self.release();
            return;
        }
        let gained = self.realm_points_per_tick();
        let cost = self.claim_cost();
        let mut g = guild.lock();
        g.gain_realm_points(gained);
        g.gain_bounty_points(-cost);
        debug!(
            "{} claim tick: '{}' paid {} BP, gained {} RP ({} BP left)",
            self.id, g.name, cost, gained, g.bounty_points
        );
    }

    // -----------------------------------------------------------------------
    // Release
    // -----------------------------------------------------------------------

    pub fn release(&mut self) {
        if let Some(guild) = self.guild.take() {
            let name = {
                let mut g = guild.lock();
                if g.claimed_keep == Some(self.id) {
                    g.claimed_keep = None;
                }
                g.name.clone()
            };
            self.tell_guild(&name, format!("Your guild has lost the claim of {}.", self.name));
            info!("{} released by '{}'", self.id, name);
        }
        self.pending_claims.clear();
        self.claim_timer.disarm();
        self.upgrade_timer.disarm();
        self.change_level(MIN_LEVEL);
        self.target_level = self.level;

        for obj in self.guards.values_mut().chain(self.banners.values_mut()) {
            obj.guild = None;
        }
        self.fire_event(KeepEventKind::Released, self.realm);
        self.save();
    }

    // -----------------------------------------------------------------------
    // Upgrade
    // -----------------------------------------------------------------------

    pub fn upgrade_eligibility(
        &self,
        player: &Player,
        target: u8,
    ) -> std::result::Result<(), UpgradeRejection> {
        let owns = match (&self.guild, &player.guild) {
            (Some(mine), Some(theirs)) => Arc::ptr_eq(mine, theirs),
            _ => false,
        };
        if !owns {
            return Err(UpgradeRejection::NotOwner);
        }
        if !self
            .guild
            .as_ref()
            .is_some_and(|g| g.lock().has_permission(player.id, GuildPermission::Upgrade))
        {
            return Err(UpgradeRejection::NoPermission);
        }
        if target <= self.level || target > MAX_LEVEL {
            return Err(UpgradeRejection::InvalidTarget(target));
        }
        Ok(())
    }

    pub fn check_upgrade_eligibility(&self, player: &Player, target: u8) -> bool {
        match self.upgrade_eligibility(player, target) {
            Ok(()) => true,
            Err(reason) => {
                self.tell(player.id, ChatKind::System, reason.to_string());
                false
            }
        }
    }

    /// Per-level upgrade time.
    pub fn time_to_upgrade(&self) -> u64 {
        match self.kind {
            KeepKind::Keep => self.services.config.keep_upgrade_interval_ms,
            KeepKind::Tower => TOWER_UPGRADE_MS,
        }
    }

    /// Start raising the keep to `target`. The first level is granted at once.
    pub fn upgrade(&mut self, target: u8) -> Result<()> {
        if !(MIN_LEVEL..=MAX_LEVEL).contains(&target) || target <= self.level {
            return Err(KeepError::InvalidLevel(target));
        }
        self.target_level = target;
        self.change_level(self.level + 1);
        self.broadcast_component_update(true);

        if self.level < self.target_level {
            let now = self.services.now();
            self.upgrade_timer.arm(now, self.time_to_upgrade());
        } else {
            self.upgrade_timer.disarm();
        }
        if let Some(name) = self.guild_name() {
            self.tell_guild(
                &name,
                format!("{} is being upgraded to level {}.", self.name, target),
            );
        }
        self.save();
        Ok(())
    }

    /// One step towards the target level; re-arms until the target is reached.
    pub fn upgrade_tick(&mut self) {
        if !(MIN_LEVEL..=MAX_LEVEL).contains(&self.target_level) {
            return;
        }
        if self.level >= self.target_level {
            self.upgrade_timer.disarm();
            return;
        }
        self.change_level(self.level + 1);
        self.services.send(
            Audience::All,
            Outbound::chat(
                ChatKind::Important,
                format!("The keep {} is upgraded to level {}!", self.name, self.level),
            ),
        );
        for comp in &self.components {
            self.services.send(
                Audience::Region {
                    region: self.region,
                },
                Outbound::ComponentDetailUpdate(comp.detail_update(self.kind)),
            );
        }
        self.broadcast_component_update(true);
        self.fire_event(KeepEventKind::Upgraded, self.realm);
        self.save();

        if self.level < self.target_level {
            let now = self.services.now();
            self.upgrade_timer.arm(now, self.time_to_upgrade());
        } else {
            self.upgrade_timer.disarm();
        }
    }

    // -----------------------------------------------------------------------
    // Capture & reset
    // -----------------------------------------------------------------------

    /// Hand the keep to `realm` and rebuild it from its templates.
    pub fn reset(&mut self, realm: Realm) {
        self.last_attacked_ms = 0;
        if self.guild.is_some() {
            self.release();
        }
        self.realm = realm;
        self.original_realm = realm;
        self.keep_type = KeepType::Melee;
        self.claim_timer.disarm();
        self.upgrade_timer.disarm();
        self.change_level(MIN_LEVEL);
        self.target_level = self.level;

        self.clear_guards_and_banners();

        let now = self.services.now();
        for idx in 0..self.components.len() {
            let comp = &mut self.components[idx];
            if !comp.raized {
                comp.repair_full();
            }
            self.destroy_hookpoint_occupants(idx, now);
        }

        self.load_template_objects();
        for idx in 0..self.components.len() {
            self.resolve_positions_at(idx);
        }

        for door in self.doors.values_mut() {
            door.realm = realm;
            door.closed = true;
            door.guild = None;
        }
        if let Some(stone) = self.teleport_stone.as_mut() {
            stone.realm = realm;
        }

        self.broadcast_component_update(false);
        info!("{} reset to {}", self.id, realm.name());
        self.save();
    }

    fn clear_guards_and_banners(&mut self) {
        self.lord_watch = None;
        let world = &self.services.world;
        for obj in self.guards.values().chain(self.banners.values()) {
            world.remove_object(obj.id);
        }
        self.guards.clear();
        self.banners.clear();
        self.patrols.clear();
    }

    /// The lord died: announce the capture and reset to the killer's realm.
    pub fn on_lord_killed(&mut self, killer_realm: Realm) {
        let text = format!(
            "The Forces of {} have captured {}!",
            killer_realm.name(),
            self.name
        );
        for _ in 0..3 {
            self.services
                .send(Audience::All, Outbound::chat(ChatKind::Important, text.clone()));
        }
        self.lord_watch = None;
        self.fire_event(KeepEventKind::Captured, killer_realm);
        self.reset(killer_realm);
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    /// Fire every due timer, earliest deadline first. Returns the number of
    /// firings.
    pub fn advance(&mut self) -> usize {
        let mut fired = 0;
        while fired < MAX_FIRINGS_PER_ADVANCE {
            let now = self.services.now();
            let Some(next) = self.next_due(now) else {
                break;
            };
            fired += 1;
            match next {
                TimerRef::Claim => {
                    if self.claim_timer.take_due(now) {
                        self.claim_tick();
                    }
                }
                TimerRef::Upgrade => {
                    if self.upgrade_timer.take_due(now) {
                        self.upgrade_tick();
                    }
                }
                TimerRef::Repair(idx) => {
                    if self.components[idx].repair_timer.take_due(now) {
                        self.repair_tick_at(idx);
                    }
                }
                TimerRef::Eviction(idx, hp) => {
                    let due = self.components[idx]
                        .hookpoints
                        .get_mut(&hp)
                        .is_some_and(|h| h.eviction.take_due(now));
                    if due {
                        self.eviction_tick_at(idx, hp);
                    }
                }
            }
        }
        if fired == MAX_FIRINGS_PER_ADVANCE {
            warn!("{}: timer firing limit reached in one advance", self.id);
        }
        fired
    }

    fn next_due(&self, now: u64) -> Option<TimerRef> {
        let mut best: Option<(u64, TimerRef)> = None;
        let mut consider = |deadline: Option<u64>, which: TimerRef| {
            if let Some(d) = deadline.filter(|d| *d <= now) {
                if best.map_or(true, |(b, _)| d < b) {
                    best = Some((d, which));
                }
            }
        };
        consider(self.claim_timer.deadline(), TimerRef::Claim);
        consider(self.upgrade_timer.deadline(), TimerRef::Upgrade);
        for (idx, comp) in self.components.iter().enumerate() {
            consider(comp.repair_timer.deadline(), TimerRef::Repair(idx));
            for (hp_id, hp) in &comp.hookpoints {
                consider(hp.eviction.deadline(), TimerRef::Eviction(idx, *hp_id));
            }
        }
        best.map(|(_, which)| which)
    }
}
