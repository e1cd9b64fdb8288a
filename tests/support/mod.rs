//! Shared fixture: a small frontier with three keeps, one tower and a keep
//! outside the contested region, wired to in-memory collaborators.

#![allow(dead_code)]

use realm_keeps::{
    config::KeepConfig,
    events::DeathWatch,
    guild::{Guild, GuildHandle, GuildPermission, GuildRoster, Player},
    objects::ObjectFactory,
    protocol::{Outbound, Outbox},
    registry::{KeepHandle, KeepRegistry},
    store::{MemoryStore, SeedData},
    timer::{IdAllocator, ManualClock},
    types::{AttackData, Attacker, EntityId, KeepId, Realm},
    world::{Services, SimWorld},
};
use serde_json::json;
use std::sync::Arc;

pub const START_MS: u64 = 1_000_000;

pub const BENOWYC: u32 = 50;
pub const BLEDMEER: u32 = 51;
pub const ERASLEIGH: u32 = 52;
pub const CRAUCHON: u32 = 60;
/// First tower linked to Caer Benowyc.
pub const BENOWYC_TOWER: u32 = (1 << 8) + BENOWYC;

pub fn seed() -> SeedData {
    let doc = json!({
        "keeps": [
            { "keep_id": BENOWYC, "name": "Caer Benowyc", "level": 1, "base_level": 50,
              "realm": "albion", "original_realm": "albion", "difficulty": [1, 1, 1],
              "region": 163, "position": { "x": 100000, "y": 100000, "z": 0 } },
            { "keep_id": BLEDMEER, "name": "Bledmeer Faste", "level": 1, "base_level": 50,
              "realm": "midgard", "original_realm": "midgard", "difficulty": [1, 1, 1],
              "region": 163, "position": { "x": 200000, "y": 200000, "z": 0 } },
            { "keep_id": ERASLEIGH, "name": "Caer Erasleigh", "level": 1, "base_level": 50,
              "realm": "albion", "original_realm": "albion", "difficulty": [1, 1, 1],
              "region": 163, "position": { "x": 140000, "y": 100000, "z": 0 } },
            { "keep_id": CRAUCHON, "name": "Dun Crauchon", "level": 1, "base_level": 50,
              "realm": "hibernia", "original_realm": "hibernia",
              "region": 200, "position": { "x": 0, "y": 0, "z": 0 } },
            { "keep_id": BENOWYC_TOWER, "name": "Benowyc Tower", "level": 1, "base_level": 50,
              "realm": "albion", "original_realm": "albion", "difficulty": [2, 2, 2],
              "region": 163, "position": { "x": 103000, "y": 100000, "z": 0 } }
        ],
        "components": [
            { "keep_id": BENOWYC, "component_id": 1, "skin": 0, "x": 0, "y": 0 },
            { "keep_id": BENOWYC, "component_id": 2, "skin": 1, "x": 500, "y": 0 },
            { "keep_id": BLEDMEER, "component_id": 1, "skin": 1, "x": 0, "y": 0 },
            { "keep_id": ERASLEIGH, "component_id": 1, "skin": 1, "x": 0, "y": 0 },
            { "keep_id": CRAUCHON, "component_id": 1, "skin": 1, "x": 0, "y": 0 },
            { "keep_id": BENOWYC_TOWER, "component_id": 1, "skin": 10, "x": 0, "y": 0 },
            { "keep_id": 999, "component_id": 1, "skin": 0, "x": 0, "y": 0 }
        ],
        "hookpoints": [
            { "skin": 1, "height": 0, "hookpoint_id": 1, "x": 10, "y": 0, "z": 0 },
            { "skin": 1, "height": 0, "hookpoint_id": 2, "x": 20, "y": 0, "z": 0 },
            { "skin": 1, "height": 0, "hookpoint_id": 65, "x": 0, "y": 50, "z": 0 }
        ],
        "positions": [
            { "template_id": "archer-a", "component_skin": 0, "height": 0,
              "class_type": "DOL.GS.Keeps.GuardArcher", "x": 10, "y": 0, "z": 0 },
            { "template_id": "archer-a", "component_skin": 0, "height": 1,
              "class_type": "DOL.GS.Keeps.GuardArcher", "x": 10, "y": 0, "z": 200 },
            { "template_id": "archer-a", "component_skin": 0, "height": 3,
              "class_type": "DOL.GS.Keeps.GuardArcher", "x": 10, "y": 0, "z": 600 },
            { "template_id": "sniper", "component_skin": 0, "height": 3,
              "class_type": "GuardCaster", "x": 40, "y": 0, "z": 600 },
            { "template_id": "banner-a", "component_skin": 0, "height": 0,
              "class_type": "GameKeepBanner", "x": 0, "y": 30, "z": 0 },
            { "template_id": "door-a", "component_skin": 0, "height": 0,
              "class_type": "GameKeepDoor", "x": 0, "y": -30, "z": 0 },
            { "template_id": "patrol-a", "component_skin": 0, "height": 0,
              "class_type": "Patrol", "x": 50, "y": 50, "z": 0 },
            { "template_id": "patrol-m", "component_skin": 0, "height": 0,
              "class_type": "Patrol", "keep_type": "magic", "x": -50, "y": 50, "z": 0 },
            { "template_id": "bogus", "component_skin": 0, "height": 0,
              "class_type": "DOL.GS.Keeps.Dragon", "x": 0, "y": 0, "z": 0 },
            { "template_id": "tower-archer", "component_skin": 10, "height": 0,
              "class_type": "GuardArcher", "x": 0, "y": 0, "z": 300 }
        ],
        "keep_objects": [
            { "keep_id": BENOWYC, "template_id": "benowyc-lord", "class_type": "GuardLord",
              "x": 0, "y": 0, "z": 0 },
            { "keep_id": BLEDMEER, "template_id": "bledmeer-lord", "class_type": "GuardLord",
              "x": 0, "y": 0, "z": 0 },
            { "keep_id": ERASLEIGH, "template_id": "erasleigh-lord", "class_type": "GuardLord",
              "x": 0, "y": 0, "z": 0 },
            { "keep_id": CRAUCHON, "template_id": "crauchon-lord", "class_type": "GuardLord",
              "x": 0, "y": 0, "z": 0 },
            { "keep_id": BENOWYC_TOWER, "template_id": "tower-lord", "class_type": "GuardLord",
              "x": 0, "y": 0, "z": 300 }
        ]
    });
    serde_json::from_value(doc).expect("fixture seed parses")
}

pub struct Fixture {
    pub clock: Arc<ManualClock>,
    pub outbox: Arc<Outbox>,
    pub world: Arc<SimWorld>,
    pub store: Arc<MemoryStore>,
    pub guilds: Arc<GuildRoster>,
    pub services: Arc<Services>,
    pub registry: Arc<KeepRegistry>,
}

impl Fixture {
    /// Wired but not yet loaded.
    pub fn unloaded(seed: SeedData, config: KeepConfig) -> Self {
        let clock = Arc::new(ManualClock::new(START_MS));
        let outbox = Arc::new(Outbox::new());
        let world = Arc::new(SimWorld::new());
        let store = Arc::new(MemoryStore::new(seed));
        let guilds = Arc::new(GuildRoster::new());
        let services = Arc::new(Services {
            config,
            store: store.clone(),
            notifier: outbox.clone(),
            world: world.clone(),
            guilds: guilds.clone(),
            clock: clock.clone(),
            factory: ObjectFactory::standard(),
            deaths: DeathWatch::new(),
            ids: IdAllocator::starting_at(1),
        });
        let registry = Arc::new(KeepRegistry::new(services.clone()));
        Self {
            clock,
            outbox,
            world,
            store,
            guilds,
            services,
            registry,
        }
    }

    pub fn keep(&self, id: u32) -> KeepHandle {
        self.registry.get(KeepId(id)).expect("keep is loaded")
    }

    /// Guild registered with the roster.
    pub fn guild(&self, name: &str, realm: Realm, bounty_points: i64) -> GuildHandle {
        self.guilds
            .insert(Guild::new(name, realm).with_bounty_points(bounty_points).into_handle())
    }

    /// Guild member allowed to claim and upgrade.
    pub fn officer(&self, id: u64, realm: Realm, guild: &GuildHandle) -> Player {
        {
            let mut g = guild.lock();
            g.grant(EntityId(id), GuildPermission::Claim);
            g.grant(EntityId(id), GuildPermission::Upgrade);
        }
        Player::new(EntityId(id), format!("officer{}", id), realm).in_guild(guild.clone())
    }

    pub fn chat(&self) -> Vec<String> {
        self.outbox.chat_lines()
    }

    pub fn messages(&self) -> Vec<Outbound> {
        self.outbox.peek().into_iter().map(|e| e.payload).collect()
    }
}

pub fn fixture() -> Fixture {
    fixture_with(KeepConfig::default())
}

pub fn fixture_with(config: KeepConfig) -> Fixture {
    let fx = Fixture::unloaded(seed(), config);
    fx.registry.load().expect("fixture loads");
    fx
}

pub fn player_hit(realm: Realm, damage: i32) -> AttackData {
    AttackData {
        attacker: Attacker::Player {
            id: EntityId(500_000),
            realm,
        },
        damage,
        style_damage: 0,
    }
}
