//! Keep objects (guards, banners, doors, patrols, teleport stones) and the
//! tag-keyed factory that builds them from persisted class tags.

use crate::error::FactoryError;
use crate::types::{EntityId, KeepId, Realm, WorldPoint};
use std::collections::HashMap;
use std::str::FromStr;

/// Guards spawned per patrol slot.
pub const PATROL_SIZE: usize = 4;

// ---------------------------------------------------------------------------
// Class tags
// ---------------------------------------------------------------------------

/// Closed set of object kinds a slot or template row may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassTag {
    GuardArcher,
    GuardCaster,
    GuardFighter,
    GuardHealer,
    GuardStealther,
    GuardLord,
    Banner,
    Door,
    Patrol,
    TeleportStone,
}

/// Where on the keep an object of a given tag is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Guards,
    Banners,
    Doors,
    Patrols,
    TeleportStone,
}

impl ClassTag {
    pub fn collection(&self) -> Collection {
        match self {
            ClassTag::Banner => Collection::Banners,
            ClassTag::Door => Collection::Doors,
            ClassTag::Patrol => Collection::Patrols,
            ClassTag::TeleportStone => Collection::TeleportStone,
            _ => Collection::Guards,
        }
    }

    /// Doors and teleport stones stay where they were first placed.
    pub fn relocates(&self) -> bool {
        !matches!(self, ClassTag::Door | ClassTag::TeleportStone)
    }

    pub fn is_guard(&self) -> bool {
        self.collection() == Collection::Guards
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClassTag::GuardArcher => "GuardArcher",
            ClassTag::GuardCaster => "GuardCaster",
            ClassTag::GuardFighter => "GuardFighter",
            ClassTag::GuardHealer => "GuardHealer",
            ClassTag::GuardStealther => "GuardStealther",
            ClassTag::GuardLord => "GuardLord",
            ClassTag::Banner => "GameKeepBanner",
            ClassTag::Door => "GameKeepDoor",
            ClassTag::Patrol => "Patrol",
            ClassTag::TeleportStone => "FrontiersPortalStone",
        }
    }
}

impl FromStr for ClassTag {
    type Err = FactoryError;

    /// Accepts bare or namespace-qualified names (`DOL.GS.Keeps.GuardArcher`).
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let short = raw.trim().rsplit('.').next().unwrap_or_default();
        let tag = match short {
            "GuardArcher" => ClassTag::GuardArcher,
            "GuardCaster" => ClassTag::GuardCaster,
            "GuardFighter" => ClassTag::GuardFighter,
            "GuardHealer" => ClassTag::GuardHealer,
            "GuardStealther" => ClassTag::GuardStealther,
            "GuardLord" => ClassTag::GuardLord,
            "GameKeepBanner" | "Banner" => ClassTag::Banner,
            "GameKeepDoor" | "Door" => ClassTag::Door,
            "Patrol" => ClassTag::Patrol,
            "FrontiersPortalStone" | "TeleportStone" => ClassTag::TeleportStone,
            _ => return Err(FactoryError::UnknownTag(raw.to_string())),
        };
        Ok(tag)
    }
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct KeepObject {
    pub id: EntityId,
    pub tag: ClassTag,
    pub template_id: String,
    pub keep_id: KeepId,
    /// Component whose slot placed this object, if any.
    pub component_id: Option<u16>,
    /// Height tier of the slot the object currently occupies.
    pub slot_height: u8,
    /// `None` until a slot or template has placed it.
    pub position: Option<WorldPoint>,
    pub heading: u16,
    pub realm: Realm,
    pub guild: Option<String>,
    pub level: u8,
    pub in_world: bool,
    pub respawning: bool,
    /// Doors only.
    pub closed: bool,
}

impl KeepObject {
    pub fn is_placed(&self) -> bool {
        self.position.is_some()
    }

    pub fn place(&mut self, position: WorldPoint, heading: u16, slot_height: u8) {
        self.position = Some(position);
        self.heading = heading;
        self.slot_height = slot_height;
    }
}

/// A group of guards walking a route from one slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Patrol {
    pub template_id: String,
    pub component_id: u16,
    pub origin: WorldPoint,
    /// Keys of the member guards in the keep's guard map.
    pub members: Vec<String>,
}

impl Patrol {
    pub fn member_key(template_id: &str, index: usize) -> String {
        format!("{}#{}", template_id, index)
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Everything a constructor gets to build an object.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub id: EntityId,
    pub keep_id: KeepId,
    pub template_id: String,
    pub realm: Realm,
    pub guild: Option<String>,
    pub level: u8,
}

type Constructor = Box<dyn Fn(&SpawnRequest) -> Result<KeepObject, FactoryError> + Send + Sync>;

/// Maps each [`ClassTag`] to a constructor closure.
pub struct ObjectFactory {
    constructors: HashMap<ClassTag, Constructor>,
}

impl ObjectFactory {
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Constructors for every directly spawnable tag. Patrols are not
    /// built here; the keep expands them into member guards.
    pub fn standard() -> Self {
        let mut factory = Self::empty();
        for tag in [
            ClassTag::GuardArcher,
            ClassTag::GuardCaster,
            ClassTag::GuardFighter,
            ClassTag::GuardHealer,
            ClassTag::GuardStealther,
            ClassTag::GuardLord,
            ClassTag::Banner,
            ClassTag::Door,
            ClassTag::TeleportStone,
        ] {
            factory.register(tag, move |req| Ok(basic_object(tag, req)));
        }
        factory
    }

    pub fn register<F>(&mut self, tag: ClassTag, constructor: F)
    where
        F: Fn(&SpawnRequest) -> Result<KeepObject, FactoryError> + Send + Sync + 'static,
    {
        self.constructors.insert(tag, Box::new(constructor));
    }

    pub fn supports(&self, tag: ClassTag) -> bool {
        self.constructors.contains_key(&tag)
    }

    /// Parse `raw_tag` and run its constructor.
    pub fn create(&self, raw_tag: &str, request: &SpawnRequest) -> Result<KeepObject, FactoryError> {
        let tag: ClassTag = raw_tag.parse()?;
        self.create_tagged(tag, request)
    }

    pub fn create_tagged(
        &self,
        tag: ClassTag,
        request: &SpawnRequest,
    ) -> Result<KeepObject, FactoryError> {
        let constructor = self
            .constructors
            .get(&tag)
            .ok_or_else(|| FactoryError::Unregistered(tag.name().to_string()))?;
        constructor(request)
    }
}

impl Default for ObjectFactory {
    fn default() -> Self {
        Self::standard()
    }
}

fn basic_object(tag: ClassTag, req: &SpawnRequest) -> KeepObject {
    KeepObject {
        id: req.id,
        tag,
        template_id: req.template_id.clone(),
        keep_id: req.keep_id,
        component_id: None,
        slot_height: 0,
        position: None,
        heading: 0,
        realm: req.realm,
        guild: if tag == ClassTag::Door {
            None
        } else {
            req.guild.clone()
        },
        level: req.level,
        in_world: false,
        respawning: false,
        closed: tag == ClassTag::Door,
    }
}
