//! Core keep types shared across all modules.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Basic math
// ---------------------------------------------------------------------------

/// Heading units per full turn.
pub const HEADING_UNITS: f64 = 4096.0;

/// Sum of two headings, wrapped to one turn. Inputs may be unnormalized.
pub fn add_headings(a: u16, b: u16) -> u16 {
    ((a as u32 + b as u32) % HEADING_UNITS as u32) as u16
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct WorldPoint {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl WorldPoint {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Squared planar distance. Callers compare against `radius * radius`.
    pub fn distance_sq_2d(&self, other: &WorldPoint) -> i64 {
        let dx = (self.x - other.x) as i64;
        let dy = (self.y - other.y) as i64;
        dx * dx + dy * dy
    }

    /// Offset this point by `(dx, dy, dz)` rotated by `heading`.
    pub fn offset_rotated(&self, dx: i32, dy: i32, dz: i32, heading: u16) -> WorldPoint {
        let angle = heading as f64 * std::f64::consts::TAU / HEADING_UNITS;
        let (sin, cos) = angle.sin_cos();
        let rx = dx as f64 * cos - dy as f64 * sin;
        let ry = dx as f64 * sin + dy as f64 * cos;
        WorldPoint::new(
            self.x + rx.round() as i32,
            self.y + ry.round() as i32,
            self.z + dz,
        )
    }
}

impl std::fmt::Display for WorldPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Keep identifier. The high byte encodes the tower index; the low byte the
/// parent keep it is linked to.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct KeepId(pub u32);

impl KeepId {
    pub fn is_tower(&self) -> bool {
        self.0 >> 8 != 0
    }

    pub fn tower_index(&self) -> u32 {
        self.0 / 256
    }

    pub fn linked_keep_id(&self) -> KeepId {
        KeepId(self.0 - ((self.0 >> 8) << 8))
    }
}

impl std::fmt::Display for KeepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "keep#{}", self.0)
    }
}

/// Identifier of any simulated entity (guard, banner, siege engine, player…).
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

pub type PlayerId = EntityId;

// ---------------------------------------------------------------------------
// Realm / classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Realm {
    #[default]
    None,
    Albion,
    Midgard,
    Hibernia,
}

impl Realm {
    pub const PLAYABLE: [Realm; 3] = [Realm::Albion, Realm::Midgard, Realm::Hibernia];

    /// Index into per-realm tables (difficulty, counts). `None` has no slot.
    pub fn index(&self) -> Option<usize> {
        match self {
            Realm::None => None,
            Realm::Albion => Some(0),
            Realm::Midgard => Some(1),
            Realm::Hibernia => Some(2),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Realm::None => "None",
            Realm::Albion => "Albion",
            Realm::Midgard => "Midgard",
            Realm::Hibernia => "Hibernia",
        }
    }
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeepType {
    /// Unclaimed default; guards behave like melee.
    #[default]
    Generic,
    Melee,
    Magic,
    Stealth,
    /// Position filter only: matches every keep type.
    Any,
}

impl KeepType {
    /// Whether a slot filtered by `self` applies to a keep of type `keep`.
    pub fn admits(&self, keep: KeepType) -> bool {
        match self {
            KeepType::Any => true,
            KeepType::Generic => matches!(keep, KeepType::Generic | KeepType::Melee),
            other => *other == keep,
        }
    }
}

/// Keep vs Tower variant. Towers carry their own claim economics and raize rules.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepKind {
    Keep,
    Tower,
}

/// Server ruleset used for enemy determination.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Ruleset {
    #[default]
    Normal,
    Pvp,
    Pve,
}

/// Component status as sent to clients.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Normal = 0x00,
    Broken = 0x01,
    Raized = 0x02,
}

impl ComponentStatus {
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

// ---------------------------------------------------------------------------
// Combat participants
// ---------------------------------------------------------------------------

/// Character classes that matter to structure damage.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterClass {
    Theurgist,
    Animist,
    Bonedancer,
    Spiritmaster,
    Cabalist,
    Enchanter,
    Druid,
    Other,
}

impl CharacterClass {
    /// Pet-summoning classes whose pets take the extra structure multiplier.
    pub fn is_siege_summoner(&self) -> bool {
        matches!(
            self,
            CharacterClass::Theurgist | CharacterClass::Animist | CharacterClass::Bonedancer
        )
    }
}

/// Who is swinging at a structure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Attacker {
    Player { id: PlayerId, realm: Realm },
    Pet { owner_class: CharacterClass, realm: Realm },
    Npc { realm: Realm },
}

impl Attacker {
    pub fn realm(&self) -> Realm {
        match self {
            Attacker::Player { realm, .. } | Attacker::Pet { realm, .. } | Attacker::Npc { realm } => {
                *realm
            }
        }
    }
}

/// Damage packet headed for a structural component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttackData {
    pub attacker: Attacker,
    pub damage: i32,
    pub style_damage: i32,
}

impl AttackData {
    pub fn total(&self) -> i32 {
        self.damage + self.style_damage
    }
}

/// Target side of an enemy check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combatant {
    pub realm: Realm,
    pub guild: Option<String>,
    pub is_player: bool,
    /// GM / admin accounts are never enemies.
    pub privileged: bool,
}
