//! Read-only tunables for the keep subsystem.
//!
//! ## Sources (later wins)
//!
//! | Source                      | Example                                   |
//! |-----------------------------|-------------------------------------------|
//! | built-in defaults           | `KeepConfig::default()`                   |
//! | TOML file (optional)        | `structures_toughness_percent = 80`       |
//! | environment (`KEEPS_` vars) | `KEEPS_RULESET=pvp`                       |

use crate::types::Ruleset;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Client version from which towers can be raized.
pub const RAIZE_MIN_CLIENT_VERSION: u32 = 175;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepConfig {
    /// Enemy determination rules.
    pub ruleset: Ruleset,
    /// Region whose keeps count towards realm bonuses.
    pub frontier_region: u16,

    // -- structure damage -------------------------------------------------
    /// Global scale applied to all damage against structures.
    pub structures_toughness_percent: i32,
    /// When false, non-player attackers do no structure damage at all.
    pub allow_pet_siege_damage: bool,
    /// Scale applied to non-player structure damage.
    pub pet_damage_multiplier_percent: i32,
    /// Extra scale for pets of siege summoner classes.
    pub summoner_pet_multiplier_percent: i32,
    /// Oldest client version the server admits.
    pub client_version_min: u32,
    /// Max health of a keep component at level 1.
    pub keep_component_base_health: i32,
    /// Max health of a tower component at level 1.
    pub tower_component_base_health: i32,

    // -- claim economy ----------------------------------------------------
    pub claim_min_bounty_points: i64,
    pub claim_interval_ms: u64,
    /// Delay before the first claim tick after a fresh claim.
    pub claim_first_tick_ms: u64,
    /// Members a player needs in their group nearby to claim a tower.
    pub tower_claim_group_size: usize,
    /// Per-level upgrade time for keeps. Towers use a fixed 12 minutes.
    pub keep_upgrade_interval_ms: u64,

    // -- repair -----------------------------------------------------------
    pub repair_interval_ms: u64,
    pub repair_percent: i32,
    /// How long after enemy damage a keep counts as in combat.
    pub in_combat_window_ms: u64,

    // -- areas & bonuses --------------------------------------------------
    pub keep_area_radius: i32,
    pub tower_area_radius: i32,
    pub portal_keep_area_radius: i32,
    /// Feature flag for realm-wide keep bonuses.
    pub live_keep_bonuses: bool,
    pub bonus_refresh_interval_ms: u64,
}

impl Default for KeepConfig {
    fn default() -> Self {
        Self {
            ruleset: Ruleset::Normal,
            frontier_region: 163,
            structures_toughness_percent: 100,
            allow_pet_siege_damage: true,
            pet_damage_multiplier_percent: 100,
            summoner_pet_multiplier_percent: 100,
            client_version_min: RAIZE_MIN_CLIENT_VERSION,
            keep_component_base_health: 10_000,
            tower_component_base_health: 6_000,
            claim_min_bounty_points: 500,
            claim_interval_ms: 60 * 60 * 1000,
            claim_first_tick_ms: 1,
            tower_claim_group_size: 8,
            keep_upgrade_interval_ms: 20 * 60 * 1000,
            repair_interval_ms: 30 * 60 * 1000,
            repair_percent: 5,
            in_combat_window_ms: 5 * 60 * 1000,
            keep_area_radius: 3000,
            tower_area_radius: 1500,
            portal_keep_area_radius: 4000,
            live_keep_bonuses: false,
            bonus_refresh_interval_ms: 60 * 1000,
        }
    }
}

impl KeepConfig {
    /// Layer an optional TOML file and `KEEPS_*` environment variables over
    /// the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(config::Environment::with_prefix("KEEPS").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Whether towers can be raized given the admitted client range.
    pub fn raize_enabled(&self) -> bool {
        self.client_version_min >= RAIZE_MIN_CLIENT_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_without_sources_yields_defaults() {
        let cfg = KeepConfig::load(None).unwrap();
        assert_eq!(cfg.claim_min_bounty_points, 500);
        assert_eq!(cfg.repair_interval_ms, 1_800_000);
        assert_eq!(cfg.ruleset, Ruleset::Normal);
    }

    #[test]
    fn raize_gate_follows_client_version() {
        let mut cfg = KeepConfig::default();
        assert!(cfg.raize_enabled());
        cfg.client_version_min = 168;
        assert!(!cfg.raize_enabled());
    }
}
