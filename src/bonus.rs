//! Realm-wide bonuses earned by holding frontier keeps.
//!
//! Counts are cached and refreshed on a schedule by the driver; a bonus
//! check never walks the registry.

use crate::registry::KeepRegistry;
use crate::types::Realm;
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepBonus {
    CoinDrop3,
    Experience3,
    BountyPoints3,
    CraftTimers3,
    CoinDrop5,
    Experience5,
    BountyPoints5,
    CraftTimers5,
    ResourcePool,
    Regeneration,
    CriticalChance,
}

impl KeepBonus {
    pub const ALL: [KeepBonus; 11] = [
        KeepBonus::CoinDrop3,
        KeepBonus::Experience3,
        KeepBonus::BountyPoints3,
        KeepBonus::CraftTimers3,
        KeepBonus::CoinDrop5,
        KeepBonus::Experience5,
        KeepBonus::BountyPoints5,
        KeepBonus::CraftTimers5,
        KeepBonus::ResourcePool,
        KeepBonus::Regeneration,
        KeepBonus::CriticalChance,
    ];

    /// Keeps a realm must hold for this bonus.
    pub fn threshold(&self) -> usize {
        match self {
            KeepBonus::CoinDrop3
            | KeepBonus::Experience3
            | KeepBonus::BountyPoints3
            | KeepBonus::CraftTimers3 => 3,
            KeepBonus::CoinDrop5
            | KeepBonus::Experience5
            | KeepBonus::BountyPoints5
            | KeepBonus::CraftTimers5 => 5,
            KeepBonus::ResourcePool | KeepBonus::Regeneration | KeepBonus::CriticalChance => 8,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RealmBonusTracker {
    enabled: bool,
    keeps: [usize; 3],
    towers: [usize; 3],
    refreshed_at: Option<u64>,
}

impl RealmBonusTracker {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Re-read held counts from the registry.
    pub fn refresh(&mut self, registry: &KeepRegistry, now: u64) {
        for realm in Realm::PLAYABLE {
            if let Some(i) = realm.index() {
                self.keeps[i] = registry.keep_count_by_realm(realm);
                self.towers[i] = registry.tower_count_by_realm(realm);
            }
        }
        self.refreshed_at = Some(now);
        debug!("Realm bonus counts: keeps {:?}, towers {:?}", self.keeps, self.towers);
    }

    pub fn refreshed_at(&self) -> Option<u64> {
        self.refreshed_at
    }

    pub fn keep_count(&self, realm: Realm) -> usize {
        realm.index().map(|i| self.keeps[i]).unwrap_or_default()
    }

    pub fn tower_count(&self, realm: Realm) -> usize {
        realm.index().map(|i| self.towers[i]).unwrap_or_default()
    }

    pub fn has_bonus(&self, bonus: KeepBonus, realm: Realm) -> bool {
        self.enabled && self.keep_count(realm) >= bonus.threshold()
    }

    /// Every bonus `realm` currently qualifies for.
    pub fn bonuses(&self, realm: Realm) -> Vec<KeepBonus> {
        KeepBonus::ALL
            .into_iter()
            .filter(|b| self.has_bonus(*b, realm))
            .collect()
    }
}
