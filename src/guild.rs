//! Guild collaborator: bounty/realm points, claim slot and permissions.
//!
//! Guilds are shared between keeps and guild-side actions, so each lives
//! behind its own lock. Lock order is always keep → guild.

use crate::types::{KeepId, PlayerId, Realm};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub type GuildHandle = Arc<Mutex<Guild>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuildPermission {
    Claim,
    Upgrade,
}

#[derive(Debug, Clone)]
pub struct Guild {
    pub name: String,
    pub realm: Realm,
    pub bounty_points: i64,
    pub realm_points: i64,
    pub claimed_keep: Option<KeepId>,
    grants: HashMap<GuildPermission, HashSet<PlayerId>>,
}

impl Guild {
    pub fn new(name: impl Into<String>, realm: Realm) -> Self {
        Self {
            name: name.into(),
            realm,
            bounty_points: 0,
            realm_points: 0,
            claimed_keep: None,
            grants: HashMap::new(),
        }
    }

    pub fn with_bounty_points(mut self, points: i64) -> Self {
        self.bounty_points = points;
        self
    }

    pub fn into_handle(self) -> GuildHandle {
        Arc::new(Mutex::new(self))
    }

    pub fn grant(&mut self, player: PlayerId, permission: GuildPermission) {
        self.grants.entry(permission).or_default().insert(player);
    }

    pub fn revoke(&mut self, player: PlayerId, permission: GuildPermission) {
        if let Some(set) = self.grants.get_mut(&permission) {
            set.remove(&player);
        }
    }

    pub fn has_permission(&self, player: PlayerId, permission: GuildPermission) -> bool {
        self.grants
            .get(&permission)
            .is_some_and(|set| set.contains(&player))
    }

    pub fn gain_bounty_points(&mut self, amount: i64) {
        self.bounty_points += amount;
    }

    pub fn gain_realm_points(&mut self, amount: i64) {
        self.realm_points += amount;
    }
}

/// Acting player as seen by the keep subsystem.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub realm: Realm,
    pub guild: Option<GuildHandle>,
    /// Group members (including the player) standing near the keep.
    pub nearby_group_members: usize,
    pub privileged: bool,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>, realm: Realm) -> Self {
        Self {
            id,
            name: name.into(),
            realm,
            guild: None,
            nearby_group_members: 1,
            privileged: false,
        }
    }

    pub fn in_guild(mut self, guild: GuildHandle) -> Self {
        self.guild = Some(guild);
        self
    }

    pub fn guild_name(&self) -> Option<String> {
        self.guild.as_ref().map(|g| g.lock().name.clone())
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Lookup of guilds by name, used when restoring persisted claims.
pub trait GuildDirectory: Send + Sync {
    fn find(&self, name: &str) -> Option<GuildHandle>;
}

#[derive(Default)]
pub struct GuildRoster {
    guilds: RwLock<HashMap<String, GuildHandle>>,
}

impl GuildRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, guild: GuildHandle) -> GuildHandle {
        let name = guild.lock().name.clone();
        self.guilds.write().insert(name, guild.clone());
        guild
    }

    pub fn len(&self) -> usize {
        self.guilds.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guilds.read().is_empty()
    }
}

impl GuildDirectory for GuildRoster {
    fn find(&self, name: &str) -> Option<GuildHandle> {
        self.guilds.read().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityId;

    #[test]
    fn permissions_are_per_player() {
        let mut g = Guild::new("Wardens", Realm::Albion);
        g.grant(EntityId(1), GuildPermission::Claim);
        assert!(g.has_permission(EntityId(1), GuildPermission::Claim));
        assert!(!g.has_permission(EntityId(1), GuildPermission::Upgrade));
        assert!(!g.has_permission(EntityId(2), GuildPermission::Claim));
        g.revoke(EntityId(1), GuildPermission::Claim);
        assert!(!g.has_permission(EntityId(1), GuildPermission::Claim));
    }

    #[test]
    fn roster_finds_by_name() {
        let roster = GuildRoster::new();
        roster.insert(Guild::new("Wardens", Realm::Albion).into_handle());
        assert!(roster.find("Wardens").is_some());
        assert!(roster.find("Nobody").is_none());
    }
}
