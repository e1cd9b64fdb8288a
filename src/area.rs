//! Proximity areas around keeps and towers.

use crate::config::KeepConfig;
use crate::keep::Keep;
use crate::protocol::{Audience, ChatKind, Outbound};
use crate::types::{KeepId, PlayerId, WorldPoint};
use crate::world::Services;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaClass {
    Keep,
    Tower,
    PortalKeep,
}

impl AreaClass {
    pub fn of(keep: &Keep) -> Self {
        if keep.is_portal_keep() {
            AreaClass::PortalKeep
        } else if keep.is_tower() {
            AreaClass::Tower
        } else {
            AreaClass::Keep
        }
    }

    pub fn radius(&self, config: &KeepConfig) -> i32 {
        match self {
            AreaClass::Keep => config.keep_area_radius,
            AreaClass::Tower => config.tower_area_radius,
            AreaClass::PortalKeep => config.portal_keep_area_radius,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProximityArea {
    pub keep_id: KeepId,
    pub region: u16,
    pub center: WorldPoint,
    pub radius: i32,
    pub class: AreaClass,
}

impl ProximityArea {
    pub fn for_keep(keep: &Keep, config: &KeepConfig) -> Self {
        let class = AreaClass::of(keep);
        Self {
            keep_id: keep.id(),
            region: keep.region(),
            center: keep.position(),
            radius: class.radius(config),
            class,
        }
    }

    pub fn contains(&self, region: u16, point: &WorldPoint) -> bool {
        let r = self.radius as i64;
        region == self.region && self.center.distance_sq_2d(point) <= r * r
    }

    /// Tell an arriving player who holds the keep. Returns whether a
    /// message was sent.
    pub fn on_enter(&self, player: PlayerId, keep: &Keep, services: &Services) -> bool {
        let Some(guild) = keep.guild_name() else {
            return false;
        };
        services.send(
            Audience::Player { id: player },
            Outbound::chat(
                ChatKind::System,
                format!("{} is controlled by {}.", keep.name(), guild),
            ),
        );
        true
    }
}
