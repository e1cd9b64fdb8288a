//! Hookpoint occupancy, eviction and occupant death.

mod support;

#[cfg(test)]
mod tests {
    use super::support::*;
    use realm_keeps::{
        error::KeepError,
        hookpoint::{Occupant, EVICTION_MS, GRACE_MS},
        store::HookPointItemRow,
        types::{EntityId, KeepId, Realm, WorldPoint},
        world::WorldView,
    };

    fn ram(fx: &Fixture, id: u64) -> EntityId {
        let entity = EntityId(id);
        fx.world.insert(entity, "ram", WorldPoint::default());
        entity
    }

    #[test]
    fn components_without_geometry_get_the_default_set() {
        let fx = fixture();
        let keep = fx.keep(BENOWYC);
        let keep = keep.lock();

        // skin 0 has no rows: 38 ground + 3 siege ids
        let comp1 = keep.component(1).unwrap();
        assert_eq!(comp1.hookpoints.len(), 41);
        assert!(comp1.hookpoint(0x41).is_some());
        assert!(comp1.hookpoint(0x81).is_some());

        let comp2 = keep.component(2).unwrap();
        let ids: Vec<u8> = comp2.hookpoints.keys().copied().collect();
        assert_eq!(ids, vec![1, 2, 65]);
    }

    #[test]
    fn geometry_is_placed_relative_to_the_component() {
        let fx = fixture();
        let keep = fx.keep(BENOWYC);
        let keep = keep.lock();
        let hp = keep.component(2).unwrap().hookpoint(2).unwrap();
        assert_eq!(hp.position.x, 100_000 + 500 + 20);
        assert_eq!(hp.position.y, 100_000);
    }

    #[test]
    fn occupant_is_evicted_then_cleared() {
        let fx = fixture();
        let engine = ram(&fx, 900_001);
        let keep = fx.keep(BENOWYC);
        let mut keep = keep.lock();

        keep.set_hookpoint_occupant(2, 1, Some(Occupant::siege_engine(engine)))
            .unwrap();
        let hp = keep.component(2).unwrap().hookpoint(1).unwrap();
        assert!(!hp.is_free());
        assert_eq!(hp.eviction_timer().deadline(), Some(START_MS + EVICTION_MS));

        fx.clock.advance(EVICTION_MS);
        keep.advance();
        assert!(!fx.world.contains(engine));
        assert_eq!(fx.world.released_controls(), vec![engine]);
        let hp = keep.component(2).unwrap().hookpoint(1).unwrap();
        assert!(hp.occupant().is_some_and(|o| o.deleted));
        assert_eq!(
            hp.eviction_timer().deadline(),
            Some(START_MS + EVICTION_MS + GRACE_MS)
        );

        fx.clock.advance(GRACE_MS);
        keep.advance();
        let hp = keep.component(2).unwrap().hookpoint(1).unwrap();
        assert!(hp.is_free());
        assert!(!hp.eviction_timer().is_armed());
    }

    #[test]
    fn replacing_an_occupant_keeps_the_original_countdown() {
        let fx = fixture();
        let first = ram(&fx, 900_001);
        let second = ram(&fx, 900_002);
        let keep = fx.keep(BENOWYC);
        let mut keep = keep.lock();

        keep.set_hookpoint_occupant(2, 1, Some(Occupant::siege_engine(first)))
            .unwrap();
        fx.clock.advance(60_000);
        keep.set_hookpoint_occupant(2, 1, Some(Occupant::siege_engine(second)))
            .unwrap();
        let hp = keep.component(2).unwrap().hookpoint(1).unwrap();
        assert_eq!(hp.occupant().map(|o| o.entity), Some(second));
        assert_eq!(hp.eviction_timer().deadline(), Some(START_MS + EVICTION_MS));
        assert_eq!(fx.services.deaths.watchers(first).len(), 0);
        assert_eq!(fx.services.deaths.watchers(second).len(), 1);
    }

    #[test]
    fn clearing_an_occupant_stops_the_timer() {
        let fx = fixture();
        let engine = ram(&fx, 900_001);
        let keep = fx.keep(BENOWYC);
        let mut keep = keep.lock();

        keep.set_hookpoint_occupant(1, 0x41, Some(Occupant::siege_engine(engine)))
            .unwrap();
        keep.set_hookpoint_occupant(1, 0x41, None).unwrap();
        let hp = keep.component(1).unwrap().hookpoint(0x41).unwrap();
        assert!(hp.is_free());
        assert!(!hp.eviction_timer().is_armed());
        assert!(fx.services.deaths.watchers(engine).is_empty());
    }

    #[test]
    fn unknown_hookpoint_is_an_error() {
        let fx = fixture();
        let keep = fx.keep(BENOWYC);
        let mut keep = keep.lock();
        let err = keep
            .set_hookpoint_occupant(2, 99, Some(Occupant::other(EntityId(900_001))))
            .unwrap_err();
        assert!(matches!(
            err,
            KeepError::HookPointNotFound { hookpoint: 99, component: 2, .. }
        ));
    }

    #[test]
    fn occupant_death_shortens_eviction_and_drops_the_item() {
        let fx = fixture();
        let engine = ram(&fx, 900_003);
        fx.store.add_hookpoint_item(HookPointItemRow {
            keep_id: KeepId(BENOWYC),
            component_id: 2,
            hookpoint_id: 65,
            class_type: "GameSiegeRam".into(),
        });
        {
            let keep = fx.keep(BENOWYC);
            let mut keep = keep.lock();
            keep.set_hookpoint_occupant(2, 65, Some(Occupant::other(engine)))
                .unwrap();
        }

        fx.clock.advance(60_000);
        fx.registry.on_entity_died(engine, Realm::Hibernia);

        let keep = fx.keep(BENOWYC);
        let keep = keep.lock();
        let hp = keep.component(2).unwrap().hookpoint(65).unwrap();
        assert_eq!(
            hp.eviction_timer().deadline(),
            Some(START_MS + 60_000 + GRACE_MS)
        );
        assert!(fx.services.deaths.watchers(engine).is_empty());
        assert!(fx.store.snapshot().hookpoint_items.is_empty());
    }

    #[test]
    fn reset_removes_occupants() {
        let fx = fixture();
        let engine = ram(&fx, 900_004);
        let keep = fx.keep(BENOWYC);
        let mut keep = keep.lock();
        keep.set_hookpoint_occupant(2, 2, Some(Occupant::siege_engine(engine)))
            .unwrap();

        keep.reset(Realm::Midgard);
        assert!(!fx.world.contains(engine));
    }
}
