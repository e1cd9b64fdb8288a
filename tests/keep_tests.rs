//! Keep lifecycle tests: claim, claim ticks, release, upgrade, capture, reset.

mod support;

#[cfg(test)]
mod tests {
    use super::support::*;
    use realm_keeps::{
        config::KeepConfig,
        error::{ClaimRejection, KeepError, UpgradeRejection},
        guild::Player,
        protocol::{KeepEventKind, Outbound},
        store::KeepObjectRow,
        types::{EntityId, KeepId, KeepType, Realm},
        world::WorldView,
    };
    use std::sync::Barrier;

    const HOUR: u64 = 60 * 60 * 1000;

    // -----------------------------------------------------------------------
    // Claim eligibility
    // -----------------------------------------------------------------------

    #[test]
    fn claim_needs_enough_bounty_points() {
        let fx = fixture();
        let guild = fx.guild("Wardens", Realm::Albion, 499);
        let officer = fx.officer(1, Realm::Albion, &guild);
        let keep = fx.keep(BENOWYC);
        let keep = keep.lock();

        assert_eq!(
            keep.claim_eligibility(&officer),
            Err(ClaimRejection::InsufficientBountyPoints { required: 500 })
        );
        assert!(!keep.check_claim_eligibility(&officer));
        assert_eq!(
            fx.chat(),
            vec!["Your guild must have at least 500 guild bounty points to claim.".to_string()]
        );
    }

    #[test]
    fn claim_rejections_cover_realm_guild_and_permission() {
        let fx = fixture();
        let keep = fx.keep(BENOWYC);
        let keep = keep.lock();

        let stranger = Player::new(EntityId(2), "stranger", Realm::Midgard);
        assert_eq!(keep.claim_eligibility(&stranger), Err(ClaimRejection::WrongRealm));

        let loner = Player::new(EntityId(3), "loner", Realm::Albion);
        assert_eq!(keep.claim_eligibility(&loner), Err(ClaimRejection::NoGuild));

        let guild = fx.guild("Wardens", Realm::Albion, 5_000);
        let recruit = Player::new(EntityId(4), "recruit", Realm::Albion).in_guild(guild);
        assert_eq!(keep.claim_eligibility(&recruit), Err(ClaimRejection::NoPermission));
    }

    #[test]
    fn tower_claim_needs_a_full_group() {
        let fx = fixture();
        let guild = fx.guild("Wardens", Realm::Albion, 5_000);
        let mut officer = fx.officer(1, Realm::Albion, &guild);
        let tower = fx.keep(BENOWYC_TOWER);
        let tower = tower.lock();

        officer.nearby_group_members = 3;
        assert_eq!(
            tower.claim_eligibility(&officer),
            Err(ClaimRejection::GroupTooSmall { have: 3, required: 8 })
        );
        officer.nearby_group_members = 8;
        assert_eq!(tower.claim_eligibility(&officer), Ok(()));
    }

    // -----------------------------------------------------------------------
    // Claim
    // -----------------------------------------------------------------------

    #[test]
    fn claim_binds_guild_and_keep_exclusively() {
        let fx = fixture();
        let guild = fx.guild("Wardens", Realm::Albion, 5_000);
        let officer = fx.officer(1, Realm::Albion, &guild);

        let benowyc = fx.keep(BENOWYC);
        benowyc.lock().claim(&officer).unwrap();
        assert_eq!(guild.lock().claimed_keep, Some(KeepId(BENOWYC)));
        assert_eq!(benowyc.lock().guild_name().as_deref(), Some("Wardens"));
        assert!(benowyc
            .lock()
            .guards()
            .values()
            .all(|g| g.guild.as_deref() == Some("Wardens")));

        // Same guild, second keep.
        let erasleigh = fx.keep(ERASLEIGH);
        assert_eq!(
            erasleigh.lock().claim(&officer),
            Err(ClaimRejection::GuildOwnsKeep)
        );

        // Another guild, same keep.
        let rivals = fx.guild("Rivals", Realm::Albion, 5_000);
        let rival = fx.officer(2, Realm::Albion, &rivals);
        assert_eq!(
            benowyc.lock().claim(&rival),
            Err(ClaimRejection::AlreadyClaimed)
        );
        assert_eq!(rivals.lock().claimed_keep, None);
    }

    #[test]
    fn concurrent_claims_leave_the_guild_one_keep() {
        for _ in 0..50 {
            let fx = fixture();
            let guild = fx.guild("Wardens", Realm::Albion, 5_000);
            let officer = fx.officer(1, Realm::Albion, &guild);
            let barrier = Barrier::new(2);

            let results: Vec<_> = std::thread::scope(|s| {
                let handles: Vec<_> = [BENOWYC, ERASLEIGH]
                    .into_iter()
                    .map(|id| {
                        let keep = fx.keep(id);
                        let (officer, barrier) = (&officer, &barrier);
                        s.spawn(move || {
                            barrier.wait();
                            keep.lock().claim(officer)
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            assert!(results.contains(&Err(ClaimRejection::GuildOwnsKeep)));
            let claimed = [BENOWYC, ERASLEIGH]
                .into_iter()
                .filter(|id| fx.keep(*id).lock().is_claimed())
                .count();
            assert_eq!(claimed, 1);
        }
    }

    #[test]
    fn claim_announces_and_arms_the_claim_timer() {
        let fx = fixture();
        let guild = fx.guild("Wardens", Realm::Albion, 5_000);
        let officer = fx.officer(1, Realm::Albion, &guild);
        let keep = fx.keep(BENOWYC);
        let mut keep = keep.lock();

        keep.claim(&officer).unwrap();

        assert!(fx
            .chat()
            .contains(&"Wardens has taken control of Caer Benowyc!".to_string()));
        assert!(fx.messages().iter().any(|m| matches!(
            m,
            Outbound::Event(e) if e.kind == KeepEventKind::Claimed
        )));
        assert!(fx
            .messages()
            .iter()
            .any(|m| matches!(m, Outbound::Claim(c) if c.guild == "Wardens")));
        assert_eq!(keep.claim_timer().deadline(), Some(START_MS + 1));
        assert_eq!(keep.claim_timer().interval(), Some(HOUR));
        assert_eq!(
            fx.store.keep_row(KeepId(BENOWYC)).unwrap().claimed_guild.as_deref(),
            Some("Wardens")
        );
    }

    #[test]
    fn claim_dialog_requires_confirmation() {
        let fx = fixture();
        let guild = fx.guild("Wardens", Realm::Albion, 5_000);
        let officer = fx.officer(1, Realm::Albion, &guild);
        let keep = fx.keep(BENOWYC);
        let mut keep = keep.lock();

        assert_eq!(
            keep.confirm_claim(&officer, true),
            Err(ClaimRejection::NotPending)
        );

        assert!(keep.request_claim(&officer));
        assert!(fx
            .messages()
            .iter()
            .any(|m| matches!(m, Outbound::Dialog(d) if d.keep_id == KeepId(BENOWYC))));

        keep.confirm_claim(&officer, false).unwrap();
        assert!(!keep.is_claimed());

        assert!(keep.request_claim(&officer));
        keep.confirm_claim(&officer, true).unwrap();
        assert!(keep.is_claimed());
    }

    // -----------------------------------------------------------------------
    // Claim ticks
    // -----------------------------------------------------------------------

    #[test]
    fn first_claim_tick_charges_the_level_cost() {
        let fx = fixture();
        let guild = fx.guild("Wardens", Realm::Albion, 600);
        let officer = fx.officer(1, Realm::Albion, &guild);
        let keep = fx.keep(BENOWYC);
        let mut keep = keep.lock();
        keep.claim(&officer).unwrap();

        fx.clock.advance(1);
        assert_eq!(keep.advance(), 1);
        assert_eq!(guild.lock().bounty_points, 550);
        assert_eq!(guild.lock().realm_points, 0);
    }

    #[test]
    fn claim_is_released_once_upkeep_cannot_be_paid() {
        let fx = fixture();
        let guild = fx.guild("Wardens", Realm::Albion, 600);
        let officer = fx.officer(1, Realm::Albion, &guild);
        let keep = fx.keep(BENOWYC);
        let mut keep = keep.lock();
        keep.claim(&officer).unwrap();

        fx.clock.advance(1);
        keep.advance();
        for _ in 0..11 {
            fx.clock.advance(HOUR);
            keep.advance();
        }
        assert!(keep.is_claimed());
        assert_eq!(guild.lock().bounty_points, 0);

        fx.clock.advance(HOUR);
        keep.advance();
        assert!(!keep.is_claimed());
        assert_eq!(guild.lock().claimed_keep, None);
        assert!(!keep.claim_timer().is_armed());
    }

    #[test]
    fn tower_ticks_earn_realm_points_at_a_tenth_of_the_cost() {
        let fx = fixture();
        let guild = fx.guild("Wardens", Realm::Albion, 1_000);
        let mut officer = fx.officer(1, Realm::Albion, &guild);
        officer.nearby_group_members = 8;
        let tower = fx.keep(BENOWYC_TOWER);
        let mut tower = tower.lock();
        tower.claim(&officer).unwrap();

        assert_eq!(tower.claim_cost(), 5);
        assert_eq!(tower.realm_points_per_tick(), 200);

        tower.claim_tick();
        assert_eq!(guild.lock().bounty_points, 995);
        assert_eq!(guild.lock().realm_points, 200);
    }

    #[test]
    fn claim_cost_follows_level_table() {
        let fx = fixture();
        let keep = fx.keep(BENOWYC);
        let mut keep = keep.lock();
        let costs: Vec<i64> = (1..=10)
            .map(|level| {
                keep.change_level(level);
                keep.claim_cost()
            })
            .collect();
        assert_eq!(costs, vec![50, 50, 50, 50, 100, 200, 300, 400, 500, 1000]);
    }

    // -----------------------------------------------------------------------
    // Release
    // -----------------------------------------------------------------------

    #[test]
    fn release_resets_level_and_ownership() {
        let fx = fixture();
        let guild = fx.guild("Wardens", Realm::Albion, 5_000);
        let officer = fx.officer(1, Realm::Albion, &guild);
        let keep = fx.keep(BENOWYC);
        let mut keep = keep.lock();
        keep.claim(&officer).unwrap();
        keep.upgrade(3).unwrap();
        assert_eq!(keep.level(), 2);

        keep.release();

        assert_eq!(keep.level(), 1);
        assert_eq!(keep.target_level(), 1);
        assert!(keep.guild().is_none());
        assert_eq!(guild.lock().claimed_keep, None);
        assert!(!keep.claim_timer().is_armed());
        assert!(!keep.upgrade_timer().is_armed());
        assert!(keep.guards().values().all(|g| g.guild.is_none()));
        assert!(fx
            .chat()
            .contains(&"Your guild has lost the claim of Caer Benowyc.".to_string()));
    }

    #[test]
    fn release_of_unclaimed_keep_is_harmless() {
        let fx = fixture();
        let keep = fx.keep(ERASLEIGH);
        let mut keep = keep.lock();
        keep.release();
        assert_eq!(keep.level(), 1);
        assert!(!keep.is_claimed());
    }

    // -----------------------------------------------------------------------
    // Upgrade
    // -----------------------------------------------------------------------

    #[test]
    fn upgrade_converges_on_target_level() {
        let fx = fixture();
        let guild = fx.guild("Wardens", Realm::Albion, 50_000);
        let officer = fx.officer(1, Realm::Albion, &guild);
        let keep = fx.keep(BENOWYC);
        let mut keep = keep.lock();
        keep.claim(&officer).unwrap();

        keep.upgrade(4).unwrap();
        assert_eq!(keep.level(), 2);
        assert_eq!(keep.upgrade_timer().delay(), Some(20 * 60 * 1000));

        fx.clock.advance(20 * 60 * 1000);
        keep.advance();
        assert_eq!(keep.level(), 3);
        assert!(keep.upgrade_timer().is_armed());

        fx.clock.advance(20 * 60 * 1000);
        keep.advance();
        assert_eq!(keep.level(), 4);
        assert!(!keep.upgrade_timer().is_armed());

        fx.clock.advance(20 * 60 * 1000);
        keep.advance();
        assert_eq!(keep.level(), 4);
        assert!(fx
            .chat()
            .contains(&"The keep Caer Benowyc is upgraded to level 4!".to_string()));
    }

    #[test]
    fn tower_upgrades_take_twelve_minutes_per_level() {
        let fx = fixture();
        let guild = fx.guild("Wardens", Realm::Albion, 5_000);
        let mut officer = fx.officer(1, Realm::Albion, &guild);
        officer.nearby_group_members = 8;
        let tower = fx.keep(BENOWYC_TOWER);
        let mut tower = tower.lock();
        tower.claim(&officer).unwrap();

        tower.upgrade(3).unwrap();
        assert_eq!(tower.upgrade_timer().delay(), Some(12 * 60 * 1000));
    }

    #[test]
    fn single_step_upgrade_does_not_arm_the_timer() {
        let fx = fixture();
        let keep = fx.keep(BENOWYC);
        let mut keep = keep.lock();
        keep.upgrade(2).unwrap();
        assert_eq!(keep.level(), 2);
        assert!(!keep.upgrade_timer().is_armed());
    }

    #[test]
    fn upgrade_rejects_targets_at_or_below_level() {
        let fx = fixture();
        let keep = fx.keep(BENOWYC);
        let mut keep = keep.lock();
        keep.change_level(5);
        assert!(matches!(keep.upgrade(5), Err(KeepError::InvalidLevel(5))));
        assert!(matches!(keep.upgrade(11), Err(KeepError::InvalidLevel(11))));
        assert_eq!(keep.level(), 5);
    }

    #[test]
    fn upgrade_eligibility_requires_owning_guild() {
        let fx = fixture();
        let guild = fx.guild("Wardens", Realm::Albion, 5_000);
        let officer = fx.officer(1, Realm::Albion, &guild);
        let rivals = fx.guild("Rivals", Realm::Albion, 5_000);
        let rival = fx.officer(2, Realm::Albion, &rivals);
        let keep = fx.keep(BENOWYC);
        let mut keep = keep.lock();
        keep.claim(&officer).unwrap();

        assert_eq!(keep.upgrade_eligibility(&officer, 5), Ok(()));
        assert_eq!(
            keep.upgrade_eligibility(&rival, 5),
            Err(UpgradeRejection::NotOwner)
        );
        assert_eq!(
            keep.upgrade_eligibility(&officer, 1),
            Err(UpgradeRejection::InvalidTarget(1))
        );

        let member = Player::new(EntityId(3), "member", Realm::Albion).in_guild(guild.clone());
        assert!(!keep.check_upgrade_eligibility(&member, 5));
        assert!(fx
            .chat()
            .contains(&"You do not have permission to upgrade for your guild.".to_string()));
    }

    // -----------------------------------------------------------------------
    // Capture & reset
    // -----------------------------------------------------------------------

    #[test]
    fn killing_the_lord_hands_the_keep_to_the_killers() {
        let fx = fixture();
        let guild = fx.guild("Wardens", Realm::Albion, 5_000);
        let officer = fx.officer(1, Realm::Albion, &guild);
        let keep = fx.keep(BENOWYC);
        let old_lord = {
            let mut k = keep.lock();
            k.claim(&officer).unwrap();
            k.upgrade(3).unwrap();
            k.lord().unwrap().id
        };

        fx.registry.on_entity_died(old_lord, Realm::Midgard);

        let k = keep.lock();
        assert_eq!(k.realm(), Realm::Midgard);
        assert_eq!(k.original_realm(), Realm::Midgard);
        assert_eq!(
            fx.store.keep_row(KeepId(BENOWYC)).unwrap().original_realm,
            Realm::Midgard
        );
        assert_eq!(k.level(), 1);
        assert_eq!(k.keep_type(), KeepType::Melee);
        assert!(k.guild().is_none());
        assert_eq!(guild.lock().claimed_keep, None);

        let captures = fx
            .chat()
            .iter()
            .filter(|l| *l == "The Forces of Midgard have captured Caer Benowyc!")
            .count();
        assert_eq!(captures, 3);
        assert!(fx.messages().iter().any(|m| matches!(
            m,
            Outbound::Event(e) if e.kind == KeepEventKind::Captured && e.realm == Realm::Midgard
        )));

        let new_lord = k.lord().unwrap();
        assert_ne!(new_lord.id, old_lord);
        assert_eq!(new_lord.realm, Realm::Midgard);
        assert!(fx.services.deaths.watchers(old_lord).is_empty());
        assert_eq!(fx.services.deaths.watchers(new_lord.id).len(), 1);
        assert!(!fx.world.contains(old_lord));
        assert!(fx.world.contains(new_lord.id));
    }

    #[test]
    fn reset_keeps_template_doors_and_stone_in_place() {
        let mut data = seed();
        for (template_id, class_type) in [("gate", "GameKeepDoor"), ("stone", "FrontiersPortalStone")] {
            data.keep_objects.push(KeepObjectRow {
                keep_id: KeepId(BENOWYC),
                template_id: template_id.into(),
                class_type: class_type.into(),
                realm: None,
                keep_type: KeepType::Any,
                x: 0,
                y: 100,
                z: 0,
                heading: 0,
            });
        }
        let fx = Fixture::unloaded(data, KeepConfig::default());
        fx.registry.load().unwrap();
        let keep = fx.keep(BENOWYC);
        let mut keep = keep.lock();
        let gate = keep.doors()["gate"].id;
        let stone = keep.teleport_stone().unwrap().id;
        let objects = fx.world.len();

        keep.reset(Realm::Midgard);

        assert_eq!(keep.doors()["gate"].id, gate);
        assert_eq!(keep.doors()["gate"].realm, Realm::Midgard);
        assert_eq!(keep.teleport_stone().unwrap().id, stone);
        assert!(fx.world.contains(gate));
        assert!(fx.world.contains(stone));
        assert_eq!(fx.world.len(), objects);
    }

    #[test]
    fn reset_repairs_components_and_clears_combat() {
        let fx = fixture();
        let keep = fx.keep(BENOWYC);
        let mut keep = keep.lock();
        keep.take_damage(1, &player_hit(Realm::Midgard, 2_000)).unwrap();
        assert!(keep.in_combat());

        keep.reset(Realm::Hibernia);

        assert!(!keep.in_combat());
        assert_eq!(keep.realm(), Realm::Hibernia);
        let comp = keep.component(1).unwrap();
        assert_eq!(comp.health(), comp.max_health());
        assert!(keep.doors().values().all(|d| d.closed && d.realm == Realm::Hibernia));
        assert!(keep.guards().values().all(|g| g.realm == Realm::Hibernia));
    }

    #[test]
    fn in_combat_window_expires() {
        let fx = fixture();
        let keep = fx.keep(BENOWYC);
        let mut keep = keep.lock();
        assert!(!keep.in_combat());

        // Own-realm damage does not count.
        keep.take_damage(1, &player_hit(Realm::Albion, 100)).unwrap();
        assert!(!keep.in_combat());

        keep.take_damage(1, &player_hit(Realm::Midgard, 100)).unwrap();
        assert!(keep.in_combat());
        fx.clock.advance(5 * 60 * 1000);
        assert!(!keep.in_combat());
    }

    #[test]
    fn region_entry_sends_keep_and_component_info() {
        let fx = fixture();
        let keep = fx.keep(BENOWYC);
        keep.lock().send_init(EntityId(77));

        let msgs = fx.messages();
        assert!(matches!(&msgs[0], Outbound::KeepInfo(i) if i.name == "Caer Benowyc"));
        let components = msgs
            .iter()
            .filter(|m| matches!(m, Outbound::ComponentInfo(_)))
            .count();
        assert_eq!(components, 2);
    }
}
