//! Shortcut expansion against the sample tables.
//!
//! Covers weapon modes, spell slot levels, modifier arithmetic and the
//! full per-character rebuild.

use dnd_rules::character::{AbilityScores, CarriedWeapon, Character, CharacterQuery};
use dnd_rules::shortcuts::{DiceRollType, ShortcutError, ShortcutSource};
use dnd_rules::testing::{sample_barbarian, sample_wizard, InMemorySource, TestHarness};
use dnd_rules::time::TurnPart;
use dnd_rules::weapons::AttackType;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

fn names(shortcuts: &[dnd_rules::ActionShortcut]) -> Vec<&str> {
    shortcuts.iter().map(|s| s.name.as_str()).collect()
}

// ============================================================================
// Weapons
// ============================================================================

#[test]
fn test_melee_and_ranged_versatile_weapon_has_three_modes() {
    let harness = TestHarness::new();
    let shemo = sample_barbarian();

    let shortcuts = harness
        .engine
        .expand(&ShortcutSource::new("Spear", "Shemo"), &shemo)
        .unwrap();

    assert_eq!(
        names(&shortcuts),
        vec!["Spear (1H Stabbed)", "Spear (2H Slice)", "Spear (1H Thrown)"]
    );
    let attack_types: Vec<AttackType> = shortcuts.iter().map(|s| s.attack_type).collect();
    assert_eq!(
        attack_types,
        vec![AttackType::MELEE, AttackType::MELEE, AttackType::RANGE]
    );
    // Strength for the melee modes, dexterity for the throw.
    assert_eq!(shortcuts[0].dice, "1d6+3(piercing)");
    assert_eq!(shortcuts[1].dice, "1d8+3(piercing)");
    assert_eq!(shortcuts[2].dice, "1d6+2(piercing)");
    assert!(shortcuts.iter().all(|s| s.proficiency_bonus == 3));
}

#[test]
fn test_versatile_melee_weapon_has_two_modes() {
    let harness = TestHarness::new();
    let shemo = sample_barbarian();

    let shortcuts = harness
        .engine
        .expand(&ShortcutSource::new("Longsword +1", "Shemo").with_plus_modifier(1), &shemo)
        .unwrap();

    assert_eq!(names(&shortcuts), vec!["Longsword +1 (1H)", "Longsword +1 (2H)"]);
    assert_eq!(shortcuts[0].dice, "1d8+4(slashing)");
    assert_eq!(shortcuts[1].dice, "1d10+4(slashing)");
    assert_eq!(shortcuts[0].to_hit_modifier(), 7);
    assert_eq!(shortcuts[0].damage_modifier(), 4);
}

#[test]
fn test_unproficient_weapon_gets_no_proficiency_bonus() {
    let harness = TestHarness::new();
    let shemo = sample_barbarian();

    let shortcuts = harness
        .engine
        .expand(&ShortcutSource::new("Rapier", "Shemo"), &shemo)
        .unwrap();

    assert_eq!(shortcuts.len(), 1);
    assert_eq!(shortcuts[0].proficiency_bonus, 0);
    assert!(!shortcuts[0].uses_proficiency());
    // Finesse picks the better of strength and dexterity.
    assert_eq!(shortcuts[0].attacking_ability_modifier, 3);
}

#[test]
fn test_two_handed_ranged_weapon() {
    let harness = TestHarness::new();
    let archer = Character::new("Vex")
        .with_class("Ranger", 5)
        .with_ability_scores(AbilityScores::new(10, 18, 12, 10, 14, 8))
        .with_weapon_proficiency("Longbow");

    let shortcuts = harness
        .engine
        .expand(&ShortcutSource::new("Longbow", "Vex"), &archer)
        .unwrap();

    assert_eq!(names(&shortcuts), vec!["Longbow"]);
    assert_eq!(shortcuts[0].attack_type, AttackType::RANGE);
    assert_eq!(shortcuts[0].dice, "1d8+4(piercing)");
    assert_eq!(shortcuts[0].to_hit_modifier(), 7);
}

// ============================================================================
// Spells
// ============================================================================

#[test]
fn test_upcast_spell_without_higher_slots_is_single() {
    let harness = TestHarness::new();
    let mut merric = sample_wizard();
    merric.spell_slots[3] = 2;
    merric.spell_slots[4] = 0;

    let shortcuts = harness
        .engine
        .expand(&ShortcutSource::new("Fireball", "Merric"), &merric)
        .unwrap();

    assert_eq!(names(&shortcuts), vec!["Fireball"]);
    assert_eq!(shortcuts[0].spell_slot_level, Some(3));
    assert_eq!(shortcuts[0].dice, "8d6(fire)");
    assert_eq!(shortcuts[0].roll_type, DiceRollType::DamageOnly);
}

#[test]
fn test_upcast_spell_lists_each_available_level() {
    let harness = TestHarness::new();
    let mut merric = sample_wizard();
    merric.spell_slots[3] = 1;
    merric.spell_slots[4] = 1;

    let shortcuts = harness
        .engine
        .expand(&ShortcutSource::new("Fireball", "Merric"), &merric)
        .unwrap();

    assert_eq!(names(&shortcuts), vec!["Fireball [3]", "Fireball [4]"]);
    assert_eq!(shortcuts[0].spell_slot_level, Some(3));
    assert_eq!(shortcuts[1].spell_slot_level, Some(4));
    assert_eq!(shortcuts[0].dice, "8d6(fire)");
    assert_eq!(shortcuts[1].dice, "9d6(fire)");
    assert!(shortcuts[0].index < shortcuts[1].index);
}

#[test]
fn test_slot_levels_stop_at_first_gap() {
    let harness = TestHarness::new();
    let mut merric = sample_wizard();
    merric.spell_slots[2] = 0;

    let shortcuts = harness
        .engine
        .expand(&ShortcutSource::new("Cure Wounds", "Merric"), &merric)
        .unwrap();

    assert_eq!(names(&shortcuts), vec!["Cure Wounds"]);
    assert_eq!(shortcuts[0].dice, "1d8+3(healing)");
}

#[test]
fn test_cantrip_scales_with_caster_level() {
    let harness = TestHarness::new();
    let merric = sample_wizard();

    let shortcuts = harness
        .engine
        .expand(&ShortcutSource::new("Fire Bolt", "Merric"), &merric)
        .unwrap();

    assert_eq!(shortcuts.len(), 1);
    assert_eq!(shortcuts[0].dice, "2d10(fire)");
    assert_eq!(shortcuts[0].roll_type, DiceRollType::Attack);
    assert!(shortcuts[0].uses_magic);
}

#[test]
fn test_unknown_spell_falls_back_to_command_shortcut() {
    let harness = TestHarness::new();
    let shemo = sample_barbarian();

    let shortcuts = harness
        .engine
        .expand(&ShortcutSource::new("Fireball", "Shemo"), &shemo)
        .unwrap();

    assert_eq!(shortcuts.len(), 1);
    assert!(shortcuts[0].spell.is_none());
    assert_eq!(shortcuts[0].spell_slot_level, None);
}

#[test]
fn test_instant_dice_on_command_shortcut() {
    let harness = TestHarness::new();
    let shemo = sample_barbarian();
    let source = ShortcutSource::new("Second Wind", "Shemo")
        .with_dice("!1d10+5")
        .with_commands("TellDm(\"breath\")");

    let shortcuts = harness.engine.expand(&source, &shemo).unwrap();

    assert_eq!(shortcuts[0].instant_dice, "1d10+5");
    assert_eq!(shortcuts[0].dice, "");
    assert_eq!(shortcuts[0].commands, "TellDm(\"breath\")");
}

// ============================================================================
// Modifier arithmetic
// ============================================================================

#[test]
fn test_modifiers_sum_for_random_characters() {
    let harness = TestHarness::new();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let weapons = ["Longsword", "Spear", "Greatsword", "Rapier", "Longbow"];

    for _ in 0..200 {
        let weapon = weapons[rng.gen_range(0..weapons.len())];
        let bonus = rng.gen_range(-3..=3);
        let mut character = Character::new("Random")
            .with_class("Fighter", rng.gen_range(1..=20))
            .with_ability_scores(AbilityScores::new(
                rng.gen_range(3..=20),
                rng.gen_range(3..=20),
                10,
                10,
                10,
                10,
            ))
            .with_carried_weapon(CarriedWeapon {
                name: None,
                weapon: weapon.to_string(),
                hit_damage_bonus: bonus,
            });
        if rng.gen_bool(0.5) {
            character = character.with_weapon_proficiency(weapon);
        }

        let carried = character.carried_weapons[0].clone();
        let shortcuts = harness
            .engine
            .expander()
            .from_carried_weapon(&carried, &character)
            .unwrap();
        assert!(!shortcuts.is_empty());

        for shortcut in &shortcuts {
            assert_eq!(shortcut.plus_modifier, bonus);
            assert_eq!(
                shortcut.to_hit_modifier(),
                bonus + shortcut.attacking_ability_modifier + shortcut.proficiency_bonus
            );
            assert_eq!(
                shortcut.damage_modifier(),
                bonus + shortcut.attacking_ability_modifier
            );
            let expected_proficiency = if character.is_proficient_with(weapon) {
                character.proficiency_bonus()
            } else {
                0
            };
            assert_eq!(shortcut.proficiency_bonus, expected_proficiency);
            assert_eq!(shortcut.uses_magic, bonus > 0);
        }
    }
}

// ============================================================================
// Rebuild
// ============================================================================

#[test]
fn test_rebuild_barbarian() {
    let harness = TestHarness::new();
    let mut shemo = harness.ready(sample_barbarian());

    let failures = harness.engine.rebuild_shortcuts(&mut shemo).unwrap();

    assert!(failures.is_empty());
    assert_eq!(
        names(&shemo.shortcuts),
        vec![
            "Longsword +1 (1H)",
            "Longsword +1 (2H)",
            "Spear (1H Stabbed)",
            "Spear (2H Slice)",
            "Spear (1H Thrown)",
            "Second Wind",
            "Greatsword",
            "Rage",
        ]
    );
    let indexes: Vec<usize> = shemo.shortcuts.iter().map(|s| s.index).collect();
    assert_eq!(indexes, (0..8).collect::<Vec<_>>());

    let second_wind = &shemo.shortcuts[5];
    assert_eq!(second_wind.part, TurnPart::BonusAction);
    assert_eq!(second_wind.instant_dice, "1d10+5");
    assert_eq!(shemo.shortcuts[6].dice, "2d6+3(slashing)");
    assert_eq!(shemo.shortcuts[7].part, TurnPart::BonusAction);
}

#[test]
fn test_rebuild_wizard() {
    let harness = TestHarness::new();
    let mut merric = harness.ready(sample_wizard());

    harness.engine.rebuild_shortcuts(&mut merric).unwrap();

    assert_eq!(
        names(&merric.shortcuts),
        vec![
            "Fireball",
            "Fire Bolt",
            "Chaos Bolt [1]",
            "Chaos Bolt [2]",
            "Chaos Bolt [3]",
            "Shield",
            "Cure Wounds [1]",
            "Cure Wounds [2]",
            "Cure Wounds [3]",
        ]
    );
    let chaos_bolt = &merric.shortcuts[3];
    assert_eq!(chaos_bolt.roll_type, DiceRollType::ChaosBolt);
    assert_eq!(chaos_bolt.dice, "2d8+1d6");
    assert_eq!(merric.shortcuts[5].part, TurnPart::Reaction);
    assert_eq!(merric.shortcuts[8].dice, "3d8+3(healing)");
}

#[test]
fn test_rebuild_is_repeatable() {
    let harness = TestHarness::new();
    let mut merric = harness.ready(sample_wizard());

    harness.engine.rebuild_shortcuts(&mut merric).unwrap();
    let first = merric.shortcuts.clone();
    harness.engine.rebuild_shortcuts(&mut merric).unwrap();

    assert_eq!(first, merric.shortcuts);
}

#[test]
fn test_rebuild_skips_source_with_bad_dice() {
    let harness = TestHarness::new();
    harness.source.push_row(
        "shortcuts",
        json!({"name": "Cursed Blow", "player": "Shemo", "dieStr": "2d7"}),
    );
    harness.engine.catalogs().shortcuts.invalidate();
    let mut shemo = harness.ready(sample_barbarian());

    let failures = harness.engine.rebuild_shortcuts(&mut shemo).unwrap();

    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].source, "Cursed Blow");
    assert!(matches!(failures[0].error, ShortcutError::Dice { .. }));
    assert_eq!(shemo.shortcuts.len(), 8);
}

#[test]
fn test_trigger_shortcut_runs_commands() {
    let harness = TestHarness::new();
    let mut shemo = harness.ready(sample_barbarian());
    harness.engine.rebuild_shortcuts(&mut shemo).unwrap();
    let mut events = harness.engine.events().subscribe();

    harness.engine.trigger_shortcut(&mut shemo, 0).unwrap();
    assert_eq!(
        shemo.state_value("swings"),
        Some(&dnd_rules::Value::Int(1))
    );

    harness.engine.trigger_shortcut(&mut shemo, 5).unwrap();
    match events.try_recv() {
        Ok(dnd_rules::RulesEvent::DungeonMasterMessage { source, message }) => {
            assert_eq!(source, "Shemo");
            assert_eq!(message, "Shemo catches their breath");
        }
        other => panic!("expected a message, got {other:?}"),
    }
}

#[test]
fn test_spell_shortcut_commands_see_their_spell() {
    let source = InMemorySource::with_sample_data();
    source.insert(
        "shortcuts",
        vec![json!({"name": "Fireball", "player": "Merric",
                    "commands": "TellDm(\"Stand back; it burns\"); lastCast = spellName; castLevel = spellLevel"})],
    );
    let harness = TestHarness::with_source(source);
    let mut merric = harness.ready(sample_wizard());
    harness.engine.rebuild_shortcuts(&mut merric).unwrap();
    let mut events = harness.engine.events().subscribe();

    assert_eq!(names(&merric.shortcuts), vec!["Fireball"]);
    let fireball = merric.shortcuts[0].index;
    harness.engine.trigger_shortcut(&mut merric, fireball).unwrap();

    assert_eq!(
        merric.state_value("lastCast"),
        Some(&dnd_rules::Value::Str("Fireball".to_string()))
    );
    assert_eq!(merric.state_value("castLevel"), Some(&dnd_rules::Value::Int(3)));
    match events.try_recv() {
        Ok(dnd_rules::RulesEvent::DungeonMasterMessage { message, .. }) => {
            assert_eq!(message, "Stand back; it burns");
        }
        other => panic!("expected a message, got {other:?}"),
    }
}
