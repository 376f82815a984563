//! Testing utilities for the rules engine.
//!
//! This module provides:
//! - `InMemorySource`, a table source backed by JSON values in memory
//! - Sample spell, weapon, feature and shortcut tables
//! - Sample characters
//! - `TestHarness`, an engine wired to the sample data and an in-game clock

use crate::catalog::{CatalogError, TableSource};
use crate::character::{Ability, AbilityScores, CarriedWeapon, Character, Skill};
use crate::clock::GameClock;
use crate::config::EngineConfig;
use crate::rules::RulesEngine;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// A table source holding rows in memory.
#[derive(Debug, Default)]
pub struct InMemorySource {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    loads: Mutex<HashMap<String, usize>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source holding every sample table.
    pub fn with_sample_data() -> Self {
        let source = Self::new();
        source.insert("spells", sample_spells());
        source.insert("weapons", sample_weapons());
        source.insert("features", sample_features());
        source.insert("shortcuts", sample_shortcuts());
        source
    }

    /// Add or replace a table.
    pub fn insert(&self, table: &str, rows: Vec<Value>) {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(table.to_string(), rows);
    }

    /// Append one row to a table, creating it if needed.
    pub fn push_row(&self, table: &str, row: Value) {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    /// How many times `table` has been read.
    pub fn loads(&self, table: &str) -> usize {
        self.loads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
            .copied()
            .unwrap_or(0)
    }
}

impl TableSource for InMemorySource {
    fn load_rows(&self, table: &str) -> Result<Vec<Value>, CatalogError> {
        *self
            .loads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(table.to_string())
            .or_default() += 1;
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
            .cloned()
            .ok_or_else(|| CatalogError::MissingTable {
                table: table.to_string(),
                location: "memory".to_string(),
            })
    }
}

// ============================================================================
// Sample Data
// ============================================================================

pub fn sample_spells() -> Vec<Value> {
    vec![
        json!({
            "name": "Fireball", "level": 3, "school": "Evocation",
            "castingTime": "1 action", "duration": "Instantaneous", "range": "150 feet",
            "components": "V, S, M", "description": "A bright streak flashes to a point you choose.",
            "dieStr": "8d6(fire)", "perSlotLevel": "1d6", "morePowerfulAtHigherLevels": "x",
            "spellType": "SavingThrowSpell"
        }),
        json!({
            "name": "Fire Bolt", "level": 0, "school": "Evocation",
            "castingTime": "1 action", "duration": "Instantaneous", "range": "120 feet",
            "dieStr": "1d10(fire)", "powerComesFromCasterLevel": "x",
            "spellType": "RangedSpell"
        }),
        json!({
            "name": "Chaos Bolt", "level": 1, "school": "Evocation",
            "castingTime": "1 action", "duration": "Instantaneous",
            "dieStr": "2d8", "perSlotLevel": "1d6", "morePowerfulAtHigherLevels": "x",
            "spellType": "RangedSpell"
        }),
        json!({
            "name": "Cure Wounds", "level": 1, "school": "Evocation",
            "castingTime": "1 action", "duration": "Instantaneous",
            "dieStr": "1d8+spellcastingAbilityModifier(healing)", "perSlotLevel": "1d8",
            "morePowerfulAtHigherLevels": true, "spellType": "OtherSpell"
        }),
        json!({
            "name": "Shield", "level": 1, "school": "Abjuration",
            "castingTime": "1 reaction", "duration": "1 round",
            "spellType": "OtherSpell"
        }),
    ]
}

pub fn sample_weapons() -> Vec<Value> {
    vec![
        json!({"name": "Longsword", "properties": "Melee, Versatile, Martial",
               "damageOneHanded": "1d8(slashing)", "damageTwoHanded": "1d10(slashing)"}),
        json!({"name": "Spear", "properties": "Melee, Ranged, Versatile, Thrown",
               "damageOneHanded": "1d6(piercing)", "damageTwoHanded": "1d8(piercing)"}),
        json!({"name": "Greatsword", "properties": "Melee, Two-Handed, Heavy, Martial",
               "damageOneHanded": "2d6(slashing)"}),
        json!({"name": "Rapier", "properties": "Melee, Finesse, Martial",
               "damageOneHanded": "1d8(piercing)"}),
        json!({"name": "Longbow", "properties": "Ranged, Two-Handed, Heavy, Martial, Ammunition",
               "damageTwoHanded": "1d8(piercing)"}),
    ]
}

pub fn sample_features() -> Vec<Value> {
    vec![
        json!({
            "name": "Rage",
            "duration": "1 minute",
            "activationTime": "1ba",
            "requiresActivation": "x",
            "shortcutAvailableWhen": "rages > 0 && !FeatureActive(Rage)",
            "onStartGame": "rages = 3",
            "onActivate": "rages -= 1",
            "onPlayerStartsTurn": "ragingTurns += 1",
            "activationMessage": "$\"{name} flies into a rage!\"",
            "deactivationMessage": "$\"{name} calms down.\"",
            "description": "Advantage on Strength checks and bonus melee damage."
        }),
        json!({
            "name": "Unarmored Defense",
            "activateWhen": "true"
        }),
        json!({
            "name": "FavoredEnemy(enemy)",
            "onActivate": "favoredEnemy = \"enemy\"",
            "activationMessage": "\"Tracking enemy\""
        }),
        json!({
            "name": "Danger Sense",
            "activateWhen": "Level(Barbarian) >= 2"
        }),
    ]
}

pub fn sample_shortcuts() -> Vec<Value> {
    vec![
        json!({"name": "Longsword +1", "player": "Shemo", "type": "Attack",
               "plusModifier": 1, "magic": "x", "commands": "swings += 1"}),
        json!({"name": "Spear", "player": "Shemo", "type": "Attack"}),
        json!({"name": "Second Wind", "player": "Shemo", "time": "1ba", "type": "HealthOnly",
               "dieStr": "!1d10+5", "commands": "TellDm(\"Shemo catches their breath\")"}),
        json!({"name": "Fireball", "player": "Merric"}),
        json!({"name": "Fire Bolt", "player": "Merric"}),
        json!({"name": "Chaos Bolt", "player": "Merric"}),
        json!({"name": "Shield", "player": "Merric"}),
        json!({"name": "Cure Wounds", "player": "Merric"}),
    ]
}

/// A level 5 barbarian carrying a greatsword.
pub fn sample_barbarian() -> Character {
    Character::new("Shemo")
        .with_class("Barbarian", 5)
        .with_ability_scores(AbilityScores::new(16, 14, 14, 10, 12, 8))
        .with_weapon_proficiency("Longsword")
        .with_weapon_proficiency("Spear")
        .with_weapon_proficiency("Greatsword")
        .with_skill_proficiency(Skill::Athletics)
        .with_carried_weapon(CarriedWeapon::new("Greatsword"))
        .with_feature("Rage")
        .with_feature("Unarmored Defense")
        .with_feature("Danger Sense")
}

/// A level 5 wizard with slots at levels 1 to 3.
pub fn sample_wizard() -> Character {
    Character::new("Merric")
        .with_class("Wizard", 5)
        .with_ability_scores(AbilityScores::new(8, 14, 12, 16, 12, 10))
        .with_spellcasting_ability(Ability::Intelligence)
        .with_spell_slots(1, 4)
        .with_spell_slots(2, 3)
        .with_spell_slots(3, 2)
        .with_known_spell("Fireball")
        .with_known_spell("Fire Bolt")
        .with_known_spell("Chaos Bolt")
        .with_known_spell("Shield")
        .with_known_spell("Cure Wounds")
        .with_skill_proficiency(Skill::Arcana)
}

// ============================================================================
// Test Harness
// ============================================================================

/// An engine over the sample tables with an in-game clock.
pub struct TestHarness {
    pub engine: RulesEngine,
    pub clock: Arc<GameClock>,
    pub source: Arc<InMemorySource>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_source(InMemorySource::with_sample_data())
    }

    pub fn with_source(source: InMemorySource) -> Self {
        let source = Arc::new(source);
        let clock = Arc::new(GameClock::new());
        let engine = RulesEngine::with_source(
            EngineConfig::default(),
            Arc::clone(&source) as Arc<dyn TableSource>,
            Arc::clone(&clock) as Arc<dyn crate::clock::AlarmClock>,
        );
        Self {
            engine,
            clock,
            source,
        }
    }

    /// Attach features and run the start-of-game hooks.
    ///
    /// # Panics
    ///
    /// Panics if the sample data is broken; this is a test helper.
    pub fn ready(&self, mut character: Character) -> Character {
        let missing = self
            .engine
            .attach_features(&mut character)
            .expect("sample features load");
        assert!(missing.is_empty(), "unknown features: {missing:?}");
        self.engine
            .start_game(&mut character)
            .expect("start-of-game hooks run");
        character
    }

    /// Advance in-game time and apply any alarms that fired.
    pub fn advance_rounds(&self, character: &mut Character, rounds: u32) -> usize {
        self.clock.advance_rounds(rounds);
        self.engine
            .process_alarms(character)
            .expect("expiry hooks run")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_tables_load() {
        let harness = TestHarness::new();
        let catalogs = harness.engine.catalogs();
        assert_eq!(catalogs.spells.all().unwrap().len(), 5);
        assert_eq!(catalogs.weapons.all().unwrap().len(), 5);
        assert_eq!(catalogs.features.all().unwrap().len(), 4);
        assert_eq!(catalogs.shortcuts.all().unwrap().len(), 8);
        assert_eq!(harness.source.loads("spells"), 1);
    }

    #[test]
    fn test_ready_barbarian() {
        let harness = TestHarness::new();
        let shemo = harness.ready(sample_barbarian());
        assert_eq!(shemo.features.len(), 3);
        assert!(shemo.is_feature_active("Unarmored Defense"));
        assert!(!shemo.is_feature_active("Rage"));
        assert!(!shemo.is_feature_active("Danger Sense"));
    }
}
