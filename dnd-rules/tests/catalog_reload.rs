//! Catalog lookups, invalidation and loading tables from disk.

use dnd_rules::catalog::{CatalogError, Catalogs, JsonDirectorySource};
use dnd_rules::clock::GameClock;
use dnd_rules::config::EngineConfig;
use dnd_rules::rules::{EngineError, RulesEngine};
use dnd_rules::testing::{sample_features, sample_shortcuts, sample_spells, sample_weapons, TestHarness};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::thread;

fn write_table(dir: &Path, table: &str, rows: Vec<Value>) {
    let text = serde_json::to_string_pretty(&rows).unwrap();
    std::fs::write(dir.join(format!("{table}.json")), text).unwrap();
}

#[test]
fn test_unknown_names_are_not_errors() {
    let harness = TestHarness::new();
    let spells = &harness.engine.catalogs().spells;

    assert!(spells.get("Wish").unwrap().is_none());
    assert!(spells.get_all("Wish").unwrap().is_empty());
    assert!(spells.get("fireball").unwrap().is_some());
}

#[test]
fn test_invalidate_reloads_once() {
    let harness = TestHarness::new();
    let spells = &harness.engine.catalogs().spells;

    spells.get("Fireball").unwrap();
    spells.get_all("Fire Bolt").unwrap();
    assert_eq!(spells.load_count(), 1);

    spells.invalidate();
    assert_eq!(spells.load_count(), 1);
    spells.get("Fireball").unwrap();
    spells.get("Shield").unwrap();
    assert_eq!(spells.load_count(), 2);
    assert_eq!(harness.source.loads("spells"), 2);
}

#[test]
fn test_invalidate_picks_up_new_rows() {
    let harness = TestHarness::new();
    let weapons = &harness.engine.catalogs().weapons;
    assert!(weapons.get("Dagger").unwrap().is_none());

    harness.source.push_row(
        "weapons",
        json!({"name": "Dagger", "properties": "Melee, Finesse, Light, Thrown",
               "damageOneHanded": "1d4(piercing)"}),
    );
    assert!(weapons.get("Dagger").unwrap().is_none());

    harness.engine.catalogs().invalidate_all();
    assert!(weapons.get("Dagger").unwrap().is_some());
}

#[test]
fn test_concurrent_readers_share_one_load() {
    let harness = TestHarness::new();
    let catalogs = harness.engine.catalogs();

    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                assert!(catalogs.weapons.get("Spear").unwrap().is_some());
            });
        }
    });

    assert_eq!(catalogs.weapons.load_count(), 1);
}

#[test]
fn test_bad_row_reports_table_and_index() {
    let harness = TestHarness::new();
    harness.source.push_row("spells", json!({"name": "Meteor Swarm", "level": 12}));
    let spells = &harness.engine.catalogs().spells;

    match spells.get("Fireball") {
        Err(CatalogError::InvalidField { table, index, .. }) => {
            assert_eq!(table, "spells");
            assert_eq!(index, 5);
        }
        other => panic!("expected an invalid field, got {other:?}"),
    }
}

#[test]
fn test_json_directory_tables() {
    let dir = tempfile::tempdir().unwrap();
    write_table(dir.path(), "spells", sample_spells());
    write_table(dir.path(), "weapons", sample_weapons());
    write_table(dir.path(), "features", sample_features());
    write_table(dir.path(), "shortcuts", sample_shortcuts());

    let config = EngineConfig::new(dir.path());
    let catalogs = Catalogs::new(Arc::new(JsonDirectorySource::new(dir.path())), &config);
    assert_eq!(catalogs.spells.all().unwrap().len(), 5);
    assert!(catalogs.features.get("Rage").unwrap().is_some());

    write_table(
        dir.path(),
        "spells",
        vec![json!({"name": "Magic Missile", "level": 1, "dieStr": "3d4+3(force)"})],
    );
    assert!(catalogs.spells.get("Magic Missile").unwrap().is_none());
    catalogs.invalidate_all();
    assert!(catalogs.spells.get("Magic Missile").unwrap().is_some());
    assert!(catalogs.spells.get("Fireball").unwrap().is_none());
}

#[test]
fn test_missing_table_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = JsonDirectorySource::new(dir.path());
    let catalogs = Catalogs::new(Arc::new(source), &EngineConfig::new(dir.path()));

    assert!(matches!(
        catalogs.weapons.get("Spear"),
        Err(CatalogError::MissingTable { .. })
    ));
}

#[test]
fn test_renamed_tables_from_config() {
    let dir = tempfile::tempdir().unwrap();
    write_table(dir.path(), "homebrew_spells", sample_spells());

    let config = EngineConfig::new(dir.path()).with_spells_table("homebrew_spells");
    let engine = RulesEngine::from_config(config, Arc::new(GameClock::new()));

    assert!(engine.catalogs().spells.get("Fireball").unwrap().is_some());
    assert!(engine.catalogs().weapons.get("Spear").is_err());
}

#[test]
fn test_load_character_attaches_features() {
    let dir = tempfile::tempdir().unwrap();
    write_table(dir.path(), "features", sample_features());
    let path = dir.path().join("shemo.json");
    let shemo = dnd_rules::testing::sample_barbarian();
    std::fs::write(&path, serde_json::to_string(&shemo).unwrap()).unwrap();

    let engine = RulesEngine::from_config(
        EngineConfig::new(dir.path()),
        Arc::new(GameClock::new()),
    );
    let loaded = engine.load_character(&path).unwrap();

    assert_eq!(loaded.name, "Shemo");
    assert_eq!(loaded.features.len(), 3);
    assert!(loaded.shortcuts.is_empty());

    assert!(matches!(
        engine.load_character(dir.path().join("nobody.json")),
        Err(EngineError::Io(_))
    ));
}
