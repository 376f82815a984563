//! The data tables shipped in the repository's `data/` directory.

use dnd_rules::clock::GameClock;
use dnd_rules::config::EngineConfig;
use dnd_rules::rules::RulesEngine;
use std::path::PathBuf;
use std::sync::Arc;

fn data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../data")
}

fn engine() -> RulesEngine {
    RulesEngine::from_config(EngineConfig::new(data_dir()), Arc::new(GameClock::new()))
}

#[test]
fn test_tables_parse() {
    let engine = engine();
    let catalogs = engine.catalogs();

    assert!(!catalogs.spells.all().unwrap().is_empty());
    assert!(!catalogs.weapons.all().unwrap().is_empty());
    assert!(!catalogs.features.all().unwrap().is_empty());
    assert!(!catalogs.shortcuts.all().unwrap().is_empty());
}

#[test]
fn test_sample_characters_build_cleanly() {
    let engine = engine();

    for file in ["shemo.json", "merric.json"] {
        let mut character = engine
            .load_character(data_dir().join("characters").join(file))
            .unwrap();
        assert_eq!(character.features.len(), character.feature_names.len());

        engine.start_game(&mut character).unwrap();
        engine.activate_conditional_features(&mut character).unwrap();
        let failures = engine.rebuild_shortcuts(&mut character).unwrap();

        assert!(failures.is_empty(), "{file}: {failures:?}");
        assert!(!character.shortcuts.is_empty());
        for shortcut in &character.shortcuts {
            shortcut.is_available(&engine, &character).unwrap();
        }
    }
}
