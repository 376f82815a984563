//! D&D 5e rules engine for a table-side companion app.
//!
//! This crate provides:
//! - A small rule language for conditions, message templates and commands
//! - Lazily loaded catalogs of spells, weapons, features and shortcut sources
//! - The feature activation lifecycle with timed expiry
//! - Derivation of the action shortcuts a character can use each turn
//! - Dice notation parsing, composition and rolling
//!
//! # Quick Start
//!
//! ```ignore
//! use dnd_rules::{EngineConfig, GameClock, RulesEngine};
//! use std::sync::Arc;
//!
//! let config = EngineConfig::new("data/");
//! let engine = RulesEngine::from_config(config, Arc::new(GameClock::new()));
//!
//! let mut character = load_character()?;
//! engine.attach_features(&mut character)?;
//! engine.start_game(&mut character)?;
//! let failures = engine.rebuild_shortcuts(&mut character)?;
//! for shortcut in &character.shortcuts {
//!     println!("{} {}", shortcut.name, shortcut.dice);
//! }
//! ```

// Lets `#[derive(NamedVariants)]` refer to `::dnd_rules` from inside this crate.
extern crate self as dnd_rules;

pub mod catalog;
pub mod character;
pub mod clock;
pub mod config;
pub mod dice;
pub mod events;
pub mod expressions;
pub mod features;
pub mod rules;
pub mod shortcuts;
pub mod spells;
pub mod testing;
pub mod time;
pub mod weapons;

pub use dnd_macros::NamedVariants;

// Primary public API
pub use catalog::{Catalog, CatalogError, Catalogs, JsonDirectorySource, TableSource};
pub use character::{Ability, Character, CharacterId, CharacterQuery, Skill};
pub use clock::{AlarmClock, AlarmHandle, GameClock, TokioClock};
pub use config::EngineConfig;
pub use dice::{compose, DiceError, DieRollDetails, Vantage};
pub use events::{EventBus, RulesEvent};
pub use expressions::{ExpressionError, Value};
pub use features::{FeatureDefinition, FeatureInstance};
pub use rules::{EngineError, RulesEngine, ShortcutFailure};
pub use shortcuts::{ActionShortcut, ShortcutError, ShortcutSource};
pub use spells::{CastedSpell, SpellDefinition, SpellInstance};
pub use testing::TestHarness;
pub use time::{DndTimeSpan, TurnPart};
pub use weapons::{WeaponDefinition, WeaponProperties};
