//! The rules engine.
//!
//! [`RulesEngine`] owns the catalogs, the rule-language evaluator, the alarm
//! clock and the event bus. It evaluates rule expressions against
//! characters, rebuilds their action shortcuts and (in
//! [`crate::features::activation`]) drives the feature lifecycle.

use crate::catalog::{CatalogError, Catalogs, JsonDirectorySource, TableSource};
use crate::character::Character;
use crate::clock::AlarmClock;
use crate::config::EngineConfig;
use crate::dice::DiceError;
use crate::events::EventBus;
use crate::expressions::{EvalContext, Evaluator, ExpressionError};
use crate::shortcuts::{
    ActionShortcut, ShortcutError, ShortcutExpander, ShortcutIndexer, ShortcutSource,
};
use crate::spells::{CastedSpell, SpellInstance};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors from the rules engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    #[error("Dice error: {0}")]
    Dice(#[from] DiceError),

    #[error("Shortcut error: {0}")]
    Shortcut(#[from] ShortcutError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No shortcut with index {0}")]
    UnknownShortcut(usize),

    #[error("Shortcut '{0}' is not available right now")]
    Unavailable(String),
}

/// A shortcut source that could not be expanded during a rebuild.
#[derive(Debug)]
pub struct ShortcutFailure {
    pub source: String,
    pub error: ShortcutError,
}

/// Rules engine for one table of characters.
pub struct RulesEngine {
    config: EngineConfig,
    catalogs: Catalogs,
    evaluator: Evaluator,
    clock: Arc<dyn AlarmClock>,
    events: EventBus,
    indexer: ShortcutIndexer,
}

impl RulesEngine {
    /// Create an engine over existing catalogs with the default config.
    pub fn new(catalogs: Catalogs, clock: Arc<dyn AlarmClock>) -> Self {
        Self::with_catalogs(EngineConfig::default(), catalogs, clock)
    }

    /// Create an engine reading tables from `source`.
    pub fn with_source(
        config: EngineConfig,
        source: Arc<dyn TableSource>,
        clock: Arc<dyn AlarmClock>,
    ) -> Self {
        let catalogs = Catalogs::new(source, &config);
        Self::with_catalogs(config, catalogs, clock)
    }

    /// Create an engine reading JSON tables from the config's data directory.
    pub fn from_config(config: EngineConfig, clock: Arc<dyn AlarmClock>) -> Self {
        let source = Arc::new(JsonDirectorySource::new(config.data_dir.clone()));
        Self::with_source(config, source, clock)
    }

    fn with_catalogs(config: EngineConfig, catalogs: Catalogs, clock: Arc<dyn AlarmClock>) -> Self {
        let events = EventBus::new(config.event_capacity);
        Self {
            config,
            catalogs,
            evaluator: Evaluator::standard(),
            clock,
            events,
            indexer: ShortcutIndexer::new(),
        }
    }

    /// Replace the evaluator, e.g. one with extra functions registered.
    pub fn with_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalogs(&self) -> &Catalogs {
        &self.catalogs
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub(crate) fn clock(&self) -> &dyn AlarmClock {
        self.clock.as_ref()
    }

    // ========================================================================
    // Rule Expressions
    // ========================================================================

    /// Evaluate a condition. Booleans are taken as-is and numbers are true
    /// when non-zero. A blank condition is an error; callers that treat
    /// blank as "always" check for it first.
    pub fn evaluate_bool(
        &self,
        expression: &str,
        character: &Character,
    ) -> Result<bool, ExpressionError> {
        let mut ctx = EvalContext::shared(self, character);
        let value = self
            .evaluator
            .run(expression, &mut ctx)?
            .ok_or_else(|| ExpressionError::TypeMismatch("empty condition".to_string()))?;
        value.truthy().ok_or_else(|| {
            ExpressionError::TypeMismatch(format!(
                "condition '{}' is a {}, not a bool",
                expression.trim(),
                value.type_name()
            ))
        })
    }

    /// Evaluate a message template. A blank template is empty text.
    pub fn evaluate_string(
        &self,
        expression: &str,
        character: &Character,
    ) -> Result<String, ExpressionError> {
        let mut ctx = EvalContext::shared(self, character);
        Ok(self
            .evaluator
            .run(expression, &mut ctx)?
            .map(|value| value.to_string())
            .unwrap_or_default())
    }

    /// Run commands that may change the character. A blank command does
    /// nothing.
    pub fn execute(
        &self,
        expression: &str,
        character: &mut Character,
        target: Option<&Character>,
        spell: Option<&CastedSpell>,
    ) -> Result<(), ExpressionError> {
        if expression.trim().is_empty() {
            return Ok(());
        }
        let mut ctx = EvalContext::exclusive(self, character)
            .with_target(target)
            .with_spell(spell);
        self.evaluator.run(expression, &mut ctx)?;
        Ok(())
    }

    // ========================================================================
    // Shortcuts
    // ========================================================================

    pub fn expander(&self) -> ShortcutExpander<'_> {
        ShortcutExpander::new(&self.catalogs, &self.indexer)
    }

    /// Expand one shortcut source for a character.
    pub fn expand(
        &self,
        source: &ShortcutSource,
        character: &Character,
    ) -> Result<Vec<ActionShortcut>, ShortcutError> {
        self.expander().expand(source, character)
    }

    /// Rebuild the character's shortcuts: every shortcut source owned by the
    /// character, then carried weapons, then features the player switches on.
    ///
    /// Sources with bad data are skipped and returned; catalog failures
    /// abort the rebuild.
    pub fn rebuild_shortcuts(
        &self,
        character: &mut Character,
    ) -> Result<Vec<ShortcutFailure>, EngineError> {
        self.indexer.reset();
        let expander = self.expander();
        let mut shortcuts = Vec::new();
        let mut failures = Vec::new();

        let sources = self
            .catalogs
            .shortcuts
            .filter(|source| source.belongs_to(&character.name))?;
        for source in &sources {
            match expander.expand(source, &*character) {
                Ok(expanded) => shortcuts.extend(expanded),
                Err(ShortcutError::Catalog(err)) => return Err(err.into()),
                Err(error) => {
                    tracing::warn!(source = %source.name, %error, "skipping shortcut source");
                    failures.push(ShortcutFailure {
                        source: source.name.clone(),
                        error,
                    });
                }
            }
        }

        for carried in &character.carried_weapons {
            match expander.from_carried_weapon(carried, &*character) {
                Ok(expanded) => shortcuts.extend(expanded),
                Err(ShortcutError::Catalog(err)) => return Err(err.into()),
                Err(error) => {
                    tracing::warn!(weapon = %carried.display_name(), %error, "skipping carried weapon");
                    failures.push(ShortcutFailure {
                        source: carried.display_name().to_string(),
                        error,
                    });
                }
            }
        }

        for feature in &character.features {
            if feature.definition.requires_player_activation {
                shortcuts.push(expander.from_feature(&feature.definition, &*character));
            }
        }

        tracing::debug!(
            character = %character.name,
            shortcuts = shortcuts.len(),
            failures = failures.len(),
            "shortcuts rebuilt"
        );
        character.shortcuts = shortcuts;
        Ok(failures)
    }

    /// Use the shortcut with creation index `index`: run its commands, then
    /// tell the character's features that a spell was cast or a weapon
    /// swung.
    pub fn trigger_shortcut(
        &self,
        character: &mut Character,
        index: usize,
    ) -> Result<(), EngineError> {
        let shortcut = character
            .shortcuts
            .iter()
            .find(|s| s.index == index)
            .cloned()
            .ok_or(EngineError::UnknownShortcut(index))?;
        if !shortcut.is_available(self, character)? {
            return Err(EngineError::Unavailable(shortcut.name));
        }

        tracing::debug!(character = %character.name, shortcut = %shortcut.name, "shortcut triggered");
        let cast = shortcut.spell.clone().map(CastedSpell::new);
        shortcut.execute_commands(self, character, cast.as_ref())?;

        if let Some(cast) = &cast {
            self.spell_just_cast(character, "", cast)?;
        } else if !shortcut.weapon_properties.is_empty() {
            self.weapon_just_swung(character, "")?;
        }
        Ok(())
    }

    /// Bind a spell from the catalog for this character.
    pub fn spell_instance(
        &self,
        character: &Character,
        spell: &str,
        slot_level: Option<u8>,
    ) -> Result<Option<SpellInstance>, EngineError> {
        use crate::character::CharacterQuery;
        let Some(definition) = self.catalogs.spells.get(spell)? else {
            return Ok(None);
        };
        let instance = SpellInstance::new(
            definition,
            slot_level,
            character.spellcasting_level(),
            Some(character.spellcasting_ability_modifier()),
        )?;
        Ok(Some(instance))
    }

    // ========================================================================
    // Characters
    // ========================================================================

    /// Load a character from a JSON file and attach its features.
    pub fn load_character(&self, path: impl AsRef<Path>) -> Result<Character, EngineError> {
        let text = std::fs::read_to_string(path)?;
        let mut character: Character = serde_json::from_str(&text)?;
        self.attach_features(&mut character)?;
        Ok(character)
    }
}

impl std::fmt::Debug for RulesEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RulesEngine")
            .field("config", &self.config)
            .field("catalogs", &self.catalogs)
            .field("evaluator", &self.evaluator)
            .finish_non_exhaustive()
    }
}
