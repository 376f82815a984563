//! Action shortcuts: the attacks, spell casts and feature activations a
//! player can pick from each turn.
//!
//! Shortcut sources come from the shortcuts table. Each source expands into
//! zero or more [`ActionShortcut`]s (see [`expander`]); the list is rebuilt
//! from scratch whenever the character's options change.

pub mod expander;

pub use expander::ShortcutExpander;

use crate::catalog::{de, CatalogEntry, CatalogError};
use crate::character::{Ability, CarriedWeapon, Character};
use crate::dice::{DiceError, Vantage};
use crate::expressions::ExpressionError;
use crate::rules::RulesEngine;
use crate::spells::{CastedSpell, SpellInstance};
use crate::time::TurnPart;
use crate::weapons::{AttackType, WeaponProperties};
use dnd_macros::NamedVariants;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Errors raised while expanding one shortcut source.
#[derive(Debug, Error)]
pub enum ShortcutError {
    #[error("Bad dice in shortcut '{shortcut}': {source}")]
    Dice {
        shortcut: String,
        #[source]
        source: DiceError,
    },

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// How the dice of a shortcut are rolled and presented.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, NamedVariants,
)]
#[variant(type_name = "DiceRollType")]
pub enum DiceRollType {
    Attack,
    AddOnDice,
    ChaosBolt,
    LuckRollHigh,
    WildMagic,
    SavingThrow,
    NonCombatInitiative,
    Initiative,
    DamageOnly,
    BendLuckAdd,
    FlatD20,
    #[default]
    None,
    WildMagicD20Check,
    HealthOnly,
    BendLuckSubtract,
    DeathSavingThrow,
    SkillCheck,
    InspirationOnly,
    ExtraOnly,
    LuckRollLow,
    PercentageRoll,
}

impl DiceRollType {
    /// Parse a roll type name from data. Unknown names are `None`.
    pub fn parse(text: &str) -> DiceRollType {
        use crate::expressions::NamedVariants;
        DiceRollType::from_variant_name(text).unwrap_or_default()
    }
}

/// A visual effect played before a shortcut's roll. Only the name and the
/// availability predicate mean anything here; the rest is passed through to
/// the presentation layer untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Windup {
    pub name: String,
    pub effect_available_when: String,
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// One row of the shortcuts table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShortcutSource {
    /// Weapon name, spell name or free-form action name.
    pub name: String,
    /// Name of the character this shortcut belongs to.
    pub player: String,
    pub description: String,
    #[serde(deserialize_with = "de::text")]
    pub die_str: String,
    #[serde(deserialize_with = "de::lenient_int")]
    pub plus_modifier: i32,
    /// `1a`, `1ba`, `1r` or `*`.
    pub time: String,
    #[serde(alias = "type")]
    pub roll_type: String,
    pub vantage_mod: String,
    #[serde(deserialize_with = "de::checked")]
    pub roll_mod: bool,
    #[serde(deserialize_with = "de::checked")]
    pub magic: bool,
    pub commands: String,
    pub trailing_effects: String,
    pub die_roll_effects: String,
    #[serde(deserialize_with = "de::text")]
    pub add_dice: String,
    #[serde(deserialize_with = "de::text")]
    pub add_dice_on_hit: String,
    pub add_dice_on_hit_message: String,
    pub add_dice_title: String,
    #[serde(deserialize_with = "de::lenient_int")]
    pub min_damage: i32,
    pub available_when: String,
    pub windups: Vec<Windup>,
}

impl ShortcutSource {
    pub fn new(name: impl Into<String>, player: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            player: player.into(),
            ..Self::default()
        }
    }

    pub fn with_dice(mut self, die_str: &str) -> Self {
        self.die_str = die_str.to_string();
        self
    }

    pub fn with_plus_modifier(mut self, plus_modifier: i32) -> Self {
        self.plus_modifier = plus_modifier;
        self
    }

    pub fn with_commands(mut self, commands: &str) -> Self {
        self.commands = commands.to_string();
        self
    }

    pub fn with_available_when(mut self, predicate: &str) -> Self {
        self.available_when = predicate.to_string();
        self
    }

    pub fn with_windup(mut self, windup: Windup) -> Self {
        self.windups.push(windup);
        self
    }

    pub fn belongs_to(&self, player: &str) -> bool {
        self.player.trim().eq_ignore_ascii_case(player.trim())
    }
}

impl CatalogEntry for ShortcutSource {
    type Row = ShortcutSource;

    fn from_row(row: ShortcutSource) -> Result<Self, String> {
        if row.name.trim().is_empty() {
            return Err("shortcut name is blank".to_string());
        }
        Ok(row)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Hands out creation-order indexes for shortcuts.
#[derive(Debug, Default)]
pub struct ShortcutIndexer {
    next: AtomicUsize,
}

impl ShortcutIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> usize {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Start numbering from zero again, at the start of a rebuild.
    pub fn reset(&self) {
        self.next.store(0, Ordering::SeqCst);
    }
}

/// A fully resolved action a player can take.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionShortcut {
    /// Creation order within the current rebuild.
    pub index: usize,
    pub name: String,
    pub description: String,
    pub player: String,
    pub part: TurnPart,
    pub roll_type: DiceRollType,
    pub attack_type: AttackType,

    pub plus_modifier: i32,
    pub attacking_ability: Option<Ability>,
    pub attacking_ability_modifier: i32,
    pub proficiency_bonus: i32,

    /// Dice rolled when the shortcut is triggered, with the damage modifier
    /// already folded in.
    pub dice: String,
    /// Dice rolled as soon as the shortcut is chosen.
    pub instant_dice: String,
    pub vantage: Vantage,
    pub windups: Vec<Windup>,
    pub available_when: String,

    pub spell: Option<SpellInstance>,
    pub spell_slot_level: Option<u8>,
    /// `;` separated rule-language commands.
    pub commands: String,

    pub trailing_effects: String,
    pub die_roll_effects: String,
    pub add_dice: String,
    pub add_dice_on_hit: String,
    pub add_dice_on_hit_message: String,
    pub add_dice_title: String,
    pub min_damage: i32,
    pub modifies_existing_roll: bool,
    pub uses_magic: bool,
    pub weapon_properties: WeaponProperties,
    pub carried_weapon: Option<CarriedWeapon>,
}

impl ActionShortcut {
    /// A shortcut with nothing but a name and creation index.
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            description: String::new(),
            player: String::new(),
            part: TurnPart::Action,
            roll_type: DiceRollType::None,
            attack_type: AttackType::empty(),
            plus_modifier: 0,
            attacking_ability: None,
            attacking_ability_modifier: 0,
            proficiency_bonus: 0,
            dice: String::new(),
            instant_dice: String::new(),
            vantage: Vantage::Normal,
            windups: Vec::new(),
            available_when: String::new(),
            spell: None,
            spell_slot_level: None,
            commands: String::new(),
            trailing_effects: String::new(),
            die_roll_effects: String::new(),
            add_dice: String::new(),
            add_dice_on_hit: String::new(),
            add_dice_on_hit_message: String::new(),
            add_dice_title: String::new(),
            min_damage: 0,
            modifies_existing_roll: false,
            uses_magic: false,
            weapon_properties: WeaponProperties::empty(),
            carried_weapon: None,
        }
    }

    pub fn to_hit_modifier(&self) -> i32 {
        self.plus_modifier + self.attacking_ability_modifier + self.proficiency_bonus
    }

    /// Proficiency never applies to damage.
    pub fn damage_modifier(&self) -> i32 {
        self.plus_modifier + self.attacking_ability_modifier
    }

    pub fn uses_proficiency(&self) -> bool {
        self.proficiency_bonus != 0
    }

    pub fn windups_reversed(&self) -> Vec<Windup> {
        self.windups.iter().rev().cloned().collect()
    }

    /// Whether the shortcut can be used now. Blank means always.
    pub fn is_available(
        &self,
        rules: &RulesEngine,
        character: &Character,
    ) -> Result<bool, ExpressionError> {
        if self.available_when.trim().is_empty() {
            return Ok(true);
        }
        rules.evaluate_bool(&self.available_when, character)
    }

    /// Windups whose availability predicate is blank or currently true.
    pub fn available_windups(
        &self,
        rules: &RulesEngine,
        character: &Character,
    ) -> Result<Vec<Windup>, ExpressionError> {
        let mut available = Vec::with_capacity(self.windups.len());
        for windup in &self.windups {
            let predicate = windup.effect_available_when.trim();
            if predicate.is_empty() || rules.evaluate_bool(predicate, character)? {
                available.push(windup.clone());
            }
        }
        Ok(available)
    }

    /// Run the `;` separated command list against the character, in order.
    /// `spell` is the cast this shortcut makes, if any.
    pub fn execute_commands(
        &self,
        rules: &RulesEngine,
        character: &mut Character,
        spell: Option<&CastedSpell>,
    ) -> Result<(), ExpressionError> {
        rules.execute(&self.commands, character, None, spell)
    }
}
