//! Characters and the query surface the rules engine reads them through.

use crate::expressions::Value;
use crate::features::FeatureInstance;
use crate::shortcuts::ActionShortcut;
use crate::weapons::{AttackType, WeaponProperties};
use dnd_macros::NamedVariants;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacterId(pub Uuid);

impl CharacterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Ability Scores
// ============================================================================

/// The six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, NamedVariants)]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

/// Ability scores container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: u8,
    pub dexterity: u8,
    pub constitution: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub charisma: u8,
}

impl AbilityScores {
    pub fn new(str: u8, dex: u8, con: u8, int: u8, wis: u8, cha: u8) -> Self {
        Self {
            strength: str,
            dexterity: dex,
            constitution: con,
            intelligence: int,
            wisdom: wis,
            charisma: cha,
        }
    }

    pub fn get(&self, ability: Ability) -> u8 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    pub fn modifier(&self, ability: Ability) -> i32 {
        // Floor division: 8-9 = -1, 10-11 = 0, 12-13 = +1.
        (i32::from(self.get(ability)) - 10).div_euclid(2)
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::new(10, 10, 10, 10, 10, 10)
    }
}

// ============================================================================
// Skills
// ============================================================================

/// D&D 5e skills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, NamedVariants)]
pub enum Skill {
    Athletics,
    Acrobatics,
    SleightOfHand,
    Stealth,
    Arcana,
    History,
    Investigation,
    Nature,
    Religion,
    AnimalHandling,
    Insight,
    Medicine,
    Perception,
    Survival,
    Deception,
    Intimidation,
    Performance,
    Persuasion,
}

impl Skill {
    pub fn ability(&self) -> Ability {
        match self {
            Skill::Athletics => Ability::Strength,
            Skill::Acrobatics | Skill::SleightOfHand | Skill::Stealth => Ability::Dexterity,
            Skill::Arcana
            | Skill::History
            | Skill::Investigation
            | Skill::Nature
            | Skill::Religion => Ability::Intelligence,
            Skill::AnimalHandling
            | Skill::Insight
            | Skill::Medicine
            | Skill::Perception
            | Skill::Survival => Ability::Wisdom,
            Skill::Deception | Skill::Intimidation | Skill::Performance | Skill::Persuasion => {
                Ability::Charisma
            }
        }
    }
}

// ============================================================================
// Equipment and Classes
// ============================================================================

/// Levels taken in one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLevel {
    pub class: String,
    pub level: u8,
}

/// A weapon the character carries, possibly magic or renamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarriedWeapon {
    /// Display name, e.g. "Flaming Longsword". Falls back to the weapon name.
    #[serde(default)]
    pub name: Option<String>,
    /// Weapons catalog name.
    pub weapon: String,
    #[serde(default)]
    pub hit_damage_bonus: i32,
}

impl CarriedWeapon {
    pub fn new(weapon: impl Into<String>) -> Self {
        Self {
            name: None,
            weapon: weapon.into(),
            hit_damage_bonus: 0,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.weapon)
    }
}

// ============================================================================
// Character
// ============================================================================

/// A player character as seen by the rules engine.
///
/// Feature instances and shortcuts are runtime state: they are not
/// serialised and are rebuilt by the engine after loading.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    #[serde(default)]
    pub id: CharacterId,
    pub name: String,
    #[serde(default)]
    pub ability_scores: AbilityScores,
    #[serde(default)]
    pub classes: Vec<ClassLevel>,
    #[serde(default)]
    pub spellcasting_ability: Option<Ability>,
    /// Available slots per spell level; index 0 is cantrips.
    #[serde(default)]
    pub spell_slots: [u8; 10],
    #[serde(default)]
    pub known_spells: Vec<String>,
    #[serde(default)]
    pub weapon_proficiencies: Vec<String>,
    #[serde(default)]
    pub skill_proficiencies: Vec<Skill>,
    #[serde(default)]
    pub carried_weapons: Vec<CarriedWeapon>,
    /// Feature source names, e.g. `Rage` or `FavoredEnemy(Orcs)`.
    #[serde(default, rename = "features")]
    pub feature_names: Vec<String>,
    /// Named values written by rule-language assignments. Keys are lowercase.
    #[serde(default)]
    pub state: BTreeMap<String, Value>,
    #[serde(skip)]
    pub features: Vec<FeatureInstance>,
    #[serde(skip)]
    pub shortcuts: Vec<ActionShortcut>,
}

impl Character {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: CharacterId::new(),
            name: name.into(),
            ability_scores: AbilityScores::default(),
            classes: Vec::new(),
            spellcasting_ability: None,
            spell_slots: [0; 10],
            known_spells: Vec::new(),
            weapon_proficiencies: Vec::new(),
            skill_proficiencies: Vec::new(),
            carried_weapons: Vec::new(),
            feature_names: Vec::new(),
            state: BTreeMap::new(),
            features: Vec::new(),
            shortcuts: Vec::new(),
        }
    }

    pub fn with_ability_scores(mut self, scores: AbilityScores) -> Self {
        self.ability_scores = scores;
        self
    }

    pub fn with_class(mut self, class: impl Into<String>, level: u8) -> Self {
        self.classes.push(ClassLevel {
            class: class.into(),
            level,
        });
        self
    }

    pub fn with_spellcasting_ability(mut self, ability: Ability) -> Self {
        self.spellcasting_ability = Some(ability);
        self
    }

    pub fn with_spell_slots(mut self, level: usize, count: u8) -> Self {
        if let Some(slot) = self.spell_slots.get_mut(level) {
            *slot = count;
        }
        self
    }

    pub fn with_known_spell(mut self, spell: impl Into<String>) -> Self {
        self.known_spells.push(spell.into());
        self
    }

    pub fn with_weapon_proficiency(mut self, weapon: impl Into<String>) -> Self {
        self.weapon_proficiencies.push(weapon.into());
        self
    }

    pub fn with_skill_proficiency(mut self, skill: Skill) -> Self {
        self.skill_proficiencies.push(skill);
        self
    }

    pub fn with_carried_weapon(mut self, weapon: CarriedWeapon) -> Self {
        self.carried_weapons.push(weapon);
        self
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.feature_names.push(feature.into());
        self
    }

    /// Total character level across all classes.
    pub fn level(&self) -> u8 {
        self.classes.iter().map(|c| c.level).sum()
    }

    /// Levels taken in the named class, ignoring case.
    pub fn class_level(&self, class: &str) -> u8 {
        let class = class.trim();
        self.classes
            .iter()
            .filter(|c| c.class.eq_ignore_ascii_case(class))
            .map(|c| c.level)
            .sum()
    }

    pub fn is_proficient_in(&self, skill: Skill) -> bool {
        self.skill_proficiencies.contains(&skill)
    }

    /// Spend one slot of `level`. Returns false if none are left.
    pub fn use_spell_slot(&mut self, level: usize) -> bool {
        match self.spell_slots.get_mut(level) {
            Some(slots) if *slots > 0 => {
                *slots -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn state_value(&self, name: &str) -> Option<&Value> {
        self.state.get(&name.trim().to_lowercase())
    }

    pub fn set_state(&mut self, name: &str, value: Value) {
        self.state.insert(name.trim().to_lowercase(), value);
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureInstance> {
        self.feature_index(name).map(|i| &self.features[i])
    }

    pub fn feature_index(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.features
            .iter()
            .position(|f| f.definition.name.eq_ignore_ascii_case(name))
    }

    pub fn is_feature_active(&self, name: &str) -> bool {
        self.feature(name).is_some_and(|f| f.active)
    }
}

/// Read-only view of a character used when expanding shortcuts.
#[cfg_attr(test, mockall::automock)]
pub trait CharacterQuery {
    fn name(&self) -> String;

    fn spellcasting_level(&self) -> u8;

    fn spellcasting_ability(&self) -> Option<Ability>;

    fn spellcasting_ability_modifier(&self) -> i32;

    /// Available slots at each spell level 0-9.
    fn spell_slot_levels(&self) -> [u8; 10];

    fn is_proficient_with(&self, weapon: &str) -> bool;

    /// The ability used to attack with a weapon, and its modifier.
    fn attacking_ability(
        &self,
        properties: WeaponProperties,
        attack_type: AttackType,
    ) -> (Ability, i32);

    fn proficiency_bonus(&self) -> i32;

    fn knows_spell(&self, spell: &str) -> bool;
}

impl CharacterQuery for Character {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn spellcasting_level(&self) -> u8 {
        self.level()
    }

    fn spellcasting_ability(&self) -> Option<Ability> {
        self.spellcasting_ability
    }

    fn spellcasting_ability_modifier(&self) -> i32 {
        self.spellcasting_ability
            .map(|ability| self.ability_scores.modifier(ability))
            .unwrap_or(0)
    }

    fn spell_slot_levels(&self) -> [u8; 10] {
        self.spell_slots
    }

    fn is_proficient_with(&self, weapon: &str) -> bool {
        let weapon = weapon.trim();
        self.weapon_proficiencies
            .iter()
            .any(|w| w.trim().eq_ignore_ascii_case(weapon))
    }

    fn attacking_ability(
        &self,
        properties: WeaponProperties,
        attack_type: AttackType,
    ) -> (Ability, i32) {
        let scores = &self.ability_scores;
        let ability = if properties.contains(WeaponProperties::FINESSE) {
            if scores.modifier(Ability::Dexterity) > scores.modifier(Ability::Strength) {
                Ability::Dexterity
            } else {
                Ability::Strength
            }
        } else if attack_type.is_ranged() {
            Ability::Dexterity
        } else {
            Ability::Strength
        };
        (ability, scores.modifier(ability))
    }

    fn proficiency_bonus(&self) -> i32 {
        match self.level() {
            0..=4 => 2,
            5..=8 => 3,
            9..=12 => 4,
            13..=16 => 5,
            // Level 17+ caps at proficiency bonus 6
            _ => 6,
        }
    }

    fn knows_spell(&self, spell: &str) -> bool {
        let spell = spell.trim();
        self.known_spells
            .iter()
            .any(|s| s.trim().eq_ignore_ascii_case(spell))
    }
}
