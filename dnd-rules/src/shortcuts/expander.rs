//! Expands shortcut sources into concrete shortcuts.
//!
//! A source name is resolved against the weapons catalog first, then the
//! spells the character knows, and otherwise becomes a command-only
//! shortcut. Output order is emission order: weapon modes in a fixed order,
//! spell slot levels ascending.

use super::{ActionShortcut, DiceRollType, ShortcutError, ShortcutIndexer, ShortcutSource};
use crate::catalog::Catalogs;
use crate::character::{CarriedWeapon, CharacterQuery};
use crate::dice::{compose, split_instant, Vantage};
use crate::features::FeatureDefinition;
use crate::spells::{SpellDefinition, SpellInstance, SpellType};
use crate::time::TurnPart;
use crate::weapons::{AttackType, WeaponDefinition, WeaponProperties};
use std::sync::Arc;

/// Highest spell slot level.
const MAX_SLOT_LEVEL: usize = 9;

/// Builds [`ActionShortcut`]s from catalog data and a character.
pub struct ShortcutExpander<'a> {
    catalogs: &'a Catalogs,
    indexer: &'a ShortcutIndexer,
}

impl<'a> ShortcutExpander<'a> {
    pub fn new(catalogs: &'a Catalogs, indexer: &'a ShortcutIndexer) -> Self {
        Self { catalogs, indexer }
    }

    /// Expand one source into its shortcuts.
    pub fn expand(
        &self,
        source: &ShortcutSource,
        character: &dyn CharacterQuery,
    ) -> Result<Vec<ActionShortcut>, ShortcutError> {
        let clean = clean_name(&source.name);

        let mut weapon = self.catalogs.weapons.get(&clean)?;
        if weapon.is_none() {
            if let Some((before, _)) = clean.split_once(" of ") {
                if !before.trim().is_empty() {
                    weapon = self.catalogs.weapons.get(before)?;
                }
            }
        }
        if let Some(weapon) = weapon {
            tracing::debug!(source = %source.name, weapon = %weapon.name, "weapon shortcut");
            return self.weapon_shortcuts(source, &weapon, character);
        }

        let spells: Vec<Arc<SpellDefinition>> = self
            .catalogs
            .spells
            .get_all(&clean)?
            .into_iter()
            .filter(|spell| character.knows_spell(&spell.name))
            .collect();
        if !spells.is_empty() {
            tracing::debug!(source = %source.name, matches = spells.len(), "spell shortcut");
            let mut shortcuts = Vec::new();
            for spell in spells {
                self.spell_shortcuts(source, spell, character, &mut shortcuts)?;
            }
            return Ok(shortcuts);
        }

        let mut shortcut = self.from_action(source, "");
        apply_dice(&mut shortcut, &source.die_str)?;
        Ok(vec![shortcut])
    }

    /// The shortcut that lets a player switch on a feature.
    pub fn from_feature(
        &self,
        feature: &FeatureDefinition,
        character: &dyn CharacterQuery,
    ) -> ActionShortcut {
        let mut shortcut = ActionShortcut::new(self.indexer.next(), feature.display_shortcut_name());
        shortcut.description = feature.description.clone();
        shortcut.player = character.name();
        shortcut.available_when = feature.shortcut_available_when.clone();
        shortcut.uses_magic = feature.magic;
        shortcut.part = feature.activation_time;
        shortcut.commands = format!(
            "ActivateFeature(\"{}\")",
            feature.name.replace('\\', "\\\\").replace('"', "\\\"")
        );
        shortcut
    }

    /// Shortcuts for a carried, possibly magic, weapon. The weapon's
    /// hit/damage bonus becomes every shortcut's flat bonus.
    pub fn from_carried_weapon(
        &self,
        carried: &CarriedWeapon,
        character: &dyn CharacterQuery,
    ) -> Result<Vec<ActionShortcut>, ShortcutError> {
        let Some(weapon) = self.catalogs.weapons.get(&carried.weapon)? else {
            tracing::warn!(weapon = %carried.weapon, "carried weapon is not in the catalog");
            return Ok(Vec::new());
        };

        let mut source = ShortcutSource::new(carried.display_name(), character.name())
            .with_plus_modifier(carried.hit_damage_bonus);
        source.roll_type = "Attack".to_string();

        let mut shortcuts = self.weapon_shortcuts(&source, &weapon, character)?;
        for shortcut in &mut shortcuts {
            shortcut.carried_weapon = Some(carried.clone());
            shortcut.uses_magic = carried.hit_damage_bonus > 0;
        }
        Ok(shortcuts)
    }

    // ========================================================================
    // Weapons
    // ========================================================================

    fn weapon_shortcuts(
        &self,
        source: &ShortcutSource,
        weapon: &WeaponDefinition,
        character: &dyn CharacterQuery,
    ) -> Result<Vec<ActionShortcut>, ShortcutError> {
        let one = weapon.damage_one_handed.as_str();
        let two = weapon.damage_two_handed.as_str();
        let declared = AttackType::declared_by(weapon.properties);

        let modes: Vec<(&str, &str, AttackType)> = if weapon.has(WeaponProperties::VERSATILE) {
            if weapon.has(WeaponProperties::MELEE | WeaponProperties::RANGED) {
                vec![
                    (one, " (1H Stabbed)", AttackType::MELEE),
                    (two, " (2H Slice)", AttackType::MELEE),
                    (one, " (1H Thrown)", AttackType::RANGE),
                ]
            } else {
                vec![(one, " (1H)", declared), (two, " (2H)", declared)]
            }
        } else if weapon.has(WeaponProperties::TWO_HANDED) {
            vec![(two, "", declared)]
        } else {
            vec![(one, "", declared)]
        };

        modes
            .into_iter()
            .map(|(damage, suffix, attack_type)| {
                self.from_weapon(source, weapon, character, damage, suffix, attack_type)
            })
            .collect()
    }

    fn from_weapon(
        &self,
        source: &ShortcutSource,
        weapon: &WeaponDefinition,
        character: &dyn CharacterQuery,
        damage: &str,
        suffix: &str,
        attack_type: AttackType,
    ) -> Result<ActionShortcut, ShortcutError> {
        let mut shortcut = self.from_action(source, suffix);
        shortcut.weapon_properties = weapon.properties;
        shortcut.attack_type = attack_type;

        if attack_type.intersects(AttackType::WEAPON_ATTACKS)
            && character.is_proficient_with(&weapon.name)
        {
            shortcut.proficiency_bonus = character.proficiency_bonus();
        }
        let (ability, modifier) = character.attacking_ability(weapon.properties, attack_type);
        shortcut.attacking_ability = Some(ability);
        shortcut.attacking_ability_modifier = modifier;

        let dice = if damage.trim().is_empty() {
            source.die_str.as_str()
        } else {
            damage
        };
        apply_dice(&mut shortcut, dice)?;
        Ok(shortcut)
    }

    // ========================================================================
    // Spells
    // ========================================================================

    fn spell_shortcuts(
        &self,
        source: &ShortcutSource,
        spell: Arc<SpellDefinition>,
        character: &dyn CharacterQuery,
        shortcuts: &mut Vec<ActionShortcut>,
    ) -> Result<(), ShortcutError> {
        let base = usize::from(spell.level).min(MAX_SLOT_LEVEL);
        if !spell.more_powerful_at_higher_levels {
            shortcuts.push(self.from_spell(source, spell, base, "", character)?);
            return Ok(());
        }

        let slots = character.spell_slot_levels();
        if slots[base] == 0 {
            // Still listed so the player can see it, though it can't be cast.
            shortcuts.push(self.from_spell(source, spell, base, "", character)?);
            return Ok(());
        }

        let levels: Vec<usize> = (base..=MAX_SLOT_LEVEL)
            .take_while(|&level| slots[level] > 0)
            .collect();
        let disambiguate = levels.len() > 1;
        for level in levels {
            let suffix = if disambiguate {
                format!(" [{level}]")
            } else {
                String::new()
            };
            shortcuts.push(self.from_spell(source, Arc::clone(&spell), level, &suffix, character)?);
        }
        Ok(())
    }

    fn from_spell(
        &self,
        source: &ShortcutSource,
        spell: Arc<SpellDefinition>,
        slot_level: usize,
        suffix: &str,
        character: &dyn CharacterQuery,
    ) -> Result<ActionShortcut, ShortcutError> {
        let mut shortcut = self.from_action(source, suffix);
        // MAX_SLOT_LEVEL fits in a u8.
        let slot_level = slot_level.min(MAX_SLOT_LEVEL) as u8;

        let instance = SpellInstance::new(
            Arc::clone(&spell),
            Some(slot_level),
            character.spellcasting_level(),
            Some(character.spellcasting_ability_modifier()),
        )
        .map_err(|source| ShortcutError::Dice {
            shortcut: shortcut.name.clone(),
            source,
        })?;

        shortcut.roll_type = spell_roll_type(&spell);
        shortcut.uses_magic = true;
        shortcut.part = instance.part;
        shortcut.spell_slot_level = Some(slot_level);
        shortcut.attacking_ability = character.spellcasting_ability();
        if !spell.description.trim().is_empty() {
            shortcut.description = spell.description.clone();
        }

        let dice = if source.die_str.trim().is_empty() {
            instance.die_str.clone()
        } else {
            source.die_str.clone()
        };
        shortcut.spell = Some(instance);
        apply_dice(&mut shortcut, &dice)?;
        Ok(shortcut)
    }

    // ========================================================================
    // Shared
    // ========================================================================

    /// The fields every shortcut copies from its source. Dice are left to
    /// the caller.
    fn from_action(&self, source: &ShortcutSource, suffix: &str) -> ActionShortcut {
        let mut shortcut =
            ActionShortcut::new(self.indexer.next(), format!("{}{suffix}", source.name));
        shortcut.description = source.description.clone();
        shortcut.player = source.player.clone();
        shortcut.part = TurnPart::from_time_code(&source.time);
        shortcut.roll_type = DiceRollType::parse(&source.roll_type);
        shortcut.vantage = Vantage::parse(&source.vantage_mod);
        shortcut.plus_modifier = source.plus_modifier;
        shortcut.modifies_existing_roll = source.roll_mod;
        shortcut.uses_magic = source.magic;
        shortcut.commands = source.commands.clone();
        shortcut.trailing_effects = source.trailing_effects.clone();
        shortcut.die_roll_effects = source.die_roll_effects.clone();
        shortcut.add_dice = source.add_dice.clone();
        shortcut.add_dice_on_hit = source.add_dice_on_hit.clone();
        shortcut.add_dice_on_hit_message = source.add_dice_on_hit_message.clone();
        shortcut.add_dice_title = source.add_dice_title.clone();
        shortcut.min_damage = source.min_damage;
        shortcut.available_when = source.available_when.clone();
        shortcut.windups = source.windups.clone();
        shortcut
    }
}

/// Fold the shortcut's damage modifier into `dice` and store it as the
/// trigger or instant dice.
fn apply_dice(shortcut: &mut ActionShortcut, dice: &str) -> Result<(), ShortcutError> {
    let (instant, dice) = split_instant(dice.trim());
    let composed =
        compose(dice, shortcut.damage_modifier()).map_err(|source| ShortcutError::Dice {
            shortcut: shortcut.name.clone(),
            source,
        })?;
    if instant {
        shortcut.instant_dice = composed;
    } else {
        shortcut.dice = composed;
    }
    Ok(())
}

fn spell_roll_type(spell: &SpellDefinition) -> DiceRollType {
    match spell.spell_type {
        SpellType::RangedSpell | SpellType::MeleeSpell => {
            if spell.name.trim().eq_ignore_ascii_case("Chaos Bolt") {
                DiceRollType::ChaosBolt
            } else {
                DiceRollType::Attack
            }
        }
        SpellType::SavingThrowSpell | SpellType::DamageSpell => DiceRollType::DamageOnly,
        SpellType::HpCapacitySpell => DiceRollType::ExtraOnly,
        SpellType::OtherSpell => DiceRollType::None,
    }
}

/// Strip decorations from an item name: a trailing `+N` magic bonus and
/// trailing `(...)` or `[...]` qualifiers.
pub fn clean_name(name: &str) -> String {
    let mut name = name.trim();
    loop {
        let before = name;
        for (open, close) in [('(', ')'), ('[', ']')] {
            if name.ends_with(close) {
                if let Some(start) = name.rfind(open) {
                    name = name[..start].trim_end();
                }
            }
        }
        if let Some((head, last)) = name.rsplit_once(char::is_whitespace) {
            let bonus = last.strip_prefix('+').unwrap_or("");
            if !bonus.is_empty() && bonus.chars().all(|c| c.is_ascii_digit()) {
                name = head.trim_end();
            }
        }
        if name == before {
            return name.to_string();
        }
    }
}
