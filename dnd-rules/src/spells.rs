//! Spell definitions and per-cast spell instances.

use crate::catalog::{de, CatalogEntry};
use crate::dice::{DiceError, DieRoll, DieRollDetails};
use crate::expressions::NamedVariants;
use crate::time::{DndTimeSpan, TurnPart};
use dnd_macros::NamedVariants;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Token in spell dice replaced by the caster's spellcasting modifier.
pub const SPELLCASTING_MODIFIER_TOKEN: &str = "spellcastingAbilityModifier";

/// Schools of magic in D&D.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, NamedVariants)]
pub enum SpellSchool {
    Abjuration,
    Conjuration,
    Divination,
    Enchantment,
    Evocation,
    Illusion,
    Necromancy,
    Transmutation,
}

/// How a spell is resolved at the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, NamedVariants)]
pub enum SpellType {
    RangedSpell,
    MeleeSpell,
    SavingThrowSpell,
    DamageSpell,
    HpCapacitySpell,
    #[default]
    OtherSpell,
}

/// One row of the spells table.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpellRow {
    pub name: String,
    #[serde(default, deserialize_with = "de::lenient_int")]
    pub level: i32,
    #[serde(default)]
    pub school: String,
    #[serde(default)]
    pub casting_time: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default, deserialize_with = "de::text")]
    pub range: String,
    #[serde(default)]
    pub components: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "de::text")]
    pub die_str: String,
    #[serde(default, deserialize_with = "de::text")]
    pub per_slot_level: String,
    #[serde(default, deserialize_with = "de::checked")]
    pub more_powerful_at_higher_levels: bool,
    #[serde(default, deserialize_with = "de::checked")]
    pub power_comes_from_caster_level: bool,
    #[serde(default)]
    pub spell_type: String,
}

/// An immutable spell definition.
#[derive(Debug, Clone, PartialEq)]
pub struct SpellDefinition {
    pub name: String,
    /// Base level, 0 for cantrips.
    pub level: u8,
    pub school: Option<SpellSchool>,
    pub casting_time: DndTimeSpan,
    pub duration: DndTimeSpan,
    pub range: String,
    pub components: String,
    pub description: String,
    pub die_str: String,
    /// Dice added once per slot level above the base level.
    pub per_slot_level: String,
    pub more_powerful_at_higher_levels: bool,
    pub power_comes_from_caster_level: bool,
    pub spell_type: SpellType,
}

impl SpellDefinition {
    pub fn new(name: impl Into<String>, level: u8, spell_type: SpellType) -> Self {
        Self {
            name: name.into(),
            level,
            school: None,
            casting_time: DndTimeSpan::Actions(1),
            duration: DndTimeSpan::Zero,
            range: String::new(),
            components: String::new(),
            description: String::new(),
            die_str: String::new(),
            per_slot_level: String::new(),
            more_powerful_at_higher_levels: false,
            power_comes_from_caster_level: false,
            spell_type,
        }
    }

    pub fn with_dice(mut self, die_str: &str) -> Self {
        self.die_str = die_str.to_string();
        self
    }

    pub fn with_upcast(mut self, per_slot_level: &str) -> Self {
        self.per_slot_level = per_slot_level.to_string();
        self.more_powerful_at_higher_levels = true;
        self
    }

    pub fn with_cantrip_scaling(mut self) -> Self {
        self.power_comes_from_caster_level = true;
        self
    }

    pub fn with_casting_time(mut self, casting_time: DndTimeSpan) -> Self {
        self.casting_time = casting_time;
        self
    }

    pub fn with_duration(mut self, duration: DndTimeSpan) -> Self {
        self.duration = duration;
        self
    }

    pub fn is_cantrip(&self) -> bool {
        self.level == 0
    }
}

impl CatalogEntry for SpellDefinition {
    type Row = SpellRow;

    fn from_row(row: SpellRow) -> Result<Self, String> {
        let level = u8::try_from(row.level)
            .ok()
            .filter(|level| *level <= 9)
            .ok_or_else(|| format!("spell level {} is outside 0-9", row.level))?;

        let school = match row.school.trim() {
            "" => None,
            school => Some(
                SpellSchool::from_variant_name(school)
                    .ok_or_else(|| format!("unknown spell school '{school}'"))?,
            ),
        };

        let spell_type = match row.spell_type.trim() {
            "" => SpellType::default(),
            spell_type => SpellType::from_variant_name(spell_type)
                .ok_or_else(|| format!("unknown spell type '{spell_type}'"))?,
        };

        Ok(Self {
            name: row.name.trim().to_string(),
            level,
            school,
            casting_time: DndTimeSpan::from_duration_str(&row.casting_time),
            duration: DndTimeSpan::from_duration_str(&row.duration),
            range: row.range,
            components: row.components,
            description: row.description,
            die_str: row.die_str,
            per_slot_level: row.per_slot_level,
            more_powerful_at_higher_levels: row.more_powerful_at_higher_levels,
            power_comes_from_caster_level: row.power_comes_from_caster_level,
            spell_type,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Number of times a cantrip's dice are multiplied at a caster level.
pub fn cantrip_dice_multiplier(caster_level: u8) -> u32 {
    match caster_level {
        0..=4 => 1,
        5..=10 => 2,
        11..=16 => 3,
        _ => 4,
    }
}

/// A spell bound to a slot level, caster level and casting modifier.
#[derive(Debug, Clone, PartialEq)]
pub struct SpellInstance {
    pub definition: Arc<SpellDefinition>,
    pub slot_level: u8,
    pub caster_level: u8,
    pub casting_modifier: i32,
    /// Dice after cantrip scaling, upcasting and modifier substitution.
    pub die_str: String,
    pub part: TurnPart,
}

impl SpellInstance {
    /// Bind `definition` for one cast. A missing slot level casts at the
    /// spell's base level; a missing modifier is zero.
    pub fn new(
        definition: Arc<SpellDefinition>,
        slot_level: Option<u8>,
        caster_level: u8,
        casting_modifier: Option<i32>,
    ) -> Result<Self, DiceError> {
        let slot_level = slot_level.unwrap_or(definition.level);
        let casting_modifier = casting_modifier.unwrap_or(0);
        let die_str = Self::scaled_dice(&definition, slot_level, caster_level, casting_modifier)?;
        let part = definition.casting_time.turn_part();

        Ok(Self {
            definition,
            slot_level,
            caster_level,
            casting_modifier,
            die_str,
            part,
        })
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    fn scaled_dice(
        definition: &SpellDefinition,
        slot_level: u8,
        caster_level: u8,
        casting_modifier: i32,
    ) -> Result<String, DiceError> {
        let substituted = replace_ignore_case(
            &definition.die_str,
            SPELLCASTING_MODIFIER_TOKEN,
            &casting_modifier.to_string(),
        );
        let mut details = DieRollDetails::parse(&substituted)?;
        let mut changed = false;

        if definition.power_comes_from_caster_level {
            if let Some(component) = details
                .rolls
                .first_mut()
                .and_then(|roll| roll.components.first_mut())
            {
                component.count = component
                    .count
                    .checked_mul(cantrip_dice_multiplier(caster_level))
                    .ok_or_else(|| DiceError::Overflow(definition.die_str.clone()))?;
                changed = true;
            }
        }

        let levels_above_base = slot_level.saturating_sub(definition.level);
        if definition.more_powerful_at_higher_levels
            && levels_above_base > 0
            && !definition.per_slot_level.trim().is_empty()
        {
            let extra = DieRollDetails::parse(&definition.per_slot_level)?;
            let levels = u32::from(levels_above_base);
            if details.rolls.is_empty() {
                details.rolls.push(DieRoll {
                    components: Vec::new(),
                    offset: 0,
                    label: None,
                });
            }
            if let Some(first) = details.rolls.first_mut() {
                let overflow = || DiceError::Overflow(definition.per_slot_level.clone());
                for component in extra.rolls.iter().flat_map(|r| r.components.iter()) {
                    let count = component.count.checked_mul(levels).ok_or_else(overflow)?;
                    first.add_dice(count, component.die_type)?;
                }
                let offset = extra
                    .rolls
                    .iter()
                    .try_fold(0i32, |total, r| total.checked_add(r.offset))
                    .and_then(|total| total.checked_mul(i32::from(levels_above_base)))
                    .ok_or_else(overflow)?;
                first.add_offset(offset)?;
                changed = true;
            }
        }

        if details.is_empty() {
            Ok(substituted)
        } else if changed || substituted != definition.die_str {
            Ok(details.to_string())
        } else {
            Ok(definition.die_str.clone())
        }
    }
}

/// A spell being cast, as passed to on-cast feature hooks.
#[derive(Debug, Clone, PartialEq)]
pub struct CastedSpell {
    pub spell: SpellInstance,
    pub target: Option<String>,
}

impl CastedSpell {
    pub fn new(spell: SpellInstance) -> Self {
        Self {
            spell,
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

fn replace_ignore_case(text: &str, token: &str, replacement: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let token_lower = token.to_ascii_lowercase();
    let mut result = String::with_capacity(text.len());
    let mut last = 0;
    for (start, _) in lower.match_indices(&token_lower) {
        result.push_str(&text[last..start]);
        result.push_str(replacement);
        last = start + token.len();
    }
    result.push_str(&text[last..]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fireball() -> Arc<SpellDefinition> {
        Arc::new(
            SpellDefinition::new("Fireball", 3, SpellType::SavingThrowSpell)
                .with_dice("8d6(fire)")
                .with_upcast("1d6"),
        )
    }

    #[test]
    fn test_base_level_when_slot_unspecified() {
        let spell = SpellInstance::new(fireball(), None, 5, None).unwrap();
        assert_eq!(spell.slot_level, 3);
        assert_eq!(spell.die_str, "8d6(fire)");
        assert_eq!(spell.part, TurnPart::Action);
    }

    #[test]
    fn test_upcast_adds_dice_per_level() {
        let spell = SpellInstance::new(fireball(), Some(5), 9, None).unwrap();
        assert_eq!(spell.die_str, "10d6(fire)");
    }

    #[test]
    fn test_upcast_never_applies_below_base() {
        let spell = SpellInstance::new(fireball(), Some(1), 9, None).unwrap();
        assert_eq!(spell.die_str, "8d6(fire)");
    }

    #[test]
    fn test_upcast_appends_new_die_size() {
        let def = Arc::new(
            SpellDefinition::new("Odd Bolt", 1, SpellType::RangedSpell)
                .with_dice("2d8")
                .with_upcast("1d4+1"),
        );
        let spell = SpellInstance::new(def, Some(3), 5, None).unwrap();
        assert_eq!(spell.die_str, "2d8+2d4+2");
    }

    #[test]
    fn test_cantrip_scaling_tiers() {
        let def = Arc::new(
            SpellDefinition::new("Fire Bolt", 0, SpellType::RangedSpell)
                .with_dice("1d10(fire)")
                .with_cantrip_scaling(),
        );
        let dice = |level| {
            SpellInstance::new(Arc::clone(&def), None, level, None)
                .unwrap()
                .die_str
        };
        assert_eq!(dice(1), "1d10(fire)");
        assert_eq!(dice(5), "2d10(fire)");
        assert_eq!(dice(11), "3d10(fire)");
        assert_eq!(dice(17), "4d10(fire)");
    }

    #[test]
    fn test_modifier_substitution() {
        let def = Arc::new(
            SpellDefinition::new("Cure Wounds", 1, SpellType::HpCapacitySpell)
                .with_dice("1d8+SpellcastingAbilityModifier")
                .with_upcast("1d8"),
        );
        let spell = SpellInstance::new(Arc::clone(&def), Some(2), 3, Some(3)).unwrap();
        assert_eq!(spell.die_str, "2d8+3");

        let spell = SpellInstance::new(def, None, 3, None).unwrap();
        assert_eq!(spell.die_str, "1d8");
    }

    #[test]
    fn test_non_dice_spell_is_unchanged() {
        let def = Arc::new(SpellDefinition::new("Shield", 1, SpellType::OtherSpell));
        let spell = SpellInstance::new(def, Some(2), 3, Some(4)).unwrap();
        assert_eq!(spell.die_str, "");
    }

    #[test]
    fn test_oversized_dice_are_errors() {
        let huge_cantrip = Arc::new(
            SpellDefinition::new("Storm Bolt", 0, SpellType::RangedSpell)
                .with_dice("3000000000d6")
                .with_cantrip_scaling(),
        );
        assert!(matches!(
            SpellInstance::new(huge_cantrip, None, 5, None),
            Err(DiceError::Overflow(_))
        ));

        let huge_modifier = Arc::new(
            SpellDefinition::new("Cure Everything", 1, SpellType::HpCapacitySpell)
                .with_dice("1d8+2147483647+spellcastingAbilityModifier"),
        );
        assert!(matches!(
            SpellInstance::new(huge_modifier, None, 5, Some(3)),
            Err(DiceError::Overflow(_))
        ));
    }

    #[test]
    fn test_row_rejects_level_above_nine() {
        let row: SpellRow = serde_json::from_value(serde_json::json!({
            "name": "Wish Plus",
            "level": 10,
        }))
        .unwrap();
        assert!(SpellDefinition::from_row(row).is_err());
    }

    #[test]
    fn test_row_parses_fields() {
        let row: SpellRow = serde_json::from_value(serde_json::json!({
            "name": "Misty Step",
            "level": "2",
            "school": "conjuration",
            "castingTime": "1 bonus action",
            "spellType": "OtherSpell",
        }))
        .unwrap();
        let spell = SpellDefinition::from_row(row).unwrap();
        assert_eq!(spell.level, 2);
        assert_eq!(spell.school, Some(SpellSchool::Conjuration));
        assert_eq!(spell.casting_time.turn_part(), TurnPart::BonusAction);
    }
}
