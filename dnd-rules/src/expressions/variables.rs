//! Built-in variable resolvers.

use super::{EvalContext, ExpressionError, NamedVariants, Value};
use crate::character::CharacterQuery;
use std::marker::PhantomData;

/// Resolves one family of names to values.
pub trait Variable: Send + Sync {
    fn handles(&self, name: &str, ctx: &EvalContext<'_>) -> bool;

    fn value(&self, name: &str, ctx: &EvalContext<'_>) -> Result<Value, ExpressionError>;
}

/// Members of a [`NamedVariants`] enum, e.g. `athletics` or `Dexterity`.
pub struct EnumVariable<T>(PhantomData<fn() -> T>);

impl<T> EnumVariable<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for EnumVariable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: NamedVariants> Variable for EnumVariable<T> {
    fn handles(&self, name: &str, _ctx: &EvalContext<'_>) -> bool {
        T::from_variant_name(name).is_some()
    }

    fn value(&self, name: &str, _ctx: &EvalContext<'_>) -> Result<Value, ExpressionError> {
        T::from_variant_name(name)
            .map(|member| Value::from_variant(&member))
            .ok_or_else(|| ExpressionError::UnknownToken(name.to_string()))
    }
}

const CHARACTER_PROPERTIES: &[&str] = &[
    "name",
    "level",
    "proficiencyBonus",
    "spellcastingAbilityModifier",
    "spellcastingLevel",
];

/// Derived properties of the acting character.
pub struct CharacterProperties;

impl Variable for CharacterProperties {
    fn handles(&self, name: &str, _ctx: &EvalContext<'_>) -> bool {
        CHARACTER_PROPERTIES
            .iter()
            .any(|p| p.eq_ignore_ascii_case(name))
    }

    fn value(&self, name: &str, ctx: &EvalContext<'_>) -> Result<Value, ExpressionError> {
        let character = ctx.character();
        let value = match name.to_ascii_lowercase().as_str() {
            "name" => Value::Str(character.name.clone()),
            "level" => Value::Int(i64::from(character.level())),
            "proficiencybonus" => Value::Int(i64::from(character.proficiency_bonus())),
            "spellcastingabilitymodifier" => {
                Value::Int(i64::from(character.spellcasting_ability_modifier()))
            }
            "spellcastinglevel" => Value::Int(i64::from(character.spellcasting_level())),
            _ => return Err(ExpressionError::UnknownToken(name.to_string())),
        };
        Ok(value)
    }
}

/// Values written by rule-language assignments.
pub struct CharacterState;

impl Variable for CharacterState {
    fn handles(&self, name: &str, ctx: &EvalContext<'_>) -> bool {
        ctx.character().state_value(name).is_some()
    }

    fn value(&self, name: &str, ctx: &EvalContext<'_>) -> Result<Value, ExpressionError> {
        ctx.character()
            .state_value(name)
            .cloned()
            .ok_or_else(|| ExpressionError::UnknownToken(name.to_string()))
    }
}

/// `spellLevel` and `spellName`, while a spell is being cast.
pub struct CastedSpellVariables;

impl Variable for CastedSpellVariables {
    fn handles(&self, name: &str, ctx: &EvalContext<'_>) -> bool {
        ctx.spell.is_some()
            && (name.eq_ignore_ascii_case("spellLevel") || name.eq_ignore_ascii_case("spellName"))
    }

    fn value(&self, name: &str, ctx: &EvalContext<'_>) -> Result<Value, ExpressionError> {
        let spell = ctx
            .spell
            .ok_or_else(|| ExpressionError::UnknownToken(name.to_string()))?;
        if name.eq_ignore_ascii_case("spellLevel") {
            Ok(Value::Int(i64::from(spell.spell.slot_level)))
        } else {
            Ok(Value::Str(spell.spell.name().to_string()))
        }
    }
}
