//! Built-in rule-language functions.

use super::{check_arity, EvalContext, Expr, ExpressionError, Value};
use crate::character::Skill;

/// A named callable. Arguments arrive unevaluated so a function can treat
/// bare names as text or skip evaluation entirely.
pub trait Function: Send + Sync {
    fn name(&self) -> &'static str;

    fn call(&self, args: &[Expr], ctx: &mut EvalContext<'_>) -> Result<Value, ExpressionError>;
}

/// `Level(class)`: levels the character has in a class.
pub struct LevelFunction;

impl Function for LevelFunction {
    fn name(&self) -> &'static str {
        "Level"
    }

    fn call(&self, args: &[Expr], ctx: &mut EvalContext<'_>) -> Result<Value, ExpressionError> {
        check_arity(self.name(), args, 1, Some(1))?;
        let class = ctx.eval_text(&args[0])?;
        Ok(Value::Int(i64::from(ctx.character().class_level(&class))))
    }
}

/// Feature name plus the remaining arguments joined as a parameter list.
fn feature_call(
    args: &[Expr],
    ctx: &mut EvalContext<'_>,
) -> Result<(String, String), ExpressionError> {
    let name = ctx.eval_text(&args[0])?;
    let mut parameters = Vec::with_capacity(args.len() - 1);
    for arg in &args[1..] {
        parameters.push(ctx.eval_text(arg)?);
    }
    Ok((name, parameters.join(", ")))
}

/// `ActivateFeature(name, args...)`
pub struct ActivateFeatureFunction;

impl Function for ActivateFeatureFunction {
    fn name(&self) -> &'static str {
        "ActivateFeature"
    }

    fn call(&self, args: &[Expr], ctx: &mut EvalContext<'_>) -> Result<Value, ExpressionError> {
        check_arity(self.name(), args, 1, None)?;
        let (feature, arguments) = feature_call(args, ctx)?;
        let rules = ctx.rules;
        let character = ctx.character_mut(self.name())?;
        rules.activate_feature(character, &feature, &arguments, false)?;
        Ok(Value::Bool(true))
    }
}

/// `DeactivateFeature(name, args...)`
pub struct DeactivateFeatureFunction;

impl Function for DeactivateFeatureFunction {
    fn name(&self) -> &'static str {
        "DeactivateFeature"
    }

    fn call(&self, args: &[Expr], ctx: &mut EvalContext<'_>) -> Result<Value, ExpressionError> {
        check_arity(self.name(), args, 1, None)?;
        let (feature, arguments) = feature_call(args, ctx)?;
        let rules = ctx.rules;
        let character = ctx.character_mut(self.name())?;
        rules.deactivate_feature(character, &feature, &arguments, false)?;
        Ok(Value::Bool(true))
    }
}

/// `FeatureActive(name)`: false for features the character doesn't have.
pub struct FeatureActiveFunction;

impl Function for FeatureActiveFunction {
    fn name(&self) -> &'static str {
        "FeatureActive"
    }

    fn call(&self, args: &[Expr], ctx: &mut EvalContext<'_>) -> Result<Value, ExpressionError> {
        check_arity(self.name(), args, 1, Some(1))?;
        let feature = ctx.eval_text(&args[0])?;
        Ok(Value::Bool(ctx.character().is_feature_active(&feature)))
    }
}

/// `TellDm(message)`: post a message to the dungeon master.
pub struct TellDmFunction;

impl Function for TellDmFunction {
    fn name(&self) -> &'static str {
        "TellDm"
    }

    fn call(&self, args: &[Expr], ctx: &mut EvalContext<'_>) -> Result<Value, ExpressionError> {
        check_arity(self.name(), args, 1, Some(1))?;
        let message = ctx.eval(&args[0])?.to_string();
        let source = ctx.character().name.clone();
        ctx.rules.events().notify(source, message);
        Ok(Value::Bool(true))
    }
}

fn slot_level(function: &str, level: i64) -> Result<usize, ExpressionError> {
    usize::try_from(level)
        .ok()
        .filter(|level| *level <= 9)
        .ok_or_else(|| {
            ExpressionError::TypeMismatch(format!("{function}: spell level {level} is outside 0-9"))
        })
}

/// `SpellSlots(level)`: slots left at a level.
pub struct SpellSlotsFunction;

impl Function for SpellSlotsFunction {
    fn name(&self) -> &'static str {
        "SpellSlots"
    }

    fn call(&self, args: &[Expr], ctx: &mut EvalContext<'_>) -> Result<Value, ExpressionError> {
        check_arity(self.name(), args, 1, Some(1))?;
        let level = slot_level(self.name(), ctx.eval_int(&args[0])?)?;
        Ok(Value::Int(i64::from(ctx.character().spell_slots[level])))
    }
}

/// `UseSpellSlot(level)`: spend a slot, false if none are left.
pub struct UseSpellSlotFunction;

impl Function for UseSpellSlotFunction {
    fn name(&self) -> &'static str {
        "UseSpellSlot"
    }

    fn call(&self, args: &[Expr], ctx: &mut EvalContext<'_>) -> Result<Value, ExpressionError> {
        check_arity(self.name(), args, 1, Some(1))?;
        let level = slot_level(self.name(), ctx.eval_int(&args[0])?)?;
        let character = ctx.character_mut(self.name())?;
        Ok(Value::Bool(character.use_spell_slot(level)))
    }
}

/// `IsProficient(skill)`
pub struct IsProficientFunction;

impl Function for IsProficientFunction {
    fn name(&self) -> &'static str {
        "IsProficient"
    }

    fn call(&self, args: &[Expr], ctx: &mut EvalContext<'_>) -> Result<Value, ExpressionError> {
        check_arity(self.name(), args, 1, Some(1))?;
        let value = ctx.eval(&args[0])?;
        let skill = value
            .as_variant::<Skill>()
            .ok_or_else(|| ExpressionError::UnknownToken(value.to_string()))?;
        Ok(Value::Bool(ctx.character().is_proficient_in(skill)))
    }
}

fn numeric_pair(
    function: &str,
    args: &[Expr],
    ctx: &mut EvalContext<'_>,
) -> Result<(Value, Value), ExpressionError> {
    check_arity(function, args, 2, Some(2))?;
    let a = ctx.eval(&args[0])?;
    let b = ctx.eval(&args[1])?;
    if a.as_float().is_none() || b.as_float().is_none() {
        return Err(ExpressionError::TypeMismatch(format!(
            "{function} expects numbers, got {} and {}",
            a.type_name(),
            b.type_name()
        )));
    }
    Ok((a, b))
}

fn pick(a: Value, b: Value, take_first: impl Fn(f64, f64) -> bool) -> Value {
    match (a.as_int(), b.as_int()) {
        (Some(x), Some(y)) => Value::Int(if take_first(x as f64, y as f64) { x } else { y }),
        _ => {
            let (x, y) = (a.as_float().unwrap_or_default(), b.as_float().unwrap_or_default());
            Value::Float(if take_first(x, y) { x } else { y })
        }
    }
}

/// `Min(a, b)`
pub struct MinFunction;

impl Function for MinFunction {
    fn name(&self) -> &'static str {
        "Min"
    }

    fn call(&self, args: &[Expr], ctx: &mut EvalContext<'_>) -> Result<Value, ExpressionError> {
        let (a, b) = numeric_pair(self.name(), args, ctx)?;
        Ok(pick(a, b, |x, y| x <= y))
    }
}

/// `Max(a, b)`
pub struct MaxFunction;

impl Function for MaxFunction {
    fn name(&self) -> &'static str {
        "Max"
    }

    fn call(&self, args: &[Expr], ctx: &mut EvalContext<'_>) -> Result<Value, ExpressionError> {
        let (a, b) = numeric_pair(self.name(), args, ctx)?;
        Ok(pick(a, b, |x, y| x >= y))
    }
}
