//! The rule language.
//!
//! Spell, feature and shortcut data carry small snippets of this language:
//! conditions (`Level(Barbarian) >= 3 && !FeatureActive(Rage)`), message
//! templates (`$"{name} flies into a rage!"`) and commands
//! (`rages -= 1; ActivateFeature(Rage)`). Snippets are parsed into an
//! [`ast::Program`] and interpreted by the [`Evaluator`] against an
//! [`EvalContext`].
//!
//! Names are resolved through ordered [`Variable`] resolvers (first match
//! wins) and [`Function`] callables keyed by case-insensitive name.

pub mod ast;
pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod value;
pub mod variables;

pub use ast::{Expr, Program};
pub use evaluator::Evaluator;
pub use functions::Function;
pub use value::Value;
pub use variables::Variable;

use crate::character::Character;
use crate::rules::RulesEngine;
use crate::spells::CastedSpell;
use thiserror::Error;

/// A fieldless enum whose members can be named in rule expressions.
///
/// Implement with `#[derive(NamedVariants)]`.
pub trait NamedVariants: Sized + 'static {
    const TYPE_NAME: &'static str;

    fn variant_names() -> &'static [&'static str];

    fn variant_name(&self) -> &'static str;

    /// Look up a member by name, ignoring case and surrounding whitespace.
    fn from_variant_name(name: &str) -> Option<Self>;
}

/// Errors from parsing or evaluating a rule expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("Parse error in '{expression}' at {position}: {message}")]
    Parse {
        expression: String,
        position: usize,
        message: String,
    },

    #[error("Unknown name '{0}'")]
    UnknownToken(String),

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("{function} expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Unknown feature '{0}'")]
    UnknownFeature(String),

    #[error("'{0}' changes character state and is only allowed in commands")]
    ReadOnly(String),
}

/// The character an expression runs against.
#[derive(Debug)]
pub enum Subject<'a> {
    Shared(&'a Character),
    Exclusive(&'a mut Character),
}

/// Everything an expression can see while it runs.
pub struct EvalContext<'a> {
    pub rules: &'a RulesEngine,
    subject: Subject<'a>,
    pub target: Option<&'a Character>,
    pub spell: Option<&'a CastedSpell>,
}

impl<'a> EvalContext<'a> {
    /// A read-only context, for conditions and message templates.
    pub fn shared(rules: &'a RulesEngine, character: &'a Character) -> Self {
        Self {
            rules,
            subject: Subject::Shared(character),
            target: None,
            spell: None,
        }
    }

    /// A context that may change the character, for commands and hooks.
    pub fn exclusive(rules: &'a RulesEngine, character: &'a mut Character) -> Self {
        Self {
            rules,
            subject: Subject::Exclusive(character),
            target: None,
            spell: None,
        }
    }

    pub fn with_target(mut self, target: Option<&'a Character>) -> Self {
        self.target = target;
        self
    }

    pub fn with_spell(mut self, spell: Option<&'a CastedSpell>) -> Self {
        self.spell = spell;
        self
    }

    pub fn character(&self) -> &Character {
        match &self.subject {
            Subject::Shared(character) => *character,
            Subject::Exclusive(character) => &**character,
        }
    }

    /// Mutable access, refused for read-only contexts. `operation` names
    /// what was attempted, for the error.
    pub fn character_mut(&mut self, operation: &str) -> Result<&mut Character, ExpressionError> {
        match &mut self.subject {
            Subject::Exclusive(character) => Ok(&mut **character),
            Subject::Shared(_) => Err(ExpressionError::ReadOnly(operation.to_string())),
        }
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Value, ExpressionError> {
        let rules = self.rules;
        rules.evaluator().eval(expr, self)
    }

    /// Evaluate a name-like argument. A bare identifier that no variable
    /// resolves is taken as literal text, so `Level(Fighter)` works unquoted.
    pub fn eval_text(&mut self, expr: &Expr) -> Result<String, ExpressionError> {
        if let Expr::Variable(name) = expr {
            if !self.rules.evaluator().is_resolvable(name, self) {
                return Ok(name.clone());
            }
        }
        Ok(self.eval(expr)?.to_string())
    }

    pub fn eval_int(&mut self, expr: &Expr) -> Result<i64, ExpressionError> {
        let value = self.eval(expr)?;
        value.as_int().ok_or_else(|| {
            ExpressionError::TypeMismatch(format!("expected an integer, got {}", value.type_name()))
        })
    }
}

/// Check a call's argument count. `max` of `None` means no upper bound.
pub fn check_arity(
    function: &str,
    args: &[Expr],
    min: usize,
    max: Option<usize>,
) -> Result<(), ExpressionError> {
    let found = args.len();
    let ok = found >= min && max.map_or(true, |max| found <= max);
    if ok {
        return Ok(());
    }
    let expected = match max {
        Some(max) if max == min => min.to_string(),
        Some(max) => format!("{min} to {max}"),
        None => format!("at least {min}"),
    };
    Err(ExpressionError::Arity {
        function: function.to_string(),
        expected,
        found,
    })
}
