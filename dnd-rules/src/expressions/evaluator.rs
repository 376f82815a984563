//! Tree-walking interpreter for rule-language programs.

use super::ast::{AssignOp, BinaryOp, Expr, Part, Program, Statement, UnaryOp};
use super::functions::{
    ActivateFeatureFunction, DeactivateFeatureFunction, FeatureActiveFunction, Function,
    IsProficientFunction, LevelFunction, MaxFunction, MinFunction, SpellSlotsFunction,
    TellDmFunction, UseSpellSlotFunction,
};
use super::variables::{
    CastedSpellVariables, CharacterProperties, CharacterState, EnumVariable, Variable,
};
use super::{EvalContext, ExpressionError, Value};
use crate::character::{Ability, Skill};
use std::collections::HashMap;
use std::fmt;

/// Ordered variable resolvers and named functions.
pub struct Evaluator {
    variables: Vec<Box<dyn Variable>>,
    functions: HashMap<String, Box<dyn Function>>,
}

impl Evaluator {
    /// An evaluator with nothing registered.
    pub fn empty() -> Self {
        Self {
            variables: Vec::new(),
            functions: HashMap::new(),
        }
    }

    /// An evaluator with the built-in variables and functions.
    pub fn standard() -> Self {
        let mut evaluator = Self::empty();

        evaluator.register_variable(EnumVariable::<Skill>::new());
        evaluator.register_variable(EnumVariable::<Ability>::new());
        evaluator.register_variable(CharacterProperties);
        evaluator.register_variable(CharacterState);
        evaluator.register_variable(CastedSpellVariables);

        evaluator.register_function(LevelFunction);
        evaluator.register_function(ActivateFeatureFunction);
        evaluator.register_function(DeactivateFeatureFunction);
        evaluator.register_function(FeatureActiveFunction);
        evaluator.register_function(TellDmFunction);
        evaluator.register_function(SpellSlotsFunction);
        evaluator.register_function(UseSpellSlotFunction);
        evaluator.register_function(IsProficientFunction);
        evaluator.register_function(MinFunction);
        evaluator.register_function(MaxFunction);

        evaluator
    }

    /// Add a resolver after the existing ones.
    pub fn register_variable(&mut self, variable: impl Variable + 'static) {
        self.variables.push(Box::new(variable));
    }

    /// Add or replace a function.
    pub fn register_function(&mut self, function: impl Function + 'static) {
        self.functions
            .insert(function.name().to_lowercase(), Box::new(function));
    }

    /// Parse and run `source`, returning the value of the last statement.
    /// Blank programs return `None`.
    pub fn run(
        &self,
        source: &str,
        ctx: &mut EvalContext<'_>,
    ) -> Result<Option<Value>, ExpressionError> {
        let program = Program::parse(source)?;
        let mut last = None;
        for statement in &program.statements {
            last = Some(self.statement(statement, ctx)?);
        }
        Ok(last)
    }

    pub fn is_resolvable(&self, name: &str, ctx: &EvalContext<'_>) -> bool {
        self.variables.iter().any(|v| v.handles(name, ctx))
    }

    fn resolve(&self, name: &str, ctx: &EvalContext<'_>) -> Result<Value, ExpressionError> {
        match self.variables.iter().find(|v| v.handles(name, ctx)) {
            Some(variable) => variable.value(name, ctx),
            None => Err(ExpressionError::UnknownToken(name.to_string())),
        }
    }

    fn statement(
        &self,
        statement: &Statement,
        ctx: &mut EvalContext<'_>,
    ) -> Result<Value, ExpressionError> {
        match statement {
            Statement::Expr(expr) => self.eval(expr, ctx),
            Statement::Assign { name, op, value } => {
                let value = self.eval(value, ctx)?;
                let value = match op {
                    AssignOp::Set => value,
                    AssignOp::Add | AssignOp::Sub => {
                        let current = ctx
                            .character()
                            .state_value(name)
                            .cloned()
                            .unwrap_or(Value::Int(0));
                        let op = if *op == AssignOp::Add {
                            BinaryOp::Add
                        } else {
                            BinaryOp::Sub
                        };
                        if current.as_float().is_none() {
                            return Err(ExpressionError::TypeMismatch(format!(
                                "cannot apply {op:?} to {name}, which holds a {}",
                                current.type_name()
                            )));
                        }
                        arithmetic(op, current, value)?
                    }
                };
                let character = ctx.character_mut(&format!("{name} ="))?;
                character.set_state(name, value.clone());
                Ok(value)
            }
        }
    }

    pub fn eval(&self, expr: &Expr, ctx: &mut EvalContext<'_>) -> Result<Value, ExpressionError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Variable(name) => self.resolve(name, ctx),
            Expr::Call { name, args } => {
                let function = self
                    .functions
                    .get(&name.to_lowercase())
                    .ok_or_else(|| ExpressionError::UnknownFunction(name.clone()))?;
                function.call(args, ctx)
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, ctx)?;
                match (op, value) {
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnaryOp::Negate, Value::Int(n)) => n
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| ExpressionError::TypeMismatch("integer overflow".into())),
                    (UnaryOp::Negate, Value::Float(n)) => Ok(Value::Float(-n)),
                    (op, value) => Err(ExpressionError::TypeMismatch(format!(
                        "cannot apply {op:?} to {}",
                        value.type_name()
                    ))),
                }
            }
            Expr::Binary { op, left, right } => match op {
                BinaryOp::And | BinaryOp::Or => {
                    let left = self.eval_boolean(left, ctx)?;
                    // Short-circuit.
                    if (*op == BinaryOp::And && !left) || (*op == BinaryOp::Or && left) {
                        return Ok(Value::Bool(left));
                    }
                    Ok(Value::Bool(self.eval_boolean(right, ctx)?))
                }
                _ => {
                    let left = self.eval(left, ctx)?;
                    let right = self.eval(right, ctx)?;
                    binary(*op, left, right)
                }
            },
            Expr::Interpolated(parts) => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        Part::Text(s) => text.push_str(s),
                        Part::Expr(expr) => text.push_str(&self.eval(expr, ctx)?.to_string()),
                    }
                }
                Ok(Value::Str(text))
            }
        }
    }

    fn eval_boolean(&self, expr: &Expr, ctx: &mut EvalContext<'_>) -> Result<bool, ExpressionError> {
        match self.eval(expr, ctx)? {
            Value::Bool(b) => Ok(b),
            other => Err(ExpressionError::TypeMismatch(format!(
                "expected a bool, got {}",
                other.type_name()
            ))),
        }
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<_> = self.functions.values().map(|f| f.name()).collect();
        functions.sort_unstable();
        f.debug_struct("Evaluator")
            .field("variables", &self.variables.len())
            .field("functions", &functions)
            .finish()
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, ExpressionError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&left, &right))),
        BinaryOp::NotEq => Ok(Value::Bool(!values_equal(&left, &right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, &left, &right),
        BinaryOp::Add
            if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) =>
        {
            Ok(Value::Str(format!("{left}{right}")))
        }
        _ => arithmetic(op, left, right),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Enum { .. }, Value::Enum { .. }) => left == right,
        (Value::Enum { member, .. }, Value::Str(s)) | (Value::Str(s), Value::Enum { member, .. }) => {
            member.eq_ignore_ascii_case(s)
        }
        _ => match (left.as_float(), right.as_float()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExpressionError> {
    let ordering = match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        _ => match (left.as_float(), right.as_float()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).ok_or_else(|| {
                ExpressionError::TypeMismatch("cannot compare NaN".to_string())
            })?,
            _ => {
                return Err(ExpressionError::TypeMismatch(format!(
                    "cannot compare {} with {}",
                    left.type_name(),
                    right.type_name()
                )))
            }
        },
    };
    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    };
    Ok(Value::Bool(result))
}

fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

fn arithmetic(op: BinaryOp, left: Value, right: Value) -> Result<Value, ExpressionError> {
    let overflow = || ExpressionError::TypeMismatch("integer overflow".to_string());

    if let (Value::Int(a), Value::Int(b)) = (&left, &right) {
        let (a, b) = (*a, *b);
        let result = match op {
            BinaryOp::Add => a.checked_add(b).ok_or_else(overflow)?,
            BinaryOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
            BinaryOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
            BinaryOp::Div | BinaryOp::Rem if b == 0 => return Err(ExpressionError::DivisionByZero),
            BinaryOp::Div => {
                if a == i64::MIN && b == -1 {
                    return Err(overflow());
                }
                floor_div(a, b)
            }
            BinaryOp::Rem => {
                if a == i64::MIN && b == -1 {
                    0
                } else {
                    a - b * floor_div(a, b)
                }
            }
            _ => return Err(ExpressionError::TypeMismatch(format!("{op:?} is not arithmetic"))),
        };
        return Ok(Value::Int(result));
    }

    let (a, b) = match (left.as_float(), right.as_float()) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(ExpressionError::TypeMismatch(format!(
                "cannot apply {op:?} to {} and {}",
                left.type_name(),
                right.type_name()
            )))
        }
    };
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Rem if b == 0.0 => return Err(ExpressionError::DivisionByZero),
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a.rem_euclid(b),
        _ => return Err(ExpressionError::TypeMismatch(format!("{op:?} is not arithmetic"))),
    };
    Ok(Value::Float(result))
}
