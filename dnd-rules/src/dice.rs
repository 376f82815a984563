//! D&D dice notation.
//!
//! Supports the notation used by shortcut and spell data: comma separated
//! roll terms such as `1d8+3`, `2d6-1(fire)` or `8d6(fire),1d6(radiant)`,
//! keep highest/lowest (`4d6kh3`), and composition of a numeric modifier into
//! the first term.

use dnd_macros::NamedVariants;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Marks a dice string that is rolled immediately instead of on trigger.
pub const INSTANT_DICE_MARKER: char = '!';

/// Error type for dice parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("Invalid die size: {0}")]
    InvalidDieSize(u32),
    #[error("No dice specified in '{0}'")]
    NoDice(String),
    #[error("Cannot keep {keep} dice when only rolling {count} (in {notation})")]
    InvalidKeepCount {
        keep: u32,
        count: u32,
        notation: String,
    },
    #[error("Dice arithmetic overflows in '{0}'")]
    Overflow(String),
}

/// Advantage state for d20 rolls.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, NamedVariants,
)]
#[variant(type_name = "Vantage")]
pub enum Vantage {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl Vantage {
    /// Parse a vantage name from data. Anything unrecognised is `Normal`.
    pub fn parse(text: &str) -> Vantage {
        use crate::expressions::NamedVariants;
        Vantage::from_variant_name(text).unwrap_or_default()
    }

    /// Combine two vantage states (advantage + disadvantage = normal).
    pub fn combine(self, other: Vantage) -> Vantage {
        match (self, other) {
            (Vantage::Normal, x) | (x, Vantage::Normal) => x,
            (Vantage::Advantage, Vantage::Disadvantage) => Vantage::Normal,
            (Vantage::Disadvantage, Vantage::Advantage) => Vantage::Normal,
            (Vantage::Advantage, Vantage::Advantage) => Vantage::Advantage,
            (Vantage::Disadvantage, Vantage::Disadvantage) => Vantage::Disadvantage,
        }
    }
}

/// Standard D&D die types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DieType {
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    D100,
}

impl DieType {
    pub fn sides(&self) -> u32 {
        match self {
            DieType::D4 => 4,
            DieType::D6 => 6,
            DieType::D8 => 8,
            DieType::D10 => 10,
            DieType::D12 => 12,
            DieType::D20 => 20,
            DieType::D100 => 100,
        }
    }

    pub fn from_sides(sides: u32) -> Option<DieType> {
        match sides {
            4 => Some(DieType::D4),
            6 => Some(DieType::D6),
            8 => Some(DieType::D8),
            10 => Some(DieType::D10),
            12 => Some(DieType::D12),
            20 => Some(DieType::D20),
            100 => Some(DieType::D100),
            _ => None,
        }
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.sides())
    }
}

/// A single die component of a roll term (e.g. the `2d6` in `2d6+3`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceComponent {
    pub count: u32,
    pub die_type: DieType,
    pub keep_highest: Option<u32>,
    pub keep_lowest: Option<u32>,
}

impl DiceComponent {
    pub fn new(count: u32, die_type: DieType) -> Self {
        Self {
            count,
            die_type,
            keep_highest: None,
            keep_lowest: None,
        }
    }
}

impl fmt::Display for DiceComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.die_type)?;
        if let Some(keep) = self.keep_highest {
            write!(f, "kh{keep}")?;
        } else if let Some(keep) = self.keep_lowest {
            write!(f, "kl{keep}")?;
        }
        Ok(())
    }
}

/// One comma separated roll term: dice, a summed offset and an optional
/// label such as a damage type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DieRoll {
    pub components: Vec<DiceComponent>,
    pub offset: i32,
    pub label: Option<String>,
}

impl DieRoll {
    fn parse(term: &str) -> Result<Self, DiceError> {
        let term = term.trim();
        let (body, label) = split_label(term)?;
        let body: String = body
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();

        let mut components = Vec::new();
        let mut offset: i32 = 0;
        let mut saw_chunk = false;
        let mut current = String::new();
        let mut sign: i32 = 1;

        for ch in body.chars() {
            match ch {
                '+' | '-' => {
                    if !current.is_empty() {
                        Self::parse_chunk(&current, sign, term, &mut components, &mut offset)?;
                        saw_chunk = true;
                        current.clear();
                        sign = 1;
                    }
                    if ch == '-' {
                        sign = -sign;
                    }
                }
                _ => current.push(ch),
            }
        }

        if !current.is_empty() {
            Self::parse_chunk(&current, sign, term, &mut components, &mut offset)?;
            saw_chunk = true;
        }

        if !saw_chunk {
            return Err(DiceError::NoDice(term.to_string()));
        }

        Ok(DieRoll {
            components,
            offset,
            label,
        })
    }

    fn parse_chunk(
        s: &str,
        sign: i32,
        term: &str,
        components: &mut Vec<DiceComponent>,
        offset: &mut i32,
    ) -> Result<(), DiceError> {
        let invalid = || DiceError::InvalidNotation(term.to_string());

        if let Some(d_pos) = s.find('d') {
            if sign < 0 {
                return Err(invalid());
            }
            let count_str = &s[..d_pos];
            let rest = &s[d_pos + 1..];

            let count: u32 = if count_str.is_empty() {
                1
            } else {
                count_str.parse().map_err(|_| invalid())?
            };

            let (sides_str, keep_highest, keep_lowest) = if let Some(kh_pos) = rest.find("kh") {
                let keep: u32 = rest[kh_pos + 2..].parse().map_err(|_| invalid())?;
                (&rest[..kh_pos], Some(keep), None)
            } else if let Some(kl_pos) = rest.find("kl") {
                let keep: u32 = rest[kl_pos + 2..].parse().map_err(|_| invalid())?;
                (&rest[..kl_pos], None, Some(keep))
            } else {
                (rest, None, None)
            };

            let sides: u32 = sides_str.parse().map_err(|_| invalid())?;
            let die_type = DieType::from_sides(sides).ok_or(DiceError::InvalidDieSize(sides))?;

            if let Some(keep) = keep_highest.or(keep_lowest) {
                if keep > count {
                    return Err(DiceError::InvalidKeepCount {
                        keep,
                        count,
                        notation: s.to_string(),
                    });
                }
            }

            components.push(DiceComponent {
                count,
                die_type,
                keep_highest,
                keep_lowest,
            });
        } else {
            let value: i32 = s.parse().map_err(|_| invalid())?;
            let current = *offset;
            *offset = sign
                .checked_mul(value)
                .and_then(|value| current.checked_add(value))
                .ok_or_else(|| DiceError::Overflow(term.to_string()))?;
        }

        Ok(())
    }

    /// Merge `count` more dice of `die_type` into this term.
    pub fn add_dice(&mut self, count: u32, die_type: DieType) -> Result<(), DiceError> {
        if let Some(existing) = self
            .components
            .iter_mut()
            .find(|c| c.die_type == die_type && c.keep_highest.is_none() && c.keep_lowest.is_none())
        {
            existing.count = existing
                .count
                .checked_add(count)
                .ok_or_else(|| DiceError::Overflow(format!("{count}{die_type}")))?;
        } else {
            self.components.push(DiceComponent::new(count, die_type));
        }
        Ok(())
    }

    /// Add `modifier` to this term's offset.
    pub fn add_offset(&mut self, modifier: i32) -> Result<(), DiceError> {
        match self.offset.checked_add(modifier) {
            Some(offset) => {
                self.offset = offset;
                Ok(())
            }
            None => Err(DiceError::Overflow(self.to_string())),
        }
    }
}

impl fmt::Display for DieRoll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            write!(f, "{}", self.offset)?;
        } else {
            let dice = self
                .components
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join("+");
            write!(f, "{dice}")?;
            if self.offset > 0 {
                write!(f, "+{}", self.offset)?;
            } else if self.offset < 0 {
                write!(f, "-{}", self.offset.unsigned_abs())?;
            }
        }
        if let Some(label) = &self.label {
            write!(f, "({label})")?;
        }
        Ok(())
    }
}

fn split_label(term: &str) -> Result<(&str, Option<String>), DiceError> {
    match (term.find('('), term.ends_with(')')) {
        (Some(open), true) => {
            let label = term[open + 1..term.len() - 1].trim();
            if label.contains('(') || label.contains(')') {
                return Err(DiceError::InvalidNotation(term.to_string()));
            }
            let label = (!label.is_empty()).then(|| label.to_string());
            Ok((&term[..open], label))
        }
        (None, false) if !term.contains(')') => Ok((term, None)),
        _ => Err(DiceError::InvalidNotation(term.to_string())),
    }
}

/// A parsed dice string made of zero or more roll terms.
///
/// Strings without any digit (`special`, blank) parse to zero terms rather
/// than failing; they have nowhere to hold a modifier.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DieRollDetails {
    pub rolls: Vec<DieRoll>,
}

impl DieRollDetails {
    /// Parse a dice notation string.
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let notation = notation.trim();
        if !notation.chars().any(|c| c.is_ascii_digit()) {
            return Ok(Self::default());
        }

        let rolls = notation
            .split(',')
            .map(DieRoll::parse)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { rolls })
    }

    pub fn is_empty(&self) -> bool {
        self.rolls.is_empty()
    }

    /// Sum of every term's offset, saturating at the `i32` bounds.
    pub fn total_offset(&self) -> i32 {
        self.rolls
            .iter()
            .fold(0i32, |total, r| total.saturating_add(r.offset))
    }

    /// Roll every term and return the combined result.
    pub fn roll(&self) -> RollResult {
        self.roll_with_rng(&mut rand::thread_rng())
    }

    /// Roll with a specific RNG (useful for testing).
    pub fn roll_with_rng<R: Rng>(&self, rng: &mut R) -> RollResult {
        let mut component_results = Vec::new();

        for component in self.rolls.iter().flat_map(|r| r.components.iter()) {
            let rolls: Vec<u32> = (0..component.count)
                .map(|_| rng.gen_range(1..=component.die_type.sides()))
                .collect();

            let kept = if let Some(keep) = component.keep_highest {
                let mut sorted = rolls.clone();
                sorted.sort_by(|a, b| b.cmp(a));
                sorted.truncate(keep as usize);
                sorted
            } else if let Some(keep) = component.keep_lowest {
                let mut sorted = rolls.clone();
                sorted.sort();
                sorted.truncate(keep as usize);
                sorted
            } else {
                rolls.clone()
            };

            let subtotal = kept.iter().fold(0u32, |total, r| total.saturating_add(*r));
            component_results.push(ComponentResult {
                die_type: component.die_type,
                rolls,
                kept,
                subtotal,
            });
        }

        let modifier = self.total_offset();
        let dice_total = component_results.iter().fold(0i32, |total, c| {
            total.saturating_add(i32::try_from(c.subtotal).unwrap_or(i32::MAX))
        });

        // Natural 20/1 only matter for a lone d20.
        let d20_roll = component_results
            .iter()
            .find(|c| c.die_type == DieType::D20 && c.rolls.len() == 1)
            .and_then(|c| c.rolls.first().copied());

        RollResult {
            expression: self.clone(),
            component_results,
            modifier,
            total: dice_total.saturating_add(modifier),
            natural_20: d20_roll == Some(20),
            natural_1: d20_roll == Some(1),
        }
    }

    /// Roll with advantage/disadvantage (only applies to single d20 rolls).
    pub fn roll_with_vantage_rng<R: Rng>(&self, vantage: Vantage, rng: &mut R) -> RollResult {
        if vantage == Vantage::Normal || !self.is_single_d20() {
            return self.roll_with_rng(rng);
        }

        let roll1 = rng.gen_range(1..=20u32);
        let roll2 = rng.gen_range(1..=20u32);
        let chosen = match vantage {
            Vantage::Advantage => roll1.max(roll2),
            _ => roll1.min(roll2),
        };
        let modifier = self.total_offset();

        RollResult {
            expression: self.clone(),
            component_results: vec![ComponentResult {
                die_type: DieType::D20,
                rolls: vec![roll1, roll2],
                kept: vec![chosen],
                subtotal: chosen,
            }],
            modifier,
            total: (chosen as i32).saturating_add(modifier),
            natural_20: chosen == 20,
            natural_1: chosen == 1,
        }
    }

    fn is_single_d20(&self) -> bool {
        let mut components = self.rolls.iter().flat_map(|r| r.components.iter());
        match (components.next(), components.next()) {
            (Some(c), None) => c.count == 1 && c.die_type == DieType::D20,
            _ => false,
        }
    }
}

impl FromStr for DieRollDetails {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DieRollDetails::parse(s)
    }
}

impl fmt::Display for DieRollDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms = self
            .rolls
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{terms}")
    }
}

/// Split a leading instant marker (`!`) off a dice string.
pub fn split_instant(dice: &str) -> (bool, &str) {
    match dice.strip_prefix(INSTANT_DICE_MARKER) {
        Some(rest) => (true, rest),
        None => (false, dice),
    }
}

/// Add `modifier` to the first roll term's offset and return the canonical
/// string. Strings with no roll terms are returned unchanged.
pub fn compose(dice: &str, modifier: i32) -> Result<String, DiceError> {
    let mut details = DieRollDetails::parse(dice)?;
    match details.rolls.first_mut() {
        Some(first) => {
            first
                .add_offset(modifier)
                .map_err(|_| DiceError::Overflow(dice.to_string()))?;
            Ok(details.to_string())
        }
        None => Ok(dice.to_string()),
    }
}

/// Result of rolling a single dice component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentResult {
    pub die_type: DieType,
    pub rolls: Vec<u32>,
    pub kept: Vec<u32>,
    pub subtotal: u32,
}

/// Complete result of a dice roll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollResult {
    pub expression: DieRollDetails,
    pub component_results: Vec<ComponentResult>,
    pub modifier: i32,
    pub total: i32,
    pub natural_20: bool,
    pub natural_1: bool,
}

impl RollResult {
    /// Format the individual dice results for display.
    pub fn dice_display(&self) -> String {
        let dice_str = self
            .component_results
            .iter()
            .map(|c| {
                format!(
                    "[{}]",
                    c.rolls
                        .iter()
                        .map(|r| r.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join(" + ");

        if self.modifier > 0 {
            format!("{} + {}", dice_str, self.modifier)
        } else if self.modifier < 0 {
            format!("{} - {}", dice_str, self.modifier.abs())
        } else {
            dice_str
        }
    }
}

impl fmt::Display for RollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.dice_display(), self.total)
    }
}

/// Convenience function to roll dice from a notation string.
pub fn roll(notation: &str) -> Result<RollResult, DiceError> {
    Ok(DieRollDetails::parse(notation)?.roll())
}
