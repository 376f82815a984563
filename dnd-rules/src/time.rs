//! Game time spans and turn parts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Seconds in one combat round.
pub const SECONDS_PER_ROUND: u64 = 6;

/// Which part of a turn an action consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TurnPart {
    #[default]
    Action,
    BonusAction,
    Reaction,
    Special,
}

impl TurnPart {
    /// Parse a shortcut time code: `1a`, `1ba`, `1r` or `*`.
    ///
    /// Anything else (including blank) is an action.
    pub fn from_time_code(code: &str) -> TurnPart {
        match code.trim().to_lowercase().as_str() {
            "1ba" => TurnPart::BonusAction,
            "1r" => TurnPart::Reaction,
            "*" => TurnPart::Special,
            _ => TurnPart::Action,
        }
    }

    pub fn time_code(&self) -> &'static str {
        match self {
            TurnPart::Action => "1a",
            TurnPart::BonusAction => "1ba",
            TurnPart::Reaction => "1r",
            TurnPart::Special => "*",
        }
    }
}

impl fmt::Display for TurnPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnPart::Action => "Action",
            TurnPart::BonusAction => "Bonus Action",
            TurnPart::Reaction => "Reaction",
            TurnPart::Special => "Special",
        };
        write!(f, "{name}")
    }
}

/// A span of game time as written in spell and feature data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DndTimeSpan {
    #[default]
    Zero,
    Actions(u32),
    BonusActions(u32),
    Reactions(u32),
    Rounds(u32),
    Minutes(u32),
    Hours(u32),
    Days(u32),
    Forever,
}

impl DndTimeSpan {
    /// Parse a duration such as `1 minute`, `Concentration, up to 10 minutes`,
    /// `1 bonus action`, `Instantaneous` or `Until dispelled`.
    ///
    /// Unrecognised text is `Zero`.
    pub fn from_duration_str(text: &str) -> DndTimeSpan {
        let owned = text.trim().to_lowercase();
        let lower = owned
            .strip_prefix("concentration,")
            .map(str::trim)
            .unwrap_or(owned.as_str());
        let lower = lower.strip_prefix("up to").map(str::trim).unwrap_or(lower);

        if lower.is_empty() || lower.starts_with("instant") {
            return DndTimeSpan::Zero;
        }
        if lower.starts_with("until") || lower == "forever" || lower == "permanent" {
            return DndTimeSpan::Forever;
        }

        let (count, unit) = match lower.split_once(char::is_whitespace) {
            Some((count, unit)) => match count.parse::<u32>() {
                Ok(count) => (count, unit.trim()),
                Err(_) => (1, lower),
            },
            None => (1, lower),
        };

        let unit = unit.trim_end_matches('s');
        match unit {
            "action" => DndTimeSpan::Actions(count),
            "bonus action" => DndTimeSpan::BonusActions(count),
            "reaction" => DndTimeSpan::Reactions(count),
            "round" => DndTimeSpan::Rounds(count),
            "minute" => DndTimeSpan::Minutes(count),
            "hour" => DndTimeSpan::Hours(count),
            "day" => DndTimeSpan::Days(count),
            _ => {
                tracing::warn!(duration = %text, "unrecognised duration, treating as zero");
                DndTimeSpan::Zero
            }
        }
    }

    /// In-game duration. Actions take no measurable time; `Forever` has none.
    pub fn as_duration(&self) -> Option<Duration> {
        let seconds = match *self {
            DndTimeSpan::Zero
            | DndTimeSpan::Actions(_)
            | DndTimeSpan::BonusActions(_)
            | DndTimeSpan::Reactions(_) => 0,
            DndTimeSpan::Rounds(n) => u64::from(n) * SECONDS_PER_ROUND,
            DndTimeSpan::Minutes(n) => u64::from(n) * 60,
            DndTimeSpan::Hours(n) => u64::from(n) * 3_600,
            DndTimeSpan::Days(n) => u64::from(n) * 86_400,
            DndTimeSpan::Forever => return None,
        };
        Some(Duration::from_secs(seconds))
    }

    /// True for a finite, positive span that can be put on an alarm.
    pub fn has_value(&self) -> bool {
        matches!(self.as_duration(), Some(d) if !d.is_zero())
    }

    /// The turn part consumed when this span is a casting time.
    pub fn turn_part(&self) -> TurnPart {
        match self {
            DndTimeSpan::Actions(1) => TurnPart::Action,
            DndTimeSpan::BonusActions(1) => TurnPart::BonusAction,
            DndTimeSpan::Reactions(1) => TurnPart::Reaction,
            _ => TurnPart::Special,
        }
    }
}
