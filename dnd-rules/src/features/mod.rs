//! Character features (Rage, Bardic Inspiration, Favored Enemy, ...).
//!
//! A [`FeatureDefinition`] is catalog data. Each character gets one
//! [`FeatureInstance`] per feature it has; the instance carries the
//! active flag and any expiry alarms it is waiting on. The lifecycle
//! itself lives in [`activation`].

pub mod activation;

use crate::catalog::{de, CatalogEntry};
use crate::clock::AlarmHandle;
use crate::time::{DndTimeSpan, TurnPart};
use serde::Deserialize;
use std::sync::Arc;

/// Lifecycle points a feature can attach rule-language commands to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureHook {
    OnActivate,
    OnDeactivate,
    OnStartGame,
    OnPlayerCastsSpell,
    OnPlayerSwingsWeapon,
    OnPlayerStartsTurn,
    OnPlayerSaves,
    OnRollComplete,
}

/// One row of the features table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureRow {
    pub name: String,
    pub activate_when: String,
    pub on_activate: String,
    pub on_deactivate: String,
    pub on_start_game: String,
    pub on_player_casts_spell: String,
    pub on_player_swings_weapon: String,
    pub on_player_starts_turn: String,
    pub on_player_saves: String,
    pub on_roll_complete: String,
    pub activation_message: String,
    pub deactivation_message: String,
    pub duration: String,
    pub per: String,
    #[serde(deserialize_with = "de::text")]
    pub limit: String,
    pub activation_time: String,
    #[serde(deserialize_with = "de::checked")]
    pub requires_activation: bool,
    pub shortcut_name: String,
    pub shortcut_available_when: String,
    #[serde(deserialize_with = "de::checked")]
    pub magic: bool,
    pub description: String,
}

/// An immutable feature definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDefinition {
    /// Name with any parameter list removed.
    pub name: String,
    /// Parameter names declared as `Name(param1, param2)`.
    pub parameters: Vec<String>,
    /// Activation predicate. Blank means always eligible.
    pub activate_when: String,
    pub on_activate: String,
    pub on_deactivate: String,
    pub on_start_game: String,
    pub on_player_casts_spell: String,
    pub on_player_swings_weapon: String,
    pub on_player_starts_turn: String,
    pub on_player_saves: String,
    pub on_roll_complete: String,
    pub activation_message: String,
    pub deactivation_message: String,
    pub duration: DndTimeSpan,
    pub per: DndTimeSpan,
    pub limit: String,
    pub activation_time: TurnPart,
    pub requires_player_activation: bool,
    pub shortcut_name: String,
    pub shortcut_available_when: String,
    pub magic: bool,
    pub description: String,
}

impl FeatureDefinition {
    pub fn new(name: &str) -> Self {
        let (name, parameters) = split_name_and_parameters(name);
        Self::from_parts(name, parameters, FeatureRow::default())
    }

    fn from_parts(name: String, parameters: Vec<String>, row: FeatureRow) -> Self {
        Self {
            name,
            parameters,
            activate_when: row.activate_when,
            on_activate: row.on_activate,
            on_deactivate: row.on_deactivate,
            on_start_game: row.on_start_game,
            on_player_casts_spell: row.on_player_casts_spell,
            on_player_swings_weapon: row.on_player_swings_weapon,
            on_player_starts_turn: row.on_player_starts_turn,
            on_player_saves: row.on_player_saves,
            on_roll_complete: row.on_roll_complete,
            activation_message: row.activation_message,
            deactivation_message: row.deactivation_message,
            duration: DndTimeSpan::from_duration_str(&row.duration),
            per: DndTimeSpan::from_duration_str(&row.per),
            limit: row.limit,
            activation_time: TurnPart::from_time_code(&row.activation_time),
            requires_player_activation: row.requires_activation,
            shortcut_name: row.shortcut_name,
            shortcut_available_when: row.shortcut_available_when,
            magic: row.magic,
            description: row.description,
        }
    }

    pub fn with_duration(mut self, duration: DndTimeSpan) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_activate_when(mut self, predicate: &str) -> Self {
        self.activate_when = predicate.to_string();
        self
    }

    pub fn with_hook(mut self, hook: FeatureHook, commands: &str) -> Self {
        let slot = match hook {
            FeatureHook::OnActivate => &mut self.on_activate,
            FeatureHook::OnDeactivate => &mut self.on_deactivate,
            FeatureHook::OnStartGame => &mut self.on_start_game,
            FeatureHook::OnPlayerCastsSpell => &mut self.on_player_casts_spell,
            FeatureHook::OnPlayerSwingsWeapon => &mut self.on_player_swings_weapon,
            FeatureHook::OnPlayerStartsTurn => &mut self.on_player_starts_turn,
            FeatureHook::OnPlayerSaves => &mut self.on_player_saves,
            FeatureHook::OnRollComplete => &mut self.on_roll_complete,
        };
        *slot = commands.to_string();
        self
    }

    pub fn with_messages(mut self, activation: &str, deactivation: &str) -> Self {
        self.activation_message = activation.to_string();
        self.deactivation_message = deactivation.to_string();
        self
    }

    pub fn with_player_activation(mut self, shortcut_name: &str, part: TurnPart) -> Self {
        self.requires_player_activation = true;
        self.shortcut_name = shortcut_name.to_string();
        self.activation_time = part;
        self
    }

    pub fn hook(&self, hook: FeatureHook) -> &str {
        match hook {
            FeatureHook::OnActivate => &self.on_activate,
            FeatureHook::OnDeactivate => &self.on_deactivate,
            FeatureHook::OnStartGame => &self.on_start_game,
            FeatureHook::OnPlayerCastsSpell => &self.on_player_casts_spell,
            FeatureHook::OnPlayerSwingsWeapon => &self.on_player_swings_weapon,
            FeatureHook::OnPlayerStartsTurn => &self.on_player_starts_turn,
            FeatureHook::OnPlayerSaves => &self.on_player_saves,
            FeatureHook::OnRollComplete => &self.on_roll_complete,
        }
    }

    /// Activated automatically at the start of the game.
    pub fn is_always_on(&self) -> bool {
        self.activate_when.trim().eq_ignore_ascii_case("true")
    }

    /// The name shown on the feature's shortcut.
    pub fn display_shortcut_name(&self) -> &str {
        if self.shortcut_name.trim().is_empty() {
            &self.name
        } else {
            &self.shortcut_name
        }
    }
}

impl CatalogEntry for FeatureDefinition {
    type Row = FeatureRow;

    fn from_row(row: FeatureRow) -> Result<Self, String> {
        let (name, parameters) = split_name_and_parameters(&row.name);
        if name.is_empty() {
            return Err(format!("feature name '{}' is blank", row.name));
        }
        Ok(Self::from_parts(name, parameters, row))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Split `Name(a, b)` into `("Name", ["a", "b"])`.
pub fn split_name_and_parameters(source: &str) -> (String, Vec<String>) {
    let source = source.trim();
    match source.find('(') {
        Some(open) => {
            let name = source[..open].trim().to_string();
            let inner = source[open + 1..].trim_end();
            let inner = inner.strip_suffix(')').unwrap_or(inner);
            let parameters = inner
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            (name, parameters)
        }
        None => (source.to_string(), Vec::new()),
    }
}

/// Replace each whole-word parameter name in `text` with the matching
/// comma separated argument. Missing arguments become empty text.
pub fn inject_parameters(text: &str, parameters: &[String], arguments: &str) -> String {
    if parameters.is_empty() {
        return text.to_string();
    }
    let values: Vec<&str> = if arguments.trim().is_empty() {
        Vec::new()
    } else {
        arguments.split(',').map(str::trim).collect()
    };

    let mut result = String::with_capacity(text.len());
    let mut word_start = None;
    for (offset, c) in text.char_indices().chain(std::iter::once((text.len(), ' '))) {
        match (word_start, is_word_char(c)) {
            (None, true) => word_start = Some(offset),
            (Some(start), false) => {
                let word = &text[start..offset];
                match parameters.iter().position(|parameter| parameter == word) {
                    Some(index) => result.push_str(values.get(index).copied().unwrap_or("")),
                    None => result.push_str(word),
                }
                word_start = None;
            }
            _ => {}
        }
        if word_start.is_none() && offset < text.len() {
            result.push(c);
        }
    }
    result
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// A feature bound to one character.
#[derive(Debug)]
pub struct FeatureInstance {
    pub definition: Arc<FeatureDefinition>,
    /// Arguments from the character's feature list, e.g. `Orcs` for
    /// `FavoredEnemy(Orcs)`.
    pub arguments: String,
    pub active: bool,
    pub pending_alarms: Vec<AlarmHandle>,
}

impl FeatureInstance {
    pub fn new(definition: Arc<FeatureDefinition>, arguments: impl Into<String>) -> Self {
        Self {
            definition,
            arguments: arguments.into(),
            active: false,
            pending_alarms: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_name_and_parameters() {
        assert_eq!(
            split_name_and_parameters("FavoredEnemy(enemy, terrain)"),
            (
                "FavoredEnemy".to_string(),
                vec!["enemy".to_string(), "terrain".to_string()]
            )
        );
        assert_eq!(
            split_name_and_parameters(" Rage "),
            ("Rage".to_string(), Vec::new())
        );
        assert_eq!(
            split_name_and_parameters("Empty()"),
            ("Empty".to_string(), Vec::new())
        );
    }

    #[test]
    fn test_inject_parameters_whole_words() {
        let params = vec!["enemy".to_string(), "bonus".to_string()];
        assert_eq!(
            inject_parameters("TellDm(\"vs enemy\"); x = bonus + enemyCount", &params, "Orcs, 2"),
            "TellDm(\"vs Orcs\"); x = 2 + enemyCount"
        );
        assert_eq!(inject_parameters("bonus", &params, "Orcs"), "");
        assert_eq!(inject_parameters("enemy", &[], "Orcs"), "enemy");
    }

    #[test]
    fn test_inject_parameters_skips_embedded_names() {
        let params = vec!["enemy".to_string()];
        assert_eq!(
            inject_parameters("enemyenemy is enemy", &params, "orcs"),
            "enemyenemy is orcs"
        );
        assert_eq!(
            inject_parameters("enemy_enemy enemy,enemy", &params, "orcs"),
            "enemy_enemy orcs,orcs"
        );

        // Arguments are not themselves rescanned for later parameters.
        let params = vec!["a".to_string(), "b".to_string()];
        assert_eq!(inject_parameters("a + b", &params, "b, 2"), "b + 2");
    }

    #[test]
    fn test_row_defaults() {
        let row: FeatureRow = serde_json::from_value(serde_json::json!({
            "name": "Rage",
            "duration": "1 minute",
            "activationTime": "1ba",
            "requiresActivation": "x",
            "activateWhen": " TRUE ",
        }))
        .unwrap();
        let rage = FeatureDefinition::from_row(row).unwrap();
        assert_eq!(rage.duration, DndTimeSpan::Minutes(1));
        assert_eq!(rage.activation_time, TurnPart::BonusAction);
        assert!(rage.requires_player_activation);
        assert!(rage.is_always_on());
        assert_eq!(rage.display_shortcut_name(), "Rage");
    }

    #[test]
    fn test_blank_name_is_rejected() {
        assert!(FeatureDefinition::from_row(FeatureRow::default()).is_err());
    }
}
