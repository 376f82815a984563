//! Feature activation lifecycle.
//!
//! A feature instance is either inactive (the initial state) or active.
//! Activating computes the message, marks the instance active, schedules an
//! expiry alarm for timed features, runs the on-activate hook and finally
//! posts the message and an activation event. Deactivation mirrors it.
//!
//! State is committed before hooks run. A failing hook returns its error
//! but the instance stays in its new state.

use super::{inject_parameters, split_name_and_parameters, FeatureHook, FeatureInstance};
use crate::catalog::CatalogError;
use crate::character::Character;
use crate::clock::AlarmStatus;
use crate::events::RulesEvent;
use crate::expressions::ExpressionError;
use crate::rules::RulesEngine;
use crate::spells::CastedSpell;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Activate,
    Deactivate,
}

impl RulesEngine {
    // ========================================================================
    // Activation
    // ========================================================================

    /// Activate the character's feature `name`.
    ///
    /// Does nothing if the feature is already active, unless `force` is set.
    pub fn activate_feature(
        &self,
        character: &mut Character,
        name: &str,
        arguments: &str,
        force: bool,
    ) -> Result<(), ExpressionError> {
        let index = feature_index(character, name)?;
        self.transition(character, index, arguments, force, Transition::Activate)
    }

    /// Deactivate the character's feature `name`.
    ///
    /// Does nothing if the feature is already inactive, unless `force` is set.
    pub fn deactivate_feature(
        &self,
        character: &mut Character,
        name: &str,
        arguments: &str,
        force: bool,
    ) -> Result<(), ExpressionError> {
        let index = feature_index(character, name)?;
        self.transition(character, index, arguments, force, Transition::Deactivate)
    }

    fn transition(
        &self,
        character: &mut Character,
        index: usize,
        arguments: &str,
        force: bool,
        transition: Transition,
    ) -> Result<(), ExpressionError> {
        let activate = transition == Transition::Activate;
        let feature = &character.features[index];
        if feature.active == activate && !force {
            return Ok(());
        }

        let definition = Arc::clone(&feature.definition);
        let arguments = effective_arguments(feature, arguments);

        let (template, verb, hook) = if activate {
            (&definition.activation_message, "Activating", &definition.on_activate)
        } else {
            (&definition.deactivation_message, "Deactivating", &definition.on_deactivate)
        };
        let template = inject_parameters(template, &definition.parameters, &arguments);
        let mut message = self.evaluate_string(&template, character)?;
        if message.trim().is_empty() {
            message = format!("{verb} {}'s {}.", character.name, definition.name);
        }

        let alarm_name = format!("{}.{}", character.name, definition.name);
        character.features[index].active = activate;
        if activate {
            if let Some(duration) = definition
                .duration
                .as_duration()
                .filter(|d| !d.is_zero())
            {
                let alarm =
                    self.clock()
                        .create_alarm(duration, &alarm_name, character.id, &definition.name);
                character.features[index].pending_alarms.push(alarm);
            }
        } else {
            // Alarms from this activation can no longer apply.
            character.features[index].pending_alarms.clear();
        }
        tracing::debug!(
            character = %character.name,
            feature = %definition.name,
            ?transition,
            "feature transition"
        );

        let hook = inject_parameters(hook, &definition.parameters, &arguments);
        self.execute(&hook, character, None, None)?;

        self.events().notify(character.name.clone(), message);
        let event = if activate {
            RulesEvent::FeatureActivated {
                character: character.id,
                character_name: character.name.clone(),
                feature: definition.name.clone(),
            }
        } else {
            RulesEvent::FeatureDeactivated {
                character: character.id,
                character_name: character.name.clone(),
                feature: definition.name.clone(),
            }
        };
        self.events().publish(event);
        Ok(())
    }

    /// Evaluate a feature's activation predicate. A blank predicate is true.
    pub fn should_activate_now(
        &self,
        character: &Character,
        name: &str,
        arguments: &str,
    ) -> Result<bool, ExpressionError> {
        let feature = &character.features[feature_index(character, name)?];
        let definition = &feature.definition;
        let arguments = effective_arguments(feature, arguments);
        let predicate =
            inject_parameters(&definition.activate_when, &definition.parameters, &arguments);
        if predicate.trim().is_empty() {
            return Ok(true);
        }
        self.evaluate_bool(&predicate, character)
    }

    // ========================================================================
    // Game Events
    // ========================================================================

    /// Run one feature's hook for a game event. Inactive features ignore
    /// every event. Blank `arguments` use the feature's bound arguments.
    pub fn feature_event(
        &self,
        character: &mut Character,
        name: &str,
        hook: FeatureHook,
        arguments: &str,
        spell: Option<&CastedSpell>,
    ) -> Result<(), ExpressionError> {
        let index = feature_index(character, name)?;
        self.run_event_hook(character, index, hook, arguments, spell)
    }

    fn run_event_hook(
        &self,
        character: &mut Character,
        index: usize,
        hook: FeatureHook,
        arguments: &str,
        spell: Option<&CastedSpell>,
    ) -> Result<(), ExpressionError> {
        let feature = &character.features[index];
        if !feature.active {
            return Ok(());
        }
        self.run_hook(character, index, hook, arguments, spell)
    }

    fn run_hook(
        &self,
        character: &mut Character,
        index: usize,
        hook: FeatureHook,
        arguments: &str,
        spell: Option<&CastedSpell>,
    ) -> Result<(), ExpressionError> {
        let feature = &character.features[index];
        let definition = Arc::clone(&feature.definition);
        let arguments = effective_arguments(feature, arguments);
        let commands = inject_parameters(definition.hook(hook), &definition.parameters, &arguments);
        if commands.trim().is_empty() {
            return Ok(());
        }
        tracing::trace!(feature = %definition.name, ?hook, "running feature hook");
        self.execute(&commands, character, None, spell)
    }

    /// Fan an event out to every active feature, in definition order.
    fn broadcast(
        &self,
        character: &mut Character,
        hook: FeatureHook,
        arguments: &str,
        spell: Option<&CastedSpell>,
    ) -> Result<(), ExpressionError> {
        for index in 0..character.features.len() {
            self.run_event_hook(character, index, hook, arguments, spell)?;
        }
        Ok(())
    }

    pub fn player_starts_turn(
        &self,
        character: &mut Character,
        arguments: &str,
    ) -> Result<(), ExpressionError> {
        self.broadcast(character, FeatureHook::OnPlayerStartsTurn, arguments, None)
    }

    pub fn weapon_just_swung(
        &self,
        character: &mut Character,
        arguments: &str,
    ) -> Result<(), ExpressionError> {
        self.broadcast(character, FeatureHook::OnPlayerSwingsWeapon, arguments, None)
    }

    pub fn spell_just_cast(
        &self,
        character: &mut Character,
        arguments: &str,
        spell: &CastedSpell,
    ) -> Result<(), ExpressionError> {
        self.broadcast(character, FeatureHook::OnPlayerCastsSpell, arguments, Some(spell))
    }

    pub fn player_saves(
        &self,
        character: &mut Character,
        arguments: &str,
    ) -> Result<(), ExpressionError> {
        self.broadcast(character, FeatureHook::OnPlayerSaves, arguments, None)
    }

    pub fn roll_is_complete(
        &self,
        character: &mut Character,
        arguments: &str,
    ) -> Result<(), ExpressionError> {
        self.broadcast(character, FeatureHook::OnRollComplete, arguments, None)
    }

    /// Run every feature's start-of-game hook, then switch on the features
    /// whose activation predicate is literally `true`.
    pub fn start_game(&self, character: &mut Character) -> Result<(), ExpressionError> {
        for index in 0..character.features.len() {
            self.run_hook(character, index, FeatureHook::OnStartGame, "", None)?;
        }
        for index in 0..character.features.len() {
            if character.features[index].definition.is_always_on() {
                let arguments = character.features[index].arguments.clone();
                self.transition(character, index, &arguments, false, Transition::Activate)?;
            }
        }
        Ok(())
    }

    /// Activate every inactive, automatically triggered feature whose
    /// activation predicate now holds. Returns how many were activated.
    pub fn activate_conditional_features(
        &self,
        character: &mut Character,
    ) -> Result<usize, ExpressionError> {
        let mut activated = 0;
        for index in 0..character.features.len() {
            let feature = &character.features[index];
            let definition = &feature.definition;
            if feature.active
                || definition.requires_player_activation
                || definition.activate_when.trim().is_empty()
            {
                continue;
            }
            let predicate = inject_parameters(
                &definition.activate_when,
                &definition.parameters,
                &feature.arguments,
            );
            if self.evaluate_bool(&predicate, character)? {
                let arguments = character.features[index].arguments.clone();
                self.transition(character, index, &arguments, false, Transition::Activate)?;
                activated += 1;
            }
        }
        Ok(activated)
    }

    // ========================================================================
    // Alarms
    // ========================================================================

    /// Apply every alarm that has fired for this character's features.
    ///
    /// A fired alarm deactivates its feature if it is still active; a stale
    /// alarm is dropped. Returns how many features were deactivated.
    pub fn process_alarms(&self, character: &mut Character) -> Result<usize, ExpressionError> {
        let mut expired = Vec::new();
        for (index, feature) in character.features.iter_mut().enumerate() {
            let mut fired = false;
            feature.pending_alarms.retain_mut(|alarm| match alarm.poll() {
                AlarmStatus::Pending => true,
                AlarmStatus::Fired(_) => {
                    fired = true;
                    false
                }
                AlarmStatus::Dropped => false,
            });
            if fired {
                expired.push(index);
            }
        }

        let mut deactivated = 0;
        for index in expired {
            if !character.features[index].active {
                tracing::trace!(feature = %character.features[index].name(), "stale alarm");
                continue;
            }
            self.transition(character, index, "", false, Transition::Deactivate)?;
            deactivated += 1;
        }
        Ok(deactivated)
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Create instances for the character's feature names that do not have
    /// one yet. Names missing from the catalog are logged and skipped;
    /// they are returned so the caller can report them.
    pub fn attach_features(&self, character: &mut Character) -> Result<Vec<String>, CatalogError> {
        let mut missing = Vec::new();
        for source in character.feature_names.clone() {
            let (name, arguments) = split_name_and_parameters(&source);
            if character.feature_index(&name).is_some() {
                continue;
            }
            match self.catalogs().features.get(&name)? {
                Some(definition) => character
                    .features
                    .push(FeatureInstance::new(definition, arguments.join(", "))),
                None => {
                    tracing::warn!(character = %character.name, feature = %name, "unknown feature");
                    missing.push(source);
                }
            }
        }
        Ok(missing)
    }
}

fn feature_index(character: &Character, name: &str) -> Result<usize, ExpressionError> {
    character
        .feature_index(name)
        .ok_or_else(|| ExpressionError::UnknownFeature(name.trim().to_string()))
}

/// Explicit arguments win; otherwise the ones bound when the feature was
/// attached.
fn effective_arguments(feature: &FeatureInstance, arguments: &str) -> String {
    if arguments.trim().is_empty() {
        feature.arguments.clone()
    } else {
        arguments.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalogs;
    use crate::clock::{AlarmClock, GameClock, MockAlarmClock};
    use crate::config::EngineConfig;
    use crate::expressions::Value;
    use crate::features::FeatureDefinition;
    use crate::testing::InMemorySource;
    use crate::time::DndTimeSpan;
    use std::time::Duration;

    fn engine_with(clock: Arc<dyn AlarmClock>) -> RulesEngine {
        let source = Arc::new(InMemorySource::new());
        let catalogs = Catalogs::new(source, &EngineConfig::default());
        RulesEngine::new(catalogs, clock)
    }

    fn with_feature(definition: FeatureDefinition, arguments: &str) -> Character {
        let mut character = Character::new("Shemo");
        character
            .features
            .push(FeatureInstance::new(Arc::new(definition), arguments));
        character
    }

    #[test]
    fn test_activation_runs_hook_and_posts_default_message() {
        let engine = engine_with(Arc::new(GameClock::new()));
        let mut events = engine.events().subscribe();
        let mut shemo = with_feature(
            FeatureDefinition::new("Rage").with_hook(FeatureHook::OnActivate, "rages += 1"),
            "",
        );

        engine.activate_feature(&mut shemo, "rage", "", false).unwrap();

        assert!(shemo.is_feature_active("Rage"));
        assert_eq!(shemo.state_value("rages"), Some(&Value::Int(1)));
        assert_eq!(
            events.try_recv().unwrap(),
            RulesEvent::DungeonMasterMessage {
                source: "Shemo".to_string(),
                message: "Activating Shemo's Rage.".to_string(),
            }
        );
        assert!(matches!(
            events.try_recv().unwrap(),
            RulesEvent::FeatureActivated { ref feature, .. } if feature == "Rage"
        ));
    }

    #[test]
    fn test_reactivation_without_force_is_a_no_op() {
        let engine = engine_with(Arc::new(GameClock::new()));
        let mut shemo = with_feature(
            FeatureDefinition::new("Rage").with_hook(FeatureHook::OnActivate, "rages += 1"),
            "",
        );
        engine.activate_feature(&mut shemo, "Rage", "", false).unwrap();
        let mut events = engine.events().subscribe();

        engine.activate_feature(&mut shemo, "Rage", "", false).unwrap();
        assert_eq!(shemo.state_value("rages"), Some(&Value::Int(1)));
        assert!(events.try_recv().is_err());

        engine.activate_feature(&mut shemo, "Rage", "", true).unwrap();
        assert_eq!(shemo.state_value("rages"), Some(&Value::Int(2)));
        assert!(events.try_recv().is_ok());
    }

    #[test]
    fn test_timed_feature_schedules_named_alarm() {
        let mut clock = MockAlarmClock::new();
        clock
            .expect_create_alarm()
            .withf(|duration, name, _, feature| {
                *duration == Duration::from_secs(60) && name == "Shemo.Rage" && feature == "Rage"
            })
            .times(1)
            .returning(|_, name, character, feature| {
                crate::clock::alarm_pair(name, character, feature).0
            });
        let engine = engine_with(Arc::new(clock));
        let mut shemo = with_feature(
            FeatureDefinition::new("Rage").with_duration(DndTimeSpan::Minutes(1)),
            "",
        );

        engine.activate_feature(&mut shemo, "Rage", "", false).unwrap();
        assert_eq!(shemo.features[0].pending_alarms.len(), 1);
    }

    #[test]
    fn test_untimed_feature_schedules_nothing() {
        let mut clock = MockAlarmClock::new();
        clock.expect_create_alarm().times(0);
        let engine = engine_with(Arc::new(clock));
        let mut shemo = with_feature(FeatureDefinition::new("Reckless Attack"), "");
        engine
            .activate_feature(&mut shemo, "Reckless Attack", "", false)
            .unwrap();
        assert!(shemo.features[0].pending_alarms.is_empty());
    }

    #[test]
    fn test_hook_failure_keeps_new_state() {
        let engine = engine_with(Arc::new(GameClock::new()));
        let mut shemo = with_feature(
            FeatureDefinition::new("Rage").with_hook(FeatureHook::OnActivate, "NoSuchThing()"),
            "",
        );
        let err = engine.activate_feature(&mut shemo, "Rage", "", false).unwrap_err();
        assert_eq!(err, ExpressionError::UnknownFunction("NoSuchThing".to_string()));
        assert!(shemo.is_feature_active("Rage"));
    }

    #[test]
    fn test_unknown_feature() {
        let engine = engine_with(Arc::new(GameClock::new()));
        let mut nobody = Character::new("Nobody");
        assert_eq!(
            engine.activate_feature(&mut nobody, "Rage", "", false),
            Err(ExpressionError::UnknownFeature("Rage".to_string()))
        );
    }

    #[test]
    fn test_parameters_injected_into_messages_and_hooks() {
        let engine = engine_with(Arc::new(GameClock::new()));
        let mut events = engine.events().subscribe();
        let definition = FeatureDefinition::new("FavoredEnemy(enemy)")
            .with_messages("$\"Hunting enemy\"", "")
            .with_hook(FeatureHook::OnActivate, "favored = \"enemy\"");
        let mut ranger = with_feature(definition, "Orcs");

        engine
            .activate_feature(&mut ranger, "FavoredEnemy", "", false)
            .unwrap();

        assert_eq!(ranger.state_value("favored"), Some(&Value::Str("Orcs".into())));
        assert_eq!(
            events.try_recv().unwrap(),
            RulesEvent::DungeonMasterMessage {
                source: "Shemo".to_string(),
                message: "Hunting Orcs".to_string(),
            }
        );
    }

    #[test]
    fn test_event_hooks_skip_inactive_features() {
        let engine = engine_with(Arc::new(GameClock::new()));
        let mut shemo = with_feature(
            FeatureDefinition::new("Rage").with_hook(FeatureHook::OnPlayerStartsTurn, "turns += 1"),
            "",
        );

        engine.player_starts_turn(&mut shemo, "").unwrap();
        assert_eq!(shemo.state_value("turns"), None);

        engine.activate_feature(&mut shemo, "Rage", "", false).unwrap();
        engine.player_starts_turn(&mut shemo, "").unwrap();
        engine
            .feature_event(&mut shemo, "Rage", FeatureHook::OnPlayerStartsTurn, "", None)
            .unwrap();
        assert_eq!(shemo.state_value("turns"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_event_arguments_override_bound_arguments() {
        let engine = engine_with(Arc::new(GameClock::new()));
        let definition = FeatureDefinition::new("FavoredEnemy(enemy)")
            .with_hook(FeatureHook::OnPlayerStartsTurn, "hunting = \"enemy\"");
        let mut ranger = with_feature(definition, "Orcs");
        engine
            .activate_feature(&mut ranger, "FavoredEnemy", "", false)
            .unwrap();

        engine.player_starts_turn(&mut ranger, "").unwrap();
        assert_eq!(ranger.state_value("hunting"), Some(&Value::Str("Orcs".into())));

        engine.player_starts_turn(&mut ranger, "Goblins").unwrap();
        assert_eq!(ranger.state_value("hunting"), Some(&Value::Str("Goblins".into())));

        engine
            .feature_event(&mut ranger, "FavoredEnemy", FeatureHook::OnPlayerStartsTurn, "Gnolls", None)
            .unwrap();
        assert_eq!(ranger.state_value("hunting"), Some(&Value::Str("Gnolls".into())));
        assert_eq!(ranger.features[0].arguments, "Orcs");
    }

    #[test]
    fn test_should_activate_now() {
        let engine = engine_with(Arc::new(GameClock::new()));
        let mut shemo = with_feature(FeatureDefinition::new("Blank"), "");
        shemo.features.push(FeatureInstance::new(
            Arc::new(FeatureDefinition::new("Veteran").with_activate_when("level >= 5")),
            "",
        ));

        assert!(engine.should_activate_now(&shemo, "Blank", "").unwrap());
        assert!(!engine.should_activate_now(&shemo, "Veteran", "").unwrap());
    }

    #[test]
    fn test_start_game_and_conditional_activation() {
        let engine = engine_with(Arc::new(GameClock::new()));
        let mut shemo = with_feature(
            FeatureDefinition::new("Darkvision")
                .with_activate_when("true")
                .with_hook(FeatureHook::OnStartGame, "rages = 3"),
            "",
        );
        shemo.features.push(FeatureInstance::new(
            Arc::new(FeatureDefinition::new("Frenzy").with_activate_when("rages > 2")),
            "",
        ));

        engine.start_game(&mut shemo).unwrap();
        assert_eq!(shemo.state_value("rages"), Some(&Value::Int(3)));
        assert!(shemo.is_feature_active("Darkvision"));
        assert!(!shemo.is_feature_active("Frenzy"));

        assert_eq!(engine.activate_conditional_features(&mut shemo).unwrap(), 1);
        assert!(shemo.is_feature_active("Frenzy"));
        assert_eq!(engine.activate_conditional_features(&mut shemo).unwrap(), 0);
    }

    #[test]
    fn test_alarm_deactivates_once() {
        let clock = Arc::new(GameClock::new());
        let engine = engine_with(clock.clone());
        let mut shemo = with_feature(
            FeatureDefinition::new("Rage").with_duration(DndTimeSpan::Rounds(10)),
            "",
        );
        engine.activate_feature(&mut shemo, "Rage", "", false).unwrap();

        clock.advance_rounds(9);
        assert_eq!(engine.process_alarms(&mut shemo).unwrap(), 0);
        assert!(shemo.is_feature_active("Rage"));

        clock.advance_rounds(1);
        assert_eq!(engine.process_alarms(&mut shemo).unwrap(), 1);
        assert!(!shemo.is_feature_active("Rage"));
        assert_eq!(engine.process_alarms(&mut shemo).unwrap(), 0);
    }
}
