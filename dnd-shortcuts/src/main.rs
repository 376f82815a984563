//! Table-side shortcut lister.
//!
//! Loads a character and the data tables, starts the game for them and
//! prints every action shortcut they can use this turn. Shortcuts can be
//! triggered and game time advanced from the command line:
//!
//! ```bash
//! cargo run -p dnd-shortcuts -- --character data/characters/shemo.json
//! cargo run -p dnd-shortcuts -- --character data/characters/shemo.json --trigger 7 --rounds 10
//! ```

use anyhow::{bail, Context};
use dnd_rules::{ActionShortcut, Character, EngineConfig, GameClock, RulesEngine, RulesEvent};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct CliConfig {
    data_dir: Option<PathBuf>,
    character: Option<PathBuf>,
    triggers: Vec<usize>,
    rounds: u32,
    help: bool,
}

fn parse_args(args: &[String]) -> anyhow::Result<CliConfig> {
    let mut config = CliConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => config.help = true,
            "--data" => {
                let dir = args.get(i + 1).context("--data needs a directory")?;
                config.data_dir = Some(PathBuf::from(dir));
                i += 1;
            }
            "--character" => {
                let path = args.get(i + 1).context("--character needs a file")?;
                config.character = Some(PathBuf::from(path));
                i += 1;
            }
            "--trigger" => {
                let index = args.get(i + 1).context("--trigger needs a shortcut index")?;
                config.triggers.push(
                    index
                        .parse()
                        .with_context(|| format!("'{index}' is not a shortcut index"))?,
                );
                i += 1;
            }
            "--rounds" => {
                let rounds = args.get(i + 1).context("--rounds needs a count")?;
                config.rounds = rounds
                    .parse()
                    .with_context(|| format!("'{rounds}' is not a round count"))?;
                i += 1;
            }
            other => bail!("unknown argument '{other}' (try --help)"),
        }
        i += 1;
    }

    Ok(config)
}

fn print_help() {
    println!("dnd-shortcuts - list a character's action shortcuts");
    println!();
    println!("USAGE:");
    println!("  dnd-shortcuts --character <FILE> [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  -h, --help           Show this help message");
    println!("  --data <DIR>         Data tables directory (default: $DND_DATA_DIR or ./data)");
    println!("  --character <FILE>   Character JSON file");
    println!("  --trigger <INDEX>    Trigger a shortcut by index; may be repeated");
    println!("  --rounds <N>         Advance game time by N rounds afterwards");
    println!();
    println!("Set RUST_LOG (e.g. RUST_LOG=dnd_rules=debug) for engine logging.");
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let cli = parse_args(&args)?;
    if cli.help {
        print_help();
        return Ok(());
    }
    let Some(character_path) = cli.character else {
        print_help();
        bail!("--character is required");
    };

    let config = match cli.data_dir {
        Some(dir) => EngineConfig::new(dir),
        None => EngineConfig::from_env(),
    };
    tracing::info!(data_dir = %config.data_dir.display(), "loading tables");

    let clock = Arc::new(GameClock::new());
    let engine = RulesEngine::from_config(config, Arc::clone(&clock) as Arc<dyn dnd_rules::AlarmClock>);
    let mut events = engine.events().subscribe();

    let mut character = engine
        .load_character(&character_path)
        .with_context(|| format!("loading {}", character_path.display()))?;
    engine.start_game(&mut character)?;
    engine.activate_conditional_features(&mut character)?;

    for failure in engine.rebuild_shortcuts(&mut character)? {
        tracing::warn!(source = %failure.source, error = %failure.error, "shortcut skipped");
    }
    print_messages(&mut events);

    for index in cli.triggers {
        engine
            .trigger_shortcut(&mut character, index)
            .with_context(|| format!("triggering shortcut {index}"))?;
        print_messages(&mut events);
    }

    if cli.rounds > 0 {
        clock.advance_rounds(cli.rounds);
        let expired = engine.process_alarms(&mut character)?;
        tracing::info!(rounds = cli.rounds, expired, "time advanced");
        print_messages(&mut events);
    }

    print_shortcuts(&engine, &character);
    print_features(&character);
    Ok(())
}

fn print_messages(events: &mut Receiver<RulesEvent>) {
    while let Ok(event) = events.try_recv() {
        if let RulesEvent::DungeonMasterMessage { source, message } = event {
            println!("[{source}] {message}");
        }
    }
}

fn print_shortcuts(engine: &RulesEngine, character: &Character) {
    println!();
    println!("{}'s shortcuts:", character.name);
    for shortcut in &character.shortcuts {
        println!("{}", shortcut_line(engine, character, shortcut));
    }
}

fn shortcut_line(engine: &RulesEngine, character: &Character, shortcut: &ActionShortcut) -> String {
    let available = match shortcut.is_available(engine, character) {
        Ok(true) => " ",
        Ok(false) => "x",
        Err(_) => "?",
    };
    let mut line = format!(
        "{available} {:>3}  {:<28} {:<13}",
        shortcut.index,
        shortcut.name,
        shortcut.part.to_string()
    );
    if !shortcut.weapon_properties.is_empty() || shortcut.spell.is_some() {
        line.push_str(&format!(" hit {:+}", shortcut.to_hit_modifier()));
    }
    if !shortcut.instant_dice.is_empty() {
        line.push_str(&format!("  !{}", shortcut.instant_dice));
    }
    if !shortcut.dice.is_empty() {
        line.push_str(&format!("  {}", shortcut.dice));
    }
    line
}

fn print_features(character: &Character) {
    if character.features.is_empty() {
        return;
    }
    println!();
    println!("Features:");
    for feature in &character.features {
        let state = if feature.active { "active" } else { "inactive" };
        println!("  {:<28} {state}", feature.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("dnd-shortcuts")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_args() {
        let config = parse_args(&args(&[
            "--data", "tables", "--character", "shemo.json", "--trigger", "3", "--trigger", "7",
            "--rounds", "10",
        ]))
        .unwrap();

        assert_eq!(config.data_dir, Some(PathBuf::from("tables")));
        assert_eq!(config.character, Some(PathBuf::from("shemo.json")));
        assert_eq!(config.triggers, vec![3, 7]);
        assert_eq!(config.rounds, 10);
        assert!(!config.help);
    }

    #[test]
    fn test_parse_args_rejects_bad_input() {
        assert!(parse_args(&args(&["--trigger", "first"])).is_err());
        assert!(parse_args(&args(&["--character"])).is_err());
        assert!(parse_args(&args(&["--verbose"])).is_err());
        assert!(parse_args(&args(&["-h"])).unwrap().help);
    }
}
