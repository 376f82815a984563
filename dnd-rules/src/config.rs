//! Engine configuration.

use std::path::PathBuf;

/// Environment variable naming the data directory.
pub const DATA_DIR_ENV: &str = "DND_DATA_DIR";

/// Configuration for a [`crate::RulesEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Directory holding the JSON data tables.
    pub data_dir: PathBuf,

    /// Table names within the data directory.
    pub spells_table: String,
    pub weapons_table: String,
    pub features_table: String,
    pub shortcuts_table: String,

    /// Buffered events per subscriber before the slowest one starts lagging.
    pub event_capacity: usize,
}

impl EngineConfig {
    /// Create a config reading tables from `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            spells_table: "spells".to_string(),
            weapons_table: "weapons".to_string(),
            features_table: "features".to_string(),
            shortcuts_table: "shortcuts".to_string(),
            event_capacity: 64,
        }
    }

    /// Build from `DND_DATA_DIR`, defaulting to `./data`.
    pub fn from_env() -> Self {
        let dir = std::env::var_os(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));
        Self::new(dir)
    }

    pub fn with_spells_table(mut self, table: impl Into<String>) -> Self {
        self.spells_table = table.into();
        self
    }

    pub fn with_weapons_table(mut self, table: impl Into<String>) -> Self {
        self.weapons_table = table.into();
        self
    }

    pub fn with_features_table(mut self, table: impl Into<String>) -> Self {
        self.features_table = table.into();
        self
    }

    pub fn with_shortcuts_table(mut self, table: impl Into<String>) -> Self {
        self.shortcuts_table = table.into();
        self
    }

    /// Set the event channel capacity. Zero is raised to one.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new("data")
    }
}
