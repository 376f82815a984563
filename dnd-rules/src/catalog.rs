//! Name-keyed catalogs of game data loaded from tabular sources.
//!
//! A [`Catalog`] is loaded lazily the first time it is read, memoised as an
//! immutable snapshot, and reloaded after [`Catalog::invalidate`]. Readers
//! always see either a complete snapshot or none.

use crate::config::EngineConfig;
use crate::features::FeatureDefinition;
use crate::shortcuts::ShortcutSource;
use crate::spells::SpellDefinition;
use crate::weapons::WeaponDefinition;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Errors raised while loading a catalog table.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Table '{table}' not found in {location}")]
    MissingTable { table: String, location: String },

    #[error("IO error reading table '{table}': {source}")]
    Io {
        table: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Table '{table}' is not a JSON array of rows: {source}")]
    Json {
        table: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Row {index} of table '{table}' is malformed: {source}")]
    InvalidRow {
        table: String,
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Row {index} of table '{table}': {message}")]
    InvalidField {
        table: String,
        index: usize,
        message: String,
    },
}

/// Where catalog rows come from.
pub trait TableSource: Send + Sync {
    /// Load every row of `table`, in source order.
    fn load_rows(&self, table: &str) -> Result<Vec<serde_json::Value>, CatalogError>;
}

/// Reads `<dir>/<table>.json`, each file holding an array of row objects.
#[derive(Debug, Clone)]
pub struct JsonDirectorySource {
    dir: PathBuf,
}

impl JsonDirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl TableSource for JsonDirectorySource {
    fn load_rows(&self, table: &str) -> Result<Vec<serde_json::Value>, CatalogError> {
        let path = self.dir.join(format!("{table}.json"));
        let text = std::fs::read_to_string(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                CatalogError::MissingTable {
                    table: table.to_string(),
                    location: self.dir.display().to_string(),
                }
            } else {
                CatalogError::Io {
                    table: table.to_string(),
                    source,
                }
            }
        })?;

        serde_json::from_str(&text).map_err(|source| CatalogError::Json {
            table: table.to_string(),
            source,
        })
    }
}

/// A definition type that can be built from one table row.
pub trait CatalogEntry: Sized + Send + Sync + 'static {
    type Row: DeserializeOwned;

    fn from_row(row: Self::Row) -> Result<Self, String>;

    /// Lookup key, matched case-insensitively.
    fn name(&self) -> &str;
}

type Snapshot<T> = Arc<[Arc<T>]>;

/// Lazily loaded, memoised collection of definitions from one table.
pub struct Catalog<T: CatalogEntry> {
    table: String,
    source: Arc<dyn TableSource>,
    entries: RwLock<Option<Snapshot<T>>>,
    loads: AtomicUsize,
}

impl<T: CatalogEntry> Catalog<T> {
    pub fn new(table: impl Into<String>, source: Arc<dyn TableSource>) -> Self {
        Self {
            table: table.into(),
            source,
            entries: RwLock::new(None),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// First entry whose name matches, ignoring case.
    pub fn get(&self, name: &str) -> Result<Option<Arc<T>>, CatalogError> {
        let name = name.trim();
        Ok(self
            .all()?
            .iter()
            .find(|entry| entry.name().eq_ignore_ascii_case(name))
            .cloned())
    }

    /// Every entry whose name matches, in source order.
    pub fn get_all(&self, name: &str) -> Result<Vec<Arc<T>>, CatalogError> {
        let name = name.trim();
        self.filter(|entry| entry.name().eq_ignore_ascii_case(name))
    }

    pub fn filter(&self, predicate: impl Fn(&T) -> bool) -> Result<Vec<Arc<T>>, CatalogError> {
        Ok(self
            .all()?
            .iter()
            .filter(|entry| predicate(entry))
            .cloned()
            .collect())
    }

    /// The current snapshot, loading it first if needed.
    pub fn all(&self) -> Result<Snapshot<T>, CatalogError> {
        if let Some(snapshot) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Ok(Arc::clone(snapshot));
        }

        let mut guard = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // Another reader may have loaded while we waited for the write lock.
        if let Some(snapshot) = guard.as_ref() {
            return Ok(Arc::clone(snapshot));
        }

        let snapshot = self.load()?;
        *guard = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Drop the cached snapshot. The next read reloads from the source.
    pub fn invalidate(&self) {
        *self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
        tracing::debug!(table = %self.table, "catalog invalidated");
    }

    /// How many times the table has been loaded from the source.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    fn load(&self) -> Result<Snapshot<T>, CatalogError> {
        let rows = self.source.load_rows(&self.table)?;
        let mut entries = Vec::with_capacity(rows.len());

        for (index, row) in rows.into_iter().enumerate() {
            let row: T::Row =
                serde_json::from_value(row).map_err(|source| CatalogError::InvalidRow {
                    table: self.table.clone(),
                    index,
                    source,
                })?;
            let entry = T::from_row(row).map_err(|message| CatalogError::InvalidField {
                table: self.table.clone(),
                index,
                message,
            })?;
            entries.push(Arc::new(entry));
        }

        self.loads.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(table = %self.table, rows = entries.len(), "catalog loaded");
        Ok(entries.into())
    }
}

impl<T: CatalogEntry> std::fmt::Debug for Catalog<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("table", &self.table)
            .field("loads", &self.load_count())
            .finish_non_exhaustive()
    }
}

/// The four catalogs the engine reads from.
#[derive(Debug)]
pub struct Catalogs {
    pub spells: Catalog<SpellDefinition>,
    pub weapons: Catalog<WeaponDefinition>,
    pub features: Catalog<FeatureDefinition>,
    pub shortcuts: Catalog<ShortcutSource>,
}

impl Catalogs {
    pub fn new(source: Arc<dyn TableSource>, config: &EngineConfig) -> Self {
        Self {
            spells: Catalog::new(&config.spells_table, Arc::clone(&source)),
            weapons: Catalog::new(&config.weapons_table, Arc::clone(&source)),
            features: Catalog::new(&config.features_table, Arc::clone(&source)),
            shortcuts: Catalog::new(&config.shortcuts_table, source),
        }
    }

    pub fn invalidate_all(&self) {
        self.spells.invalidate();
        self.weapons.invalidate();
        self.features.invalidate();
        self.shortcuts.invalidate();
    }
}

/// Lenient field deserialisers for hand-edited data tables.
pub mod de {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Bool(bool),
        Int(i64),
        Float(f64),
        Text(String),
    }

    /// A checkbox column: `true`, `x`, `yes`, `1` or any non-zero number.
    pub fn checked<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Loose>::deserialize(deserializer)? {
            None => false,
            Some(Loose::Bool(b)) => b,
            Some(Loose::Int(n)) => n != 0,
            Some(Loose::Float(n)) => n != 0.0,
            Some(Loose::Text(s)) => is_checked(&s),
        })
    }

    pub fn is_checked(text: &str) -> bool {
        matches!(
            text.trim().to_lowercase().as_str(),
            "x" | "true" | "yes" | "y" | "1"
        )
    }

    /// An integer column that may be written as a number, a string or left blank.
    pub fn lenient_int<'de, D>(deserializer: D) -> Result<i32, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Loose>::deserialize(deserializer)? {
            None => Ok(0),
            Some(Loose::Bool(b)) => Ok(i32::from(b)),
            Some(Loose::Int(n)) => i32::try_from(n).map_err(serde::de::Error::custom),
            Some(Loose::Float(n)) => Ok(n.round() as i32),
            Some(Loose::Text(s)) => {
                let s = s.trim();
                if s.is_empty() {
                    Ok(0)
                } else {
                    s.parse().map_err(serde::de::Error::custom)
                }
            }
        }
    }

    /// A text column that may hold a bare number.
    pub fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Loose>::deserialize(deserializer)? {
            None => String::new(),
            Some(Loose::Bool(b)) => b.to_string(),
            Some(Loose::Int(n)) => n.to_string(),
            Some(Loose::Float(n)) => n.to_string(),
            Some(Loose::Text(s)) => s,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemorySource;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug)]
    struct Thing {
        name: String,
        magic: bool,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct ThingRow {
        name: String,
        #[serde(default, deserialize_with = "de::checked")]
        magic: bool,
    }

    impl CatalogEntry for Thing {
        type Row = ThingRow;

        fn from_row(row: ThingRow) -> Result<Self, String> {
            if row.name.trim().is_empty() {
                return Err("name is blank".to_string());
            }
            Ok(Thing {
                name: row.name,
                magic: row.magic,
            })
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    fn source() -> Arc<InMemorySource> {
        let source = InMemorySource::new();
        source.insert(
            "things",
            vec![
                json!({"name": "Wand", "magic": "x"}),
                json!({"name": "Rope"}),
                json!({"name": "wand", "magic": true}),
            ],
        );
        Arc::new(source)
    }

    #[test]
    fn test_get_is_case_insensitive_first_match() {
        let catalog: Catalog<Thing> = Catalog::new("things", source());
        let wand = catalog.get("WAND").unwrap().unwrap();
        assert_eq!(wand.name, "Wand");
        assert!(wand.magic);
        assert!(!catalog.get("rope").unwrap().unwrap().magic);
    }

    #[test]
    fn test_get_all_in_source_order() {
        let catalog: Catalog<Thing> = Catalog::new("things", source());
        let all = catalog.get_all("wand").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "Wand");
        assert_eq!(all[1].name, "wand");
    }

    #[test]
    fn test_miss_is_not_an_error() {
        let catalog: Catalog<Thing> = Catalog::new("things", source());
        assert!(catalog.get("Lute").unwrap().is_none());
        assert!(catalog.get_all("Lute").unwrap().is_empty());
    }

    #[test]
    fn test_loads_once_until_invalidated() {
        let catalog: Catalog<Thing> = Catalog::new("things", source());
        assert_eq!(catalog.load_count(), 0);
        catalog.get("wand").unwrap();
        catalog.get("rope").unwrap();
        assert_eq!(catalog.load_count(), 1);

        catalog.invalidate();
        assert_eq!(catalog.load_count(), 1);
        catalog.get("wand").unwrap();
        assert_eq!(catalog.load_count(), 2);
    }

    #[test]
    fn test_missing_table_is_fatal() {
        let catalog: Catalog<Thing> = Catalog::new("nothing", source());
        assert!(matches!(
            catalog.get("wand"),
            Err(CatalogError::MissingTable { .. })
        ));
    }

    #[test]
    fn test_bad_row_reports_index() {
        let source = InMemorySource::new();
        source.insert("things", vec![json!({"name": "Ok"}), json!({"name": ""})]);
        let catalog: Catalog<Thing> = Catalog::new("things", Arc::new(source));
        match catalog.all() {
            Err(CatalogError::InvalidField { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected InvalidField, got {other:?}"),
        }
    }

    #[test]
    fn test_json_directory_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("things.json"),
            r#"[{"name": "Lantern", "magic": 0}]"#,
        )
        .unwrap();
        let source = JsonDirectorySource::new(dir.path());
        let catalog: Catalog<Thing> = Catalog::new("things", Arc::new(source));
        assert!(!catalog.get("lantern").unwrap().unwrap().magic);

        let missing: Catalog<Thing> =
            Catalog::new("spells", Arc::new(JsonDirectorySource::new(dir.path())));
        assert!(matches!(
            missing.all(),
            Err(CatalogError::MissingTable { .. })
        ));
    }

    #[test]
    fn test_lenient_fields() {
        #[derive(Deserialize)]
        struct Row {
            #[serde(default, deserialize_with = "de::lenient_int")]
            bonus: i32,
            #[serde(default, deserialize_with = "de::text")]
            dice: String,
        }

        let row: Row = serde_json::from_value(json!({"bonus": "2", "dice": 5})).unwrap();
        assert_eq!(row.bonus, 2);
        assert_eq!(row.dice, "5");

        let row: Row = serde_json::from_value(json!({"bonus": "", "dice": null})).unwrap();
        assert_eq!(row.bonus, 0);
        assert_eq!(row.dice, "");

        let row: Row = serde_json::from_value(json!({})).unwrap();
        assert_eq!(row.bonus, 0);
    }
}
