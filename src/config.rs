use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::app_dirs::AppDirs;
use crate::error::PreferencesError;
use crate::util::lock;

/// Settings that outlive a session, plus the all-time high score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Preferences {
    pub highscore: u32,
    pub n_back: usize,
    pub number_of_events: usize,
    pub event_interval_ms: u64,
    /// Letters in use for audio stimuli.
    pub number_of_combinations: usize,
    /// Side length of the visual grid.
    pub grid_size: usize,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            highscore: 0,
            n_back: 2,
            number_of_events: 20,
            event_interval_ms: 2000,
            number_of_combinations: 15,
            grid_size: 3,
        }
    }
}

impl Preferences {
    /// Restore every setting to its default, keeping the high score.
    pub fn reset_settings(&mut self) {
        *self = Self {
            highscore: self.highscore,
            ..Self::default()
        };
    }

    /// Read each field on its own so one malformed entry only costs that
    /// entry its stored value.
    pub fn from_json_lenient(value: &Value) -> Self {
        let defaults = Self::default();
        Self {
            highscore: field(value, "highscore", defaults.highscore),
            n_back: field(value, "n_back", defaults.n_back),
            number_of_events: field(value, "number_of_events", defaults.number_of_events),
            event_interval_ms: field(value, "event_interval_ms", defaults.event_interval_ms),
            number_of_combinations: field(
                value,
                "number_of_combinations",
                defaults.number_of_combinations,
            ),
            grid_size: field(value, "grid_size", defaults.grid_size),
        }
    }
}

fn field<T: serde::de::DeserializeOwned>(value: &Value, key: &str, default: T) -> T {
    match value.get(key) {
        None => default,
        Some(raw) => match T::deserialize(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(key, %raw, "malformed preference, using default: {e}");
                default
            }
        },
    }
}

/// Key-value store for [`Preferences`].
pub trait PreferencesStore: Send + Sync {
    fn load(&self) -> Result<Preferences, PreferencesError>;
    fn save(&self, prefs: &Preferences) -> Result<(), PreferencesError>;

    /// Load, apply `f`, save.
    fn update(&self, f: &mut dyn FnMut(&mut Preferences)) -> Result<(), PreferencesError> {
        let mut prefs = self.load()?;
        f(&mut prefs);
        self.save(&prefs)
    }

    /// Clear every stored setting except the high score.
    fn reset_settings(&self) -> Result<(), PreferencesError> {
        self.update(&mut |prefs: &mut Preferences| prefs.reset_settings())
    }
}

/// JSON file under the platform config directory.
#[derive(Debug)]
pub struct FilePreferencesStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FilePreferencesStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self::with_path(AppDirs::preferences_path())
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferencesStore for FilePreferencesStore {
    fn load(&self) -> Result<Preferences, PreferencesError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Preferences::default()),
            Err(e) => return Err(e.into()),
        };
        let value: Value = serde_json::from_slice(&bytes)?;
        Ok(Preferences::from_json_lenient(&value))
    }

    fn save(&self, prefs: &Preferences) -> Result<(), PreferencesError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(prefs)?;
        fs::write(&self.path, data)?;
        Ok(())
    }

    fn update(&self, f: &mut dyn FnMut(&mut Preferences)) -> Result<(), PreferencesError> {
        let _guard = lock(&self.write_lock);
        // Start from defaults when the file is corrupt so the write repairs it.
        let mut prefs = match self.load() {
            Ok(prefs) => prefs,
            Err(PreferencesError::Json(e)) => {
                tracing::warn!(path = %self.path.display(), "rewriting corrupt preferences: {e}");
                Preferences::default()
            }
            Err(e) => return Err(e),
        };
        f(&mut prefs);
        self.save(&prefs)
    }
}

/// In-process store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryPreferencesStore {
    prefs: Mutex<Preferences>,
}

impl MemoryPreferencesStore {
    pub fn new(prefs: Preferences) -> Self {
        Self {
            prefs: Mutex::new(prefs),
        }
    }
}

impl PreferencesStore for MemoryPreferencesStore {
    fn load(&self) -> Result<Preferences, PreferencesError> {
        Ok(lock(&self.prefs).clone())
    }

    fn save(&self, prefs: &Preferences) -> Result<(), PreferencesError> {
        *lock(&self.prefs) = prefs.clone();
        Ok(())
    }

    fn update(&self, f: &mut dyn FnMut(&mut Preferences)) -> Result<(), PreferencesError> {
        let mut prefs = lock(&self.prefs);
        f(&mut *prefs);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempdir().unwrap();
        let store = FilePreferencesStore::with_path(dir.path().join("prefs.json"));
        assert_eq!(store.load().unwrap(), Preferences::default());
    }

    #[test]
    fn save_and_load_custom_preferences() {
        let dir = tempdir().unwrap();
        let store = FilePreferencesStore::with_path(dir.path().join("nested").join("prefs.json"));
        let prefs = Preferences {
            highscore: 12,
            n_back: 3,
            number_of_events: 40,
            event_interval_ms: 1500,
            number_of_combinations: 20,
            grid_size: 4,
        };
        store.save(&prefs).unwrap();
        assert_eq!(store.load().unwrap(), prefs);
    }

    #[test]
    fn malformed_field_falls_back_for_that_field_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, r#"{"highscore": 7, "n_back": "three", "grid_size": 5}"#).unwrap();
        let prefs = FilePreferencesStore::with_path(&path).load().unwrap();
        assert_eq!(prefs.highscore, 7);
        assert_eq!(prefs.n_back, 2);
        assert_eq!(prefs.grid_size, 5);
        assert_eq!(prefs.number_of_events, 20);
    }

    #[test]
    fn corrupt_file_is_an_error_but_update_repairs_it() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "not json").unwrap();
        let store = FilePreferencesStore::with_path(&path);
        assert_matches!(store.load(), Err(PreferencesError::Json(_)));

        store.update(&mut |p| p.n_back = 4).unwrap();
        let prefs = store.load().unwrap();
        assert_eq!(prefs.n_back, 4);
        assert_eq!(prefs.highscore, 0);
    }

    #[test]
    fn reset_settings_keeps_highscore() {
        let store = MemoryPreferencesStore::new(Preferences {
            highscore: 30,
            n_back: 5,
            number_of_events: 50,
            event_interval_ms: 5000,
            number_of_combinations: 26,
            grid_size: 5,
        });
        store.reset_settings().unwrap();
        assert_eq!(
            store.load().unwrap(),
            Preferences {
                highscore: 30,
                ..Preferences::default()
            }
        );
    }

    #[test]
    fn file_reset_settings_keeps_highscore() {
        let dir = tempdir().unwrap();
        let store = FilePreferencesStore::with_path(dir.path().join("prefs.json"));
        store
            .update(&mut |p| {
                p.highscore = 9;
                p.grid_size = 5;
            })
            .unwrap();
        store.reset_settings().unwrap();
        let prefs = store.load().unwrap();
        assert_eq!(prefs.highscore, 9);
        assert_eq!(prefs.grid_size, 3);
    }
}
