//! # PMOKuwo Configuration Module
//!
//! This module provides configuration management for the Kuwo cache engine:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Managed directories and files resolved against the configuration directory
//! - Thread-safe singleton access pattern
//!
//! ## Usage
//!
//! ```no_run
//! use pmoconfig::get_config;
//!
//! let config = get_config();
//! let songs = config.get_managed_dir(&["kuwo", "directories", "songs"], "songs")?;
//! let attempts = config.get_usize(&["kuwo", "network", "max_attempts"], 3)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::info;

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("kuwo.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load PMOKuwo configuration"));
}

const ENV_CONFIG_DIR: &str = "PMOKUWO_CONFIG";
const ENV_PREFIX: &str = "PMOKUWO_CONFIG__";
const CONFIG_DIR_NAME: &str = ".pmokuwo";
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Configuration manager
///
/// Holds the merged YAML tree (defaults, `config.yaml`, environment) and
/// writes it back to `config.yaml` after every mutation.
#[derive(Debug)]
pub struct Config {
    config_dir: PathBuf,
    path: PathBuf,
    data: Mutex<Value>,
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> PathBuf {
        if !directory.is_empty() {
            return PathBuf::from(directory);
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return PathBuf::from(env_path);
        }

        if Path::new(CONFIG_DIR_NAME).exists() {
            return PathBuf::from(CONFIG_DIR_NAME);
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config;
            }
        }

        PathBuf::from(CONFIG_DIR_NAME)
    }

    /// Creates the directory if needed and checks that it is writable
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        let probe = path.join(".write_test");
        fs::write(&probe, b"test")?;
        fs::remove_file(&probe)?;

        Ok(())
    }

    /// Loads the configuration from the specified directory
    ///
    /// 1. Determines the configuration directory (argument, `PMOKUWO_CONFIG`,
    ///    `./.pmokuwo`, `~/.pmokuwo`)
    /// 2. Loads the embedded defaults
    /// 3. Merges `config.yaml` on top of them when present
    /// 4. Applies `PMOKUWO_CONFIG__SECTION__KEY=value` overrides
    /// 5. Saves the merged result
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::find_config_dir(directory);
        Self::validate_config_dir(&config_dir)?;
        info!(config_dir = %config_dir.display(), "Using config directory");

        let path = config_dir.join(CONFIG_FILE_NAME);

        let mut value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        match fs::read(&path) {
            Ok(data) => {
                info!(config_file = %path.display(), "Loaded config file");
                let external: Value = serde_yaml::from_slice(&data)?;
                merge_yaml(&mut value, &external);
            }
            Err(_) => {
                info!(config_file = %path.display(), "Config file not found, using embedded defaults");
            }
        }

        let mut value = lower_keys(value);
        apply_env_overrides(&mut value);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(value),
        };

        config.save()?;
        Ok(config)
    }

    fn data(&self) -> MutexGuard<'_, Value> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Directory holding `config.yaml`; relative managed paths resolve against it
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Saves the current configuration to `config.yaml`
    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&*self.data())?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// # Arguments
    ///
    /// * `path` - Keys from the root (e.g. `&["kuwo", "use_ape"]`)
    /// * `value` - The YAML value to store
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.data();
            set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    /// Gets a configuration value at the specified path
    ///
    /// Fails when one of the keys does not exist.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data();
        let mut current = &*data;
        for (i, key) in path.iter().enumerate() {
            match current {
                Value::Mapping(map) => match map.get(Value::String(key.to_lowercase())) {
                    Some(next) => current = next,
                    None => return Err(anyhow!("Path {} does not exist", path[..=i].join("."))),
                },
                _ => return Err(anyhow!("Path {} is not a mapping", path[..i].join("."))),
            }
        }
        Ok(current.clone())
    }

    /// Reads an unsigned integer, falling back to `default` when absent or of another type
    pub fn get_usize(&self, path: &[&str], default: usize) -> Result<usize> {
        match self.get_value(path) {
            Ok(Value::Number(n)) => Ok(n.as_u64().map(|v| v as usize).unwrap_or(default)),
            Ok(Value::String(s)) => Ok(s.trim().parse().unwrap_or(default)),
            _ => Ok(default),
        }
    }

    pub fn set_usize(&self, path: &[&str], value: usize) -> Result<()> {
        self.set_value(path, Value::Number(Number::from(value as u64)))
    }

    /// Reads a boolean, falling back to `default` when absent or of another type
    pub fn get_bool(&self, path: &[&str], default: bool) -> Result<bool> {
        match self.get_value(path) {
            Ok(Value::Bool(b)) => Ok(b),
            _ => Ok(default),
        }
    }

    pub fn set_bool(&self, path: &[&str], value: bool) -> Result<()> {
        self.set_value(path, Value::Bool(value))
    }

    /// Reads a string, falling back to `default` when absent or of another type
    pub fn get_string(&self, path: &[&str], default: &str) -> Result<String> {
        match self.get_value(path) {
            Ok(Value::String(s)) => Ok(s),
            _ => Ok(default.to_string()),
        }
    }

    fn resolve(&self, raw: &str) -> PathBuf {
        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    /// Récupère un répertoire géré par la configuration
    ///
    /// Le répertoire peut être absolu ou relatif au répertoire de
    /// configuration. Il est créé s'il n'existe pas. Si la clé est absente,
    /// `default` est enregistré dans la configuration puis utilisé.
    ///
    /// # Exemple
    ///
    /// ```no_run
    /// use pmoconfig::get_config;
    ///
    /// let config = get_config();
    /// let lyrics = config.get_managed_dir(&["kuwo", "directories", "lyrics"], "cache/lyrics")?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn get_managed_dir(&self, path: &[&str], default: &str) -> Result<PathBuf> {
        let raw = match self.get_value(path) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => {
                self.set_managed_dir(path, default.to_string())?;
                default.to_string()
            }
        };

        let directory = self.resolve(&raw);
        if !directory.exists() {
            fs::create_dir_all(&directory)?;
            info!(directory = %directory.display(), "Created managed directory");
        }
        Ok(directory)
    }

    /// Définit un répertoire géré par la configuration
    pub fn set_managed_dir(&self, path: &[&str], directory: String) -> Result<()> {
        self.set_value(path, Value::String(directory))
    }

    /// Récupère un fichier géré par la configuration (ex: une base SQLite)
    ///
    /// Même résolution que [`Config::get_managed_dir`], mais c'est le
    /// répertoire parent qui est créé.
    pub fn get_managed_file(&self, path: &[&str], default: &str) -> Result<PathBuf> {
        let raw = match self.get_value(path) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => {
                self.set_value(path, Value::String(default.to_string()))?;
                default.to_string()
            }
        };

        let file = self.resolve(&raw);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(file)
    }

    /// Niveau de log minimum (`kuwo.logger.min_level`)
    pub fn get_log_min_level(&self) -> Result<String> {
        self.get_string(&["kuwo", "logger", "min_level"], "info")
    }
}

/// Returns the global configuration instance
///
/// The instance is loaded lazily on first access.
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
    if path.is_empty() {
        *data = value;
        return Ok(());
    }
    match data {
        Value::Mapping(map) => {
            let key = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key, value);
                Ok(())
            } else {
                let entry = map.entry(key).or_insert(Value::Mapping(Mapping::new()));
                set_value_internal(entry, &path[1..], value)
            }
        }
        _ => Err(anyhow!("Current node is not a map")),
    }
}

fn apply_env_overrides(config: &mut Value) {
    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
            let key_path = stripped.split("__").collect::<Vec<_>>();
            let yaml_value = serde_yaml::from_str::<Value>(&value)
                .unwrap_or_else(|_| Value::String(value.clone()));
            let _ = set_value_internal(config, &key_path, yaml_value);
        }
    }
}

fn lower_keys(value: Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut lowered = Mapping::new();
            for (k, v) in map {
                let k = match k {
                    Value::String(s) => Value::String(s.to_lowercase()),
                    other => other,
                };
                lowered.insert(k, lower_keys(v));
            }
            Value::Mapping(lowered)
        }
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys).collect()),
        _ => value,
    }
}

/// Merges external YAML configuration into default configuration
///
/// Mappings are merged key by key; scalars and sequences from `external`
/// replace the default value.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(dir: &Path) -> Config {
        Config::load_config(dir.to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_defaults_are_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(dir.path());

        assert_eq!(config.get_usize(&["kuwo", "network", "max_attempts"], 0).unwrap(), 3);
        assert_eq!(config.get_usize(&["kuwo", "network", "timeout_secs"], 0).unwrap(), 30);
        assert!(!config.get_bool(&["kuwo", "use_ape"], true).unwrap());
        assert!(dir.path().join(CONFIG_FILE_NAME).exists());
    }

    #[test]
    fn test_external_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "kuwo:\n  use_ape: true\n  network:\n    max_attempts: 5\n",
        )
        .unwrap();

        let config = load(dir.path());
        assert!(config.get_bool(&["kuwo", "use_ape"], false).unwrap());
        assert_eq!(config.get_usize(&["kuwo", "network", "max_attempts"], 0).unwrap(), 5);
        // Les clés non redéfinies gardent leur valeur par défaut
        assert_eq!(config.get_usize(&["kuwo", "network", "timeout_secs"], 0).unwrap(), 30);
    }

    #[test]
    fn test_set_value_persists() {
        let dir = tempfile::tempdir().unwrap();
        {
            let config = load(dir.path());
            config.set_usize(&["kuwo", "workers"], 2).unwrap();
        }
        let config = load(dir.path());
        assert_eq!(config.get_usize(&["kuwo", "workers"], 8).unwrap(), 2);
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(dir.path());
        assert!(config.get_value(&["kuwo", "nope"]).is_err());
        assert_eq!(config.get_usize(&["kuwo", "nope"], 7).unwrap(), 7);
    }

    #[test]
    fn test_managed_dir_is_relative_to_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(dir.path());

        let lyrics = config
            .get_managed_dir(&["kuwo", "directories", "lyrics"], "lrc")
            .unwrap();
        assert_eq!(lyrics, dir.path().join("cache/lyrics"));
        assert!(lyrics.is_dir());

        let extra = config
            .get_managed_dir(&["kuwo", "directories", "extra"], "extra")
            .unwrap();
        assert_eq!(extra, dir.path().join("extra"));
        assert_eq!(
            config.get_string(&["kuwo", "directories", "extra"], "").unwrap(),
            "extra"
        );
    }

    #[test]
    fn test_managed_file_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(dir.path());

        let db = config
            .get_managed_file(&["kuwo", "databases", "other"], "db/other.db")
            .unwrap();
        assert_eq!(db, dir.path().join("db/other.db"));
        assert!(dir.path().join("db").is_dir());
        assert!(!db.exists());
    }

    #[test]
    fn test_merge_yaml_replaces_scalars() {
        let mut base: Value = serde_yaml::from_str("a: 1\nb:\n  c: 2\n  d: 3\n").unwrap();
        let ext: Value = serde_yaml::from_str("b:\n  c: 9\ne: x\n").unwrap();
        merge_yaml(&mut base, &ext);

        let expected: Value = serde_yaml::from_str("a: 1\nb:\n  c: 9\n  d: 3\ne: x\n").unwrap();
        assert_eq!(base, expected);
    }
}
