//! # PMORoom Configuration Module
//!
//! Configuration management for the PMORoom client core:
//! - Loading configuration from YAML files
//! - Merging with the embedded default configuration
//! - Environment variable overrides
//! - Typed getters and setters for configuration values
//! - Process-wide shared instance
//!
//! ## Usage
//!
//! ```no_run
//! use pmoconfig::get_config;
//!
//! let config = get_config()?;
//! let timeout = config.get_sync_timeout_ms()?;
//! config.set_auto_advance(true)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Result, anyhow};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};
use tracing::{info, warn};
use uuid::Uuid;

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("pmoroom.yaml");

lazy_static! {
    static ref CONFIG: Mutex<Option<Arc<Config>>> = Mutex::new(None);
}

const ENV_CONFIG_DIR: &str = "PMOROOM_CONFIG";
const ENV_PREFIX: &str = "PMOROOM_CONFIG__";
const DEFAULT_DIR_NAME: &str = ".pmoroom";

// Default values for configuration
const DEFAULT_SYNC_TIMEOUT_MS: usize = 5000;
const DEFAULT_AUTO_ADVANCE: bool = false;
const DEFAULT_VOLUME: usize = 100;
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;

/// Macro to generate getter/setter for usize values with default
macro_rules! impl_usize_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<usize> {
            match self.get_value($path) {
                Ok(Value::Number(n)) => match n.as_u64() {
                    Some(v) => Ok(v as usize),
                    None => Ok($default),
                },
                Ok(Value::String(s)) => Ok(s.trim().parse().unwrap_or($default)),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, size: usize) -> Result<()> {
            let n = Number::from(size as u64);
            self.set_value($path, Value::Number(n))
        }
    };
}

/// Macro to generate getter/setter for bool values with default
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<bool> {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => Ok(b),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Configuration manager for PMORoom
///
/// Values live in a YAML tree; every setter writes the tree back to
/// `config.yaml` unless the configuration was built in memory.
#[derive(Debug)]
pub struct Config {
    config_dir: Option<String>,
    path: Option<String>,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(self.data()),
        }
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        if Path::new(DEFAULT_DIR_NAME).exists() {
            return DEFAULT_DIR_NAME.to_string();
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(DEFAULT_DIR_NAME);
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        DEFAULT_DIR_NAME.to_string()
    }

    /// Validates and prepares a config directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        // Write then read access
        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;
        fs::read_dir(path)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `PMOROOM_CONFIG` environment variable
    /// 3. `.pmoroom` in the current directory
    /// 4. `.pmoroom` in the user's home directory
    ///
    /// The directory is created if it doesn't exist, and validated for read/write permissions.
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))?;
        Ok(dir_path)
    }

    /// Loads the configuration from the specified directory
    ///
    /// The embedded defaults are merged with `config.yaml` when present,
    /// keys are lower-cased, `PMOROOM_CONFIG__SECTION__KEY` variables are
    /// applied, and the result is written back.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir = %config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let yaml_data = match fs::read_to_string(&path) {
            Ok(data) => {
                info!(config_file = %path, "Loaded config file");
                data
            }
            Err(_) => {
                info!(config_file = %path, "Config file not found, using default embedded config");
                String::new()
            }
        };

        let config = Config {
            config_dir: Some(config_dir),
            path: Some(path),
            data: Mutex::new(Self::build_tree(&yaml_data)?),
        };

        config.save()?;
        Ok(config)
    }

    /// Builds an in-memory configuration from a YAML document.
    ///
    /// The document is merged over the embedded defaults and environment
    /// overrides apply, as with `load_config`. Nothing is ever written to
    /// disk.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(Config {
            config_dir: None,
            path: None,
            data: Mutex::new(Self::build_tree(yaml)?),
        })
    }

    fn build_tree(yaml: &str) -> Result<Value> {
        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;
        if !yaml.trim().is_empty() {
            let external_value: Value = serde_yaml::from_str(yaml)?;
            merge_yaml(&mut default_value, &Self::lower_keys_value(external_value));
        }
        let mut config_value = Self::lower_keys_value(default_value);
        Self::apply_env_overrides(&mut config_value);
        Ok(config_value)
    }

    fn data(&self) -> Value {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Directory holding `config.yaml`, if the configuration is file backed.
    pub fn directory(&self) -> Option<&str> {
        self.config_dir.as_deref()
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let yaml = serde_yaml::to_string(&self.data())?;
        fs::write(path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// `path` is an array of keys, e.g. `&["room", "auto_advance"]`.
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
            Self::set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key_value = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                match map.get(&Value::String(key.to_lowercase())) {
                    Some(next) => current = next,
                    None => return Err(anyhow!("Path {} does not exist", path[..=i].join("."))),
                }
            } else {
                return Err(anyhow!("Path {} is not a Config", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if let Some(rest) = key.strip_prefix(ENV_PREFIX) {
                let key_path = rest.split("__").collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                if let Err(err) = Self::set_value_internal(config, &key_path, yaml_value) {
                    warn!(env_var = %key, error = %err, "Ignoring config override");
                }
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    let key = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    new_map.insert(key, Self::lower_keys_value(v));
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    impl_usize_config!(
        get_sync_timeout_ms,
        set_sync_timeout_ms,
        &["room", "sync_timeout_ms"],
        DEFAULT_SYNC_TIMEOUT_MS
    );

    impl_bool_config!(
        get_auto_advance,
        set_auto_advance,
        &["room", "auto_advance"],
        DEFAULT_AUTO_ADVANCE
    );

    impl_usize_config!(
        get_default_volume,
        set_default_volume,
        &["room", "default_volume"],
        DEFAULT_VOLUME
    );

    /// Address of the session authority, if configured.
    pub fn get_server_url(&self) -> Option<String> {
        match self.get_value(&["session", "server_url"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        }
    }

    pub fn set_server_url(&self, url: &str) -> Result<()> {
        self.set_value(&["session", "server_url"], Value::String(url.to_string()))
    }

    /// Gets the persistent identifier of this install, generating one if
    /// it doesn't exist
    pub fn get_client_id(&self) -> Result<String> {
        let path = &["session", "client_id"];
        match self.get_value(path) {
            Ok(Value::String(id)) if Uuid::parse_str(id.trim()).is_ok() => Ok(id.trim().to_string()),
            _ => {
                let new_id = Uuid::new_v4().to_string();
                self.set_value(path, Value::String(new_id.clone()))?;
                Ok(new_id)
            }
        }
    }

    impl_bool_config!(
        get_log_enable_console,
        set_log_enable_console,
        &["host", "logger", "enable_console"],
        DEFAULT_LOG_ENABLE_CONSOLE
    );

    /// Récupère le niveau de log minimum depuis la configuration
    pub fn get_log_min_level(&self) -> Result<String> {
        match self.get_value(&["host", "logger", "min_level"]) {
            Ok(Value::String(s)) => Ok(s),
            _ => Ok(DEFAULT_LOG_MIN_LEVEL.to_string()),
        }
    }

    /// Définit le niveau de log minimum dans la configuration
    pub fn set_log_min_level(&self, level: String) -> Result<()> {
        self.set_value(&["host", "logger", "min_level"], Value::String(level))
    }
}

/// Returns the shared configuration instance
///
/// The configuration is loaded on first access from the default
/// directory search. Later calls return the same instance.
pub fn get_config() -> Result<Arc<Config>> {
    let mut slot = CONFIG.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(config) = slot.as_ref() {
        return Ok(config.clone());
    }
    let config = Arc::new(Config::load_config("")?);
    *slot = Some(config.clone());
    Ok(config)
}

/// Merges external YAML configuration into default configuration
///
/// Mappings are merged key by key; scalars and sequences from `external`
/// replace the default.
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

    #[test]
    fn test_embedded_defaults() {
        let config = Config::from_yaml_str("").unwrap();
        assert_eq!(config.get_sync_timeout_ms().unwrap(), 5000);
        assert!(!config.get_auto_advance().unwrap());
        assert_eq!(config.get_default_volume().unwrap(), 100);
        assert_eq!(config.get_server_url(), None);
        assert_eq!(config.get_log_min_level().unwrap(), "INFO");
        assert!(config.get_log_enable_console().unwrap());
    }

    #[test]
    fn test_yaml_overrides_defaults_with_mixed_case_keys() {
        let config = Config::from_yaml_str(
            "Room:\n  Sync_Timeout_Ms: 1500\n  auto_advance: true\nsession:\n  server_url: ws://relay.local\n",
        )
        .unwrap();
        assert_eq!(config.get_sync_timeout_ms().unwrap(), 1500);
        assert!(config.get_auto_advance().unwrap());
        assert_eq!(config.get_default_volume().unwrap(), 100);
        assert_eq!(config.get_server_url().as_deref(), Some("ws://relay.local"));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = Config::from_yaml_str("room:\n  sync_timeout_ms: soon\n  default_volume: -4\n").unwrap();
        assert_eq!(config.get_sync_timeout_ms().unwrap(), 5000);
        assert_eq!(config.get_default_volume().unwrap(), 100);
    }

    #[test]
    fn test_setters_in_memory() {
        let config = Config::from_yaml_str("").unwrap();
        config.set_default_volume(40).unwrap();
        config.set_auto_advance(true).unwrap();
        assert_eq!(config.get_default_volume().unwrap(), 40);
        assert!(config.get_auto_advance().unwrap());
        assert_eq!(config.directory(), None);
    }

    #[test]
    fn test_client_id_is_generated_once() {
        let config = Config::from_yaml_str("").unwrap();
        let first = config.get_client_id().unwrap();
        assert!(Uuid::parse_str(&first).is_ok());
        assert_eq!(config.get_client_id().unwrap(), first);
    }

    #[test]
    fn test_load_config_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = dir.path().to_string_lossy().to_string();
        fs::write(dir.path().join("config.yaml"), "room:\n  default_volume: 55\n").unwrap();

        let config = Config::load_config(&dir_path).unwrap();
        assert_eq!(config.get_default_volume().unwrap(), 55);
        config.set_sync_timeout_ms(2500).unwrap();

        let reloaded = Config::load_config(&dir_path).unwrap();
        assert_eq!(reloaded.get_sync_timeout_ms().unwrap(), 2500);
        assert_eq!(reloaded.get_default_volume().unwrap(), 55);
    }

    #[test]
    fn test_merge_replaces_scalars_and_keeps_siblings() {
        let mut base: Value = serde_yaml::from_str("a:\n  b: 1\n  c: 2\n").unwrap();
        let ext: Value = serde_yaml::from_str("a:\n  c: 3\n  d: 4\n").unwrap();
        merge_yaml(&mut base, &ext);
        let config = Config {
            config_dir: None,
            path: None,
            data: Mutex::new(base),
        };
        assert_eq!(config.get_value(&["a", "b"]).unwrap(), Value::from(1));
        assert_eq!(config.get_value(&["a", "c"]).unwrap(), Value::from(3));
        assert_eq!(config.get_value(&["a", "d"]).unwrap(), Value::from(4));
        assert!(config.get_value(&["a", "e"]).is_err());
    }
}
