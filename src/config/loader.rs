// src/config/loader.rs
//! Layered configuration loading: defaults, TOML files, environment

use crate::config::constants::paths;
use crate::config::CoreConfig;
use crate::error::{IngestError, IngestResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Top-level sections an environment override may target
const SECTIONS: [&str; 2] = ["session", "capture"];
/// Keys deserialized as strings; env values for them are never reinterpreted as numbers
const STRING_KEYS: [&str; 2] = ["capture.path", "session.layout.kind"];

/// Loads [`CoreConfig`] from layered sources
///
/// Later files override earlier ones key by key; `NXBCI_<SECTION>_<KEY>` environment
/// variables override every file (e.g. `NXBCI_SESSION_SAMPLE_RATE=1000`). The merged result
/// is validated before it is returned.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_paths: Vec<PathBuf>,
    current_config: CoreConfig,
}

impl ConfigLoader {
    /// Loader over the default search paths
    pub fn new() -> Self {
        Self::with_paths(Self::discover_config_paths())
    }

    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            config_paths: paths,
            current_config: CoreConfig::default(),
        }
    }

    pub fn config_paths(&self) -> &[PathBuf] {
        &self.config_paths
    }

    /// Merge every existing file and the environment, validate, and keep the result
    pub fn load(&mut self) -> IngestResult<CoreConfig> {
        let config = self.load_and_merge_configs()?;
        self.current_config = config.clone();
        Ok(config)
    }

    /// Last successfully loaded configuration
    pub fn current_config(&self) -> &CoreConfig {
        &self.current_config
    }

    /// Parse and validate a single file, without defaults or environment
    pub fn load_file<P: AsRef<Path>>(path: P) -> IngestResult<CoreConfig> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(IngestError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: CoreConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the current configuration as TOML
    pub fn export_config<P: AsRef<Path>>(&self, path: P) -> IngestResult<()> {
        let content = toml::to_string_pretty(&self.current_config).map_err(|e| IngestError::Parse(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn load_and_merge_configs(&self) -> IngestResult<CoreConfig> {
        let mut merged = toml::Value::try_from(CoreConfig::default()).map_err(|e| IngestError::Parse(e.to_string()))?;

        for path in &self.config_paths {
            if !path.is_file() {
                continue;
            }
            debug!("Merging configuration from {}", path.display());
            let content = std::fs::read_to_string(path)?;
            let overlay: toml::Value = toml::from_str(&content)?;
            merge_toml_values(&mut merged, overlay);
        }

        self.apply_environment_overrides(&mut merged);

        let config: CoreConfig = merged.try_into()?;
        config.validate()?;
        info!(
            "Configuration loaded: {} channels at {} Hz, {} layout",
            config.session.channels,
            config.session.sample_rate,
            config.session.layout.name()
        );
        Ok(config)
    }

    fn apply_environment_overrides(&self, config: &mut toml::Value) {
        for (key, value) in std::env::vars() {
            let Some(rest) = key.strip_prefix(paths::ENV_PREFIX) else {
                continue;
            };
            let rest = rest.to_lowercase();
            let Some((section, field)) = rest.split_once('_') else {
                warn!("Ignoring {}: expected {}<SECTION>_<KEY>", key, paths::ENV_PREFIX);
                continue;
            };
            if !SECTIONS.contains(&section) {
                warn!("Ignoring {}: unknown section '{}'", key, section);
                continue;
            }

            let mut path = vec![section.to_string()];
            match field.strip_prefix("layout_") {
                Some(layout_key) => path.extend(["layout".to_string(), layout_key.to_string()]),
                None => path.push(field.to_string()),
            }

            let dotted = path.join(".");
            debug!("Environment override {} = {}", dotted, value);
            let value = if STRING_KEYS.contains(&dotted.as_str()) {
                toml::Value::String(value)
            } else {
                parse_env_value(&value)
            };
            set_nested_value(config, &path, value);
        }
    }

    fn discover_config_paths() -> Vec<PathBuf> {
        vec![
            PathBuf::from(paths::DEFAULT_CONFIG_FILE),
            PathBuf::from(paths::LOCAL_CONFIG_FILE),
        ]
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_toml_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                if let Some(base_value) = base_table.get_mut(&key) {
                    merge_toml_values(base_value, value);
                } else {
                    base_table.insert(key, value);
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value;
        }
    }
}

fn parse_env_value(value: &str) -> toml::Value {
    if let Ok(int_val) = value.parse::<i64>() {
        toml::Value::Integer(int_val)
    } else if let Ok(float_val) = value.parse::<f64>() {
        toml::Value::Float(float_val)
    } else if let Ok(bool_val) = value.parse::<bool>() {
        toml::Value::Boolean(bool_val)
    } else {
        toml::Value::String(value.to_string())
    }
}

fn set_nested_value(config: &mut toml::Value, path: &[String], value: toml::Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = config;
    for part in parents {
        let toml::Value::Table(table) = current else {
            return;
        };
        current = table
            .entry(part.clone())
            .or_insert_with(|| toml::Value::Table(toml::value::Table::new()));
    }

    if let toml::Value::Table(table) = current {
        table.insert(last.clone(), value);
    }
}
