//! Configuration loading with multi-layer merge

use super::{BackendConfig, RepairConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level mend configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MendConfig {
    /// Repair loop settings
    #[serde(default)]
    pub repair: RepairConfig,

    /// Model backend settings
    #[serde(default)]
    pub backend: BackendConfig,
}

impl MendConfig {
    /// Load configuration from the standard hierarchy
    ///
    /// Load order (later overrides earlier, key by key):
    /// 1. Built-in defaults
    /// 2. ~/.config/mend/config.toml
    /// 3. .mend/config.toml (project)
    /// 4. `explicit`, when given (must exist)
    pub fn load(project_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        let mut layers = Vec::new();

        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                layers.push(user_config_path);
            }
        }

        let project_config_path = project_dir.join(".mend/config.toml");
        if project_config_path.exists() {
            layers.push(project_config_path);
        }

        if let Some(path) = explicit {
            layers.push(path.to_path_buf());
        }

        Self::load_layers(&layers)
    }

    /// Load configuration from a specific file
    #[allow(dead_code)]
    pub fn load_file(path: &Path) -> Result<Self> {
        Self::load_layers(&[path.to_path_buf()])
    }

    /// Merge the given files in order and deserialize the result
    fn load_layers(paths: &[PathBuf]) -> Result<Self> {
        let mut merged = toml::Table::new();

        for path in paths {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let table: toml::Table = toml::from_str(&contents)
                .with_context(|| format!("parsing {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded config layer");
            merge_tables(&mut merged, table);
        }

        let mut config: Self = toml::Value::Table(merged)
            .try_into()
            .context("invalid configuration")?;
        config.expand_paths();
        Ok(config)
    }

    /// Get the user config path (~/.config/mend/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("mend/config.toml"))
    }

    fn expand_paths(&mut self) {
        if let Some(ref template) = self.repair.prompt_template {
            let expanded = shellexpand::tilde(&template.to_string_lossy()).into_owned();
            self.repair.prompt_template = Some(PathBuf::from(expanded));
        }
    }
}

/// Recursively merge `other` into `base`; `other` wins on conflicts
fn merge_tables(base: &mut toml::Table, other: toml::Table) {
    for (key, value) in other {
        match value {
            toml::Value::Table(incoming) => match base.get_mut(&key) {
                Some(toml::Value::Table(existing)) => merge_tables(existing, incoming),
                _ => {
                    base.insert(key, toml::Value::Table(incoming));
                }
            },
            value => {
                base.insert(key, value);
            }
        }
    }
}
