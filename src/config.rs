//! Per-module override configuration.
//!
//! Modules can place a `stratagen.toml` next to their `package.json` to
//! override the conventional locations and names the planner assumes. The file
//! is optional; a missing file means "all defaults". A present-but-broken file
//! is a hard error, because explicit configuration must never be silently
//! ignored.

use crate::boundary::ModuleRoot;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name probed next to the module manifest.
pub const CONFIG_FILE_NAME: &str = "stratagen.toml";

/// Generator command recognized in package scripts unless overridden.
pub const DEFAULT_GENERATOR_COMMAND: &str = "persistence-gen";
/// Package script consulted for dependency installation unless overridden.
pub const DEFAULT_INSTALL_SCRIPT: &str = "install:deps";
/// Discriminator field assumed when a schema does not declare one.
pub const DEFAULT_DISCRIMINATOR_FIELD: &str = "entityType";

/// Raw override file contents. All sections and keys are optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Generator command name recognized in package scripts.
    pub generator_command: Option<String>,
    /// Package script that installs module dependencies.
    pub install_script: Option<String>,
    /// Discriminator field name assumed when the schema declares none.
    pub discriminator_field: Option<String>,
    #[serde(default)]
    pub outputs: OutputOverrides,
    #[serde(default)]
    pub wrappers: WrapperOverrides,
    #[serde(default)]
    pub conventions: ConventionOverrides,
}

/// Overrides for the expected generated-output locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputOverrides {
    pub db_beans: Option<PathBuf>,
    pub document_beans: Option<PathBuf>,
    pub dao: Option<PathBuf>,
    pub transactional_dao: Option<PathBuf>,
}

/// Overrides for the optional wrapper-layer locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WrapperOverrides {
    pub beans: Option<PathBuf>,
    pub daos: Option<PathBuf>,
}

/// Overrides for where existing converters/procedures are scanned for
/// naming precedent and import style.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConventionOverrides {
    pub converters: Option<PathBuf>,
    pub procedures: Option<PathBuf>,
}

/// Fully resolved configuration: overrides merged over defaults. Everything
/// downstream of discovery reads this, never the raw file.
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub generator_command: String,
    pub install_script: String,
    pub discriminator_field: String,
    pub db_beans_dir: PathBuf,
    pub document_beans_dir: PathBuf,
    pub dao_dir: PathBuf,
    pub transactional_dao_dir: PathBuf,
    pub bean_wrapper_dir: PathBuf,
    pub dao_wrapper_dir: PathBuf,
    pub converter_dir: PathBuf,
    pub procedure_dir: PathBuf,
}

impl EffectiveConfig {
    /// Merge a loaded (or absent) override file with the built-in defaults.
    /// `install_script_override` is the CLI-level override, which wins over
    /// the file.
    pub fn merge(config: Option<ModuleConfig>, install_script_override: Option<&str>) -> Self {
        let config = config.unwrap_or_default();
        let install_script = install_script_override
            .map(str::to_string)
            .or(config.install_script)
            .unwrap_or_else(|| DEFAULT_INSTALL_SCRIPT.to_string());
        EffectiveConfig {
            generator_command: config
                .generator_command
                .unwrap_or_else(|| DEFAULT_GENERATOR_COMMAND.to_string()),
            install_script,
            discriminator_field: config
                .discriminator_field
                .unwrap_or_else(|| DEFAULT_DISCRIMINATOR_FIELD.to_string()),
            db_beans_dir: config
                .outputs
                .db_beans
                .unwrap_or_else(|| PathBuf::from("generated/db-beans")),
            document_beans_dir: config
                .outputs
                .document_beans
                .unwrap_or_else(|| PathBuf::from("generated/document-beans")),
            dao_dir: config
                .outputs
                .dao
                .unwrap_or_else(|| PathBuf::from("generated/dao")),
            transactional_dao_dir: config
                .outputs
                .transactional_dao
                .unwrap_or_else(|| PathBuf::from("generated/transactional-dao")),
            bean_wrapper_dir: config
                .wrappers
                .beans
                .unwrap_or_else(|| PathBuf::from("src/beans")),
            dao_wrapper_dir: config
                .wrappers
                .daos
                .unwrap_or_else(|| PathBuf::from("src/daos")),
            converter_dir: config
                .conventions
                .converters
                .unwrap_or_else(|| PathBuf::from("src/converters")),
            procedure_dir: config
                .conventions
                .procedures
                .unwrap_or_else(|| PathBuf::from("src/procedures")),
        }
    }
}

/// Load the override file for a module.
///
/// Returns `Ok(None)` when the file does not exist (not an error), the parsed
/// config when it does, and an error when it exists but fails to parse.
pub fn load_module_config(root: &ModuleRoot) -> Result<Option<ModuleConfig>> {
    let config_path = root.path().join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&config_path)?;
    let config: ModuleConfig = toml::from_str(&contents).map_err(|e| Error::Config {
        path: config_path.clone(),
        detail: e.to_string(),
    })?;
    Ok(Some(config))
}

/// Resolve the effective configuration for a module: probe the override file,
/// merge with defaults, apply the CLI install-script override.
pub fn resolve_config(
    root: &ModuleRoot,
    install_script_override: Option<&str>,
) -> Result<EffectiveConfig> {
    let loaded = load_module_config(root)?;
    Ok(EffectiveConfig::merge(loaded, install_script_override))
}

/// Path the override file would occupy for a module (whether or not it exists).
pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE_NAME)
}
