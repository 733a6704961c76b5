//! Configuration module for lunahost.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::{LunaError, Result};

/// Script discovery and loading configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptsConfig {
    /// Directory scanned recursively for single-file scripts.
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: String,
    /// Directory whose immediate subdirectories are projects.
    #[serde(default = "default_projects_dir")]
    pub projects_dir: String,
    /// Directory for per-script log files.
    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,
    /// Per-script options file, keyed by script file name.
    #[serde(default = "default_options_file")]
    pub options_file: String,
    /// Options file name looked up inside each project folder.
    #[serde(default = "default_project_file")]
    pub project_file: String,
    /// Main file of a project when its options do not name one.
    #[serde(default = "default_main")]
    pub default_main: String,
    /// Spread startup loads across ticks instead of loading in one burst.
    #[serde(default)]
    pub incremental_load: bool,
    /// Ticks between two incremental loads.
    #[serde(default = "default_load_interval")]
    pub load_interval_ticks: u32,
    /// Length of one host tick in milliseconds.
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
    /// Log every load and unload at info level.
    #[serde(default = "default_action_logging")]
    pub action_logging: bool,
}

fn default_scripts_dir() -> String {
    "scripts".to_string()
}

fn default_projects_dir() -> String {
    "projects".to_string()
}

fn default_logs_dir() -> String {
    "logs".to_string()
}

fn default_options_file() -> String {
    "script_options.toml".to_string()
}

fn default_project_file() -> String {
    "project.toml".to_string()
}

fn default_main() -> String {
    "main.lua".to_string()
}

fn default_load_interval() -> u32 {
    1
}

fn default_tick_millis() -> u64 {
    50
}

fn default_action_logging() -> bool {
    true
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            scripts_dir: default_scripts_dir(),
            projects_dir: default_projects_dir(),
            logs_dir: default_logs_dir(),
            options_file: default_options_file(),
            project_file: default_project_file(),
            default_main: default_main(),
            incremental_load: false,
            load_interval_ticks: default_load_interval(),
            tick_millis: default_tick_millis(),
            action_logging: default_action_logging(),
        }
    }
}

/// Global defaults applied to every script's options.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptDefaults {
    /// Whether scripts may be loaded at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Whether scripts are picked up by the startup batch.
    #[serde(default = "default_auto_load")]
    pub auto_load: bool,
    /// Load priority; higher loads earlier.
    #[serde(default = "default_load_priority")]
    pub load_priority: i32,
    /// External capabilities that must be present.
    #[serde(default)]
    pub plugin_depend: Vec<String>,
    /// Whether each script writes its own log file.
    #[serde(default = "default_file_logging")]
    pub file_logging: bool,
    /// Minimum level recorded by script loggers.
    #[serde(default = "default_min_logging_level")]
    pub min_logging_level: String,
    /// Permissions granted to each script while it is loaded.
    #[serde(default)]
    pub permissions: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_auto_load() -> bool {
    true
}

fn default_load_priority() -> i32 {
    1
}

fn default_file_logging() -> bool {
    true
}

fn default_min_logging_level() -> String {
    "info".to_string()
}

impl Default for ScriptDefaults {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            auto_load: default_auto_load(),
            load_priority: default_load_priority(),
            plugin_depend: Vec::new(),
            file_logging: default_file_logging(),
            min_logging_level: default_min_logging_level(),
            permissions: Vec::new(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/lunahost.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Script discovery and loading.
    #[serde(default)]
    pub scripts: ScriptsConfig,
    /// Global script option defaults.
    #[serde(default)]
    pub script_defaults: ScriptDefaults,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(LunaError::Io)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| LunaError::Config(format!("config parse error: {e}")))
    }
}

/// Per-script or per-project option overrides.
///
/// Every field is optional; an absent field falls back to [`ScriptDefaults`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OptionOverrides {
    pub enabled: Option<bool>,
    pub auto_load: Option<bool>,
    pub load_priority: Option<i32>,
    pub plugin_depend: Option<Vec<String>>,
    pub file_logging: Option<bool>,
    pub min_logging_level: Option<String>,
    pub permissions: Option<Vec<String>>,
    /// Main file name (projects only).
    pub main: Option<String>,
}

/// The per-script options file: a table of overrides keyed by script file name.
#[derive(Debug, Clone, Default)]
pub struct ScriptOptionsFile {
    entries: HashMap<String, OptionOverrides>,
}

impl ScriptOptionsFile {
    /// Load the options file; a missing file yields an empty table.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse the options file from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        let entries = toml::from_str(s)
            .map_err(|e| LunaError::Config(format!("script options parse error: {e}")))?;
        Ok(Self { entries })
    }

    /// Overrides for the given script, if it has an entry.
    pub fn get(&self, script_name: &str) -> Option<&OptionOverrides> {
        self.entries.get(script_name)
    }

    /// Check whether the given script has an entry.
    pub fn contains(&self, script_name: &str) -> bool {
        self.entries.contains_key(script_name)
    }
}

/// Load a project's own options file; a missing file yields no overrides.
pub fn load_project_overrides<P: AsRef<Path>>(path: P) -> Result<OptionOverrides> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(OptionOverrides::default());
    }
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| {
        LunaError::Config(format!(
            "project options parse error in {}: {e}",
            path.display()
        ))
    })
}
