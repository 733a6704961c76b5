//! Per-script options, layered over the global defaults.

use std::fmt;

use tracing::{warn, Level};

use crate::config::{OptionOverrides, ScriptDefaults};
use crate::logging::parse_level;

/// Resolved options for one script or project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOptions {
    /// Whether the script may be loaded.
    pub enabled: bool,
    /// Whether the startup batch picks the script up.
    pub auto_load: bool,
    /// Load priority; higher loads earlier.
    pub load_priority: i32,
    /// External capabilities that must be present before loading.
    pub plugin_dependencies: Vec<String>,
    /// Whether the script writes its own log file.
    pub file_logging_enabled: bool,
    /// Minimum level recorded by the script logger.
    pub min_logging_level: Level,
    /// Permissions granted while the script is loaded.
    pub permissions: Vec<String>,
    /// Declared main file (projects only).
    pub main_script: Option<String>,
}

impl ScriptOptions {
    /// Options made only of the global defaults.
    pub fn from_defaults(defaults: &ScriptDefaults) -> Self {
        Self::resolve(defaults, None)
    }

    /// Layer per-script overrides over the global defaults.
    ///
    /// An unparseable logging level falls back to the default level with a warning.
    pub fn resolve(defaults: &ScriptDefaults, overrides: Option<&OptionOverrides>) -> Self {
        let empty = OptionOverrides::default();
        let o = overrides.unwrap_or(&empty);

        let default_level = parse_level(&defaults.min_logging_level).unwrap_or_else(|| {
            warn!(
                "Invalid default script logging level '{}', using INFO",
                defaults.min_logging_level
            );
            Level::INFO
        });
        let min_logging_level = match o.min_logging_level.as_deref() {
            Some(raw) => parse_level(raw).unwrap_or_else(|| {
                warn!("Invalid script logging level '{raw}', using {default_level}");
                default_level
            }),
            None => default_level,
        };

        let plugin_dependencies = o
            .plugin_depend
            .as_ref()
            .unwrap_or(&defaults.plugin_depend)
            .iter()
            .map(|dep| dep.trim().replace(' ', "_"))
            .filter(|dep| !dep.is_empty())
            .collect();

        Self {
            enabled: o.enabled.unwrap_or(defaults.enabled),
            auto_load: o.auto_load.unwrap_or(defaults.auto_load),
            load_priority: o.load_priority.unwrap_or(defaults.load_priority),
            plugin_dependencies,
            file_logging_enabled: o.file_logging.unwrap_or(defaults.file_logging),
            min_logging_level,
            permissions: o
                .permissions
                .clone()
                .unwrap_or_else(|| defaults.permissions.clone()),
            main_script: o.main.clone(),
        }
    }
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self::from_defaults(&ScriptDefaults::default())
    }
}

impl fmt::Display for ScriptOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ScriptOptions[enabled: {}, auto load: {}, load priority: {}, plugin dependencies: {:?}, file logging: {}, minimum logging level: {}, permissions: {:?}",
            self.enabled,
            self.auto_load,
            self.load_priority,
            self.plugin_dependencies,
            self.file_logging_enabled,
            self.min_logging_level,
            self.permissions,
        )?;
        if let Some(main) = &self.main_script {
            write!(f, ", main: {main}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_only() {
        let options = ScriptOptions::default();
        assert!(options.enabled);
        assert!(options.auto_load);
        assert_eq!(options.load_priority, 1);
        assert!(options.plugin_dependencies.is_empty());
        assert_eq!(options.min_logging_level, Level::INFO);
        assert!(options.main_script.is_none());
    }

    #[test]
    fn test_overrides_win_over_defaults() {
        let defaults = ScriptDefaults {
            load_priority: 3,
            plugin_depend: vec!["Vault".to_string()],
            ..ScriptDefaults::default()
        };
        let overrides = OptionOverrides {
            load_priority: Some(10),
            enabled: Some(false),
            min_logging_level: Some("debug".to_string()),
            ..OptionOverrides::default()
        };

        let options = ScriptOptions::resolve(&defaults, Some(&overrides));
        assert_eq!(options.load_priority, 10);
        assert!(!options.enabled);
        assert_eq!(options.min_logging_level, Level::DEBUG);
        // Not overridden, so the default list applies.
        assert_eq!(options.plugin_dependencies, vec!["Vault"]);
    }

    #[test]
    fn test_plugin_dependency_names_normalized() {
        let overrides = OptionOverrides {
            plugin_depend: Some(vec!["World Edit".to_string(), " ".to_string()]),
            ..OptionOverrides::default()
        };
        let options = ScriptOptions::resolve(&ScriptDefaults::default(), Some(&overrides));
        assert_eq!(options.plugin_dependencies, vec!["World_Edit"]);
    }

    #[test]
    fn test_invalid_level_falls_back_to_default() {
        let defaults = ScriptDefaults {
            min_logging_level: "warn".to_string(),
            ..ScriptDefaults::default()
        };
        let overrides = OptionOverrides {
            min_logging_level: Some("chatty".to_string()),
            ..OptionOverrides::default()
        };
        let options = ScriptOptions::resolve(&defaults, Some(&overrides));
        assert_eq!(options.min_logging_level, Level::WARN);
    }

    #[test]
    fn test_display_includes_main_for_projects() {
        let options = ScriptOptions {
            main_script: Some("app.lua".to_string()),
            ..ScriptOptions::default()
        };
        let text = options.to_string();
        assert!(text.contains("load priority: 1"));
        assert!(text.ends_with("main: app.lua]"));
    }
}
