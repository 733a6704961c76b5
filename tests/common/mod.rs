//! Test helpers for supervisor integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use lunahost::config::ScriptsConfig;
use lunahost::{Config, Host, Script, Supervisor, SupervisorBuilder, ThreadingMode};

/// Host that records lifecycle callbacks.
#[derive(Default)]
pub struct RecordingHost {
    plugins: HashSet<String>,
    suppress_reports: bool,
    pub loaded: Mutex<Vec<String>>,
    pub unloaded: Mutex<Vec<(String, bool)>>,
}

impl RecordingHost {
    pub fn with_plugins(plugins: &[&str]) -> Self {
        Self {
            plugins: plugins.iter().map(|p| p.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn suppressing_reports() -> Self {
        Self {
            suppress_reports: true,
            ..Self::default()
        }
    }

    pub fn loaded(&self) -> Vec<String> {
        self.loaded.lock().clone()
    }

    /// Names of unloaded scripts, in unload order.
    pub fn unloaded_names(&self) -> Vec<String> {
        self.unloaded.lock().iter().map(|(n, _)| n.clone()).collect()
    }
}

impl Host for RecordingHost {
    fn is_plugin_present(&self, name: &str) -> bool {
        self.plugins.contains(name)
    }

    fn should_report_exception(&self, _script: &Script, _error: &mlua::Error) -> bool {
        !self.suppress_reports
    }

    fn on_script_loaded(&self, script: &Script) {
        self.loaded.lock().push(script.name().to_string());
    }

    fn on_script_unloaded(&self, script: &Script, error: bool) {
        self.unloaded.lock().push((script.name().to_string(), error));
    }
}

/// A supervisor working inside a temporary directory.
pub struct TestEnv {
    pub dir: TempDir,
    pub host: Arc<RecordingHost>,
    pub supervisor: Arc<Supervisor>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::build(RecordingHost::default(), ThreadingMode::ControlThread, |_| {})
    }

    pub fn with_host(host: RecordingHost) -> Self {
        Self::build(host, ThreadingMode::ControlThread, |_| {})
    }

    pub fn with_mode(mode: ThreadingMode) -> Self {
        Self::build(RecordingHost::default(), mode, |_| {})
    }

    pub fn with_config(configure: impl FnOnce(&mut Config)) -> Self {
        Self::build(RecordingHost::default(), ThreadingMode::ControlThread, configure)
    }

    /// Build with a per-script options file already on disk.
    pub fn with_options(toml: &str) -> Self {
        Self::with_host_and_options(RecordingHost::default(), toml)
    }

    pub fn with_host_and_options(host: RecordingHost, toml: &str) -> Self {
        let dir = TempDir::new().unwrap();
        write_file(&dir.path().join("script_options.toml"), toml);
        Self::build_in(dir, host, ThreadingMode::ControlThread, |_| {})
    }

    pub fn build(
        host: RecordingHost,
        mode: ThreadingMode,
        configure: impl FnOnce(&mut Config),
    ) -> Self {
        Self::build_in(TempDir::new().unwrap(), host, mode, configure)
    }

    fn build_in(
        dir: TempDir,
        host: RecordingHost,
        mode: ThreadingMode,
        configure: impl FnOnce(&mut Config),
    ) -> Self {
        let mut config = test_config(dir.path());
        configure(&mut config);
        fs::create_dir_all(&config.scripts.scripts_dir).unwrap();
        fs::create_dir_all(&config.scripts.projects_dir).unwrap();

        let host = Arc::new(host);
        let supervisor = SupervisorBuilder::new(config, Arc::clone(&host) as Arc<dyn Host>)
            .threading(mode)
            .build();
        Self {
            dir,
            host,
            supervisor,
        }
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.dir.path().join("scripts")
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.dir.path().join("projects")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.dir.path().join("logs")
    }

    /// Write a single-file script and return its path.
    pub fn write_script(&self, name: &str, source: &str) -> PathBuf {
        let path = self.scripts_dir().join(name);
        write_file(&path, source);
        path
    }

    /// Write a file inside a project folder and return the folder.
    pub fn write_project_file(&self, project: &str, file: &str, source: &str) -> PathBuf {
        let dir = self.projects_dir().join(project);
        write_file(&dir.join(file), source);
        dir
    }

    /// Replace the per-script options file. Read again on `reload_all`.
    pub fn write_options(&self, toml: &str) {
        write_file(&self.dir.path().join("script_options.toml"), toml);
    }
}

pub fn test_config(root: &Path) -> Config {
    let mut config = Config {
        scripts: ScriptsConfig {
            scripts_dir: root.join("scripts").display().to_string(),
            projects_dir: root.join("projects").display().to_string(),
            logs_dir: root.join("logs").display().to_string(),
            options_file: root.join("script_options.toml").display().to_string(),
            ..ScriptsConfig::default()
        },
        ..Config::default()
    };
    config.script_defaults.file_logging = false;
    config
}

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Read a global from a loaded script's interpreter.
pub fn global<V: mlua::FromLua>(supervisor: &Supervisor, script: &str, name: &str) -> V {
    supervisor
        .script(script)
        .and_then(|s| s.engine())
        .unwrap()
        .get_global(name)
        .unwrap()
}
