//! Script entity and load outcome types.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::Level;

use super::engine::ScriptEngine;
use super::loader::collect_modules;
use super::logger::ScriptLogger;
use super::options::ScriptOptions;

/// Outcome of a load attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunResult {
    /// The script loaded (or ran to a clean exit).
    Success,
    /// The script is disabled in its options.
    FailDisabled,
    /// One or more plugin dependencies are missing.
    FailPluginDependency,
    /// A syntax or runtime fault occurred at load time.
    FailError,
    /// A script with the same name or path is already loaded.
    FailDuplicate,
    /// No script or project exists under the given name.
    FailScriptNotFound,
    /// The project's main file is missing.
    FailNoMain,
}

impl RunResult {
    /// Whether this result represents a successful load.
    pub fn is_success(self) -> bool {
        self == RunResult::Success
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunResult::Success => "SUCCESS",
            RunResult::FailDisabled => "FAIL_DISABLED",
            RunResult::FailPluginDependency => "FAIL_PLUGIN_DEPENDENCY",
            RunResult::FailError => "FAIL_ERROR",
            RunResult::FailDuplicate => "FAIL_DUPLICATE",
            RunResult::FailScriptNotFound => "FAIL_SCRIPT_NOT_FOUND",
            RunResult::FailNoMain => "FAIL_NO_MAIN",
        }
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a script is a single file or a project folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    Single,
    Project,
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptKind::Single => write!(f, "script"),
            ScriptKind::Project => write!(f, "project"),
        }
    }
}

/// Lifecycle state of a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptState {
    /// Constructed but not in the registry.
    Unregistered,
    /// In the registry, no interpreter yet.
    Registered,
    /// Interpreter and logger attached.
    Prepared,
    /// Top-level code and start hook ran to completion.
    Running,
    /// An unload is in progress.
    Stopping,
    /// Interpreter and logger released.
    Closed,
}

impl fmt::Display for ScriptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScriptState::Unregistered => "unregistered",
            ScriptState::Registered => "registered",
            ScriptState::Prepared => "prepared",
            ScriptState::Running => "running",
            ScriptState::Stopping => "stopping",
            ScriptState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// A loadable unit of user code: a single file or a project folder.
///
/// Identity is the name. Name, paths, options and the module set never change
/// after construction; only the lifecycle state and the attached interpreter do.
pub struct Script {
    name: String,
    path: PathBuf,
    main_path: PathBuf,
    options: ScriptOptions,
    kind: ScriptKind,
    modules: BTreeSet<PathBuf>,
    state: Mutex<ScriptState>,
    engine: RwLock<Option<Arc<ScriptEngine>>>,
    logger: RwLock<Option<Arc<ScriptLogger>>>,
    loaded_at: Mutex<Option<Instant>>,
    platform_registries: Mutex<Vec<String>>,
}

impl Script {
    /// A single-file script. Its name is the file name, extension included.
    pub fn single(path: impl Into<PathBuf>, options: ScriptOptions) -> Self {
        let path = path.into();
        let name = file_name(&path);
        let mut modules = BTreeSet::new();
        modules.insert(path.clone());
        Self::build(name, path.clone(), path, options, ScriptKind::Single, modules)
    }

    /// A project rooted at `dir`, executed from `dir/main_file`.
    ///
    /// Every `.lua` file under the folder becomes a module path. The main path
    /// is always part of the set, even when the file does not exist yet.
    pub fn project(dir: impl Into<PathBuf>, main_file: &str, options: ScriptOptions) -> Self {
        let dir = dir.into();
        let name = file_name(&dir);
        let main_path = dir.join(main_file);
        let mut modules = collect_modules(&dir);
        modules.insert(main_path.clone());
        Self::build(name, dir, main_path, options, ScriptKind::Project, modules)
    }

    fn build(
        name: String,
        path: PathBuf,
        main_path: PathBuf,
        options: ScriptOptions,
        kind: ScriptKind,
        modules: BTreeSet<PathBuf>,
    ) -> Self {
        Self {
            name,
            path,
            main_path,
            options,
            kind,
            modules,
            state: Mutex::new(ScriptState::Unregistered),
            engine: RwLock::new(None),
            logger: RwLock::new(None),
            loaded_at: Mutex::new(None),
            platform_registries: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// File path for single scripts, folder path for projects.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn main_path(&self) -> &Path {
        &self.main_path
    }

    pub fn options(&self) -> &ScriptOptions {
        &self.options
    }

    pub fn kind(&self) -> ScriptKind {
        self.kind
    }

    pub fn is_project(&self) -> bool {
        self.kind == ScriptKind::Project
    }

    pub fn modules(&self) -> &BTreeSet<PathBuf> {
        &self.modules
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ScriptState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: ScriptState) {
        *self.state.lock() = state;
    }

    /// Move to `Stopping` unless an unload already started or finished.
    ///
    /// Returns `false` when the script is already stopping, closed or was never
    /// registered, so concurrent unload requests run cleanup only once.
    pub(crate) fn begin_stopping(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            ScriptState::Registered | ScriptState::Prepared | ScriptState::Running => {
                *state = ScriptState::Stopping;
                true
            }
            _ => false,
        }
    }

    /// Attach the interpreter and logger created for this load.
    pub(crate) fn attach(&self, engine: Arc<ScriptEngine>, logger: Arc<ScriptLogger>) {
        *self.engine.write() = Some(engine);
        *self.logger.write() = Some(logger);
        *self.loaded_at.lock() = Some(Instant::now());
        self.set_state(ScriptState::Prepared);
    }

    /// The attached interpreter, if the script has not been closed.
    pub fn engine(&self) -> Option<Arc<ScriptEngine>> {
        self.engine.read().clone()
    }

    /// The attached logger, if the script has not been closed.
    pub fn logger(&self) -> Option<Arc<ScriptLogger>> {
        self.logger.read().clone()
    }

    /// Log through the script logger, or the global subscriber once closed.
    pub fn log(&self, level: Level, message: &str) {
        match self.logger() {
            Some(logger) => logger.log(level, message),
            None => ScriptLogger::emit(&self.name, level, message),
        }
    }

    /// Time since the interpreter was attached.
    pub fn uptime(&self) -> Option<Duration> {
        self.loaded_at.lock().map(|at| at.elapsed())
    }

    /// Record which platform registries were available when the script registered.
    pub(crate) fn set_platform_registries(&self, names: Vec<String>) {
        *self.platform_registries.lock() = names;
    }

    pub fn platform_registries(&self) -> Vec<String> {
        self.platform_registries.lock().clone()
    }

    pub fn uses_platform_registry(&self, name: &str) -> bool {
        self.platform_registries.lock().iter().any(|n| n == name)
    }

    /// Release the interpreter and logger. Safe to call more than once.
    pub(crate) fn close(&self) {
        let engine = self.engine.write().take();
        drop(engine);
        if let Some(logger) = self.logger.write().take() {
            logger.close();
        }
        *self.loaded_at.lock() = None;
        self.set_state(ScriptState::Closed);
    }

    /// Load ordering: higher priority first, then name ascending.
    pub fn load_order(a: &Script, b: &Script) -> Ordering {
        b.options
            .load_priority
            .cmp(&a.options.load_priority)
            .then_with(|| a.name.cmp(&b.name))
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("main_path", &self.main_path)
            .field("state", &self.state())
            .finish()
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.kind, self.state())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn with_priority(priority: i32) -> ScriptOptions {
        ScriptOptions {
            load_priority: priority,
            ..ScriptOptions::default()
        }
    }

    #[test]
    fn test_single_script_identity() {
        let script = Script::single("/srv/scripts/hello.lua", ScriptOptions::default());
        assert_eq!(script.name(), "hello.lua");
        assert_eq!(script.path(), script.main_path());
        assert_eq!(script.kind(), ScriptKind::Single);
        assert!(!script.is_project());
        assert_eq!(script.modules().len(), 1);
        assert_eq!(script.state(), ScriptState::Unregistered);
        assert!(script.engine().is_none());
        assert!(script.uptime().is_none());
    }

    #[test]
    fn test_project_modules() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("shop");
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::write(root.join("main.lua"), "").unwrap();
        fs::write(root.join("lib").join("util.lua"), "").unwrap();
        fs::write(root.join("notes.txt"), "").unwrap();

        let script = Script::project(&root, "main.lua", ScriptOptions::default());
        assert_eq!(script.name(), "shop");
        assert!(script.is_project());
        assert_eq!(script.main_path(), root.join("main.lua"));
        assert_eq!(script.modules().len(), 2);
        assert!(script.modules().contains(&root.join("lib").join("util.lua")));
    }

    #[test]
    fn test_project_without_main_still_lists_main_path() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("empty");
        fs::create_dir_all(&root).unwrap();

        let script = Script::project(&root, "main.lua", ScriptOptions::default());
        assert!(script.modules().contains(&root.join("main.lua")));
    }

    #[test]
    fn test_begin_stopping_only_once() {
        let script = Script::single("a.lua", ScriptOptions::default());
        assert!(!script.begin_stopping());

        script.set_state(ScriptState::Running);
        assert!(script.begin_stopping());
        assert_eq!(script.state(), ScriptState::Stopping);
        assert!(!script.begin_stopping());
    }

    #[test]
    fn test_close_is_idempotent() {
        let script = Script::single("a.lua", ScriptOptions::default());
        script.close();
        script.close();
        assert_eq!(script.state(), ScriptState::Closed);
    }

    #[test]
    fn test_load_order() {
        let b = Script::single("B.lua", with_priority(10));
        let a = Script::single("A.lua", with_priority(5));
        let c = Script::single("C.lua", with_priority(5));

        let mut scripts = vec![&a, &c, &b];
        scripts.sort_by(|x, y| Script::load_order(x, y));
        let names: Vec<&str> = scripts.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["B.lua", "A.lua", "C.lua"]);
    }

    #[test]
    fn test_platform_registries() {
        let script = Script::single("a.lua", ScriptOptions::default());
        script.set_platform_registries(vec!["placeholders".to_string()]);
        assert!(script.uses_platform_registry("placeholders"));
        assert!(!script.uses_platform_registry("economy"));
    }

    #[test]
    fn test_run_result_display() {
        assert_eq!(RunResult::Success.to_string(), "SUCCESS");
        assert_eq!(RunResult::FailNoMain.to_string(), "FAIL_NO_MAIN");
        assert!(RunResult::Success.is_success());
        assert!(!RunResult::FailError.is_success());
    }
}
