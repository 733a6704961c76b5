//! Script lifecycle supervisor.
//!
//! Owns the registry and the subsystem registries, and is the only place that
//! loads and unloads scripts. Every lifecycle operation holds the lifecycle
//! lock; unload requests raised from callbacks are queued and drained before
//! the lock is released.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn, Level};

use super::api::{script_handle, ScriptApi};
use super::cleanup::CleanupCoordinator;
use super::context;
use super::control::{control_channel, ControlJob, ControlReceiver};
use super::engine::{classify, Execution, ScriptEngine};
use super::exception::ExceptionRouter;
use super::incremental::{IncrementalLoader, LoaderHandle};
use super::loader::{ScriptDiscovery, SCRIPT_EXTENSION};
use super::logger::ScriptLogger;
use super::options::ScriptOptions;
use super::registry::ScriptRegistry;
use super::types::{RunResult, Script, ScriptKind, ScriptState};
use crate::config::{load_project_overrides, Config, ScriptOptionsFile};
use crate::host::{Host, PlatformRegistry, ThreadingMode};
use crate::services::{ConnectionFactory, Services};
use crate::{LunaError, Result};

thread_local! {
    // Supervisors whose lifecycle lock is held by this thread.
    static ACTIVE: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

struct ActiveMarker(usize);

impl ActiveMarker {
    fn set(id: usize) -> Self {
        ACTIVE.with(|a| a.borrow_mut().push(id));
        Self(id)
    }
}

impl Drop for ActiveMarker {
    fn drop(&mut self) {
        ACTIVE.with(|a| {
            let mut active = a.borrow_mut();
            if let Some(pos) = active.iter().rposition(|id| *id == self.0) {
                active.remove(pos);
            }
        });
    }
}

/// Result of [`Supervisor::reload_by_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The script was (re)loaded with this result.
    Reloaded(RunResult),
    /// The stop hook failed; the script was unloaded but not loaded again.
    UnloadFailed,
}

/// Builds a [`Supervisor`] with its collaborators.
pub struct SupervisorBuilder {
    config: Config,
    config_path: Option<PathBuf>,
    host: Arc<dyn Host>,
    threading: ThreadingMode,
    database_factory: Option<Arc<dyn ConnectionFactory>>,
    client_factory: Option<Arc<dyn ConnectionFactory>>,
    platform: Vec<Arc<dyn PlatformRegistry>>,
}

impl SupervisorBuilder {
    pub fn new(config: Config, host: Arc<dyn Host>) -> Self {
        Self {
            config,
            config_path: None,
            host,
            threading: ThreadingMode::default(),
            database_factory: None,
            client_factory: None,
            platform: Vec::new(),
        }
    }

    /// File the configuration is re-read from on `reload_all`.
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn threading(mut self, mode: ThreadingMode) -> Self {
        self.threading = mode;
        self
    }

    pub fn database_factory(mut self, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.database_factory = Some(factory);
        self
    }

    pub fn client_factory(mut self, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.client_factory = Some(factory);
        self
    }

    pub fn platform_registry(mut self, registry: Arc<dyn PlatformRegistry>) -> Self {
        self.platform.push(registry);
        self
    }

    pub fn build(self) -> Arc<Supervisor> {
        let options_file = load_options_file(&self.config);
        let (queue, pending) = control_channel();

        Arc::new_cyclic(|weak| {
            let router = Arc::new(ExceptionRouter::new(
                Arc::clone(&self.host),
                self.threading,
                queue,
                weak.clone(),
            ));
            let services = Arc::new(Services::new(
                Arc::clone(&router),
                self.database_factory,
                self.client_factory,
                self.platform,
            ));
            let cleanup = CleanupCoordinator::new(Arc::clone(&services), Arc::clone(&router));

            Supervisor {
                config: RwLock::new(self.config),
                config_path: self.config_path,
                options_file: RwLock::new(options_file),
                registry: ScriptRegistry::new(),
                services,
                router,
                cleanup,
                host: self.host,
                lifecycle: Mutex::new(()),
                pending,
                loader: Mutex::new(None),
            }
        })
    }
}

fn load_options_file(config: &Config) -> ScriptOptionsFile {
    match ScriptOptionsFile::load(&config.scripts.options_file) {
        Ok(file) => file,
        Err(e) => {
            warn!(
                "Failed to read script options from {}: {e}; using defaults",
                config.scripts.options_file
            );
            ScriptOptionsFile::default()
        }
    }
}

/// Discovers, loads, unloads and reloads scripts.
pub struct Supervisor {
    config: RwLock<Config>,
    config_path: Option<PathBuf>,
    options_file: RwLock<ScriptOptionsFile>,
    registry: ScriptRegistry,
    services: Arc<Services>,
    router: Arc<ExceptionRouter>,
    cleanup: CleanupCoordinator,
    host: Arc<dyn Host>,
    lifecycle: Mutex<()>,
    pending: ControlReceiver,
    loader: Mutex<Option<LoaderHandle>>,
}

impl Supervisor {
    // ----- lifecycle plumbing -----

    fn id(&self) -> usize {
        self as *const Self as usize
    }

    fn in_lifecycle(&self) -> bool {
        let id = self.id();
        ACTIVE.with(|a| a.borrow().contains(&id))
    }

    /// Run `op` holding the lifecycle lock, then drain queued requests.
    ///
    /// Re-entrant on the thread that already holds the lock.
    fn lifecycle<R>(&self, op: impl FnOnce() -> R) -> R {
        if self.in_lifecycle() {
            return op();
        }
        let _guard = self.lifecycle.lock();
        let _active = ActiveMarker::set(self.id());
        let result = op();
        self.drain_pending();
        result
    }

    /// Execute queued unload requests.
    ///
    /// Does nothing when called from inside a lifecycle operation on this
    /// thread; that operation drains the queue before it returns.
    pub fn process_pending(&self) {
        if self.in_lifecycle() {
            return;
        }
        self.lifecycle(|| ());
    }

    fn drain_pending(&self) {
        while let Some(job) = self.pending.try_next() {
            match job {
                ControlJob::Unload { script, error } => {
                    if self.is_registered_instance(&script) {
                        self.unload_locked(&script, error);
                    } else {
                        debug!(script = %script.name(), "Skipping queued unload; script is no longer loaded");
                    }
                }
            }
        }
    }

    fn is_registered_instance(&self, script: &Arc<Script>) -> bool {
        self.registry
            .lookup_by_name(script.name())
            .is_some_and(|current| Arc::ptr_eq(&current, script))
    }

    /// Host tick: run due tasks, deliver async completions and queued unloads.
    pub fn tick(&self) {
        self.services.tasks.tick();
        self.process_pending();
    }

    // ----- discovery -----

    fn discovery(&self) -> ScriptDiscovery {
        let config = self.config.read();
        ScriptDiscovery::new(&config.scripts.scripts_dir, &config.scripts.projects_dir)
    }

    fn action_logging(&self) -> bool {
        self.config.read().scripts.action_logging
    }

    /// Options for a single-file script named `name`.
    pub fn options_for_script(&self, name: &str) -> ScriptOptions {
        let defaults = self.config.read().script_defaults.clone();
        let options_file = self.options_file.read();
        ScriptOptions::resolve(&defaults, options_file.get(name))
    }

    /// Options and main file name for the project in `dir`.
    pub fn options_for_project(&self, dir: &Path) -> (ScriptOptions, String) {
        let (defaults, project_file, default_main) = {
            let config = self.config.read();
            (
                config.script_defaults.clone(),
                config.scripts.project_file.clone(),
                config.scripts.default_main.clone(),
            )
        };
        let overrides = load_project_overrides(dir.join(&project_file)).unwrap_or_else(|e| {
            warn!("{e}; using default options for project {}", dir.display());
            Default::default()
        });
        let options = ScriptOptions::resolve(&defaults, Some(&overrides));
        let main = options.main_script.clone().unwrap_or(default_main);
        (options, main)
    }

    fn script_from_path(&self, path: &Path) -> Script {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Script::single(path, self.options_for_script(&name))
    }

    fn project_from_path(&self, dir: &Path) -> Script {
        let (options, main) = self.options_for_project(dir);
        Script::project(dir, &main, options)
    }

    /// Every script and project on disk, in load order.
    pub fn discover(&self) -> Vec<Arc<Script>> {
        let mut scripts: Vec<Arc<Script>> = self
            .discovery()
            .candidates()
            .into_iter()
            .map(|c| match c.kind {
                ScriptKind::Single => self.script_from_path(&c.path),
                ScriptKind::Project => self.project_from_path(&c.path),
            })
            .map(Arc::new)
            .collect();
        scripts.sort_by(|a, b| Script::load_order(a, b));
        scripts
    }

    fn auto_load_candidates(&self) -> Vec<Arc<Script>> {
        self.discover()
            .into_iter()
            .filter(|s| {
                if !s.options().auto_load {
                    debug!(script = %s.name(), "Skipping script with auto load disabled");
                }
                s.options().auto_load
            })
            .collect()
    }

    /// Every script file under the scripts folder.
    pub fn all_script_paths(&self) -> Vec<PathBuf> {
        self.discovery().script_paths().into_iter().collect()
    }

    /// Every project folder under the projects folder.
    pub fn all_project_paths(&self) -> Vec<PathBuf> {
        self.discovery().project_paths().into_iter().collect()
    }

    // ----- startup -----

    /// Load the startup batch, either now or spread over ticks.
    ///
    /// Returns the loader to tick when incremental loading is configured.
    pub fn start(&self) -> Option<IncrementalLoader> {
        if let Err(e) = self.discovery().ensure_dirs() {
            warn!("Failed to create script folders: {e}");
        }
        if self.config.read().scripts.incremental_load {
            Some(self.begin_incremental_load())
        } else {
            self.discover_and_load_all();
            None
        }
    }

    /// Load every auto-load script in load order. Returns how many are loaded.
    pub fn discover_and_load_all(&self) -> usize {
        self.lifecycle(|| self.discover_and_load_all_locked())
    }

    fn discover_and_load_all_locked(&self) -> usize {
        for script in self.auto_load_candidates() {
            let name = script.name().to_string();
            if let Err(e) = self.load_locked(script) {
                error!("Error when loading script '{name}': {e}");
            }
        }
        self.finish_loading();
        self.registry.len()
    }

    /// Queue the startup batch for loading one script per interval.
    pub fn begin_incremental_load(&self) -> IncrementalLoader {
        let interval = self.config.read().scripts.load_interval_ticks;
        let loader = IncrementalLoader::new(self.auto_load_candidates(), interval);
        if let Some(previous) = self.loader.lock().replace(loader.handle()) {
            previous.cancel();
        }
        info!(
            "Loading {} script(s) incrementally, one every {} tick(s)",
            loader.remaining(),
            interval.max(1)
        );
        loader
    }

    /// Mark the startup batch complete.
    pub fn finish_loading(&self) {
        self.loader.lock().take();
        info!("Loaded {} script(s)", self.registry.len());
    }

    fn cancel_loader(&self) {
        if let Some(handle) = self.loader.lock().take() {
            handle.cancel();
        }
    }

    // ----- loading -----

    /// Plugin dependencies the host does not provide.
    pub fn missing_plugin_dependencies(&self, options: &ScriptOptions) -> Vec<String> {
        options
            .plugin_dependencies
            .iter()
            .filter(|dep| !self.host.is_plugin_present(dep))
            .cloned()
            .collect()
    }

    /// Load a script that was built by discovery or by the caller.
    pub fn load(&self, script: Arc<Script>) -> Result<RunResult> {
        self.lifecycle(|| self.load_locked(script))
    }

    /// Load the single-file script at `path`.
    pub fn load_script(&self, path: &Path) -> Result<RunResult> {
        let script = Arc::new(self.script_from_path(path));
        self.load(script)
    }

    /// Load the project in folder `dir`.
    pub fn load_project(&self, dir: &Path) -> Result<RunResult> {
        let script = Arc::new(self.project_from_path(dir));
        self.load(script)
    }

    /// Load a script file by name, ignoring case.
    pub fn load_script_by_name(&self, name: &str) -> Result<RunResult> {
        match self.discovery().find_script(name) {
            Some(path) => self.load_script(&path),
            None => Ok(RunResult::FailScriptNotFound),
        }
    }

    /// Load a project by folder name, ignoring case.
    pub fn load_project_by_name(&self, name: &str) -> Result<RunResult> {
        match self.discovery().find_project(name) {
            Some(dir) => self.load_project(&dir),
            None => Ok(RunResult::FailScriptNotFound),
        }
    }

    fn load_locked(&self, script: Arc<Script>) -> Result<RunResult> {
        let name = script.name().to_string();

        if self.registry.contains_name(&name) || self.registry.contains_main_path(script.main_path()) {
            warn!("Attempted to load '{name}', but a script with this name or path is already loaded");
            return Ok(RunResult::FailDuplicate);
        }
        if !script.options().enabled {
            debug!(script = %name, "Script is disabled");
            return Ok(RunResult::FailDisabled);
        }
        let missing = self.missing_plugin_dependencies(script.options());
        if !missing.is_empty() {
            warn!(
                "The following plugin dependencies for '{name}' are missing: {}. It will not be loaded.",
                missing.join(", ")
            );
            return Ok(RunResult::FailPluginDependency);
        }
        if script.is_project() && !script.main_path().is_file() {
            warn!(
                "Project '{name}' has no main file at {}",
                script.main_path().display()
            );
            return Ok(RunResult::FailNoMain);
        }

        if self.action_logging() {
            info!("Loading script '{name}'");
        }

        if let Err(e) = self.registry.register(Arc::clone(&script)) {
            warn!("{e}");
            return Ok(RunResult::FailDuplicate);
        }
        script.set_state(ScriptState::Registered);
        script.set_platform_registries(
            self.services
                .platform
                .iter()
                .filter(|r| r.is_available())
                .map(|r| r.name().to_string())
                .collect(),
        );

        let engine = match self.prepare(&script) {
            Ok(engine) => engine,
            Err(e) => {
                self.rollback(&script);
                return Err(e);
            }
        };
        let source = match fs::read_to_string(script.main_path()) {
            Ok(source) => source,
            Err(e) => {
                self.rollback(&script);
                return Err(LunaError::Io(e));
            }
        };

        self.services.permissions.grant_for(&script);

        match self.run_top_level(&script, &engine, &source) {
            Execution::Completed => {
                script.set_state(ScriptState::Running);
                self.host.on_script_loaded(&script);
                if self.action_logging() {
                    info!("Loaded script '{name}'");
                }
                Ok(RunResult::Success)
            }
            Execution::ExitRequested(code) => {
                script.log(Level::INFO, &format!("Script exited with exit code '{code}'"));
                self.unload_locked(&script, false);
                Ok(RunResult::Success)
            }
            Execution::Faulted(fault) => {
                self.router.report_fault(&script, &fault, None);
                script.log(
                    Level::ERROR,
                    &format!("Script unloaded due to a {} error", fault.kind),
                );
                self.unload_locked(&script, true);
                Ok(RunResult::FailError)
            }
        }
    }

    /// Create the interpreter and logger and attach them to the script.
    fn prepare(&self, script: &Arc<Script>) -> Result<Arc<ScriptEngine>> {
        let engine = ScriptEngine::new()?;
        if script.is_project() {
            engine.add_module_root(script.path())?;
        }
        let logger = Arc::new(self.create_logger(script));
        ScriptApi::new(Arc::clone(&self.services), Arc::clone(&logger)).register(engine.lua())?;

        let engine = Arc::new(engine);
        script.attach(Arc::clone(&engine), logger);
        Ok(engine)
    }

    fn create_logger(&self, script: &Script) -> ScriptLogger {
        let level = script.options().min_logging_level;
        if !script.options().file_logging_enabled {
            return ScriptLogger::new(script.name(), level);
        }
        let path = Path::new(&self.config.read().scripts.logs_dir)
            .join(ScriptLogger::file_name_for(script.name()));
        match ScriptLogger::with_file(script.name(), level, &path) {
            Ok(logger) => logger,
            Err(e) => {
                error!(
                    "Error when initializing log file {} for script '{}': {e}",
                    path.display(),
                    script.name()
                );
                ScriptLogger::new(script.name(), level)
            }
        }
    }

    /// Execute top-level code, resolve hooks and run the start hook.
    fn run_top_level(&self, script: &Arc<Script>, engine: &ScriptEngine, source: &str) -> Execution {
        let _scope = context::enter(Arc::clone(script));

        let chunk_name = script.main_path().display().to_string();
        match engine.execute(source, &chunk_name) {
            Execution::Completed => {}
            other => return other,
        }
        if let Err(e) = engine.resolve_hooks() {
            return classify(e);
        }

        let hook = engine.start_hook();
        if hook.is_none() {
            return Execution::Completed;
        }
        match script_handle(engine.lua(), script).and_then(|handle| hook.call(&handle)) {
            Ok(()) => Execution::Completed,
            Err(e) => classify(e),
        }
    }

    /// Undo a registration whose load failed before any script code ran.
    fn rollback(&self, script: &Arc<Script>) {
        self.registry.unregister(script);
        script.close();
        script.set_state(ScriptState::Unregistered);
    }

    // ----- unloading -----

    /// Unload a loaded script. `error` skips its stop hook.
    ///
    /// Returns `false` if the script was not loaded or its stop hook failed.
    pub fn unload_script(&self, script: &Arc<Script>, error: bool) -> bool {
        self.lifecycle(|| {
            if !self.is_registered_instance(script) {
                return false;
            }
            self.unload_locked(script, error)
        })
    }

    /// Unload the loaded script named `name`; `None` if nothing by that name is loaded.
    pub fn unload_by_name(&self, name: &str) -> Option<bool> {
        self.lifecycle(|| {
            let script = self.registry.lookup_by_name(name)?;
            Some(self.unload_locked(&script, false))
        })
    }

    fn unload_locked(&self, script: &Arc<Script>, error: bool) -> bool {
        if !script.begin_stopping() {
            debug!(script = %script.name(), "Unload already in progress or finished");
            return false;
        }

        self.host.on_script_unloaded(script, error);
        let graceful = self.cleanup.run(script, error);
        self.registry.unregister(script);
        script.set_state(ScriptState::Unregistered);

        if self.action_logging() {
            info!("Unloaded script '{}'", script.name());
        }
        graceful
    }

    /// Unload every script, most recently registered first.
    pub fn unload_all(&self) {
        self.lifecycle(|| self.unload_all_locked());
    }

    fn unload_all_locked(&self) {
        for script in self.registry.snapshot().iter().rev() {
            self.unload_locked(script, false);
        }
        self.registry.clear();
    }

    // ----- reloading -----

    /// Unload the named script if loaded, then load it again from disk.
    ///
    /// Names ending in the script extension are looked up as single-file
    /// scripts, anything else as projects, unless the loaded script says
    /// otherwise.
    pub fn reload_by_name(&self, name: &str) -> Result<ReloadOutcome> {
        self.lifecycle(|| {
            let kind = match self.registry.lookup_by_name(name) {
                Some(script) => {
                    let kind = script.kind();
                    if !self.unload_locked(&script, false) {
                        return Ok(ReloadOutcome::UnloadFailed);
                    }
                    kind
                }
                None if is_script_file_name(name) => ScriptKind::Single,
                None => ScriptKind::Project,
            };
            let result = match kind {
                ScriptKind::Single => self.load_script_by_name(name)?,
                ScriptKind::Project => self.load_project_by_name(name)?,
            };
            Ok(ReloadOutcome::Reloaded(result))
        })
    }

    /// Unload everything, re-read configuration and load the startup batch again.
    pub fn reload_all(&self) -> usize {
        self.cancel_loader();
        self.lifecycle(|| {
            self.unload_all_locked();
            self.reload_config();
            self.discover_and_load_all_locked()
        })
    }

    fn reload_config(&self) {
        if let Some(path) = &self.config_path {
            match Config::load(path) {
                Ok(config) => *self.config.write() = config,
                Err(e) => warn!(
                    "Failed to reload configuration from {}: {e}; keeping the current one",
                    path.display()
                ),
            }
        }
        let options_file = load_options_file(&self.config.read());
        *self.options_file.write() = options_file;
    }

    /// Stop incremental loading and unload everything.
    pub fn shutdown(&self) {
        self.cancel_loader();
        self.unload_all();
        info!("Script supervisor shut down");
    }

    // ----- queries -----

    pub fn script(&self, name: &str) -> Option<Arc<Script>> {
        self.registry.lookup_by_name(name)
    }

    pub fn script_by_path(&self, path: &Path) -> Option<Arc<Script>> {
        self.registry.lookup_by_path(path)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.registry.contains_name(name)
    }

    /// Loaded scripts in registration order.
    pub fn loaded_scripts(&self) -> Vec<Arc<Script>> {
        self.registry.snapshot()
    }

    pub fn registry(&self) -> &ScriptRegistry {
        &self.registry
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn router(&self) -> &Arc<ExceptionRouter> {
        &self.router
    }

    pub fn threading_mode(&self) -> ThreadingMode {
        self.router.mode()
    }

    pub fn config(&self) -> Config {
        self.config.read().clone()
    }
}

fn is_script_file_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(SCRIPT_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScriptsConfig;
    use crate::host::StandaloneHost;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<Supervisor>) {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let config = Config {
            scripts: ScriptsConfig {
                scripts_dir: root.join("scripts").display().to_string(),
                projects_dir: root.join("projects").display().to_string(),
                logs_dir: root.join("logs").display().to_string(),
                options_file: root.join("script_options.toml").display().to_string(),
                ..ScriptsConfig::default()
            },
            ..Config::default()
        };
        fs::create_dir_all(root.join("scripts")).unwrap();
        fs::create_dir_all(root.join("projects")).unwrap();
        let supervisor = SupervisorBuilder::new(config, Arc::new(StandaloneHost::new())).build();
        (dir, supervisor)
    }

    fn write(dir: &TempDir, name: &str, source: &str) -> PathBuf {
        let path = dir.path().join("scripts").join(name);
        fs::write(&path, source).unwrap();
        path
    }

    #[test]
    fn test_load_and_unload() {
        let (dir, supervisor) = setup();
        let path = write(&dir, "hello.lua", "loaded = true");

        assert_eq!(supervisor.load_script(&path).unwrap(), RunResult::Success);
        let script = supervisor.script("hello.lua").unwrap();
        assert_eq!(script.state(), ScriptState::Running);
        assert!(supervisor.script_by_path(&path).is_some());

        assert_eq!(supervisor.unload_by_name("hello.lua"), Some(true));
        assert!(!supervisor.is_loaded("hello.lua"));
        assert_eq!(script.state(), ScriptState::Unregistered);
        assert_eq!(supervisor.unload_by_name("hello.lua"), None);
    }

    #[test]
    fn test_runtime_error_unloads() {
        let (dir, supervisor) = setup();
        let path = write(&dir, "bad.lua", "error('broken')");

        assert_eq!(supervisor.load_script(&path).unwrap(), RunResult::FailError);
        assert!(supervisor.registry().is_empty());
    }

    #[test]
    fn test_exit_during_load_is_success() {
        let (dir, supervisor) = setup();
        let path = write(&dir, "quits.lua", "os.exit(0)");

        assert_eq!(supervisor.load_script(&path).unwrap(), RunResult::Success);
        assert!(!supervisor.is_loaded("quits.lua"));
    }

    #[test]
    fn test_missing_file_rolls_back() {
        let (dir, supervisor) = setup();
        let path = dir.path().join("scripts").join("ghost.lua");

        assert!(matches!(supervisor.load_script(&path), Err(LunaError::Io(_))));
        assert!(supervisor.registry().is_empty());
    }

    #[test]
    fn test_load_by_name_not_found() {
        let (_dir, supervisor) = setup();
        assert_eq!(
            supervisor.load_script_by_name("nothing.lua").unwrap(),
            RunResult::FailScriptNotFound
        );
        assert_eq!(
            supervisor.load_project_by_name("nothing").unwrap(),
            RunResult::FailScriptNotFound
        );
    }

    #[test]
    fn test_reload_by_name() {
        let (dir, supervisor) = setup();
        write(&dir, "hello.lua", "value = 1");
        supervisor.load_script_by_name("hello.lua").unwrap();
        let first = supervisor.script("hello.lua").unwrap();

        write(&dir, "hello.lua", "value = 2");
        let outcome = supervisor.reload_by_name("hello.lua").unwrap();
        assert_eq!(outcome, ReloadOutcome::Reloaded(RunResult::Success));

        let second = supervisor.script("hello.lua").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        let value: i64 = second.engine().unwrap().get_global("value").unwrap();
        assert_eq!(value, 2);
    }

    #[test]
    fn test_reload_aborts_when_stop_fails() {
        let (dir, supervisor) = setup();
        write(&dir, "stubborn.lua", "function stop() error('no') end");
        supervisor.load_script_by_name("stubborn.lua").unwrap();

        assert_eq!(
            supervisor.reload_by_name("stubborn.lua").unwrap(),
            ReloadOutcome::UnloadFailed
        );
        assert!(!supervisor.is_loaded("stubborn.lua"));
    }

    #[test]
    fn test_is_script_file_name() {
        assert!(is_script_file_name("a.lua"));
        assert!(is_script_file_name("A.LUA"));
        assert!(!is_script_file_name("shop"));
    }
}
