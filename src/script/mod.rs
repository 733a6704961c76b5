//! Script lifecycle: discovery, loading, execution context and teardown.
//!
//! A [`Supervisor`] owns every loaded [`Script`]. Scripts are Lua files or
//! project folders; each gets its own interpreter, logger and set of
//! resources registered with the [`crate::services`] registries.

pub mod api;
pub mod cleanup;
pub mod context;
pub mod control;
pub mod engine;
pub mod exception;
pub mod incremental;
pub mod loader;
pub mod logger;
pub mod options;
pub mod registry;
pub mod supervisor;
pub mod types;

pub use api::ScriptApi;
pub use cleanup::CleanupCoordinator;
pub use context::{current_script, require_current_script, ContextGuard};
pub use engine::{Execution, ExitRequest, FaultKind, Hook, ScriptEngine, ScriptFault};
pub use exception::ExceptionRouter;
pub use incremental::{IncrementalLoader, LoaderHandle, LoaderTick};
pub use loader::{Candidate, ScriptDiscovery, SCRIPT_EXTENSION};
pub use logger::ScriptLogger;
pub use options::ScriptOptions;
pub use registry::ScriptRegistry;
pub use supervisor::{ReloadOutcome, Supervisor, SupervisorBuilder};
pub use types::{RunResult, Script, ScriptKind, ScriptState};
