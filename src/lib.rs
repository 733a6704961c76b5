//! lunahost - hot-reloadable Lua scripting for long-running servers
//!
//! Scripts and script projects are discovered on disk, loaded into their own
//! interpreters, and can be unloaded or reloaded at runtime without
//! restarting the host process.

pub mod config;
pub mod console;
pub mod error;
pub mod host;
pub mod logging;
pub mod script;
pub mod services;

pub use config::Config;
pub use error::{LunaError, Result};
pub use host::{Host, PlatformRegistry, StandaloneHost, ThreadingMode};
pub use script::{
    IncrementalLoader, LoaderTick, ReloadOutcome, RunResult, Script, ScriptKind, ScriptOptions,
    ScriptState, Supervisor, SupervisorBuilder,
};
pub use services::{ConnectionFactory, ManagedConnection, Services};
