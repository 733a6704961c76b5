//! Lua interpreter wrapper owned by a single script.

use std::fmt;
use std::path::Path;

use mlua::{Function, Lua, LuaOptions, Result as LuaResult, StdLib, Table, Value};
use parking_lot::RwLock;
use thiserror::Error;

use crate::{LunaError, Result};

/// Name of the global function run after top-level code.
pub const START_HOOK: &str = "start";
/// Name of the global function run before cleanup on a normal unload.
pub const STOP_HOOK: &str = "stop";

/// Raised in place of `os.exit` so the supervisor can unload the script.
#[derive(Debug, Clone, Error)]
#[error("script requested exit with code {code}")]
pub struct ExitRequest {
    code: String,
}

impl ExitRequest {
    /// Render an exit code: integers as numbers, `nil` as `0`, anything else as text.
    pub fn from_value(value: &Value) -> Self {
        let code = match value {
            Value::Nil => "0".to_string(),
            Value::Boolean(true) => "0".to_string(),
            Value::Boolean(false) => "1".to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => format!("{}", *n as i64),
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.to_string_lossy(),
            other => other.type_name().to_string(),
        };
        Self { code }
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

/// Kind of fault raised by script code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Syntax,
    Runtime,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::Syntax => write!(f, "syntax"),
            FaultKind::Runtime => write!(f, "runtime"),
        }
    }
}

/// A syntax or runtime fault with its interpreter error.
#[derive(Debug, Clone)]
pub struct ScriptFault {
    pub kind: FaultKind,
    pub error: mlua::Error,
}

impl fmt::Display for ScriptFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.error)
    }
}

/// Result of running script code.
#[derive(Debug, Clone)]
pub enum Execution {
    Completed,
    /// The script called `os.exit`; carries the rendered exit code.
    ExitRequested(String),
    Faulted(ScriptFault),
}

/// Classify an interpreter error as an exit request or a fault.
pub fn classify(error: mlua::Error) -> Execution {
    if let Some(exit) = find_exit_request(&error) {
        return Execution::ExitRequested(exit.code().to_string());
    }
    let kind = match error {
        mlua::Error::SyntaxError { .. } => FaultKind::Syntax,
        _ => FaultKind::Runtime,
    };
    Execution::Faulted(ScriptFault { kind, error })
}

/// Find an exit request anywhere in the error's cause chain.
pub fn find_exit_request(error: &mlua::Error) -> Option<&ExitRequest> {
    match error {
        mlua::Error::ExternalError(inner) => inner.as_ref().downcast_ref::<ExitRequest>(),
        mlua::Error::CallbackError { cause, .. } => find_exit_request(cause),
        mlua::Error::WithContext { cause, .. } => find_exit_request(cause),
        _ => None,
    }
}

/// A lifecycle hook, classified by how many parameters it declares.
#[derive(Clone, Default)]
pub enum Hook {
    #[default]
    None,
    ZeroArg(Function),
    /// Receives the script handle table.
    OneArg(Function),
}

impl Hook {
    pub fn is_none(&self) -> bool {
        matches!(self, Hook::None)
    }

    /// Call the hook, passing `handle` only to one-argument hooks.
    pub fn call(&self, handle: &Table) -> LuaResult<()> {
        match self {
            Hook::None => Ok(()),
            Hook::ZeroArg(f) => f.call::<()>(()),
            Hook::OneArg(f) => f.call::<()>(handle.clone()),
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::None => write!(f, "Hook::None"),
            Hook::ZeroArg(_) => write!(f, "Hook::ZeroArg"),
            Hook::OneArg(_) => write!(f, "Hook::OneArg"),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Hooks {
    start: Hook,
    stop: Hook,
}

/// One interpreter instance.
pub struct ScriptEngine {
    lua: Lua,
    param_count: Function,
    hooks: RwLock<Hooks>,
}

impl ScriptEngine {
    /// Create an interpreter with the safe standard libraries plus `debug`.
    pub fn new() -> Result<Self> {
        // SAFETY: `debug` is the only unsafe library loaded; it is needed to read
        // hook arity and scripts are trusted host extensions.
        let lua = unsafe {
            Lua::unsafe_new_with(StdLib::ALL_SAFE | StdLib::DEBUG, LuaOptions::default())
        };

        Self::install_exit(&lua)
            .map_err(|e| LunaError::Lua(format!("Failed to install os.exit: {e}")))?;

        let param_count: Function = lua
            .load("local getinfo = debug.getinfo\nreturn function(f) return getinfo(f, 'u').nparams end")
            .set_name("=lunahost")
            .eval()
            .map_err(|e| LunaError::Lua(format!("Failed to create arity helper: {e}")))?;

        Ok(Self {
            lua,
            param_count,
            hooks: RwLock::new(Hooks::default()),
        })
    }

    /// Replace `os.exit` so it unwinds into the host instead of ending the process.
    fn install_exit(lua: &Lua) -> LuaResult<()> {
        let os: Table = lua.globals().get("os")?;
        let exit = lua.create_function(|_, code: Value| {
            Err::<(), _>(mlua::Error::external(ExitRequest::from_value(&code)))
        })?;
        os.set("exit", exit)
    }

    /// Let `require` find modules inside a project folder.
    pub fn add_module_root(&self, dir: &Path) -> Result<()> {
        let package: Table = self.get_global("package")?;
        let current: String = package
            .get("path")
            .map_err(|e| LunaError::Lua(format!("Failed to read package.path: {e}")))?;
        let root = dir.display();
        package
            .set("path", format!("{root}/?.lua;{root}/?/init.lua;{current}"))
            .map_err(|e| LunaError::Lua(format!("Failed to set package.path: {e}")))
    }

    /// Execute top-level source under the given chunk name.
    pub fn execute(&self, source: &str, chunk_name: &str) -> Execution {
        match self.lua.load(source).set_name(format!("@{chunk_name}")).exec() {
            Ok(()) => Execution::Completed,
            Err(e) => classify(e),
        }
    }

    /// Look up the start and stop hooks among the globals.
    ///
    /// Called once after top-level code finishes; later changes to the globals
    /// do not affect which hooks run.
    pub fn resolve_hooks(&self) -> LuaResult<()> {
        let start = self.resolve_hook(START_HOOK)?;
        let stop = self.resolve_hook(STOP_HOOK)?;
        *self.hooks.write() = Hooks { start, stop };
        Ok(())
    }

    fn resolve_hook(&self, name: &str) -> LuaResult<Hook> {
        match self.lua.globals().get::<Value>(name)? {
            Value::Function(f) => {
                let params: i64 = self.param_count.call(f.clone())?;
                Ok(if params == 0 {
                    Hook::ZeroArg(f)
                } else {
                    Hook::OneArg(f)
                })
            }
            _ => Ok(Hook::None),
        }
    }

    pub fn start_hook(&self) -> Hook {
        self.hooks.read().start.clone()
    }

    pub fn stop_hook(&self) -> Hook {
        self.hooks.read().stop.clone()
    }

    /// Set a global value in the Lua environment.
    pub fn set_global<V: mlua::IntoLua>(&self, name: &str, value: V) -> Result<()> {
        self.lua
            .globals()
            .set(name, value)
            .map_err(|e| LunaError::Lua(format!("Failed to set global '{name}': {e}")))
    }

    /// Get a global value from the Lua environment.
    pub fn get_global<V: mlua::FromLua>(&self, name: &str) -> Result<V> {
        self.lua
            .globals()
            .get(name)
            .map_err(|e| LunaError::Lua(format!("Failed to get global '{name}': {e}")))
    }

    /// Get a reference to the underlying Lua instance.
    pub fn lua(&self) -> &Lua {
        &self.lua
    }
}
