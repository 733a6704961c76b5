//! Subsystem registries scripts register resources with.
//!
//! Every resource is owned by a script and removed by the cleanup coordinator
//! when that script unloads.

pub mod command;
pub mod connection;
pub mod listener;
pub mod permission;
pub mod task;

use std::sync::Arc;

pub use command::CommandRegistry;
pub use connection::{ConnectionFactory, ConnectionId, ConnectionRegistry, ManagedConnection};
pub use listener::{ListenerId, ListenerRegistry};
pub use permission::PermissionRegistry;
pub use task::{TaskId, TaskScheduler};

use crate::host::PlatformRegistry;
use crate::script::context;
use crate::script::exception::ExceptionRouter;
use crate::script::Script;

/// All subsystem registries, shared between the supervisor and script APIs.
pub struct Services {
    pub permissions: PermissionRegistry,
    pub listeners: ListenerRegistry,
    pub tasks: Arc<TaskScheduler>,
    pub commands: CommandRegistry,
    pub databases: ConnectionRegistry,
    pub clients: ConnectionRegistry,
    pub platform: Vec<Arc<dyn PlatformRegistry>>,
}

impl Services {
    pub fn new(
        router: Arc<ExceptionRouter>,
        database_factory: Option<Arc<dyn ConnectionFactory>>,
        client_factory: Option<Arc<dyn ConnectionFactory>>,
        platform: Vec<Arc<dyn PlatformRegistry>>,
    ) -> Self {
        Self {
            permissions: PermissionRegistry::new(),
            listeners: ListenerRegistry::new(Arc::clone(&router)),
            tasks: Arc::new(TaskScheduler::new(Arc::clone(&router))),
            commands: CommandRegistry::new(router),
            databases: ConnectionRegistry::new("database", database_factory),
            clients: ConnectionRegistry::new("client", client_factory),
            platform,
        }
    }
}

/// Call into `script` with it set as the current script.
///
/// The script's interpreter is held for the duration of the call so a
/// concurrent unload cannot release it underneath. Closed scripts are skipped.
/// Errors are handed to the router and `None` is returned. Unloads requested
/// by nested calls are drained once the outermost call has returned.
pub(crate) fn invoke<R>(
    router: &ExceptionRouter,
    script: &Arc<Script>,
    what: &str,
    call: impl FnOnce() -> mlua::Result<R>,
) -> Option<R> {
    let engine = script.engine()?;
    let result = context::with_script(Arc::clone(script), call);
    let value = match result {
        Ok(value) => Some(value),
        Err(e) => {
            router.handle_exception(script, e, Some(what));
            None
        }
    };
    drop(engine);
    router.drain_deferred();
    value
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Weak};

    use mlua::Function;

    use crate::host::{StandaloneHost, ThreadingMode};
    use crate::script::control::{control_channel, ControlReceiver};
    use crate::script::engine::{Execution, ScriptEngine};
    use crate::script::exception::ExceptionRouter;
    use crate::script::logger::ScriptLogger;
    use crate::script::{Script, ScriptOptions};

    /// A router with no supervisor behind it, plus its queue.
    pub fn router() -> (Arc<ExceptionRouter>, ControlReceiver) {
        let (queue, receiver) = control_channel();
        let router = ExceptionRouter::new(
            Arc::new(StandaloneHost::new()),
            ThreadingMode::ControlThread,
            queue,
            Weak::new(),
        );
        (Arc::new(router), receiver)
    }

    /// A script with a live interpreter that has run `source`.
    pub fn running_script(name: &str, source: &str) -> Arc<Script> {
        let script = Arc::new(Script::single(name, ScriptOptions::default()));
        let engine = ScriptEngine::new().unwrap();
        assert!(matches!(engine.execute(source, name), Execution::Completed));
        script.attach(
            Arc::new(engine),
            Arc::new(ScriptLogger::new(name, tracing::Level::INFO)),
        );
        script
    }

    pub fn global_fn(script: &Script, name: &str) -> Function {
        script.engine().unwrap().get_global(name).unwrap()
    }

    pub fn global<V: mlua::FromLua>(script: &Script, name: &str) -> V {
        script.engine().unwrap().get_global(name).unwrap()
    }
}
