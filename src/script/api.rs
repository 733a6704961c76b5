//! Host API for Lua scripts.
//!
//! Provides the `host` global table for registering resources and the
//! `logger` global table bound to the script's own logger.

use std::sync::Arc;

use mlua::{Function, Lua, Result as LuaResult, Table, Value, Variadic};

use super::context;
use super::logger::ScriptLogger;
use super::types::Script;
use crate::services::Services;

/// API builder for registering functions with Lua.
pub struct ScriptApi {
    services: Arc<Services>,
    logger: Arc<ScriptLogger>,
}

impl ScriptApi {
    pub fn new(services: Arc<Services>, logger: Arc<ScriptLogger>) -> Self {
        Self { services, logger }
    }

    /// Register the `host` and `logger` tables with the Lua environment.
    pub fn register(self, lua: &Lua) -> LuaResult<()> {
        let host = lua.create_table()?;

        self.register_identity_functions(lua, &host)?;
        self.register_event_functions(lua, &host)?;
        self.register_task_functions(lua, &host)?;
        self.register_connection_functions(lua, &host)?;

        lua.globals().set("host", host)?;

        self.register_logger_table(lua)?;
        Ok(())
    }

    fn register_identity_functions(&self, lua: &Lua, host: &Table) -> LuaResult<()> {
        // host.script_name()
        let script_name_fn =
            lua.create_function(|_, ()| Ok(current()?.name().to_string()))?;
        host.set("script_name", script_name_fn)?;

        // host.script() - handle table of the current script
        let script_fn = lua.create_function(|lua, ()| {
            let script = current()?;
            script_handle(lua, &script)
        })?;
        host.set("script", script_fn)?;

        Ok(())
    }

    fn register_event_functions(&self, lua: &Lua, host: &Table) -> LuaResult<()> {
        // host.on(event, fn) -> listener id
        let services = Arc::clone(&self.services);
        let on_fn = lua.create_function(move |_, (event, callback): (String, Function)| {
            Ok(services.listeners.register(current()?, &event, callback))
        })?;
        host.set("on", on_fn)?;

        // host.off(id) -> bool
        let services = Arc::clone(&self.services);
        let off_fn = lua.create_function(move |_, id: u64| {
            let script = current()?;
            Ok(services.listeners.unregister(&script, id))
        })?;
        host.set("off", off_fn)?;

        // host.emit(event, ...) -> number of listeners that ran
        let services = Arc::clone(&self.services);
        let emit_fn = lua.create_function(move |_, (event, args): (String, Variadic<Value>)| {
            let args: Vec<String> = args.iter().map(value_to_string).collect();
            Ok(services.listeners.dispatch(&event, &args))
        })?;
        host.set("emit", emit_fn)?;

        // host.command(name, fn(sender, args))
        let services = Arc::clone(&self.services);
        let command_fn = lua.create_function(move |_, (name, callback): (String, Function)| {
            services
                .commands
                .register(current()?, &name, callback)
                .map_err(mlua::Error::external)
        })?;
        host.set("command", command_fn)?;

        Ok(())
    }

    fn register_task_functions(&self, lua: &Lua, host: &Table) -> LuaResult<()> {
        // host.run_later(delay_ticks, fn) -> task id
        let services = Arc::clone(&self.services);
        let later_fn = lua.create_function(move |_, (delay, callback): (u64, Function)| {
            Ok(services.tasks.run_later(current()?, delay, callback))
        })?;
        host.set("run_later", later_fn)?;

        // host.run_repeating(delay_ticks, period_ticks, fn) -> task id
        let services = Arc::clone(&self.services);
        let repeating_fn = lua.create_function(
            move |_, (delay, period, callback): (u64, u64, Function)| {
                Ok(services
                    .tasks
                    .run_repeating(current()?, delay, period, callback))
            },
        )?;
        host.set("run_repeating", repeating_fn)?;

        // host.run_async(fn, [then]) -> task id
        let services = Arc::clone(&self.services);
        let async_fn = lua.create_function(
            move |_, (callback, then): (Function, Option<Function>)| {
                Ok(services.tasks.run_async(current()?, callback, then))
            },
        )?;
        host.set("run_async", async_fn)?;

        // host.cancel_task(id) -> bool
        let services = Arc::clone(&self.services);
        let cancel_fn = lua.create_function(move |_, id: u64| {
            let script = current()?;
            Ok(services.tasks.cancel(&script, id))
        })?;
        host.set("cancel_task", cancel_fn)?;

        Ok(())
    }

    fn register_connection_functions(&self, lua: &Lua, host: &Table) -> LuaResult<()> {
        let services = Arc::clone(&self.services);
        let connect_database_fn = lua.create_function(move |_, target: String| {
            services
                .databases
                .open(current()?.name(), &target)
                .map_err(mlua::Error::external)
        })?;
        host.set("connect_database", connect_database_fn)?;

        let services = Arc::clone(&self.services);
        let disconnect_database_fn = lua.create_function(move |_, id: u64| {
            services
                .databases
                .close(current()?.name(), id)
                .map_err(mlua::Error::external)
        })?;
        host.set("disconnect_database", disconnect_database_fn)?;

        let services = Arc::clone(&self.services);
        let connect_client_fn = lua.create_function(move |_, target: String| {
            services
                .clients
                .open(current()?.name(), &target)
                .map_err(mlua::Error::external)
        })?;
        host.set("connect_client", connect_client_fn)?;

        let services = Arc::clone(&self.services);
        let disconnect_client_fn = lua.create_function(move |_, id: u64| {
            services
                .clients
                .close(current()?.name(), id)
                .map_err(mlua::Error::external)
        })?;
        host.set("disconnect_client", disconnect_client_fn)?;

        Ok(())
    }

    fn register_logger_table(&self, lua: &Lua) -> LuaResult<()> {
        let table = lua.create_table()?;

        let logger = Arc::clone(&self.logger);
        table.set(
            "debug",
            lua.create_function(move |_, msg: Value| {
                logger.debug(&value_to_string(&msg));
                Ok(())
            })?,
        )?;

        let logger = Arc::clone(&self.logger);
        table.set(
            "info",
            lua.create_function(move |_, msg: Value| {
                logger.info(&value_to_string(&msg));
                Ok(())
            })?,
        )?;

        let logger = Arc::clone(&self.logger);
        table.set(
            "warn",
            lua.create_function(move |_, msg: Value| {
                logger.warn(&value_to_string(&msg));
                Ok(())
            })?,
        )?;

        let logger = Arc::clone(&self.logger);
        table.set(
            "error",
            lua.create_function(move |_, msg: Value| {
                logger.error(&value_to_string(&msg));
                Ok(())
            })?,
        )?;

        lua.globals().set("logger", table)
    }
}

/// The table passed to one-argument lifecycle hooks.
pub fn script_handle(lua: &Lua, script: &Script) -> LuaResult<Table> {
    let handle = lua.create_table()?;
    handle.set("name", script.name())?;
    handle.set("path", script.path().to_string_lossy().to_string())?;
    handle.set("main", script.main_path().to_string_lossy().to_string())?;
    handle.set("project", script.is_project())?;
    Ok(handle)
}

fn current() -> LuaResult<Arc<Script>> {
    context::require_current_script().map_err(mlua::Error::external)
}

/// Convert a Lua value to a string for display.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.to_string_lossy(),
        Value::Table(_) => "[table]".to_string(),
        Value::Function(_) => "[function]".to_string(),
        Value::Thread(_) => "[thread]".to_string(),
        Value::UserData(_) => "[userdata]".to_string(),
        Value::LightUserData(_) => "[lightuserdata]".to_string(),
        Value::Error(e) => format!("[error: {}]", e),
        _ => "[unknown]".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::engine::{Execution, ScriptEngine};
    use crate::script::ScriptOptions;
    use crate::services::test_support::router;

    fn setup() -> (Arc<Services>, Arc<Script>, Arc<ScriptEngine>) {
        let (router, _rx) = router();
        let services = Arc::new(Services::new(router, None, None, Vec::new()));
        let (script, engine) = attach(&services, "api.lua");
        (services, script, engine)
    }

    fn attach(services: &Arc<Services>, name: &str) -> (Arc<Script>, Arc<ScriptEngine>) {
        let script = Arc::new(Script::single(name, ScriptOptions::default()));
        let engine = Arc::new(ScriptEngine::new().unwrap());
        let logger = Arc::new(ScriptLogger::new(name, tracing::Level::INFO));
        ScriptApi::new(Arc::clone(services), Arc::clone(&logger))
            .register(engine.lua())
            .unwrap();
        script.attach(Arc::clone(&engine), logger);
        (script, engine)
    }

    fn run(script: &Arc<Script>, engine: &ScriptEngine, source: &str) -> Execution {
        context::with_script(Arc::clone(script), || engine.execute(source, "api.lua"))
    }

    #[test]
    fn test_script_name() {
        let (_services, script, engine) = setup();
        run(&script, &engine, "name = host.script_name()\nis_project = host.script().project");

        let name: String = engine.get_global("name").unwrap();
        assert_eq!(name, "api.lua");
        let is_project: bool = engine.get_global("is_project").unwrap();
        assert!(!is_project);
    }

    #[test]
    fn test_script_name_outside_context_fails() {
        let (_services, _script, engine) = setup();
        let result = engine.execute("host.script_name()", "api.lua");
        match result {
            Execution::Faulted(fault) => {
                assert!(fault.error.to_string().contains("no script context"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_listeners_and_emit() {
        let (services, script, engine) = setup();
        let result = run(
            &script,
            &engine,
            r#"
            seen = {}
            host.on("chat", function(who, text) seen[#seen + 1] = who .. ":" .. text end)
            ran = host.emit("chat", "alex", 5)
            "#,
        );
        assert!(matches!(result, Execution::Completed));

        let ran: i64 = engine.get_global("ran").unwrap();
        assert_eq!(ran, 1);
        assert_eq!(services.listeners.events_of("api.lua"), vec!["chat"]);
        let seen: Table = engine.get_global("seen").unwrap();
        assert_eq!(seen.get::<String>(1).unwrap(), "alex:5");
    }

    #[test]
    fn test_commands_and_tasks_are_owned() {
        let (services, script, engine) = setup();
        let result = run(
            &script,
            &engine,
            r#"
            host.command("hello", function(sender, args) end)
            task = host.run_later(5, function() end)
            host.run_repeating(1, 10, function() end)
            "#,
        );
        assert!(matches!(result, Execution::Completed));

        assert_eq!(services.commands.commands_of("api.lua"), vec!["hello"]);
        assert_eq!(services.tasks.tasks_of("api.lua").len(), 2);

        run(&script, &engine, "cancelled = host.cancel_task(task)");
        let cancelled: bool = engine.get_global("cancelled").unwrap();
        assert!(cancelled);
    }

    #[test]
    fn test_off_and_cancel_only_touch_own_resources() {
        let (services, owner, owner_engine) = setup();
        let (other, other_engine) = attach(&services, "other.lua");
        run(
            &owner,
            &owner_engine,
            "listener = host.on('x', function() end)\ntask = host.run_later(5, function() end)",
        );
        let listener: u64 = owner_engine.get_global("listener").unwrap();
        let task: u64 = owner_engine.get_global("task").unwrap();

        other_engine.set_global("listener", listener).unwrap();
        other_engine.set_global("task", task).unwrap();
        run(
            &other,
            &other_engine,
            "off = host.off(listener)\ncancelled = host.cancel_task(task)",
        );
        assert!(!other_engine.get_global::<bool>("off").unwrap());
        assert!(!other_engine.get_global::<bool>("cancelled").unwrap());
        assert_eq!(services.listeners.count(), 1);
        assert_eq!(services.tasks.tasks_of("api.lua"), vec![task]);

        run(&owner, &owner_engine, "off = host.off(listener)");
        assert!(owner_engine.get_global::<bool>("off").unwrap());
        assert_eq!(services.listeners.count(), 0);
    }

    #[test]
    fn test_duplicate_command_raises() {
        let (_services, script, engine) = setup();
        let result = run(
            &script,
            &engine,
            "host.command('x', function() end)\nhost.command('x', function() end)",
        );
        assert!(matches!(result, Execution::Faulted(_)));
    }

    #[test]
    fn test_connect_without_factory_raises() {
        let (_services, script, engine) = setup();
        let result = run(&script, &engine, "host.connect_database('sqlite://x')");
        assert!(matches!(result, Execution::Faulted(_)));
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&Value::Nil), "nil");
        assert_eq!(value_to_string(&Value::Boolean(true)), "true");
        assert_eq!(value_to_string(&Value::Integer(42)), "42");
    }
}
