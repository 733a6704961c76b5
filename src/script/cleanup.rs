//! Ordered teardown of everything a script registered.

use std::sync::Arc;

use tracing::debug;

use super::api::script_handle;
use super::context;
use super::exception::ExceptionRouter;
use super::types::Script;
use crate::services::Services;

/// Runs the unload steps for a script in a fixed order.
pub struct CleanupCoordinator {
    services: Arc<Services>,
    router: Arc<ExceptionRouter>,
}

impl CleanupCoordinator {
    pub fn new(services: Arc<Services>, router: Arc<ExceptionRouter>) -> Self {
        Self { services, router }
    }

    /// Tear the script down.
    ///
    /// Order: stop hook (skipped for error unloads), permissions, listeners,
    /// tasks, commands, database connections, client connections, platform
    /// registries, then the interpreter and logger. Every step tolerates the
    /// script having nothing registered. Returns `false` if the stop hook failed.
    pub fn run(&self, script: &Arc<Script>, error: bool) -> bool {
        let graceful = if error {
            true
        } else {
            self.run_stop_hook(script)
        };

        let name = script.name();
        let permissions = self.services.permissions.revoke_for(script);
        let listeners = self.services.listeners.unregister_all(script);
        let tasks = self.services.tasks.cancel_all(script);
        let commands = self.services.commands.unregister_all(script);
        let databases = self.services.databases.close_all(name);
        let clients = self.services.clients.close_all(name);

        for registry in &self.services.platform {
            if script.uses_platform_registry(registry.name()) {
                registry.unregister(script);
            }
        }

        script.close();

        debug!(
            script = %name,
            permissions, listeners, tasks, commands, databases, clients,
            "Cleaned up script"
        );
        graceful
    }

    fn run_stop_hook(&self, script: &Arc<Script>) -> bool {
        let Some(engine) = script.engine() else {
            return true;
        };
        let hook = engine.stop_hook();
        if hook.is_none() {
            return true;
        }

        let result = context::with_script(Arc::clone(script), || {
            let handle = script_handle(engine.lua(), script)?;
            hook.call(&handle)
        });
        match result {
            Ok(()) => true,
            Err(e) => {
                self.router
                    .handle_exception(script, e, Some("Error when calling stop function"));
                false
            }
        }
    }
}
