//! Commands registered by scripts.

use std::collections::HashMap;
use std::sync::Arc;

use mlua::Function;
use parking_lot::RwLock;

use super::invoke;
use crate::script::exception::ExceptionRouter;
use crate::script::Script;
use crate::{LunaError, Result};

struct CommandEntry {
    script: Arc<Script>,
    callback: Function,
}

/// Command name to script callback. Names are case-insensitive.
pub struct CommandRegistry {
    commands: RwLock<HashMap<String, CommandEntry>>,
    router: Arc<ExceptionRouter>,
}

impl CommandRegistry {
    pub fn new(router: Arc<ExceptionRouter>) -> Self {
        Self {
            commands: RwLock::new(HashMap::new()),
            router,
        }
    }

    /// Register a command. Fails if the name is empty or already taken.
    pub fn register(&self, script: Arc<Script>, name: &str, callback: Function) -> Result<()> {
        let key = name.trim().to_lowercase();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(LunaError::Validation(format!("invalid command name '{name}'")));
        }

        let mut commands = self.commands.write();
        if let Some(existing) = commands.get(&key) {
            return Err(LunaError::Validation(format!(
                "command '{key}' is already registered by {}",
                existing.script.name()
            )));
        }
        commands.insert(key, CommandEntry { script, callback });
        Ok(())
    }

    /// Run a command as `sender` with `args`.
    ///
    /// Returns `None` for unknown commands and `Some(false)` if the callback
    /// failed or returned `false`.
    pub fn execute(&self, name: &str, sender: &str, args: &[String]) -> Option<bool> {
        let (script, callback) = {
            let commands = self.commands.read();
            let entry = commands.get(&name.to_lowercase())?;
            let Some(_engine) = entry.script.engine() else {
                return Some(false);
            };
            (Arc::clone(&entry.script), entry.callback.clone())
        };

        let what = format!("Error when executing command '{name}'");
        let result = invoke(&self.router, &script, &what, || {
            callback.call::<Option<bool>>((sender.to_string(), args.to_vec()))
        });
        Some(matches!(result, Some(None) | Some(Some(true))))
    }

    /// Remove every command owned by the script.
    pub fn unregister_all(&self, script: &Script) -> usize {
        let mut commands = self.commands.write();
        let before = commands.len();
        commands.retain(|_, entry| entry.script.name() != script.name());
        before - commands.len()
    }

    /// Command names owned by the named script, sorted.
    pub fn commands_of(&self, script_name: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .commands
            .read()
            .iter()
            .filter(|(_, entry)| entry.script.name() == script_name)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.read().contains_key(&name.to_lowercase())
    }
}
