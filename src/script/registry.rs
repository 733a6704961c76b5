//! Registry of loaded scripts.
//!
//! Scripts are indexed by name, by main path and by every module path they
//! own. Insertion order is kept so bulk unloads can run in reverse.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use super::types::Script;
use crate::{LunaError, Result};

#[derive(Default)]
struct RegistryIndex {
    order: Vec<Arc<Script>>,
    by_name: HashMap<String, Arc<Script>>,
    by_main_path: HashMap<PathBuf, String>,
    by_module: HashMap<PathBuf, String>,
}

/// Thread-safe registry of loaded scripts.
#[derive(Default)]
pub struct ScriptRegistry {
    index: RwLock<RegistryIndex>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a script under its name, main path and module paths.
    ///
    /// Fails with [`LunaError::DuplicateScript`] when the name or main path is
    /// already taken.
    pub fn register(&self, script: Arc<Script>) -> Result<()> {
        let mut index = self.index.write();
        if index.by_name.contains_key(script.name()) {
            return Err(LunaError::DuplicateScript(script.name().to_string()));
        }
        if let Some(owner) = index.by_main_path.get(script.main_path()) {
            return Err(LunaError::DuplicateScript(format!(
                "{} (path already used by {owner})",
                script.main_path().display()
            )));
        }

        let name = script.name().to_string();
        index
            .by_main_path
            .insert(script.main_path().to_path_buf(), name.clone());
        for module in script.modules() {
            index
                .by_module
                .entry(module.clone())
                .or_insert_with(|| name.clone());
        }
        index.by_name.insert(name, Arc::clone(&script));
        index.order.push(script);
        Ok(())
    }

    /// Remove a script and every index entry pointing at it.
    ///
    /// Only the registered instance is removed; a different script that
    /// happens to share the name is left alone. Returns `false` if nothing
    /// was removed.
    pub fn unregister(&self, script: &Script) -> bool {
        let mut index = self.index.write();
        let registered = match index.by_name.get(script.name()) {
            Some(existing) => std::ptr::eq(Arc::as_ptr(existing), script),
            None => false,
        };
        if !registered {
            return false;
        }

        let name = script.name();
        index.by_name.remove(name);
        index.by_main_path.retain(|_, owner| owner != name);
        index.by_module.retain(|_, owner| owner != name);
        index.order.retain(|s| s.name() != name);
        true
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<Arc<Script>> {
        self.index.read().by_name.get(name).cloned()
    }

    /// Find the script owning `path`, as main path first and then as a module.
    pub fn lookup_by_path(&self, path: &Path) -> Option<Arc<Script>> {
        let index = self.index.read();
        let name = index
            .by_main_path
            .get(path)
            .or_else(|| index.by_module.get(path))?;
        index.by_name.get(name).cloned()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.index.read().by_name.contains_key(name)
    }

    pub fn contains_main_path(&self, path: &Path) -> bool {
        self.index.read().by_main_path.contains_key(path)
    }

    /// Point-in-time copy of the loaded scripts in registration order.
    pub fn snapshot(&self) -> Vec<Arc<Script>> {
        self.index.read().order.clone()
    }

    /// Names of the loaded scripts in registration order.
    pub fn names(&self) -> Vec<String> {
        self.index
            .read()
            .order
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.index.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry, returning what was registered.
    pub fn clear(&self) -> Vec<Arc<Script>> {
        let mut index = self.index.write();
        let scripts = std::mem::take(&mut index.order);
        index.by_name.clear();
        index.by_main_path.clear();
        index.by_module.clear();
        scripts
    }
}
