//! Permissions granted to scripts while they are loaded.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::script::Script;

/// Map of permission node to owning script.
#[derive(Default)]
pub struct PermissionRegistry {
    grants: RwLock<HashMap<String, String>>,
}

impl PermissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant the permissions listed in the script's options.
    ///
    /// A node already owned by another script is skipped with a warning.
    /// Returns the nodes granted.
    pub fn grant_for(&self, script: &Script) -> Vec<String> {
        let mut grants = self.grants.write();
        let mut granted = Vec::new();
        for node in &script.options().permissions {
            match grants.get(node) {
                Some(owner) if owner != script.name() => {
                    warn!(
                        script = %script.name(),
                        "Permission '{node}' is already registered by '{owner}'"
                    );
                }
                Some(_) => {}
                None => {
                    grants.insert(node.clone(), script.name().to_string());
                    granted.push(node.clone());
                }
            }
        }
        if !granted.is_empty() {
            debug!(script = %script.name(), "Granted permissions: {granted:?}");
        }
        granted
    }

    /// Remove every node owned by the script.
    pub fn revoke_for(&self, script: &Script) -> usize {
        let mut grants = self.grants.write();
        let before = grants.len();
        grants.retain(|_, owner| owner != script.name());
        before - grants.len()
    }

    pub fn owner(&self, node: &str) -> Option<String> {
        self.grants.read().get(node).cloned()
    }

    /// Nodes owned by the named script, sorted.
    pub fn permissions_of(&self, script_name: &str) -> Vec<String> {
        let mut nodes: Vec<String> = self
            .grants
            .read()
            .iter()
            .filter(|(_, owner)| owner.as_str() == script_name)
            .map(|(node, _)| node.clone())
            .collect();
        nodes.sort();
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptOptions;

    fn script(name: &str, nodes: &[&str]) -> Script {
        let options = ScriptOptions {
            permissions: nodes.iter().map(|n| n.to_string()).collect(),
            ..ScriptOptions::default()
        };
        Script::single(name, options)
    }

    #[test]
    fn test_grant_and_revoke() {
        let registry = PermissionRegistry::new();
        let a = script("a.lua", &["shop.buy", "shop.sell"]);

        assert_eq!(registry.grant_for(&a).len(), 2);
        assert_eq!(registry.owner("shop.buy").as_deref(), Some("a.lua"));
        assert_eq!(registry.permissions_of("a.lua"), vec!["shop.buy", "shop.sell"]);

        assert_eq!(registry.revoke_for(&a), 2);
        assert!(registry.owner("shop.buy").is_none());
        assert_eq!(registry.revoke_for(&a), 0);
    }

    #[test]
    fn test_conflicting_node_skipped() {
        let registry = PermissionRegistry::new();
        let a = script("a.lua", &["shared"]);
        let b = script("b.lua", &["shared", "own"]);

        registry.grant_for(&a);
        assert_eq!(registry.grant_for(&b), vec!["own"]);
        assert_eq!(registry.owner("shared").as_deref(), Some("a.lua"));

        registry.revoke_for(&b);
        assert_eq!(registry.owner("shared").as_deref(), Some("a.lua"));
    }
}
