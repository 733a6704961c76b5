//! Connections scripts open to external stores and services.
//!
//! Opening is delegated to a host-supplied [`ConnectionFactory`]; the registry
//! only tracks ownership so connections can be closed when the owner unloads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{LunaError, Result};

/// Identifier of an open connection, unique within its registry.
pub type ConnectionId = u64;

/// An open connection.
pub trait ManagedConnection: Send + Sync {
    /// Short description used in logs and the info command.
    fn describe(&self) -> String;

    fn close(&self) -> Result<()>;
}

/// Opens connections on behalf of scripts.
pub trait ConnectionFactory: Send + Sync {
    fn open(&self, target: &str) -> Result<Box<dyn ManagedConnection>>;
}

struct OpenConnection {
    id: ConnectionId,
    connection: Box<dyn ManagedConnection>,
}

/// Connections grouped by owning script.
pub struct ConnectionRegistry {
    kind: &'static str,
    factory: Option<Arc<dyn ConnectionFactory>>,
    open: Mutex<HashMap<String, Vec<OpenConnection>>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new(kind: &'static str, factory: Option<Arc<dyn ConnectionFactory>>) -> Self {
        Self {
            kind,
            factory,
            open: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Open a connection owned by the named script.
    pub fn open(&self, script_name: &str, target: &str) -> Result<ConnectionId> {
        let factory = self
            .factory
            .as_ref()
            .ok_or_else(|| LunaError::Connection(format!("no {} factory configured", self.kind)))?;
        let connection = factory.open(target)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        debug!(script = %script_name, "Opened {} {id}: {}", self.kind, connection.describe());
        self.open
            .lock()
            .entry(script_name.to_string())
            .or_default()
            .push(OpenConnection { id, connection });
        Ok(id)
    }

    /// Close one connection owned by the named script.
    ///
    /// Returns `Ok(false)` if the script owns no connection with that id.
    pub fn close(&self, script_name: &str, id: ConnectionId) -> Result<bool> {
        let removed = {
            let mut open = self.open.lock();
            let Some(list) = open.get_mut(script_name) else {
                return Ok(false);
            };
            let Some(pos) = list.iter().position(|c| c.id == id) else {
                return Ok(false);
            };
            let removed = list.remove(pos);
            if list.is_empty() {
                open.remove(script_name);
            }
            removed
        };
        removed.connection.close()?;
        Ok(true)
    }

    /// Close every connection owned by the named script.
    ///
    /// Close failures are logged and do not stop the rest. Returns how many
    /// connections were removed.
    pub fn close_all(&self, script_name: &str) -> usize {
        let connections = self.open.lock().remove(script_name).unwrap_or_default();
        for open in &connections {
            if let Err(e) = open.connection.close() {
                warn!(
                    script = %script_name,
                    "Failed to close {} {} ({}): {e}",
                    self.kind,
                    open.id,
                    open.connection.describe()
                );
            }
        }
        connections.len()
    }

    /// Descriptions of the named script's open connections.
    pub fn connections_of(&self, script_name: &str) -> Vec<String> {
        self.open
            .lock()
            .get(script_name)
            .map(|list| {
                list.iter()
                    .map(|c| format!("#{} {}", c.id, c.connection.describe()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.open.lock().values().map(Vec::len).sum()
    }
}
