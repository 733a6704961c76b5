//! Event listeners registered by scripts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mlua::{Function, Variadic};
use parking_lot::RwLock;

use super::invoke;
use crate::script::exception::ExceptionRouter;
use crate::script::Script;

/// Identifier of a registered listener.
pub type ListenerId = u64;

struct ListenerEntry {
    id: ListenerId,
    event: String,
    script: Arc<Script>,
    callback: Function,
}

/// Event name to script callbacks.
pub struct ListenerRegistry {
    listeners: RwLock<Vec<ListenerEntry>>,
    next_id: AtomicU64,
    router: Arc<ExceptionRouter>,
}

impl ListenerRegistry {
    pub fn new(router: Arc<ExceptionRouter>) -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            router,
        }
    }

    pub fn register(&self, script: Arc<Script>, event: &str, callback: Function) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.write().push(ListenerEntry {
            id,
            event: event.to_string(),
            script,
            callback,
        });
        id
    }

    /// Remove one of `owner`'s listeners. Other scripts' listeners are left alone.
    pub fn unregister(&self, owner: &Script, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| l.id != id || l.script.name() != owner.name());
        listeners.len() != before
    }

    /// Remove every listener owned by the script.
    pub fn unregister_all(&self, script: &Script) -> usize {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| l.script.name() != script.name());
        before - listeners.len()
    }

    /// Call every listener for `event` in registration order.
    ///
    /// Each callback runs in its own script's context. A failing listener is
    /// reported and does not stop the others. Returns how many ran cleanly.
    pub fn dispatch(&self, event: &str, args: &[String]) -> usize {
        let targets: Vec<(Arc<Script>, Function)> = self
            .listeners
            .read()
            .iter()
            .filter(|l| l.event == event)
            .filter_map(|l| {
                // A closed script's interpreter may already be gone.
                let _engine = l.script.engine()?;
                Some((Arc::clone(&l.script), l.callback.clone()))
            })
            .collect();

        let what = format!("Error when handling event '{event}'");
        targets
            .into_iter()
            .filter_map(|(script, callback)| {
                invoke(&self.router, &script, &what, || {
                    callback.call::<()>(Variadic::from_iter(args.iter().cloned()))
                })
            })
            .count()
    }

    /// Distinct event names the named script listens to.
    pub fn events_of(&self, script_name: &str) -> Vec<String> {
        let mut events: Vec<String> = self
            .listeners
            .read()
            .iter()
            .filter(|l| l.script.name() == script_name)
            .map(|l| l.event.clone())
            .collect();
        events.sort();
        events.dedup();
        events
    }

    pub fn count(&self) -> usize {
        self.listeners.read().len()
    }
}
