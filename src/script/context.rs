//! Per-thread "current script" tracking.
//!
//! Each thread keeps a stack of scripts whose code is running on it. Entering a
//! script pushes it; dropping the returned guard pops it again. Nested entries
//! (a listener dispatching an event handled by another script) stack up and
//! unwind in reverse order.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

use super::types::Script;
use crate::{LunaError, Result};

thread_local! {
    static STACK: RefCell<Vec<Arc<Script>>> = const { RefCell::new(Vec::new()) };
}

/// Restores the previous context when dropped.
#[must_use = "the script context is left as soon as the guard is dropped"]
pub struct ContextGuard {
    depth: usize,
    // Guards belong to the thread that created them.
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        STACK.with(|stack| stack.borrow_mut().truncate(self.depth));
    }
}

/// Make `script` the current script on this thread until the guard drops.
pub fn enter(script: Arc<Script>) -> ContextGuard {
    STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        let depth = stack.len();
        stack.push(script);
        ContextGuard {
            depth,
            _not_send: PhantomData,
        }
    })
}

/// Run `f` with `script` as the current script.
pub fn with_script<R>(script: Arc<Script>, f: impl FnOnce() -> R) -> R {
    let _guard = enter(script);
    f()
}

/// The innermost script running on this thread.
pub fn current_script() -> Option<Arc<Script>> {
    STACK.with(|stack| stack.borrow().last().cloned())
}

/// Like [`current_script`], failing when no script code is running here.
pub fn require_current_script() -> Result<Arc<Script>> {
    current_script().ok_or(LunaError::NoScriptContext)
}

/// Number of nested script contexts on this thread.
pub fn depth() -> usize {
    STACK.with(|stack| stack.borrow().len())
}
