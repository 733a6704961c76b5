//! Interfaces the embedding application implements.

use std::collections::HashSet;
use std::fmt;

use crate::script::Script;

/// How lifecycle work is scheduled relative to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadingMode {
    /// Lifecycle requests raised off the control thread are queued and run on
    /// the next [`crate::Supervisor::tick`].
    #[default]
    ControlThread,
    /// Lifecycle operations may run on any thread, serialized by the supervisor.
    Exclusive,
}

impl fmt::Display for ThreadingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadingMode::ControlThread => write!(f, "control-thread"),
            ThreadingMode::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// The application hosting the supervisor.
pub trait Host: Send + Sync {
    /// Whether an external capability (plugin) named `name` is present.
    fn is_plugin_present(&self, name: &str) -> bool;

    /// Whether an exception raised by `script` should be reported.
    ///
    /// Returning `false` drops the exception without logging or unloading.
    fn should_report_exception(&self, _script: &Script, _error: &mlua::Error) -> bool {
        true
    }

    /// Called after a script finished loading.
    fn on_script_loaded(&self, _script: &Script) {}

    /// Called when an unload starts, before any cleanup runs.
    fn on_script_unloaded(&self, _script: &Script, _error: bool) {}
}

/// A platform-specific registry scripts may have added entries to.
///
/// The supervisor records which registries were available when a script
/// registered and calls [`PlatformRegistry::unregister`] on those at unload.
pub trait PlatformRegistry: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool {
        true
    }

    /// Remove everything `script` registered.
    fn unregister(&self, script: &Script);
}

/// Host used by the standalone binary: a fixed set of plugin names.
#[derive(Debug, Clone, Default)]
pub struct StandaloneHost {
    plugins: HashSet<String>,
}

impl StandaloneHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plugins<I, S>(plugins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            plugins: plugins.into_iter().map(Into::into).collect(),
        }
    }
}

impl Host for StandaloneHost {
    fn is_plugin_present(&self, name: &str) -> bool {
        self.plugins.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standalone_host_plugins() {
        let host = StandaloneHost::with_plugins(["Foo"]);
        assert!(host.is_plugin_present("Foo"));
        assert!(!host.is_plugin_present("Bar"));
        assert!(!StandaloneHost::new().is_plugin_present("Foo"));
    }

    #[test]
    fn test_default_exception_predicate() {
        let host = StandaloneHost::new();
        let script = Script::single("a.lua", Default::default());
        let error = mlua::Error::RuntimeError("boom".to_string());
        assert!(host.should_report_exception(&script, &error));
    }

    #[test]
    fn test_threading_mode_default() {
        assert_eq!(ThreadingMode::default(), ThreadingMode::ControlThread);
        assert_eq!(ThreadingMode::Exclusive.to_string(), "exclusive");
    }
}
