//! Routing of exceptions raised by script code.
//!
//! Every callback into a script funnels its error through the router, which
//! consults the host, recognizes exit requests and logs faults on the
//! script's own logger.

use std::error::Error as StdError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tracing::{debug, warn, Level};

use super::context;
use super::control::{ControlJob, ControlQueue};
use super::engine::{classify, Execution, ScriptFault};
use super::supervisor::Supervisor;
use super::types::Script;
use crate::host::{Host, ThreadingMode};

/// Decides what happens to an exception raised by a script.
pub struct ExceptionRouter {
    host: Arc<dyn Host>,
    mode: ThreadingMode,
    queue: ControlQueue,
    supervisor: Weak<Supervisor>,
    // Exclusive mode: a request was queued from inside script code.
    deferred: AtomicBool,
}

impl ExceptionRouter {
    pub fn new(
        host: Arc<dyn Host>,
        mode: ThreadingMode,
        queue: ControlQueue,
        supervisor: Weak<Supervisor>,
    ) -> Self {
        Self {
            host,
            mode,
            queue,
            supervisor,
            deferred: AtomicBool::new(false),
        }
    }

    pub fn mode(&self) -> ThreadingMode {
        self.mode
    }

    /// Handle an error raised while calling into `script`.
    ///
    /// `message` describes what was being called and prefixes the report.
    pub fn handle_exception(&self, script: &Arc<Script>, error: mlua::Error, message: Option<&str>) {
        if !self.host.should_report_exception(script, &error) {
            debug!(script = %script.name(), "Exception suppressed by host: {error}");
            return;
        }

        match classify(error) {
            Execution::ExitRequested(code) => {
                script.log(Level::INFO, &format!("Script exited with exit code '{code}'"));
                self.request_unload(script, false);
            }
            Execution::Faulted(fault) => self.log_fault(script, &fault, message),
            Execution::Completed => {}
        }
    }

    /// Report a fault raised during loading. Returns whether it was logged.
    pub fn report_fault(&self, script: &Arc<Script>, fault: &ScriptFault, message: Option<&str>) -> bool {
        if !self.host.should_report_exception(script, &fault.error) {
            return false;
        }
        self.log_fault(script, fault, message);
        true
    }

    fn log_fault(&self, script: &Script, fault: &ScriptFault, message: Option<&str>) {
        script.log(Level::ERROR, &format_report(fault, message));
    }

    /// Ask for `script` to be unloaded from a callback or worker thread.
    ///
    /// The request is queued. In exclusive mode the queue is drained right
    /// away when this thread is outside script code. From inside script code
    /// the thread may hold another interpreter's lock, so draining waits until
    /// the outermost call into a script has returned.
    pub fn request_unload(&self, script: &Arc<Script>, error: bool) {
        let job = ControlJob::Unload {
            script: Arc::clone(script),
            error,
        };
        if !self.queue.send(job) {
            warn!(script = %script.name(), "Supervisor is gone; dropping unload request");
            return;
        }
        if self.mode == ThreadingMode::Exclusive {
            self.deferred.store(true, Ordering::SeqCst);
            self.drain_deferred();
        }
    }

    /// Drain unload requests held back while script code was running.
    ///
    /// Only acts in exclusive mode, and only once no script code is running
    /// on this thread.
    pub(crate) fn drain_deferred(&self) {
        if self.mode != ThreadingMode::Exclusive || context::depth() > 0 {
            return;
        }
        if !self.deferred.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(supervisor) = self.supervisor.upgrade() {
            supervisor.process_pending();
        }
    }

    #[cfg(test)]
    fn has_deferred(&self) -> bool {
        self.deferred.load(Ordering::SeqCst)
    }
}

/// Render a fault with its cause chain.
pub fn format_report(fault: &ScriptFault, message: Option<&str>) -> String {
    let mut report = match message {
        Some(m) => format!("{m}: {fault}"),
        None => fault.to_string(),
    };
    let mut source = fault.error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !report.contains(&text) {
            report.push_str("\ncaused by: ");
            report.push_str(&text);
        }
        source = cause.source();
    }
    report
}
