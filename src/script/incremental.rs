//! Spreads the startup batch across host ticks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error};

use super::supervisor::Supervisor;
use super::types::{RunResult, Script};

/// Cancels an [`IncrementalLoader`] from anywhere.
#[derive(Debug, Clone, Default)]
pub struct LoaderHandle {
    cancelled: Arc<AtomicBool>,
}

impl LoaderHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// What one tick of the loader did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderTick {
    /// Not this tick.
    Waiting,
    /// Loaded one script. `result` is `None` when loading raised an error.
    Loaded {
        name: String,
        result: Option<RunResult>,
    },
    /// All scripts were attempted.
    Finished,
    /// The loader was cancelled; remaining scripts were not attempted.
    Cancelled,
}

/// Loads one queued script every `interval` ticks, starting on the first tick.
pub struct IncrementalLoader {
    queue: VecDeque<Arc<Script>>,
    interval: u32,
    countdown: u32,
    handle: LoaderHandle,
    done: bool,
}

impl IncrementalLoader {
    /// `scripts` must already be in load order. An interval of 0 counts as 1.
    pub fn new(scripts: Vec<Arc<Script>>, interval: u32) -> Self {
        Self {
            queue: scripts.into(),
            interval: interval.max(1),
            countdown: 0,
            handle: LoaderHandle::default(),
            done: false,
        }
    }

    pub fn handle(&self) -> LoaderHandle {
        self.handle.clone()
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Advance one host tick.
    pub fn tick(&mut self, supervisor: &Supervisor) -> LoaderTick {
        if self.done {
            return LoaderTick::Finished;
        }
        if self.handle.is_cancelled() {
            debug!("Incremental loading cancelled with {} script(s) left", self.queue.len());
            self.done = true;
            return LoaderTick::Cancelled;
        }
        if self.countdown > 1 {
            self.countdown -= 1;
            return LoaderTick::Waiting;
        }

        let Some(script) = self.queue.pop_front() else {
            self.finish(supervisor);
            return LoaderTick::Finished;
        };

        let name = script.name().to_string();
        let result = match supervisor.load(script) {
            Ok(result) => Some(result),
            Err(e) => {
                error!("Error when loading script '{name}': {e}");
                None
            }
        };
        self.countdown = self.interval;

        if self.queue.is_empty() {
            self.finish(supervisor);
        }
        LoaderTick::Loaded { name, result }
    }

    fn finish(&mut self, supervisor: &Supervisor) {
        self.done = true;
        supervisor.finish_loading();
    }
}
