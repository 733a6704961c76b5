//! Channel carrying lifecycle requests to the thread that owns lifecycle work.
//!
//! Worker threads and script callbacks never unload a script directly. They
//! send a [`ControlJob`] and the supervisor drains the queue once it holds the
//! lifecycle lock.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;

use parking_lot::Mutex;

use super::types::Script;

/// A deferred lifecycle request.
#[derive(Debug, Clone)]
pub enum ControlJob {
    /// Unload the script; `error` skips its stop hook.
    Unload { script: Arc<Script>, error: bool },
}

/// Sending half, shared by the exception router.
#[derive(Clone)]
pub struct ControlQueue {
    tx: Sender<ControlJob>,
}

impl ControlQueue {
    /// Queue a job. Returns `false` if the receiving side is gone.
    pub fn send(&self, job: ControlJob) -> bool {
        self.tx.send(job).is_ok()
    }
}

/// Receiving half, owned by the supervisor.
pub struct ControlReceiver {
    rx: Mutex<Receiver<ControlJob>>,
}

impl ControlReceiver {
    /// Take the next pending job without blocking.
    pub fn try_next(&self) -> Option<ControlJob> {
        match self.rx.lock().try_recv() {
            Ok(job) => Some(job),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

/// Create a connected queue/receiver pair.
pub fn control_channel() -> (ControlQueue, ControlReceiver) {
    let (tx, rx) = mpsc::channel();
    (
        ControlQueue { tx },
        ControlReceiver { rx: Mutex::new(rx) },
    )
}
