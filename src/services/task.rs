//! Tick-driven task scheduler for script callbacks.
//!
//! Delayed and repeating tasks run on the control thread when
//! [`TaskScheduler::tick`] is called. Async tasks run on a worker thread; their
//! optional completion callback is delivered back on the control thread at the
//! next tick.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use mlua::{Function, Value};
use parking_lot::Mutex;
use tracing::{debug, error};

use super::invoke;
use crate::script::exception::ExceptionRouter;
use crate::script::Script;

/// Identifier of a scheduled task.
pub type TaskId = u64;

#[derive(Debug, Clone)]
enum TaskKind {
    Delayed { run_at: u64 },
    Repeating { next_run: u64, period: u64 },
    Async { cancelled: Arc<AtomicBool> },
}

struct TaskEntry {
    script: Arc<Script>,
    callback: Function,
    kind: TaskKind,
}

struct Completion {
    task: TaskId,
    script: Arc<Script>,
    callback: Function,
    value: Value,
}

/// Schedules script callbacks by tick.
pub struct TaskScheduler {
    tasks: Mutex<HashMap<TaskId, TaskEntry>>,
    completions: Mutex<Vec<Completion>>,
    current_tick: AtomicU64,
    next_id: AtomicU64,
    router: Arc<ExceptionRouter>,
}

impl TaskScheduler {
    pub fn new(router: Arc<ExceptionRouter>) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            completions: Mutex::new(Vec::new()),
            current_tick: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
            router,
        }
    }

    fn next_id(&self) -> TaskId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick.load(Ordering::SeqCst)
    }

    /// Run `callback` once, `delay` ticks from now (at least one).
    pub fn run_later(&self, script: Arc<Script>, delay: u64, callback: Function) -> TaskId {
        let id = self.next_id();
        let run_at = self.current_tick() + delay.max(1);
        self.tasks.lock().insert(
            id,
            TaskEntry {
                script,
                callback,
                kind: TaskKind::Delayed { run_at },
            },
        );
        id
    }

    /// Run `callback` every `period` ticks, first after `delay` ticks.
    pub fn run_repeating(
        &self,
        script: Arc<Script>,
        delay: u64,
        period: u64,
        callback: Function,
    ) -> TaskId {
        let id = self.next_id();
        let next_run = self.current_tick() + delay.max(1);
        self.tasks.lock().insert(
            id,
            TaskEntry {
                script,
                callback,
                kind: TaskKind::Repeating {
                    next_run,
                    period: period.max(1),
                },
            },
        );
        id
    }

    /// Run `callback` on a worker thread.
    ///
    /// If `then` is given it receives the callback's return value on the
    /// control thread at the next tick, unless the task was cancelled first.
    pub fn run_async(
        self: &Arc<Self>,
        script: Arc<Script>,
        callback: Function,
        then: Option<Function>,
    ) -> TaskId {
        let id = self.next_id();
        let cancelled = Arc::new(AtomicBool::new(false));
        self.tasks.lock().insert(
            id,
            TaskEntry {
                script: Arc::clone(&script),
                callback: callback.clone(),
                kind: TaskKind::Async {
                    cancelled: Arc::clone(&cancelled),
                },
            },
        );

        let scheduler = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("lunahost-task-{id}"))
            .spawn(move || {
                let value = invoke(&scheduler.router, &script, "Error in asynchronous task", || {
                    callback.call::<Value>(())
                });
                scheduler.tasks.lock().remove(&id);
                if cancelled.load(Ordering::SeqCst) {
                    return;
                }
                if let (Some(value), Some(then)) = (value, then) {
                    scheduler.completions.lock().push(Completion {
                        task: id,
                        script,
                        callback: then,
                        value,
                    });
                }
            });

        if let Err(e) = spawned {
            error!("Failed to start asynchronous task {id}: {e}");
            self.tasks.lock().remove(&id);
        }
        id
    }

    /// Cancel one of `owner`'s tasks. Running async work finishes but its
    /// completion is dropped.
    pub fn cancel(&self, owner: &Script, id: TaskId) -> bool {
        let mut tasks = self.tasks.lock();
        if !tasks.get(&id).is_some_and(|e| e.script.name() == owner.name()) {
            return false;
        }
        match tasks.remove(&id) {
            Some(entry) => {
                if let TaskKind::Async { cancelled } = &entry.kind {
                    cancelled.store(true, Ordering::SeqCst);
                }
                true
            }
            None => false,
        }
    }

    /// Cancel every task owned by the script and drop its pending completions.
    pub fn cancel_all(&self, script: &Script) -> usize {
        let mut tasks = self.tasks.lock();
        let before = tasks.len();
        tasks.retain(|_, entry| {
            if entry.script.name() != script.name() {
                return true;
            }
            if let TaskKind::Async { cancelled } = &entry.kind {
                cancelled.store(true, Ordering::SeqCst);
            }
            false
        });
        let removed = before - tasks.len();
        drop(tasks);

        self.completions
            .lock()
            .retain(|c| c.script.name() != script.name());
        removed
    }

    /// Advance one tick: run due tasks, then deliver async completions.
    ///
    /// Returns how many callbacks were run.
    pub fn tick(&self) -> usize {
        let now = self.current_tick.fetch_add(1, Ordering::SeqCst) + 1;

        let mut due = Vec::new();
        {
            let mut tasks = self.tasks.lock();
            let mut finished = Vec::new();
            for (id, entry) in tasks.iter_mut() {
                // Tasks of a closed script never run again.
                let Some(_engine) = entry.script.engine() else {
                    finished.push(*id);
                    continue;
                };
                match &mut entry.kind {
                    TaskKind::Delayed { run_at } if *run_at <= now => {
                        due.push((*id, Arc::clone(&entry.script), entry.callback.clone()));
                        finished.push(*id);
                    }
                    TaskKind::Repeating { next_run, period } if *next_run <= now => {
                        due.push((*id, Arc::clone(&entry.script), entry.callback.clone()));
                        *next_run = now + *period;
                    }
                    _ => {}
                }
            }
            for id in finished {
                tasks.remove(&id);
            }
        }
        due.sort_by_key(|(id, _, _)| *id);

        let mut ran = 0;
        for (id, script, callback) in due {
            debug!(script = %script.name(), "Running task {id}");
            invoke(&self.router, &script, "Error in scheduled task", || {
                callback.call::<()>(())
            });
            ran += 1;
        }

        let completions = std::mem::take(&mut *self.completions.lock());
        for completion in completions {
            debug!(script = %completion.script.name(), "Completing task {}", completion.task);
            let value = completion.value;
            invoke(
                &self.router,
                &completion.script,
                "Error in asynchronous task callback",
                || completion.callback.call::<()>(value),
            );
            ran += 1;
        }
        ran
    }

    /// Pending task ids owned by the named script, sorted.
    pub fn tasks_of(&self, script_name: &str) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self
            .tasks
            .lock()
            .iter()
            .filter(|(_, entry)| entry.script.name() == script_name)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    pub fn active_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Whether async completions are waiting for the next tick.
    pub fn has_pending_completions(&self) -> bool {
        !self.completions.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{global, global_fn, router, running_script};
    use std::time::{Duration, Instant};

    const COUNTER: &str = "count = 0\nfunction bump() count = count + 1 end";

    #[test]
    fn test_run_later() {
        let (router, _rx) = router();
        let scheduler = TaskScheduler::new(router);
        let script = running_script("a.lua", COUNTER);

        scheduler.run_later(Arc::clone(&script), 2, global_fn(&script, "bump"));
        scheduler.tick();
        assert_eq!(global::<i64>(&script, "count"), 0);
        scheduler.tick();
        assert_eq!(global::<i64>(&script, "count"), 1);
        scheduler.tick();
        assert_eq!(global::<i64>(&script, "count"), 1);
        assert_eq!(scheduler.active_count(), 0);
    }

    #[test]
    fn test_run_later_zero_delay_runs_next_tick() {
        let (router, _rx) = router();
        let scheduler = TaskScheduler::new(router);
        let script = running_script("a.lua", COUNTER);

        scheduler.run_later(Arc::clone(&script), 0, global_fn(&script, "bump"));
        assert_eq!(scheduler.tick(), 1);
        assert_eq!(global::<i64>(&script, "count"), 1);
    }

    #[test]
    fn test_run_repeating() {
        let (router, _rx) = router();
        let scheduler = TaskScheduler::new(router);
        let script = running_script("a.lua", COUNTER);

        let id = scheduler.run_repeating(Arc::clone(&script), 1, 2, global_fn(&script, "bump"));
        for _ in 0..5 {
            scheduler.tick();
        }
        // Ticks 1, 3 and 5.
        assert_eq!(global::<i64>(&script, "count"), 3);

        let other = running_script("b.lua", COUNTER);
        assert!(!scheduler.cancel(&other, id));
        assert!(scheduler.cancel(&script, id));
        scheduler.tick();
        scheduler.tick();
        assert_eq!(global::<i64>(&script, "count"), 3);
        assert!(!scheduler.cancel(&script, id));
    }

    #[test]
    fn test_cancel_all_for_script() {
        let (router, _rx) = router();
        let scheduler = TaskScheduler::new(router);
        let a = running_script("a.lua", COUNTER);
        let b = running_script("b.lua", COUNTER);

        scheduler.run_later(Arc::clone(&a), 1, global_fn(&a, "bump"));
        scheduler.run_repeating(Arc::clone(&a), 1, 1, global_fn(&a, "bump"));
        scheduler.run_later(Arc::clone(&b), 1, global_fn(&b, "bump"));

        assert_eq!(scheduler.tasks_of("a.lua").len(), 2);
        assert_eq!(scheduler.cancel_all(&a), 2);
        assert_eq!(scheduler.cancel_all(&a), 0);
        scheduler.tick();
        assert_eq!(global::<i64>(&a, "count"), 0);
        assert_eq!(global::<i64>(&b, "count"), 1);
    }

    #[test]
    fn test_async_completion_delivered_on_tick() {
        let (router, _rx) = router();
        let scheduler = Arc::new(TaskScheduler::new(router));
        let script = running_script(
            "a.lua",
            "result = nil\nfunction work() return 21 * 2 end\nfunction done(v) result = v end",
        );

        scheduler.run_async(
            Arc::clone(&script),
            global_fn(&script, "work"),
            Some(global_fn(&script, "done")),
        );

        let deadline = Instant::now() + Duration::from_secs(5);
        while !scheduler.has_pending_completions() {
            assert!(Instant::now() < deadline, "async task did not finish");
            thread::sleep(Duration::from_millis(5));
        }
        assert!(global::<Option<i64>>(&script, "result").is_none());

        scheduler.tick();
        assert_eq!(global::<i64>(&script, "result"), 42);
        assert_eq!(scheduler.active_count(), 0);
    }

    #[test]
    fn test_failing_task_is_contained() {
        let (router, _rx) = router();
        let scheduler = TaskScheduler::new(router);
        let script = running_script("a.lua", "function boom() error('bad') end");

        scheduler.run_later(Arc::clone(&script), 1, global_fn(&script, "boom"));
        assert_eq!(scheduler.tick(), 1);
        assert_eq!(scheduler.active_count(), 0);
    }

    #[test]
    fn test_closed_script_tasks_dropped() {
        let (router, _rx) = router();
        let scheduler = TaskScheduler::new(router);
        let script = running_script("a.lua", COUNTER);
        scheduler.run_later(Arc::clone(&script), 1, global_fn(&script, "bump"));
        scheduler.run_repeating(Arc::clone(&script), 1, 1, global_fn(&script, "bump"));

        script.close();
        assert_eq!(scheduler.tick(), 0);
        assert_eq!(scheduler.active_count(), 0);
    }
}
