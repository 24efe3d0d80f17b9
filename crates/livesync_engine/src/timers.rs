use std::collections::HashMap;
use std::future::Future;

use livesync_core::Timer;
use tokio::task::JoinHandle;

/// Named, cancellable background timers. Starting a running timer replaces it.
#[derive(Debug, Default)]
pub struct TimerSet {
    tasks: HashMap<Timer, JoinHandle<()>>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start<F>(&mut self, timer: Timer, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(previous) = self.tasks.insert(timer, tokio::spawn(task)) {
            previous.abort();
        }
    }

    /// Returns whether a timer was running.
    pub fn cancel(&mut self, timer: &Timer) -> bool {
        match self.tasks.remove(timer) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, timer: &Timer) -> bool {
        self.tasks
            .get(timer)
            .is_some_and(|task| !task.is_finished())
    }

    pub fn len(&self) -> usize {
        self.tasks.values().filter(|task| !task.is_finished()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cancel_all(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
