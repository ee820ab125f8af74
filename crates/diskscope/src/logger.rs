//! In-memory diagnostic log for a host UI panel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Thread-safe append-only log of tagged messages.
///
/// Consumers poll [`has_new`](Logger::has_new) and pull the whole history;
/// fetching the history acknowledges the new entries.
#[derive(Debug, Default)]
pub struct Logger {
    history: Mutex<Vec<String>>,
    has_new: AtomicBool,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `[tag] msg` and raises the has-new flag.
    pub fn log(&self, msg: &str, tag: &str) {
        let line = format!("[{tag}] {msg}");
        tracing::debug!("{line}");
        self.history.lock().unwrap().push(line);
        self.has_new.store(true, Ordering::Release);
    }

    /// Appends with the default `LOG` tag.
    pub fn log_default(&self, msg: &str) {
        self.log(msg, "LOG");
    }

    /// Copies the history out and clears the has-new flag.
    pub fn get_history(&self) -> Vec<String> {
        let history = self.history.lock().unwrap().clone();
        self.has_new.store(false, Ordering::Release);
        history
    }

    /// Empties the history and clears the has-new flag.
    pub fn clear(&self) {
        self.history.lock().unwrap().clear();
        self.has_new.store(false, Ordering::Release);
    }

    /// True if anything was logged since the last [`get_history`] call.
    ///
    /// [`get_history`]: Logger::get_history
    pub fn has_new(&self) -> bool {
        self.has_new.load(Ordering::Acquire)
    }
}
