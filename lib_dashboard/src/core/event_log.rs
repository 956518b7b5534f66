//! # System Log Book
//!
//! A bounded, most-recent-first buffer of the backend's `system_event` lines.
//! Each line is also forwarded to the `log` facade under the `backend` target.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::models::status::SystemLogLine;

/// The log book.
pub struct SystemLogBook {
    lines: Mutex<VecDeque<SystemLogLine>>,
    capacity: usize,
}

impl SystemLogBook {
    /// Keeps at most `capacity` lines (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { lines: Mutex::new(VecDeque::with_capacity(capacity)), capacity }
    }

    /// Adds a live line.
    pub fn push(&self, line: SystemLogLine) {
        log::log!(target: "backend", line.log_level(), "[{}] {}", line.source, line.message);
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.push_front(line);
        lines.truncate(self.capacity);
    }

    /// Loads history given newest-first, without forwarding to the logger.
    pub fn load_history(&self, history: &[SystemLogLine]) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        for line in history.iter().rev() {
            lines.push_front(line.clone());
        }
        lines.truncate(self.capacity);
    }

    /// Up to `n` lines, newest first.
    pub fn recent(&self, n: usize) -> Vec<SystemLogLine> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .take(n)
            .cloned()
            .collect()
    }

    /// Number of lines held.
    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(message: &str) -> SystemLogLine {
        SystemLogLine { level: "INFO".into(), source: "SYS".into(), message: message.into(), ts: None }
    }

    #[test]
    fn test_bounded_newest_first() {
        let book = SystemLogBook::new(2);
        book.load_history(&[line("b"), line("a")]);
        book.push(line("c"));

        let recent: Vec<String> = book.recent(10).into_iter().map(|l| l.message).collect();
        assert_eq!(recent, vec!["c", "b"]);
        assert_eq!(book.len(), 2);
    }
}
