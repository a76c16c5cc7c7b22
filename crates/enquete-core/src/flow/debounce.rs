use std::collections::HashMap;

use chrono::Utc;

/// Millisecond clock behind the debounce window. Injected so tests drive
/// time by hand instead of sleeping.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingWrite {
    value: String,
    due_at_ms: u64,
}

/// Coalesces rapid free-text edits into one durable write per question.
/// One pending slot per question id; scheduling again replaces both the
/// value and the deadline, so only the last value of a burst survives.
#[derive(Debug)]
pub(crate) struct TextDebouncer {
    window_ms: u64,
    pending: HashMap<String, PendingWrite>,
}

impl TextDebouncer {
    pub(crate) fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            pending: HashMap::new(),
        }
    }

    pub(crate) fn schedule(&mut self, question_id: &str, value: impl Into<String>, now_ms: u64) {
        self.pending.insert(
            question_id.to_string(),
            PendingWrite {
                value: value.into(),
                due_at_ms: now_ms.saturating_add(self.window_ms),
            },
        );
    }

    /// Removes and returns writes whose quiet window has elapsed, ordered by
    /// deadline then question id so flushes are deterministic.
    pub(crate) fn take_due(&mut self, now_ms: u64) -> Vec<(String, String)> {
        let mut due: Vec<(String, PendingWrite)> = Vec::new();
        self.pending.retain(|question_id, write| {
            if write.due_at_ms <= now_ms {
                due.push((question_id.clone(), write.clone()));
                false
            } else {
                true
            }
        });
        due.sort_by(|a, b| (a.1.due_at_ms, &a.0).cmp(&(b.1.due_at_ms, &b.0)));
        due.into_iter()
            .map(|(question_id, write)| (question_id, write.value))
            .collect()
    }

    /// Removes and returns every pending write regardless of deadline.
    pub(crate) fn drain(&mut self) -> Vec<(String, String)> {
        self.take_due(u64::MAX)
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
