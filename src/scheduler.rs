use std::time::{Duration, Instant};

/// Deadline queue for parameter changes that should land a beat or two after
/// the trigger that caused them, drained by the render loop. No threads and
/// no timers; time is passed in, which also keeps tests deterministic.
#[derive(Debug)]
pub struct Scheduler<T> {
    pending: Vec<(Instant, T)>,
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    pub fn schedule_at(&mut self, due: Instant, action: T) {
        self.pending.push((due, action));
    }

    pub fn schedule(&mut self, now: Instant, delay: Duration, action: T) {
        self.schedule_at(now + delay, action);
    }

    /// Removes and returns every action whose deadline has passed, in
    /// deadline order.
    pub fn drain_due(&mut self, now: Instant) -> Vec<T> {
        let mut due: Vec<(Instant, T)> = Vec::new();
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].0 <= now {
                due.push(self.pending.swap_remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by_key(|(at, _)| *at);
        due.into_iter().map(|(_, action)| action).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}
