// One-shot wakeups. A session only acts on the id it is currently waiting
// for, so a cancelled or superseded wakeup is inert even if delivered late.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// What a wakeup is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    FeedbackElapsed,
    PassiveBoundary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fired {
    pub id: TimerId,
    pub wake: Wake,
    pub deadline_ms: u64,
}

pub trait Scheduler {
    /// Register a wakeup at an absolute clock reading.
    fn schedule_at(&mut self, deadline_ms: u64, wake: Wake) -> TimerId;

    /// Drop a pending wakeup. Returns false if it already fired or never existed.
    fn cancel(&mut self, id: TimerId) -> bool;

    fn schedule_after(&mut self, now_ms: u64, delay: Duration, wake: Wake) -> TimerId {
        self.schedule_at(now_ms.saturating_add(delay.as_millis() as u64), wake)
    }
}

/// In-process scheduler: a small list of pending wakeups ordered on drain.
#[derive(Debug, Default)]
pub struct TimerQueue {
    next_id: u64,
    pending: Vec<Fired>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.pending.iter().map(|f| f.deadline_ms).min()
    }

    /// Remove and return the earliest wakeup whose deadline is `<= now_ms`.
    /// Ties resolve in registration order.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<Fired> {
        let idx = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, f)| f.deadline_ms <= now_ms)
            .min_by_key(|(_, f)| (f.deadline_ms, f.id))
            .map(|(i, _)| i)?;
        Some(self.pending.remove(idx))
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl Scheduler for TimerQueue {
    fn schedule_at(&mut self, deadline_ms: u64, wake: Wake) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.pending.push(Fired {
            id,
            wake,
            deadline_ms,
        });
        id
    }

    fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|f| f.id != id);
        before != self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_deadline_order() {
        let mut q = TimerQueue::new();
        let late = q.schedule_at(200, Wake::PassiveBoundary);
        let early = q.schedule_at(100, Wake::FeedbackElapsed);

        assert_eq!(q.next_deadline_ms(), Some(100));
        assert!(q.pop_due(99).is_none());
        assert_eq!(q.pop_due(250).map(|f| f.id), Some(early));
        assert_eq!(q.pop_due(250).map(|f| f.id), Some(late));
        assert!(q.pop_due(250).is_none());
    }

    #[test]
    fn cancel_removes_pending_only_once() {
        let mut q = TimerQueue::new();
        let id = q.schedule_after(1_000, Duration::from_secs(2), Wake::FeedbackElapsed);
        assert_eq!(q.next_deadline_ms(), Some(3_000));
        assert!(q.cancel(id));
        assert!(!q.cancel(id));
        assert!(q.is_empty());
        assert!(q.pop_due(10_000).is_none());
    }

    #[test]
    fn ids_are_unique() {
        let mut q = TimerQueue::new();
        let a = q.schedule_at(5, Wake::PassiveBoundary);
        let b = q.schedule_at(5, Wake::PassiveBoundary);
        assert_ne!(a, b);
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop_due(5).map(|f| f.id), Some(a));
    }
}
