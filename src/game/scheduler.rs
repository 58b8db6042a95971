//! Deferred continuations for the tick loop
//!
//! Reload, equip, refire and interaction timers are scheduled here and
//! delivered back to their owner as plain task values when due. Cancelling
//! removes the task; the stale heap entry is skipped when it surfaces.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Handle to a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

/// Priority queue of (fire time, task) owned by one participant's tick loop
#[derive(Debug)]
pub struct Scheduler<T> {
    queue: BinaryHeap<Reverse<(u64, u64)>>,
    tasks: HashMap<u64, (u64, T)>,
    next_id: u64,
}

fn to_micros(secs: f64) -> u64 {
    (secs.max(0.0) * 1_000_000.0).round() as u64
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            tasks: HashMap::new(),
            next_id: 1,
        }
    }

    /// Schedule `task` to fire `delay` seconds after `now`
    pub fn schedule(&mut self, now: f64, delay: f32, task: T) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        let fire_at = to_micros(now + f64::from(delay.max(0.0)));
        self.queue.push(Reverse((fire_at, id)));
        self.tasks.insert(id, (fire_at, task));
        TimerHandle(id)
    }

    /// Cancel a task, returning it if it was still pending
    pub fn cancel(&mut self, handle: TimerHandle) -> Option<T> {
        self.tasks.remove(&handle.0).map(|(_, task)| task)
    }

    /// Cancel whatever handle the slot holds and empty it
    pub fn clear(&mut self, slot: &mut Option<TimerHandle>) {
        if let Some(handle) = slot.take() {
            self.cancel(handle);
        }
    }

    pub fn is_active(&self, handle: TimerHandle) -> bool {
        self.tasks.contains_key(&handle.0)
    }

    /// Seconds until the task fires, if it is still pending
    pub fn remaining(&self, handle: TimerHandle, now: f64) -> Option<f32> {
        self.tasks.get(&handle.0).map(|(fire_at, _)| {
            let remaining = *fire_at as f64 / 1_000_000.0 - now;
            remaining.max(0.0) as f32
        })
    }

    /// Pop the earliest task due at or before `now`
    pub fn pop_due(&mut self, now: f64) -> Option<(TimerHandle, T)> {
        let now = to_micros(now);
        while let Some(Reverse((fire_at, id))) = self.queue.peek().copied() {
            if fire_at > now {
                return None;
            }
            self.queue.pop();
            if let Some((_, task)) = self.tasks.remove(&id) {
                return Some((TimerHandle(id), task));
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_fire_in_time_then_schedule_order() {
        let mut s = Scheduler::new();
        s.schedule(0.0, 0.5, "late");
        s.schedule(0.0, 0.1, "early");
        s.schedule(0.0, 0.1, "early-second");

        assert!(s.pop_due(0.05).is_none());
        assert_eq!(s.pop_due(0.2).map(|(_, t)| t), Some("early"));
        assert_eq!(s.pop_due(0.2).map(|(_, t)| t), Some("early-second"));
        assert!(s.pop_due(0.2).is_none());
        assert_eq!(s.pop_due(1.0).map(|(_, t)| t), Some("late"));
        assert!(s.is_empty());
    }

    #[test]
    fn cancelled_tasks_never_fire() {
        let mut s = Scheduler::new();
        let mut slot = Some(s.schedule(0.0, 0.1, 1));
        let keep = s.schedule(0.0, 0.2, 2);

        s.clear(&mut slot);
        assert!(slot.is_none());
        assert!(s.is_active(keep));
        assert_eq!(s.remaining(keep, 0.05), Some(0.15));
        assert_eq!(s.pop_due(1.0).map(|(_, t)| t), Some(2));
        assert!(!s.is_active(keep));
        assert!(s.pop_due(1.0).is_none());
    }
}
