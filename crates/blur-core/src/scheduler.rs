//! Tick-based task scheduling.
//!
//! Modules never block. Work that must happen later is a task: fire after
//! `delay` ticks, then optionally every `interval` ticks. When a task comes
//! due the tree calls the owning module's `on_task` with its handle. Tasks
//! are owned by a module, so disabling the module or stopping its session
//! cancels them synchronously.

use std::collections::BTreeMap;

use blur_types::SessionId;

use crate::module::ModuleKey;

/// Handle to a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskHandle(u64);

impl core::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Task {
    owner: ModuleKey,
    due_at: u64,
    interval: Option<u64>,
}

/// Pending tasks for the whole tree.
#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: BTreeMap<TaskHandle, Task>,
    next_id: u64,
}

impl Scheduler {
    /// An empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a task for `owner`. A delay of zero fires on the next tick;
    /// an interval of zero is treated as one.
    pub fn schedule(
        &mut self,
        owner: ModuleKey,
        now: u64,
        delay: u64,
        interval: Option<u64>,
    ) -> TaskHandle {
        let handle = TaskHandle(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.tasks.insert(
            handle,
            Task {
                owner,
                due_at: now.saturating_add(delay.max(1)),
                interval: interval.map(|i| i.max(1)),
            },
        );
        handle
    }

    /// Cancel a task. Returns whether it was pending.
    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        self.tasks.remove(&handle).is_some()
    }

    /// Cancel every task owned by a module.
    pub fn cancel_owned_by(&mut self, owner: ModuleKey) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, t| t.owner != owner);
        before.saturating_sub(self.tasks.len())
    }

    /// Cancel every task owned by any module of a session.
    pub fn cancel_session(&mut self, session: SessionId) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, t| t.owner.session != session);
        before.saturating_sub(self.tasks.len())
    }

    /// Whether a task is still pending.
    pub fn is_scheduled(&self, handle: TaskHandle) -> bool {
        self.tasks.contains_key(&handle)
    }

    /// Number of pending tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Collect tasks due at `now`, in handle order. Repeating tasks are
    /// re-armed, one-shot tasks removed.
    pub fn take_due(&mut self, now: u64) -> Vec<(TaskHandle, ModuleKey)> {
        let mut due = Vec::new();
        let mut finished = Vec::new();
        for (handle, task) in &mut self.tasks {
            if task.due_at > now {
                continue;
            }
            due.push((*handle, task.owner));
            match task.interval {
                Some(interval) => task.due_at = now.saturating_add(interval),
                None => finished.push(*handle),
            }
        }
        for handle in finished {
            self.tasks.remove(&handle);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn owner() -> ModuleKey {
        ModuleKey {
            session: SessionId::new(),
            index: 0,
        }
    }

    #[test]
    fn one_shot_fires_once_after_delay() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.schedule(owner(), 10, 3, None);
        assert!(scheduler.take_due(12).is_empty());
        assert_eq!(scheduler.take_due(13).len(), 1);
        assert!(!scheduler.is_scheduled(handle));
        assert!(scheduler.take_due(14).is_empty());
    }

    #[test]
    fn zero_delay_means_next_tick() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(owner(), 5, 0, None);
        assert!(scheduler.take_due(5).is_empty());
        assert_eq!(scheduler.take_due(6).len(), 1);
    }

    #[test]
    fn interval_rearms() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.schedule(owner(), 0, 2, Some(5));
        assert_eq!(scheduler.take_due(2).len(), 1);
        assert!(scheduler.take_due(6).is_empty());
        assert_eq!(scheduler.take_due(7).len(), 1);
        assert!(scheduler.is_scheduled(handle));
        assert!(scheduler.cancel(handle));
        assert!(scheduler.take_due(12).is_empty());
    }

    #[test]
    fn cancelling_a_session_drops_its_tasks() {
        let mut scheduler = Scheduler::new();
        let a = owner();
        let b = owner();
        scheduler.schedule(a, 0, 1, Some(1));
        scheduler.schedule(a, 0, 4, None);
        scheduler.schedule(b, 0, 1, None);
        assert_eq!(scheduler.cancel_session(a.session), 2);
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.cancel_owned_by(b), 1);
        assert!(scheduler.is_empty());
    }

    proptest! {
        #[test]
        fn one_shot_fires_exactly_at_due_tick(now in 0_u64..1_000_000, delay in 0_u64..1_000) {
            let mut scheduler = Scheduler::new();
            scheduler.schedule(owner(), now, delay, None);
            let due = now.saturating_add(delay.max(1));
            prop_assert!(scheduler.take_due(due.saturating_sub(1)).is_empty());
            prop_assert_eq!(scheduler.take_due(due).len(), 1);
            prop_assert!(scheduler.is_empty());
        }
    }
}
