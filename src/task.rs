//! Bounded cross-thread task channel (spec §4.5 "Task Channel").
//!
//! Two priority classes, normal and urgent, each a bounded
//! `concurrent_queue::ConcurrentQueue` — the lock-free MPMC ring the wider
//! example pack reaches for instead of hand-rolling readiness bookkeeping
//! over `std::sync::mpsc` (grounded in `fafhrd91-polling`'s use of the same
//! crate for cross-thread handoff). The empty→non-empty wake transition is
//! tracked with a single shared counter, bumped before the poller is woken
//! so a waking thread never races a drain that already happened.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use concurrent_queue::{ConcurrentQueue, PopError, PushError};

use crate::error::{Error, Result};
use crate::poll::Poller;

/// A unit of work scheduled onto a loop from a foreign thread. `L` is the
/// loop type the task is invoked against (`EventLoop<H, C>`); kept generic
/// here so the channel itself has no dependency on the event-loop module.
pub struct Task<L> {
    run: Box<dyn FnOnce(&mut L) + Send>,
}

impl<L> Task<L> {
    pub fn new<F>(f: F) -> Task<L>
    where
        F: FnOnce(&mut L) + Send + 'static,
    {
        Task { run: Box::new(f) }
    }

    pub(crate) fn invoke(self, target: &mut L) {
        (self.run)(target)
    }
}

struct Inner<L> {
    normal: ConcurrentQueue<Task<L>>,
    urgent: ConcurrentQueue<Task<L>>,
    pending: AtomicUsize,
    closed: AtomicBool,
    poller: Arc<Poller>,
}

/// The consumer half, owned by the loop that drains it on every wake.
pub struct TaskChannel<L> {
    inner: Arc<Inner<L>>,
}

impl<L> TaskChannel<L> {
    pub(crate) fn new(capacity: usize, poller: Arc<Poller>) -> TaskChannel<L> {
        TaskChannel {
            inner: Arc::new(Inner {
                normal: ConcurrentQueue::bounded(capacity),
                urgent: ConcurrentQueue::bounded(capacity),
                pending: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                poller,
            }),
        }
    }

    /// A cloneable, thread-safe handle producers use to submit tasks.
    pub fn sender(&self) -> Sender<L> {
        Sender {
            inner: self.inner.clone(),
        }
    }

    /// Closes the channel; further submits fail with
    /// [`crate::Error::ChannelClosed`]. Called once, at loop shutdown.
    pub(crate) fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.normal.close();
        self.inner.urgent.close();
    }

    /// Pops the next task, preferring urgent over normal (spec §4.5
    /// "drains urgent entries before normal entries on each wake"). Returns
    /// `None` once both queues are empty.
    ///
    /// Split from invocation so a self-referential consumer (the loop
    /// itself, which owns this channel as a field) can pop without holding
    /// a borrow of `self` across the call that invokes the task.
    pub(crate) fn pop(&self) -> Option<Task<L>> {
        if let Ok(task) = self.inner.urgent.pop() {
            self.inner.pending.fetch_sub(1, Ordering::AcqRel);
            return Some(task);
        }
        if let Ok(task) = self.inner.normal.pop() {
            self.inner.pending.fetch_sub(1, Ordering::AcqRel);
            return Some(task);
        }
        None
    }

    /// Drains urgent tasks before normal tasks, up to `budget` of each
    /// (per-class cap is `LoopConfig::tasks_per_tick`). Returns the number
    /// of tasks invoked. Only usable when `L` does not itself own this
    /// channel; see [`TaskChannel::pop`] for the self-referential case.
    #[cfg(test)]
    pub(crate) fn drain_into(&self, budget: usize, target: &mut L) -> usize {
        let mut drained = 0;
        drained += self.drain_queue(&self.inner.urgent, budget, target);
        drained += self.drain_queue(&self.inner.normal, budget, target);
        drained
    }

    fn drain_queue(&self, queue: &ConcurrentQueue<Task<L>>, budget: usize, target: &mut L) -> usize {
        let mut n = 0;
        while n < budget {
            match queue.pop() {
                Ok(task) => {
                    self.inner.pending.fetch_sub(1, Ordering::AcqRel);
                    task.invoke(target);
                    n += 1;
                }
                Err(PopError::Empty) | Err(PopError::Closed) => break,
            }
        }
        n
    }
}

/// The producer half. Cheap to clone; every clone shares the same bounded
/// queues and wake-coalescing counter.
pub struct Sender<L> {
    inner: Arc<Inner<L>>,
}

impl<L> Clone for Sender<L> {
    fn clone(&self) -> Sender<L> {
        Sender {
            inner: self.inner.clone(),
        }
    }
}

impl<L> Sender<L> {
    /// Enqueues a normal-priority task (spec `Submit`).
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce(&mut L) + Send + 'static,
    {
        self.push(&self.inner.normal, Task::new(task))
    }

    /// Enqueues an urgent-priority task (spec `SubmitUrgent`), drained
    /// ahead of normal tasks on the loop's next wake.
    pub fn submit_urgent<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce(&mut L) + Send + 'static,
    {
        self.push(&self.inner.urgent, Task::new(task))
    }

    fn push(&self, queue: &ConcurrentQueue<Task<L>>, task: Task<L>) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(Error::ChannelClosed);
        }
        match queue.push(task) {
            Ok(()) => {
                let was_empty = self.inner.pending.fetch_add(1, Ordering::AcqRel) == 0;
                if was_empty {
                    self.inner.poller.wake_now()?;
                }
                Ok(())
            }
            Err(PushError::Full(_)) => Err(Error::ChannelFull),
            Err(PushError::Closed(_)) => Err(Error::ChannelClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn test_poller() -> Arc<Poller> {
        Arc::new(Poller::new().expect("poller construction"))
    }

    #[test]
    fn submits_run_in_order_within_one_priority_class() {
        let channel: TaskChannel<Vec<i32>> = TaskChannel::new(8, test_poller());
        let sender = channel.sender();
        sender.submit(|v: &mut Vec<i32>| v.push(1)).unwrap();
        sender.submit(|v: &mut Vec<i32>| v.push(2)).unwrap();
        sender.submit(|v: &mut Vec<i32>| v.push(3)).unwrap();

        let mut target = Vec::new();
        let n = channel.drain_into(16, &mut target);
        assert_eq!(n, 3);
        assert_eq!(target, vec![1, 2, 3]);
    }

    #[test]
    fn urgent_tasks_drain_before_normal_tasks() {
        let channel: TaskChannel<Vec<&'static str>> = TaskChannel::new(8, test_poller());
        let sender = channel.sender();
        sender.submit(|v| v.push("normal")).unwrap();
        sender.submit_urgent(|v| v.push("urgent")).unwrap();

        let mut target = Vec::new();
        channel.drain_into(16, &mut target);
        assert_eq!(target, vec!["urgent", "normal"]);
    }

    #[test]
    fn full_queue_reports_channel_full() {
        let channel: TaskChannel<()> = TaskChannel::new(1, test_poller());
        let sender = channel.sender();
        sender.submit(|_| {}).unwrap();
        let err = sender.submit(|_| {}).unwrap_err();
        assert!(matches!(err, Error::ChannelFull));
    }

    #[test]
    fn closed_channel_rejects_submits() {
        let channel: TaskChannel<()> = TaskChannel::new(4, test_poller());
        let sender = channel.sender();
        channel.close();
        let err = sender.submit(|_| {}).unwrap_err();
        assert!(matches!(err, Error::ChannelClosed));
    }

    #[test]
    fn drain_respects_per_class_budget() {
        let channel: TaskChannel<Mutex<u32>> = TaskChannel::new(8, test_poller());
        let sender = channel.sender();
        for _ in 0..5 {
            sender
                .submit(|m: &mut Mutex<u32>| *m.lock().unwrap() += 1)
                .unwrap();
        }
        let mut target = Mutex::new(0);
        let drained = channel.drain_into(2, &mut target);
        assert_eq!(drained, 2);
        assert_eq!(*target.lock().unwrap(), 2);
    }
}
