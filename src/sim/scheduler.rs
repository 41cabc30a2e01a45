//! Time-ordered dispatch of process ticks.
//!
//! Actions are keyed by an `f64` trigger time and an enqueue sequence number,
//! so actions due at exactly the same instant come out in the order they were
//! scheduled. Times are compared with exact equality: two instants that differ
//! only by rounding are separate batches.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

#[derive(Debug)]
struct Entry<A> {
    time: f64,
    seq: u64,
    action: A,
}

impl<A> PartialEq for Entry<A> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<A> Eq for Entry<A> {}

impl<A> PartialOrd for Entry<A> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<A> Ord for Entry<A> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Receives the actions a [`Scheduler`] dispatches.
pub trait Dispatch<A> {
    /// Run `action` at `now`. A returned `(time, action)` is scheduled as its
    /// follow-up.
    fn dispatch(&mut self, now: f64, action: A) -> Option<(f64, A)>;

    /// Called once every action of the batch at `now` has run.
    fn instant_done(&mut self, _now: f64) {}
}

impl<A, F: FnMut(f64, A) -> Option<(f64, A)>> Dispatch<A> for F {
    fn dispatch(&mut self, now: f64, action: A) -> Option<(f64, A)> {
        self(now, action)
    }
}

/// Pending actions and the current simulated time.
#[derive(Debug)]
pub struct Scheduler<A> {
    queue: BinaryHeap<Reverse<Entry<A>>>,
    now: f64,
    next_seq: u64,
}

impl<A> Default for Scheduler<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Scheduler<A> {
    pub fn new() -> Self {
        Scheduler {
            queue: BinaryHeap::new(),
            now: 0.0,
            next_seq: 0,
        }
    }

    /// Current simulated time: the instant of the last dispatched batch.
    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Trigger time of the earliest pending action.
    pub fn peek_time(&self) -> Option<f64> {
        self.queue.peek().map(|Reverse(entry)| entry.time)
    }

    /// Enqueue `action` to fire at `time`. Scheduling in the past is not
    /// checked.
    pub fn schedule(&mut self, time: f64, action: A) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(Entry { time, seq, action }));
    }

    /// Remove every action due at the earliest pending instant, provided that
    /// instant is not after `deadline`, and advance `now` to it. A NaN trigger
    /// time is never due.
    ///
    /// Actions scheduled while the returned batch is being handled, even for
    /// the same instant, belong to a later batch.
    pub fn next_batch(&mut self, deadline: f64) -> Option<(f64, Vec<A>)> {
        if !(self.peek_time()? <= deadline) {
            return None;
        }
        let Reverse(head) = self.queue.pop()?;
        let time = head.time;
        self.now = time;

        let mut batch = vec![head.action];
        while self.peek_time() == Some(time) {
            if let Some(Reverse(entry)) = self.queue.pop() {
                batch.push(entry.action);
            }
        }
        Some((time, batch))
    }

    /// Dispatch batches until the queue is empty or the next instant is after
    /// `deadline`, rescheduling whatever follow-ups `handler` returns.
    ///
    /// Returns the number of actions dispatched.
    pub fn run_until<D: Dispatch<A>>(&mut self, deadline: f64, handler: &mut D) -> usize {
        let mut dispatched = 0;
        while let Some((now, batch)) = self.next_batch(deadline) {
            for action in batch {
                dispatched += 1;
                if let Some((time, next)) = handler.dispatch(now, action) {
                    self.schedule(time, next);
                }
            }
            handler.instant_done(now);
        }
        dispatched
    }
}
