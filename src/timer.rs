//! Delayed message bookkeeping.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use tokio::time::Instant;

use crate::message::Message;

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    msg: Message,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Min-heap of not-yet-delivered delayed messages.
///
/// Ordered by deadline, then by submission order for equal deadlines. Entries
/// stay cancelable (by `what`) until popped.
pub(crate) struct TimerQueue {
    heap: BinaryHeap<Reverse<TimerEntry>>,
    seq: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    pub(crate) fn insert(&mut self, deadline: Instant, msg: Message) {
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(Reverse(TimerEntry { deadline, seq, msg }));
    }

    pub(crate) fn contains(&self, what: u32) -> bool {
        self.heap.iter().any(|Reverse(entry)| entry.msg.what == what)
    }

    pub(crate) fn remove_matching(&mut self, what: u32) {
        self.heap.retain(|Reverse(entry)| entry.msg.what != what);
    }

    /// Pops the earliest message whose deadline has passed.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<Message> {
        if self.heap.peek().is_some_and(|Reverse(entry)| entry.deadline <= now) {
            self.heap.pop().map(|Reverse(entry)| entry.msg)
        } else {
            None
        }
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(entry)| entry.deadline)
    }
}
