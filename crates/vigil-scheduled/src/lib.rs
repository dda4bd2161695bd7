//! Deadline queue for engine housekeeping tasks.
//!
//! Tasks are keyed by a monotonic nanosecond deadline and drained in
//! deadline order with [`DeadlineQueue::pop_until`], typically once per
//! host tick. Tasks must tolerate firing late and firing for state that no
//! longer exists.

use std::{
    cmp::{Ordering, Reverse},
    collections::{BinaryHeap, binary_heap::PeekMut},
};

struct Entry<T> {
    deadline: i64,
    task: T,
}

impl<T> Eq for Entry<T> {}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline.cmp(&other.deadline)
    }
}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Tasks ordered by nanosecond deadline, soonest first.
pub struct DeadlineQueue<T> {
    // min-heap
    queue: BinaryHeap<Reverse<Entry<T>>>,
}

impl<T> Default for DeadlineQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DeadlineQueue<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
        }
    }

    pub fn schedule(&mut self, deadline: i64, task: T) {
        self.queue.push(Reverse(Entry { deadline, task }));
    }

    /// Drains every task whose deadline is at or before `now`, in deadline
    /// order.
    pub fn pop_until(&mut self, now: i64) -> impl Iterator<Item = T> + '_ {
        std::iter::from_fn(move || {
            let peek = self.queue.peek_mut()?;

            let Reverse(Entry { deadline, .. }) = &*peek;
            (*deadline <= now).then(|| {
                let Reverse(Entry { task, .. }) = PeekMut::pop(peek);
                task
            })
        })
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    #[must_use]
    pub fn peek(&self) -> Option<(i64, &T)> {
        self.queue
            .peek()
            .map(|Reverse(Entry { deadline, task })| (*deadline, task))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_queue_is_empty() {
        let queue: DeadlineQueue<&str> = DeadlineQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert!(queue.peek().is_none());
    }

    #[test]
    fn peek_sees_soonest_deadline() {
        let mut queue = DeadlineQueue::new();
        queue.schedule(300, "late");
        queue.schedule(100, "early");
        queue.schedule(200, "middle");

        assert_eq!(queue.peek(), Some((100, &"early")));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn pop_until_drains_in_deadline_order() {
        let mut queue = DeadlineQueue::new();
        queue.schedule(300, "c");
        queue.schedule(100, "a");
        queue.schedule(200, "b");
        queue.schedule(400, "d");

        let due: Vec<_> = queue.pop_until(200).collect();
        assert_eq!(due, vec!["a", "b"]);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.peek(), Some((300, &"c")));
    }

    #[test]
    fn pop_until_before_everything_yields_nothing() {
        let mut queue = DeadlineQueue::new();
        queue.schedule(1_000, "task");

        assert_eq!(queue.pop_until(999).count(), 0);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn equal_deadlines_all_fire() {
        let mut queue = DeadlineQueue::new();
        queue.schedule(50, 1);
        queue.schedule(50, 2);
        queue.schedule(50, 3);

        let mut due: Vec<_> = queue.pop_until(50).collect();
        due.sort_unstable();
        assert_eq!(due, vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn clear_drops_pending_tasks() {
        let mut queue = DeadlineQueue::new();
        queue.schedule(10, "x");
        queue.clear();
        assert!(queue.is_empty());
    }
}
