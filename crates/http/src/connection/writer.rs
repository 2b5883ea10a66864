//! Outbound write queue state.
//!
//! One message is in flight per connection at any time; everything else
//! waits in a FIFO tail. The queue itself is plain state — the connection
//! guards it with its write mutex and performs the actual socket writes.
//! The critical locking rule lives with the caller: the mutex must be
//! released before stopping the connection.

use std::collections::VecDeque;

use bytes::Bytes;

pub(crate) struct WriteQueue {
    in_progress: bool,
    current: Bytes,
    pending: VecDeque<Bytes>,
}

impl WriteQueue {
    pub(crate) fn new() -> Self {
        WriteQueue { in_progress: false, current: Bytes::new(), pending: VecDeque::new() }
    }

    /// Accepts a message. Returns it back when no write is in flight — the
    /// caller must then submit it; otherwise it joins the tail.
    pub(crate) fn push(&mut self, buf: Bytes) -> Option<Bytes> {
        if self.in_progress {
            self.pending.push_back(buf);
            return None;
        }
        self.in_progress = true;
        self.current = buf.clone();
        Some(buf)
    }

    /// Marks the in-flight write finished.
    pub(crate) fn finish(&mut self) {
        self.current = Bytes::new();
        self.in_progress = false;
    }

    /// Pops the next pending message, marking it in flight. The caller must
    /// submit it.
    pub(crate) fn next(&mut self) -> Option<Bytes> {
        let buf = self.pending.pop_front()?;
        self.in_progress = true;
        self.current = buf.clone();
        Some(buf)
    }

    pub(crate) fn is_idle(&self) -> bool {
        !self.in_progress && self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_push_submits_directly() {
        let mut queue = WriteQueue::new();
        assert!(queue.push(Bytes::from_static(b"one")).is_some());
        assert!(!queue.is_idle());
    }

    #[test]
    fn pushes_while_busy_join_the_tail_in_order() {
        let mut queue = WriteQueue::new();
        assert!(queue.push(Bytes::from_static(b"one")).is_some());
        assert!(queue.push(Bytes::from_static(b"two")).is_none());
        assert!(queue.push(Bytes::from_static(b"three")).is_none());

        queue.finish();
        assert_eq!(queue.next().unwrap(), Bytes::from_static(b"two"));
        queue.finish();
        assert_eq!(queue.next().unwrap(), Bytes::from_static(b"three"));
        queue.finish();
        assert!(queue.next().is_none());
        assert!(queue.is_idle());
    }

    #[test]
    fn next_marks_in_flight() {
        let mut queue = WriteQueue::new();
        queue.push(Bytes::from_static(b"one"));
        queue.push(Bytes::from_static(b"two"));
        queue.finish();
        assert!(queue.next().is_some());
        // "two" is now in flight, a fresh push queues behind it
        assert!(queue.push(Bytes::from_static(b"three")).is_none());
    }
}
