// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Thread-safe FIFO queues connecting the gateway workers.
//!
//! [`MessageQue`] owns its items: `push` moves a message in, `pop` moves it
//! back out. Consumers that want to try processing before discarding use
//! [`MessageQue::get_message`] (a locked view of the front) or
//! [`MessageQue::pop_if`], both of which are atomic with respect to
//! concurrent pushes.
//!
//! [`EventQue`] adds blocking waits on top, for worker threads that sleep
//! until a producer posts an event.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, MappedMutexGuard, Mutex, MutexGuard};

/// FIFO of owned messages guarded by a single lock.
#[derive(Debug)]
pub struct MessageQue<T> {
    que: Mutex<VecDeque<T>>,
    ready: Condvar,
}

impl<T> Default for MessageQue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MessageQue<T> {
    pub fn new() -> Self {
        Self {
            que: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }

    /// Append a message; the queue takes ownership.
    pub fn push(&self, msg: T) {
        self.que.lock().push_back(msg);
        self.ready.notify_one();
    }

    /// Locked view of the front message, or `None` when empty.
    ///
    /// The queue stays locked while the view is alive, so drop it before
    /// calling [`pop`](Self::pop) or any other operation on this queue.
    pub fn get_message(&self) -> Option<MappedMutexGuard<'_, T>> {
        MutexGuard::try_map(self.que.lock(), |q| q.front_mut()).ok()
    }

    /// Remove the front message and hand it to the caller.
    pub fn pop(&self) -> Option<T> {
        self.que.lock().pop_front()
    }

    /// Remove the front message only if `accept` returns true for it.
    /// Peek and removal happen under one lock acquisition.
    pub fn pop_if<F>(&self, accept: F) -> Option<T>
    where
        F: FnOnce(&T) -> bool,
    {
        let mut que = self.que.lock();
        if que.front().is_some_and(accept) {
            que.pop_front()
        } else {
            None
        }
    }

    /// Drop every queued message. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let drained: Vec<T> = self.que.lock().drain(..).collect();
        drained.len()
    }

    /// Move every queued message out, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.que.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.que.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.que.lock().is_empty()
    }

    /// Pop, blocking until a message arrives or `timeout` elapses.
    /// `None` timeout waits indefinitely.
    pub fn wait_pop(&self, timeout: Option<Duration>) -> Option<T> {
        let mut que = self.que.lock();
        if let Some(msg) = que.pop_front() {
            return Some(msg);
        }
        match timeout {
            Some(t) => {
                // Spurious wakeups just return None; callers loop anyway.
                let _ = self.ready.wait_for(&mut que, t);
            }
            None => {
                while que.is_empty() {
                    self.ready.wait(&mut que);
                }
            }
        }
        que.pop_front()
    }

    /// Wake every thread blocked in [`wait_pop`](Self::wait_pop).
    pub fn notify_all(&self) {
        self.ready.notify_all();
    }
}

impl<T: Clone> MessageQue<T> {
    /// Copy of the front message without removing it.
    pub fn front_cloned(&self) -> Option<T> {
        self.que.lock().front().cloned()
    }
}

// ---------------------------------------------------------------------------
// Event queue
// ---------------------------------------------------------------------------

/// Event FIFO between worker threads.
#[derive(Debug)]
pub struct EventQue<E> {
    que: MessageQue<E>,
}

impl<E> Default for EventQue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventQue<E> {
    pub fn new() -> Self {
        Self {
            que: MessageQue::new(),
        }
    }

    /// Post an event and wake one waiter.
    pub fn post(&self, ev: E) {
        self.que.push(ev);
    }

    /// Block until an event is available.
    pub fn wait(&self) -> Option<E> {
        self.que.wait_pop(None)
    }

    /// Block for at most `timeout`. `None` means nothing arrived.
    pub fn timed_wait(&self, timeout: Duration) -> Option<E> {
        self.que.wait_pop(Some(timeout))
    }

    pub fn try_pop(&self) -> Option<E> {
        self.que.pop()
    }

    pub fn size(&self) -> usize {
        self.que.len()
    }

    pub fn is_empty(&self) -> bool {
        self.que.is_empty()
    }

    pub fn clear(&self) -> usize {
        self.que.clear()
    }

    /// Release every blocked waiter (used on shutdown).
    pub fn wake_all(&self) {
        self.que.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    struct Tracked {
        id: u32,
        drops: Arc<AtomicUsize>,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_fifo_peek_then_pop() {
        let q = MessageQue::new();
        q.push("a");
        q.push("b");
        assert_eq!(q.get_message().as_deref(), Some(&"a"));
        assert_eq!(q.pop(), Some("a"));
        assert_eq!(q.get_message().as_deref(), Some(&"b"));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_empty_queue_is_not_an_error() {
        let q: MessageQue<u8> = MessageQue::new();
        assert!(q.get_message().is_none());
        assert!(q.pop().is_none());
        assert_eq!(q.clear(), 0);
    }

    #[test]
    fn test_clear_drops_every_element() {
        let drops = Arc::new(AtomicUsize::new(0));
        let q = MessageQue::new();
        for id in 0..3 {
            q.push(Tracked {
                id,
                drops: Arc::clone(&drops),
            });
        }
        assert_eq!(q.clear(), 3);
        assert!(q.is_empty());
        assert_eq!(drops.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_pop_if_leaves_rejected_message() {
        let q = MessageQue::new();
        q.push(1u32);
        q.push(2u32);
        assert_eq!(q.pop_if(|m| *m == 2), None);
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop_if(|m| *m == 1), Some(1));
        assert_eq!(q.front_cloned(), Some(2));
    }

    #[test]
    fn test_view_allows_in_place_edit() {
        let drops = Arc::new(AtomicUsize::new(0));
        let q = MessageQue::new();
        q.push(Tracked {
            id: 7,
            drops: Arc::clone(&drops),
        });
        if let Some(mut front) = q.get_message() {
            front.id = 8;
        }
        let popped = q.pop().unwrap();
        assert_eq!(popped.id, 8);
        drop(popped);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_producers_keep_per_producer_order() {
        let q = Arc::new(MessageQue::new());
        let handles: Vec<_> = (0..4u32)
            .map(|p| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    for i in 0..250u32 {
                        q.push((p, i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let all = q.drain();
        assert_eq!(all.len(), 1000);
        for p in 0..4u32 {
            let seq: Vec<u32> = all.iter().filter(|(pp, _)| *pp == p).map(|(_, i)| *i).collect();
            assert_eq!(seq, (0..250).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_event_que_timed_wait_times_out() {
        let q: EventQue<u8> = EventQue::new();
        let start = Instant::now();
        assert!(q.timed_wait(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_event_que_post_wakes_waiter() {
        let q = Arc::new(EventQue::new());
        let producer = Arc::clone(&q);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            producer.post(42u32);
        });
        assert_eq!(q.wait(), Some(42));
        handle.join().unwrap();
        assert_eq!(q.size(), 0);
    }
}
