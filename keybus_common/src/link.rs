//! Link queues between the sampler and the rest of the system.
//!
//! `channel()` builds a fixed-capacity single-producer/single-consumer ring
//! of `BusWord`s and splits it into a `FrameProducer` and a
//! `FrameConsumer`. Neither handle is `Clone` and both mutate through
//! `&mut self`, so the one-writer/one-reader discipline the ring relies on
//! is enforced by the type system instead of by convention.
//!
//! ## Overflow Policies
//!
//! - `OverflowPolicy::OverwriteOldest` (bus → app): the producer never
//!   waits or fails. When the ring is full the oldest unread word is lost
//!   and counted in `FrameConsumer::lost()`.
//! - `OverflowPolicy::Reject` (app → bus): a push into a full ring returns
//!   `QueueError::Full` and leaves the queued words untouched.
//!
//! ## Memory-Ordering Contract
//!
//! `head` counts words ever published, `tail` counts words ever consumed;
//! both are monotonically increasing `u64`s and the slot index is
//! `count % capacity`.
//!
//! Each slot is guarded by an odd/even `stamp`:
//! - Writer of index `n`: `stamp = 2n+1` (Relaxed), `fence(Release)`,
//!   `word` (Relaxed), `stamp = 2n+2` (Release), then `head = n+1` (Release).
//! - Reader of index `n`: `head` (Acquire), `stamp` (Acquire), `word`
//!   (Relaxed), `fence(Acquire)`, `stamp` (Relaxed); the word is accepted
//!   only when both stamp loads equal `2n+2`.
//! - Reader publishes `tail = n+1` (Release) after the word is copied out;
//!   the rejecting producer loads `tail` (Acquire) before reusing a slot.
//!
//! Words are stored in `AtomicU64`, so a racing overwrite can never tear a
//! word; the stamp check only decides whether the word read is still the
//! one at index `n`. No locks are taken on either side. A consumer that
//! catches a slot mid-overwrite retries for at most the duration of one
//! producer store sequence.

use crate::codec::word::BusWord;
use static_assertions::{assert_impl_all, assert_not_impl_any, const_assert_eq};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering, fence};
use thiserror::Error;

// Each end moves to its own thread and cannot be duplicated. Sharing a
// reference is harmless: `push` and `pop` take `&mut self`.
assert_impl_all!(FrameProducer: Send, Sync);
assert_impl_all!(FrameConsumer: Send, Sync);
assert_not_impl_any!(FrameProducer: Clone);
assert_not_impl_any!(FrameConsumer: Clone);
const_assert_eq!(core::mem::size_of::<BusWord>(), core::mem::size_of::<u64>());

/// Push failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// A rejecting queue is full; the word was not stored.
    #[error("queue full ({capacity} words)")]
    Full {
        /// Configured capacity.
        capacity: usize,
    },
}

/// Behavior when pushing into a full ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverflowPolicy {
    /// Store anyway, losing the oldest unread word.
    OverwriteOldest,
    /// Refuse the new word.
    Reject,
}

/// Successful push outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pushed {
    /// Stored without loss.
    Stored,
    /// Stored; the oldest unread word is now unrecoverable.
    Overwrote,
}

/// Pads its content to its own cache line.
#[derive(Debug, Default)]
#[repr(C, align(64))]
struct CachePadded<T>(T);

#[derive(Debug, Default)]
struct Slot {
    stamp: AtomicU64,
    word: AtomicU64,
}

#[derive(Debug)]
struct Ring {
    slots: Box<[Slot]>,
    policy: OverflowPolicy,
    head: CachePadded<AtomicU64>,
    tail: CachePadded<AtomicU64>,
}

impl Ring {
    #[inline]
    fn capacity(&self) -> u64 {
        self.slots.len() as u64
    }

    #[inline]
    fn slot(&self, index: u64) -> &Slot {
        &self.slots[(index % self.capacity()) as usize]
    }
}

/// Build a ring of `capacity` words and split it into its two ends.
///
/// # Panics
/// Panics if `capacity` is zero. Configuration validation rejects that
/// before any ring is built.
pub fn channel(capacity: usize, policy: OverflowPolicy) -> (FrameProducer, FrameConsumer) {
    assert!(capacity > 0, "link queue capacity must be non-zero");
    let slots: Box<[Slot]> = (0..capacity).map(|_| Slot::default()).collect();
    let ring = Arc::new(Ring {
        slots,
        policy,
        head: CachePadded::default(),
        tail: CachePadded::default(),
    });
    (
        FrameProducer {
            ring: Arc::clone(&ring),
            head: 0,
        },
        FrameConsumer {
            ring,
            tail: 0,
            lost: 0,
        },
    )
}

/// Writing end of a link queue.
#[derive(Debug)]
pub struct FrameProducer {
    ring: Arc<Ring>,
    head: u64,
}

impl FrameProducer {
    /// Publish one word. Never blocks.
    ///
    /// # Errors
    /// `QueueError::Full` when the ring is full and the policy is
    /// `OverflowPolicy::Reject`.
    pub fn push(&mut self, word: BusWord) -> Result<Pushed, QueueError> {
        let ring = &*self.ring;
        let tail = ring.tail.0.load(Ordering::Acquire);
        let full = self.head - tail >= ring.capacity();

        if full && ring.policy == OverflowPolicy::Reject {
            return Err(QueueError::Full {
                capacity: ring.slots.len(),
            });
        }

        let slot = ring.slot(self.head);
        slot.stamp.store(2 * self.head + 1, Ordering::Relaxed);
        fence(Ordering::Release);
        slot.word.store(word.bits(), Ordering::Relaxed);
        slot.stamp.store(2 * self.head + 2, Ordering::Release);

        self.head += 1;
        ring.head.0.store(self.head, Ordering::Release);

        Ok(if full { Pushed::Overwrote } else { Pushed::Stored })
    }

    /// Configured capacity in words.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.slots.len()
    }

    /// Words published so far.
    #[inline]
    pub fn pushed(&self) -> u64 {
        self.head
    }
}

/// Reading end of a link queue.
#[derive(Debug)]
pub struct FrameConsumer {
    ring: Arc<Ring>,
    tail: u64,
    lost: u64,
}

impl FrameConsumer {
    /// Take the oldest available word, or `None` if the ring is empty.
    pub fn pop(&mut self) -> Option<BusWord> {
        let ring = &*self.ring;
        loop {
            let head = ring.head.0.load(Ordering::Acquire);
            if head == self.tail {
                return None;
            }
            if head - self.tail > ring.capacity() {
                let skip_to = head - ring.capacity();
                self.lost += skip_to - self.tail;
                self.tail = skip_to;
            }

            let slot = ring.slot(self.tail);
            let expected = 2 * self.tail + 2;
            let before = slot.stamp.load(Ordering::Acquire);
            let bits = slot.word.load(Ordering::Relaxed);
            fence(Ordering::Acquire);
            let after = slot.stamp.load(Ordering::Relaxed);

            if before == expected && after == expected {
                self.tail += 1;
                ring.tail.0.store(self.tail, Ordering::Release);
                return Some(BusWord::from_bits(bits));
            }
            // Overwritten under us; re-read head and skip forward.
            std::hint::spin_loop();
        }
    }

    /// Unread words, never more than the capacity.
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.ring.head.0.load(Ordering::Acquire);
        (head - self.tail).min(self.ring.capacity()) as usize
    }

    /// Whether there is nothing to read.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity in words.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.slots.len()
    }

    /// Words overwritten before they could be read.
    #[inline]
    pub fn lost(&self) -> u64 {
        self.lost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(n: u64) -> BusWord {
        BusWord::from_bits(n)
    }

    #[test]
    fn fifo_order() {
        let (mut tx, mut rx) = channel(4, OverflowPolicy::Reject);
        assert!(rx.pop().is_none());
        for n in 1..=3 {
            assert_eq!(tx.push(w(n)), Ok(Pushed::Stored));
        }
        assert_eq!(rx.len(), 3);
        assert_eq!(rx.pop(), Some(w(1)));
        assert_eq!(rx.pop(), Some(w(2)));
        assert_eq!(rx.pop(), Some(w(3)));
        assert!(rx.pop().is_none());
        assert!(rx.is_empty());
    }

    #[test]
    fn overwrite_keeps_newest_in_order() {
        let (mut tx, mut rx) = channel(3, OverflowPolicy::OverwriteOldest);
        let outcomes: Vec<Pushed> = (1..=5).map(|n| tx.push(w(n)).unwrap()).collect();
        assert_eq!(
            outcomes,
            vec![Pushed::Stored, Pushed::Stored, Pushed::Stored, Pushed::Overwrote, Pushed::Overwrote]
        );
        assert_eq!(rx.len(), 3);

        let drained: Vec<BusWord> = std::iter::from_fn(|| rx.pop()).collect();
        assert_eq!(drained, vec![w(3), w(4), w(5)]);
        assert_eq!(rx.lost(), 2);
    }

    #[test]
    fn reject_preserves_queued_words() {
        let (mut tx, mut rx) = channel(3, OverflowPolicy::Reject);
        for n in 1..=3 {
            tx.push(w(n)).unwrap();
        }
        assert_eq!(tx.push(w(4)), Err(QueueError::Full { capacity: 3 }));
        assert_eq!(tx.push(w(5)), Err(QueueError::Full { capacity: 3 }));

        let drained: Vec<BusWord> = std::iter::from_fn(|| rx.pop()).collect();
        assert_eq!(drained, vec![w(1), w(2), w(3)]);
        assert_eq!(rx.lost(), 0);

        // Space frees up once the consumer catches up.
        assert_eq!(tx.push(w(6)), Ok(Pushed::Stored));
        assert_eq!(rx.pop(), Some(w(6)));
    }

    #[test]
    fn wraps_around_many_times() {
        let (mut tx, mut rx) = channel(2, OverflowPolicy::Reject);
        for n in 0..1000 {
            tx.push(w(n)).unwrap();
            assert_eq!(rx.pop(), Some(w(n)));
        }
        assert_eq!(tx.pushed(), 1000);
    }

    #[test]
    fn len_never_exceeds_capacity() {
        let (mut tx, rx) = channel(4, OverflowPolicy::OverwriteOldest);
        for n in 0..50 {
            tx.push(w(n)).unwrap();
            assert!(rx.len() <= rx.capacity());
        }
        assert_eq!(rx.len(), 4);
    }

    #[test]
    #[should_panic(expected = "non-zero")]
    fn zero_capacity_panics() {
        let _ = channel(0, OverflowPolicy::Reject);
    }
}
