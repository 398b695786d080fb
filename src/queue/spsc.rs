//! Single producer / single consumer intrusive queue (§4.1.1).
//!
//! The producer never contends with itself, so pushing is a handful of
//! plain stores terminated by one `Release` publish. The consumer keeps a
//! private, already-FIFO-ordered sublist and only touches the shared,
//! producer-published state when that sublist runs dry, at which point it
//! walks the producer's (LIFO-ordered) list once and reverses it into FIFO
//! order. Amortized, each node is touched by the consumer exactly twice:
//! once to reverse it, once to return it.

use std::cell::Cell;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};

use super::Queue;

/// Per-node hook for [`Spsc`]. Embed one in any node type pushed onto an
/// `Spsc` queue and hand the queue a field accessor at construction.
pub struct SpscHook<T> {
    next: Cell<*mut T>,
    seq: Cell<u32>,
}

impl<T> SpscHook<T> {
    /// An unlinked hook, ready to be pushed.
    pub const fn new() -> Self {
        Self {
            next: Cell::new(ptr::null_mut()),
            seq: Cell::new(0),
        }
    }
}

impl<T> Default for SpscHook<T> {
    fn default() -> Self {
        Self::new()
    }
}

// Safety: `next`/`seq` are written by exactly one side (producer writes
// before the `Release` publish below, consumer writes only while reversing
// a sublist it alone owns) so the `Cell`s never see concurrent access even
// though the hook itself is shared between the two threads.
unsafe impl<T> Send for SpscHook<T> {}
unsafe impl<T> Sync for SpscHook<T> {}

/// Single producer / single consumer queue over nodes of type `T`.
pub struct Spsc<T> {
    accessor: fn(&T) -> &SpscHook<T>,

    // Producer-published state. `tail` is the most recently pushed node;
    // `published_seq` is that node's sequence number. The consumer's
    // `Acquire` load of either synchronizes with the producer's `Release`
    // store, making every hook write up to and including that node visible.
    tail: AtomicPtr<T>,
    published_seq: AtomicU32,

    // Producer-only. Never touched by the consumer.
    producer_next_seq: Cell<u32>,

    // Consumer-only. Never touched by the producer.
    consumer_local: Cell<*mut T>,
    consumer_drained_seq: Cell<u32>,
}

// Safety: fields above are partitioned into a producer-only group and a
// consumer-only group; cross-thread visibility of the producer group is
// established by the `Release`/`Acquire` pair on `tail`/`published_seq`.
unsafe impl<T> Send for Spsc<T> {}
unsafe impl<T> Sync for Spsc<T> {}

impl<T> Spsc<T> {
    /// Build an empty queue. `accessor` must always return the same hook
    /// for a given node.
    pub const fn new(accessor: fn(&T) -> &SpscHook<T>) -> Self {
        Self {
            accessor,
            tail: AtomicPtr::new(ptr::null_mut()),
            published_seq: AtomicU32::new(0),
            producer_next_seq: Cell::new(1),
            consumer_local: Cell::new(ptr::null_mut()),
            consumer_drained_seq: Cell::new(0),
        }
    }

    fn hook<'a>(&self, node: &'a T) -> &'a SpscHook<T> {
        (self.accessor)(node)
    }
}

impl<T> Queue<T> for Spsc<T> {
    unsafe fn push(&self, node: NonNull<T>) {
        let seq = self.producer_next_seq.get();
        let hook = self.hook(node.as_ref());
        hook.next.set(self.tail.load(Ordering::Relaxed));
        hook.seq.set(seq);
        self.producer_next_seq.set(seq.wrapping_add(1));

        self.tail.store(node.as_ptr(), Ordering::Relaxed);
        // Publish: everything above becomes visible to a consumer that
        // observes this store (or the `tail` store, which always precedes
        // it program-order on this single producer thread).
        self.published_seq.store(seq, Ordering::Release);
    }

    unsafe fn try_pop(&self) -> Option<NonNull<T>> {
        if self.consumer_local.get().is_null() {
            self.reverse_into_local();
        }

        let head = self.consumer_local.get();
        let head = NonNull::new(head)?;
        let next = self.hook(head.as_ref()).next.get();
        self.consumer_local.set(next);
        Some(head)
    }

    fn is_lock_free() -> bool {
        true
    }
}

impl<T> Spsc<T> {
    /// Pull everything the producer has published since the last drain and
    /// reverse it (producer order is newest-to-oldest via `next`) into
    /// oldest-to-newest order in `consumer_local`.
    unsafe fn reverse_into_local(&self) {
        let seq = self.published_seq.load(Ordering::Acquire);
        if seq == self.consumer_drained_seq.get() {
            return;
        }
        let tail = self.tail.load(Ordering::Relaxed);
        if tail.is_null() {
            return;
        }

        let drained_seq = self.consumer_drained_seq.get();
        // The marker we record once this drain lands must describe the
        // newest node this call actually reversed (`tail`'s own stamped
        // sequence), not the `published_seq` snapshot taken above: a
        // concurrent producer can publish again between that snapshot and
        // the `tail` load just below, in which case `published_seq` already
        // lags `tail`. Recording the stale snapshot would make a later
        // drain believe `tail`'s node (already reversed and handed out here)
        // was never drained, and hand it out a second time.
        let tail_seq = self.hook(&*tail).seq.get();
        let mut reversed: *mut T = ptr::null_mut();
        let mut cur = tail;
        loop {
            let hook = self.hook(&*cur);
            let next = hook.next.get();
            hook.next.set(reversed);
            reversed = cur;
            if hook.seq.get() == drained_seq.wrapping_add(1) || next.is_null() {
                break;
            }
            cur = next;
        }

        self.consumer_local.set(reversed);
        self.consumer_drained_seq.set(tail_seq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Node {
        hook: SpscHook<Node>,
        value: u32,
    }

    fn hook(n: &Node) -> &SpscHook<Node> {
        &n.hook
    }

    #[test]
    fn fifo_order_preserved() {
        let q = Spsc::<Node>::new(hook);
        let mut nodes: Vec<Box<Node>> = (0..8)
            .map(|i| {
                Box::new(Node {
                    hook: SpscHook::new(),
                    value: i,
                })
            })
            .collect();

        for n in &mut nodes {
            unsafe { q.push(NonNull::from(n.as_mut())) };
        }

        let mut popped = Vec::new();
        while let Some(n) = unsafe { q.try_pop() } {
            popped.push(unsafe { n.as_ref() }.value);
        }
        assert_eq!(popped, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn interleaved_push_pop() {
        let q = Spsc::<Node>::new(hook);
        let mut a = Box::new(Node {
            hook: SpscHook::new(),
            value: 1,
        });
        let mut b = Box::new(Node {
            hook: SpscHook::new(),
            value: 2,
        });

        unsafe { q.push(NonNull::from(a.as_mut())) };
        assert_eq!(unsafe { q.try_pop() }.map(|n| unsafe { n.as_ref() }.value), Some(1));
        assert!(unsafe { q.try_pop() }.is_none());

        unsafe { q.push(NonNull::from(b.as_mut())) };
        assert_eq!(unsafe { q.try_pop() }.map(|n| unsafe { n.as_ref() }.value), Some(2));
        assert!(unsafe { q.try_pop() }.is_none());
    }

    #[test]
    fn empty_queue_returns_none() {
        let q = Spsc::<Node>::new(hook);
        assert!(unsafe { q.try_pop() }.is_none());
    }
}
