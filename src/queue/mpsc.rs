//! Multi producer / single consumer intrusive queue (§4.1.2).
//!
//! Vyukov's MPSC algorithm (<https://www.1024cores.net/home/lock-free-algorithms/queues/intrusive-mpsc-node-based-queue>)
//! adapted to an intrusive node: producers append by atomically exchanging
//! the shared tail and linking the previous tail to the new node, which
//! needs no CAS loop and is wait-free per push. The consumer walks from a
//! dedicated sentinel node; a push caught mid-flight (the exchange has
//! happened but the link-back store has not yet landed) is reported as
//! [`PopResult::Inconsistent`] rather than `Empty`, so a caller can retry
//! instead of concluding the queue is drained.

use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, Ordering};

use super::Queue;

/// Per-node hook for [`Mpsc`].
pub struct MpscHook<T> {
    next: AtomicPtr<T>,
}

impl<T> MpscHook<T> {
    /// An unlinked hook, ready to be pushed.
    pub const fn new() -> Self {
        Self {
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

impl<T> Default for MpscHook<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a single dequeue attempt, distinguishing a genuinely empty
/// queue from a producer caught between its exchange and its link-back
/// store.
pub enum PopResult<T> {
    /// A node was dequeued.
    Data(NonNull<T>),
    /// Nothing is queued.
    Empty,
    /// A producer is mid-push; retry.
    Inconsistent,
}

/// Multi producer / single consumer queue over nodes of type `T`.
///
/// Construction requires a dedicated sentinel node the queue owns for its
/// entire lifetime: it is never handed back from `try_pop`/`dequeue` and
/// must outlive the queue.
pub struct Mpsc<T> {
    accessor: fn(&T) -> &MpscHook<T>,
    tail: AtomicPtr<T>,
    head: std::cell::Cell<*mut T>,
    sentry: NonNull<T>,
}

// Safety: `tail` is a true `AtomicPtr` shared by all producers and the
// consumer; `head` is written only by the single consumer thread. The
// sentinel is linked/unlinked exclusively through the same atomics.
unsafe impl<T> Send for Mpsc<T> {}
unsafe impl<T> Sync for Mpsc<T> {}

impl<T> Mpsc<T> {
    /// Build an empty queue anchored on `sentry`. `sentry`'s hook is
    /// (re)initialized by this call.
    ///
    /// # Safety
    ///
    /// `sentry` must remain valid and must not be pushed onto this queue
    /// (or any other) by the caller; the queue pushes it internally as
    /// needed to stay non-empty-looking.
    pub unsafe fn new(accessor: fn(&T) -> &MpscHook<T>, sentry: NonNull<T>) -> Self {
        accessor(sentry.as_ref()).next.store(ptr::null_mut(), Ordering::Relaxed);
        Self {
            accessor,
            tail: AtomicPtr::new(sentry.as_ptr()),
            head: std::cell::Cell::new(sentry.as_ptr()),
            sentry,
        }
    }

    fn hook<'a>(&self, node: &'a T) -> &'a MpscHook<T> {
        (self.accessor)(node)
    }

    unsafe fn push_raw(&self, node: *mut T) {
        self.hook(&*node).next.store(ptr::null_mut(), Ordering::Relaxed);
        let prev = self.tail.swap(node, Ordering::AcqRel);
        self.hook(&*prev).next.store(node, Ordering::Release);
    }

    /// Dequeue one node, distinguishing `Empty` from `Inconsistent`.
    ///
    /// # Safety
    ///
    /// Must only be called from the single consumer thread.
    pub unsafe fn dequeue(&self) -> PopResult<T> {
        let mut head = self.head.get();
        let mut next = self.hook(&*head).next.load(Ordering::Acquire);

        if head == self.sentry.as_ptr() {
            if next.is_null() {
                return PopResult::Empty;
            }
            self.head.set(next);
            head = next;
            next = self.hook(&*head).next.load(Ordering::Acquire);
        }

        if !next.is_null() {
            self.head.set(next);
            return PopResult::Data(NonNull::new_unchecked(head));
        }

        if head != self.tail.load(Ordering::Acquire) {
            return PopResult::Inconsistent;
        }

        self.push_raw(self.sentry.as_ptr());

        next = self.hook(&*head).next.load(Ordering::Acquire);
        if !next.is_null() {
            self.head.set(next);
            return PopResult::Data(NonNull::new_unchecked(head));
        }
        PopResult::Inconsistent
    }
}

impl<T> Queue<T> for Mpsc<T> {
    unsafe fn push(&self, node: NonNull<T>) {
        self.push_raw(node.as_ptr());
    }

    unsafe fn try_pop(&self) -> Option<NonNull<T>> {
        match self.dequeue() {
            PopResult::Data(node) => Some(node),
            PopResult::Empty | PopResult::Inconsistent => None,
        }
    }

    fn is_lock_free() -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    struct Node {
        hook: MpscHook<Node>,
        value: u32,
    }

    fn hook(n: &Node) -> &MpscHook<Node> {
        &n.hook
    }

    #[test]
    fn single_thread_fifo() {
        let mut sentry = Box::new(Node {
            hook: MpscHook::new(),
            value: u32::MAX,
        });
        let q = unsafe { Mpsc::<Node>::new(hook, NonNull::from(sentry.as_mut())) };

        let mut nodes: Vec<Box<Node>> = (0..5)
            .map(|i| {
                Box::new(Node {
                    hook: MpscHook::new(),
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
        assert_eq!(popped, (0..5).collect::<Vec<_>>());
    }

    #[test]
    fn concurrent_producers_preserve_total_count() {
        struct Holder(Mpsc<Node>);
        unsafe impl Send for Holder {}
        unsafe impl Sync for Holder {}

        let mut sentry = Box::new(Node {
            hook: MpscHook::new(),
            value: u32::MAX,
        });
        let q = Arc::new(Holder(unsafe {
            Mpsc::<Node>::new(hook, NonNull::from(sentry.as_mut()))
        }));

        const PRODUCERS: u32 = 4;
        const PER_PRODUCER: u32 = 256;

        let mut nodes: Vec<Box<Node>> = (0..PRODUCERS * PER_PRODUCER)
            .map(|i| {
                Box::new(Node {
                    hook: MpscHook::new(),
                    value: i,
                })
            })
            .collect();
        let ptrs: Vec<NonNull<Node>> = nodes.iter_mut().map(|n| NonNull::from(n.as_mut())).collect();

        thread::scope(|scope| {
            for chunk in ptrs.chunks(PER_PRODUCER as usize) {
                let q = Arc::clone(&q);
                let chunk = chunk.to_vec();
                scope.spawn(move || {
                    for ptr in chunk {
                        unsafe { q.0.push(ptr) };
                    }
                });
            }
        });

        let mut count = 0;
        loop {
            match unsafe { q.0.dequeue() } {
                PopResult::Data(_) => count += 1,
                PopResult::Empty => break,
                PopResult::Inconsistent => continue,
            }
        }
        assert_eq!(count, PRODUCERS * PER_PRODUCER);
        let _ = &nodes;
    }
}
