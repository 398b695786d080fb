//! Multi producer / multi consumer intrusive queue (§4.1.3).
//!
//! Same idea as [`spmc`](super::spmc), applied to both ends of the
//! [`spsc`](super::spsc) core: a spinlock serializes producers, a second
//! (independent) spinlock serializes consumers. The two locks never
//! contend with each other — the underlying core already tolerates exactly
//! one concurrent producer and one concurrent consumer.

use std::ptr::NonNull;

use super::spinlock::Spinlock;
use super::spsc::{Spsc, SpscHook};
use super::Queue;

/// Per-node hook for [`Mpmc`]; identical layout to [`SpscHook`].
pub type MpmcHook<T> = SpscHook<T>;

/// Multi producer / multi consumer queue over nodes of type `T`.
pub struct Mpmc<T> {
    inner: Spsc<T>,
    push_lock: Spinlock,
    pop_lock: Spinlock,
}

impl<T> Mpmc<T> {
    pub const fn new(accessor: fn(&T) -> &MpmcHook<T>) -> Self {
        Self {
            inner: Spsc::new(accessor),
            push_lock: Spinlock::new(),
            pop_lock: Spinlock::new(),
        }
    }
}

impl<T> Queue<T> for Mpmc<T> {
    unsafe fn push(&self, node: NonNull<T>) {
        let _guard = self.push_lock.lock();
        self.inner.push(node);
    }

    unsafe fn try_pop(&self) -> Option<NonNull<T>> {
        let _guard = self.pop_lock.lock();
        self.inner.try_pop()
    }

    fn is_lock_free() -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    struct Node {
        hook: MpmcHook<Node>,
        value: u32,
    }

    fn hook(n: &Node) -> &MpmcHook<Node> {
        &n.hook
    }

    #[test]
    fn every_pushed_node_popped_exactly_once() {
        struct Holder(Mpmc<Node>);
        unsafe impl Send for Holder {}
        unsafe impl Sync for Holder {}

        let q = Arc::new(Holder(Mpmc::<Node>::new(hook)));
        const PRODUCERS: u32 = 4;
        const PER_PRODUCER: u32 = 256;

        let mut nodes: Vec<Box<Node>> = (0..PRODUCERS * PER_PRODUCER)
            .map(|i| {
                Box::new(Node {
                    hook: MpmcHook::new(),
                    value: i,
                })
            })
            .collect();
        let ptrs: Vec<NonNull<Node>> = nodes.iter_mut().map(|n| NonNull::from(n.as_mut())).collect();

        let popped_count = Arc::new(AtomicUsize::new(0));
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

            for _ in 0..4 {
                let q = Arc::clone(&q);
                let popped_count = Arc::clone(&popped_count);
                scope.spawn(move || {
                    let mut misses = 0;
                    loop {
                        match unsafe { q.0.try_pop() } {
                            Some(_) => {
                                popped_count.fetch_add(1, Ordering::Relaxed);
                                misses = 0;
                            }
                            None => {
                                misses += 1;
                                if misses > 10_000 {
                                    break;
                                }
                                std::thread::yield_now();
                            }
                        }
                    }
                });
            }
        });

        assert_eq!(popped_count.load(Ordering::Relaxed), PRODUCERS * PER_PRODUCER);
        let _ = &nodes;
    }
}
