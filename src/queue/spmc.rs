//! Single producer / multiple consumer intrusive queue (§4.1.3).
//!
//! Built on the [`spsc`](super::spsc) core: a single producer needs no
//! extra coordination to push, but `try_pop` is no longer safe to call
//! from more than one thread at once against that core, so it is
//! serialized with a spinlock.

use std::ptr::NonNull;

use super::spinlock::Spinlock;
use super::spsc::{Spsc, SpscHook};
use super::Queue;

/// Per-node hook for [`Spmc`]; identical layout to [`SpscHook`].
pub type SpmcHook<T> = SpscHook<T>;

/// Single producer / multiple consumer queue over nodes of type `T`.
pub struct Spmc<T> {
    inner: Spsc<T>,
    pop_lock: Spinlock,
}

impl<T> Spmc<T> {
    pub const fn new(accessor: fn(&T) -> &SpmcHook<T>) -> Self {
        Self {
            inner: Spsc::new(accessor),
            pop_lock: Spinlock::new(),
        }
    }
}

impl<T> Queue<T> for Spmc<T> {
    unsafe fn push(&self, node: NonNull<T>) {
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
        hook: SpmcHook<Node>,
        value: u32,
    }

    fn hook(n: &Node) -> &SpmcHook<Node> {
        &n.hook
    }

    #[test]
    fn multiple_consumers_split_all_items_exactly_once() {
        struct Holder(Spmc<Node>);
        unsafe impl Send for Holder {}
        unsafe impl Sync for Holder {}

        let q = Arc::new(Holder(Spmc::<Node>::new(hook)));
        const TOTAL: u32 = 512;
        let mut nodes: Vec<Box<Node>> = (0..TOTAL)
            .map(|i| {
                Box::new(Node {
                    hook: SpmcHook::new(),
                    value: i,
                })
            })
            .collect();
        for n in &mut nodes {
            unsafe { q.0.push(NonNull::from(n.as_mut())) };
        }

        let popped_count = Arc::new(AtomicUsize::new(0));
        thread::scope(|scope| {
            for _ in 0..4 {
                let q = Arc::clone(&q);
                let popped_count = Arc::clone(&popped_count);
                scope.spawn(move || loop {
                    match unsafe { q.0.try_pop() } {
                        Some(_) => {
                            popped_count.fetch_add(1, Ordering::Relaxed);
                        }
                        None => break,
                    }
                });
            }
        });

        assert_eq!(popped_count.load(Ordering::Relaxed), TOTAL as usize);
        let _ = &nodes;
    }
}
