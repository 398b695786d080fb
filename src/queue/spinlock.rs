//! A minimal test-and-test-and-set spinlock.
//!
//! Used to extend the [`Spsc`](super::Spsc) core to the `Spmc`/`Mpmc`
//! policies (§4.1.3): rather than a second lock-free algorithm per
//! combination, the side that gained an extra concurrent caller is simply
//! serialized. This mirrors the source library's own `mpsc` specialization,
//! which is its `spsc` core with a spinlock guarding `push`.

use std::sync::atomic::{AtomicBool, Ordering};

pub struct Spinlock {
    locked: AtomicBool,
}

impl Spinlock {
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    pub fn lock(&self) -> SpinlockGuard<'_> {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.locked.load(Ordering::Relaxed) {
                std::hint::spin_loop();
            }
        }
        SpinlockGuard { lock: self }
    }
}

pub struct SpinlockGuard<'a> {
    lock: &'a Spinlock,
}

impl Drop for SpinlockGuard<'_> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}
