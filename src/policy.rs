//! Compile-time producer/consumer policy tags.
//!
//! A [`queue`](crate::queue) variant is selected once, at construction, by a
//! policy type parameter; the selection never changes for the lifetime of
//! the queue. Four canonical tags are provided, matching every combination
//! of `multi_producer` / `multi_consumer`.

mod sealed {
    pub trait Sealed {}
}

/// A compile-time tag selecting a [`queue`](crate::queue) implementation.
///
/// Implemented only by [`Spsc`], [`Mpsc`], [`Spmc`], and [`Mpmc`]; the trait
/// is sealed so no other type can be used to parameterize a queue.
pub trait Policy: sealed::Sealed + 'static {
    /// `true` if more than one thread may call `push` concurrently.
    const MULTI_PRODUCER: bool;
    /// `true` if more than one thread may call `try_pop` concurrently.
    const MULTI_CONSUMER: bool;
}

/// Single producer, single consumer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Spsc(());

/// Multiple producers, single consumer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mpsc(());

/// Single producer, multiple consumers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Spmc(());

/// Multiple producers, multiple consumers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mpmc(());

impl sealed::Sealed for Spsc {}
impl sealed::Sealed for Mpsc {}
impl sealed::Sealed for Spmc {}
impl sealed::Sealed for Mpmc {}

impl Policy for Spsc {
    const MULTI_PRODUCER: bool = false;
    const MULTI_CONSUMER: bool = false;
}

impl Policy for Mpsc {
    const MULTI_PRODUCER: bool = true;
    const MULTI_CONSUMER: bool = false;
}

impl Policy for Spmc {
    const MULTI_PRODUCER: bool = false;
    const MULTI_CONSUMER: bool = true;
}

impl Policy for Mpmc {
    const MULTI_PRODUCER: bool = true;
    const MULTI_CONSUMER: bool = true;
}
