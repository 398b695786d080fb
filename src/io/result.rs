//! Typed result storage inside an [`Io`](super::Io) block (§4.2.3).
//!
//! An operation's result is written into the block's inline result buffer
//! and tagged with the result type's identity; retrieving it later checks
//! the tag matches before reinterpreting the bytes. Grounded on
//! `sal/net/async/basic_socket.hpp`'s `result_storage<Result>`/
//! `result_of<Result>`, including its two `static_assert`s, which become
//! compile-time (const-eval) checks here.

use std::io;
use std::mem;
use std::ptr;

use super::block::{TypeTag, RESULT_CAPACITY};
use super::Io;

impl Io {
    /// Reserve room in this block's inline result storage for a `Result`
    /// value and return a pointer to write it into.
    ///
    /// `Result` must be trivially destructible (in Rust terms: it must not
    /// need `Drop`) and must fit the fixed inline capacity, both checked at
    /// compile time, matching the two `static_assert`s on the function this
    /// is grounded on.
    pub fn result_storage<Result: 'static>(&self) -> *mut Result {
        const fn assert_fits<Result>() {
            assert!(
                mem::size_of::<Result>() <= RESULT_CAPACITY,
                "result type too large for Io's inline result storage"
            );
        }
        assert_fits::<Result>();
        assert!(!mem::needs_drop::<Result>(), "result type must not need Drop");

        self.set_result_tag(TypeTag::of::<Result>());
        self.result_data_ptr() as *mut Result
    }

    /// Read back a `Result` written by [`Io::result_storage`], checking the
    /// status first and the stored type tag second.
    ///
    /// Returns `Err` if the operation failed (per [`Io::status`]) or if no
    /// value of type `Result` was ever stored here.
    pub fn result_of<Result: Copy + 'static>(&self) -> io::Result<Result> {
        let status = self.status();
        if status != 0 {
            return Err(io::Error::from_raw_os_error(status));
        }
        match self.result_tag() {
            Some(tag) if tag == TypeTag::of::<Result>() => {
                Ok(unsafe { ptr::read(self.result_data_ptr() as *const Result) })
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "no result of the requested type stored in this block",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    struct Transferred {
        bytes: usize,
    }

    #[test]
    fn stores_and_retrieves_matching_type() {
        let io = Io::empty();
        unsafe {
            io.result_storage::<Transferred>().write(Transferred { bytes: 42 });
        }
        assert_eq!(io.result_of::<Transferred>().unwrap(), Transferred { bytes: 42 });
    }

    #[test]
    fn mismatched_type_is_rejected() {
        let io = Io::empty();
        unsafe {
            io.result_storage::<Transferred>().write(Transferred { bytes: 1 });
        }
        assert!(io.result_of::<u64>().is_err());
    }

    #[test]
    fn nonzero_status_short_circuits_before_type_check() {
        let io = Io::empty();
        io.set_status(5);
        assert!(io.result_of::<Transferred>().is_err());
    }
}
