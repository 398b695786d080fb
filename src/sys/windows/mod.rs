//! Windows completion backend.

mod iocp;
pub(crate) use iocp::CompletionPort;
