//! Transport module - Moves payloads over async byte streams
//!
//! Provides:
//! - `Connection` for framed send/receive on one stream
//! - `ConnectionHandle` for sharing one write side between tasks
//!
//! Establishing the stream (dialing, accepting, resolving addresses) and
//! any deadline policy are left to the caller.

mod connection;

pub use connection::*;
