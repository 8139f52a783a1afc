//! Data definitions shared between the MTP client library and the daemon: the socket table,
//! its compile-time dimensions, and the one-shot control record used for socket/bind requests.
//!
//! Nothing in this crate performs I/O or locking; it only describes the bytes that live in
//! shared memory and the pure operations on them. `mtp-ipc` owns the mutexes that guard access.

pub mod constants;
mod control;
mod entry;
mod table;

pub use constants::*;
pub use control::ControlRecord;
pub use entry::{SocketEntry, NO_SEQ};
pub use table::SocketTable;
