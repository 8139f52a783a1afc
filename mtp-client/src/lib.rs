//! The five MTP client entry points (`m_socket`, `m_bind`, `m_sendto`, `m_recvfrom`, `m_close`).
//!
//! Every call here only touches shared memory and semaphores; none of them perform network I/O —
//! all socket I/O happens in the daemon (§9).

mod client;
mod error;

pub use client::{Client, MTP};
pub use error::MtpError;
