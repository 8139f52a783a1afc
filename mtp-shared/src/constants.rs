/// Socket-table slot count. The client-visible socket descriptor is a table index in
/// `0..MAX_SOCKETS`.
pub const MAX_SOCKETS: usize = 25;

/// Send-buffer depth per socket.
pub const MAX_SEND_BUFFER_SIZE: usize = 10;

/// Receive-buffer depth per socket.
pub const MAX_RECEIVE_BUFFER_SIZE: usize = 5;

/// Maximum payload bytes per message.
pub const MESSAGE_SIZE: usize = 1024;

/// Width of the sliding send/receive window. Capped well under the wire header's 4-bit sequence
/// field (mod 16) so cumulative-ACK disambiguation never spans a wrap.
pub const MAX_WINDOW_SIZE: usize = 5;

/// Sender retransmit tick and Receiver readiness-poll timeout, in seconds.
pub const T_SECONDS: u64 = 5;

/// Reaper scan interval, in seconds.
pub const GARBAGE_COLLECTOR_INTERVAL_SECONDS: u64 = 5;

/// Default simulated datagram loss probability. Overridden at the daemon by `MTP_LOSS_PROBABILITY`.
pub const DEFAULT_LOSS_PROBABILITY: f64 = 0.0;

/// Default shared-memory/semaphore namespace. Overridden by `MTP_NAMESPACE`.
pub const DEFAULT_NAMESPACE: &str = "mtp";
