use std::fmt;
use std::io;

/// The client-facing error taxonomy (§6): local errors an application can match on, plus the
/// underlying OS error the daemon reported for a socket-creation or bind request.
#[derive(Debug)]
pub enum MtpError {
	/// `m_socket` was asked for anything but an MTP socket.
	UnsupportedType,
	/// The socket table (or a socket's send buffer) has no free slot.
	NoBuffers,
	/// The socket descriptor does not name a live socket.
	BadSocket,
	/// The socket descriptor names a live entry, but it has no underlying UDP handle yet.
	NotASocket,
	/// `m_sendto`'s destination does not match the socket's bound peer, or the socket isn't bound.
	NotConnected,
	/// `m_recvfrom` found no message ready to deliver.
	NoMessage,
	/// The daemon reported a failure creating or binding the underlying UDP socket.
	Io(io::Error),
}

impl fmt::Display for MtpError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::UnsupportedType => write!(f, "unsupported socket type"),
			Self::NoBuffers => write!(f, "no buffers available"),
			Self::BadSocket => write!(f, "bad socket descriptor"),
			Self::NotASocket => write!(f, "not a socket"),
			Self::NotConnected => write!(f, "not connected"),
			Self::NoMessage => write!(f, "no message"),
			Self::Io(err) => write!(f, "daemon I/O error: {err}"),
		}
	}
}

impl std::error::Error for MtpError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::Io(err) => Some(err),
			_ => None,
		}
	}
}
