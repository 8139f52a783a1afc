use std::collections::{HashMap, HashSet};
use std::io;
use std::mem::size_of;
use std::net::{SocketAddrV4, UdpSocket};
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::sync::Mutex;

/// Every UDP socket the daemon has created on clients' behalf, keyed by its raw file descriptor —
/// the same number stored as `udp_fd` in the shared socket table (§9: `udp_fd` is only meaningful
/// in the daemon's address space; clients never dereference it themselves).
///
/// `socket()` and `bind()` are kept as separate steps, mirroring the POSIX calls the original
/// implementation made directly: `m_socket` creates the descriptor before the caller has chosen a
/// local address, and `m_bind` binds it once that address is known. `std::net::UdpSocket::bind`
/// bundles both, so binding goes through a raw `libc::bind` on the already-owned descriptor
/// instead.
pub struct SocketRegistry {
	sockets: Mutex<HashMap<RawFd, UdpSocket>>,
}

impl SocketRegistry {
	pub fn new() -> Self {
		Self { sockets: Mutex::new(HashMap::new()) }
	}

	/// Create a fresh non-blocking UDP socket, not yet bound to any address. Returns its raw fd,
	/// which becomes the entry's `udp_fd`.
	pub fn create(&self) -> io::Result<RawFd> {
		// SAFETY: a plain AF_INET/SOCK_DGRAM socket() call with no further preconditions.
		let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
		if fd < 0 {
			return Err(io::Error::last_os_error());
		}

		// SAFETY: fd was just returned by a successful socket() call and is owned here; wrapping it
		// in UdpSocket transfers that ownership, so it will be closed exactly once, on drop.
		let socket = unsafe { UdpSocket::from_raw_fd(fd) };
		socket.set_nonblocking(true)?;

		self.sockets.lock().unwrap().insert(fd, socket);
		Ok(fd)
	}

	/// Bind an already-created socket to `addr`.
	pub fn bind(&self, fd: RawFd, addr: SocketAddrV4) -> io::Result<()> {
		let sockets = self.sockets.lock().unwrap();
		let socket = sockets.get(&fd).ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unknown socket handle"))?;

		let sockaddr = libc::sockaddr_in {
			sin_family: libc::AF_INET as libc::sa_family_t,
			sin_port: addr.port().to_be(),
			sin_addr: libc::in_addr { s_addr: u32::from(*addr.ip()).to_be() },
			sin_zero: [0; 8],
		};

		// SAFETY: sockaddr is a fully-initialized sockaddr_in of the size passed; socket.as_raw_fd()
		// is valid for the lifetime of this call since we hold the registry lock on its entry.
		let ret = unsafe {
			libc::bind(
				socket.as_raw_fd(),
				&sockaddr as *const libc::sockaddr_in as *const libc::sockaddr,
				size_of::<libc::sockaddr_in>() as libc::socklen_t,
			)
		};

		if ret < 0 {
			return Err(io::Error::last_os_error());
		}

		Ok(())
	}

	pub fn send_to(&self, fd: RawFd, buf: &[u8], dst: SocketAddrV4) -> io::Result<usize> {
		let sockets = self.sockets.lock().unwrap();
		let socket = sockets.get(&fd).ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unknown socket handle"))?;
		socket.send_to(buf, dst)
	}

	pub fn recv_from(&self, fd: RawFd, buf: &mut [u8]) -> io::Result<(usize, SocketAddrV4)> {
		let sockets = self.sockets.lock().unwrap();
		let socket = sockets.get(&fd).ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unknown socket handle"))?;

		let (n, addr) = socket.recv_from(buf)?;
		match addr {
			std::net::SocketAddr::V4(addr) => Ok((n, addr)),
			std::net::SocketAddr::V6(_) => Err(io::Error::new(io::ErrorKind::Unsupported, "unexpected IPv6 peer on an IPv4 socket")),
		}
	}

	pub fn raw_fds(&self) -> Vec<RawFd> {
		self.sockets.lock().unwrap().keys().copied().collect()
	}

	/// Close every socket not in `live`. Called by the Reaper after clearing dead clients' table
	/// entries, so a crashed client's UDP socket doesn't outlive it for the life of the daemon.
	pub fn retain(&self, live: &HashSet<RawFd>) {
		self.sockets.lock().unwrap().retain(|fd, _| live.contains(fd));
	}
}

#[cfg(test)]
mod tests {
	use std::net::{Ipv4Addr, SocketAddrV4};

	use super::*;

	#[test]
	fn created_socket_sends_and_receives_loopback() {
		let registry = SocketRegistry::new();

		let fd_a = registry.create().unwrap();
		registry.bind(fd_a, SocketAddrV4::new(Ipv4Addr::LOCALHOST, 29301)).unwrap();
		let fd_b = registry.create().unwrap();
		registry.bind(fd_b, SocketAddrV4::new(Ipv4Addr::LOCALHOST, 29302)).unwrap();

		registry.send_to(fd_a, b"hello", SocketAddrV4::new(Ipv4Addr::LOCALHOST, 29302)).unwrap();

		let mut buf = [0u8; 16];
		let deadline = std::time::Instant::now() + std::time::Duration::from_secs(1);
		let (n, peer) = loop {
			match registry.recv_from(fd_b, &mut buf) {
				Ok(result) => break result,
				Err(_) if std::time::Instant::now() < deadline => continue,
				Err(err) => panic!("recv_from never became ready: {err}"),
			}
		};

		assert_eq!(&buf[..n], b"hello");
		assert_eq!(peer.port(), 29301);
	}

	#[test]
	fn bind_on_unknown_handle_fails() {
		let registry = SocketRegistry::new();
		assert!(registry.bind(99999, SocketAddrV4::new(Ipv4Addr::LOCALHOST, 29303)).is_err());
	}

	#[test]
	fn retain_closes_sockets_not_in_live_set() {
		let registry = SocketRegistry::new();
		let fd_a = registry.create().unwrap();
		let fd_b = registry.create().unwrap();

		registry.retain(&HashSet::from([fd_a]));

		assert_eq!(registry.raw_fds(), vec![fd_a]);
		assert!(registry.send_to(fd_b, b"x", SocketAddrV4::new(Ipv4Addr::LOCALHOST, 29304)).is_err());
	}
}
