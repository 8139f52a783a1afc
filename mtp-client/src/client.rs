use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};

use mtp_ipc::Region;
use mtp_shared::MESSAGE_SIZE;

use crate::error::MtpError;

/// The only socket type `m_socket` accepts.
pub const MTP: i32 = 1;

/// A handle to the daemon's shared state, implementing the five public entry points. Cheap to
/// construct per call site; every method re-derives its guards rather than holding one across
/// calls, matching the "client calls block only on the semaphores" contract (§4.3).
pub struct Client {
	region: Region,
}

impl Client {
	/// Attach to a daemon already running under `namespace`.
	pub fn connect(namespace: &str) -> Result<Self, MtpError> {
		let region = Region::open(namespace).map_err(|()| MtpError::Io(io::Error::other("failed to attach to the MTP daemon's shared memory")))?;
		Ok(Self { region })
	}

	/// Allocate a socket table entry and ask the daemon to create its UDP socket.
	pub fn m_socket(&self, socket_type: i32) -> Result<usize, MtpError> {
		if socket_type != MTP {
			return Err(MtpError::UnsupportedType);
		}

		let index = {
			let mut table = self.region.table();
			let index = table.find_free().ok_or(MtpError::NoBuffers)?;
			table.get_mut(index).expect("index came from find_free").claim(std::process::id());
			index
		};

		{
			let mut ctrl = self.region.control();
			ctrl.request_socket();
		}
		self.region.rendezvous_request();

		let (handle, err) = {
			let ctrl = self.region.control();
			(ctrl.handle, ctrl.err)
		};

		if handle == -1 {
			let mut table = self.region.table();
			table.get_mut(index).expect("claimed above").release_claim();
			return Err(MtpError::Io(io::Error::from_raw_os_error(err)));
		}

		let mut table = self.region.table();
		table.get_mut(index).expect("claimed above").finish_allocate(handle);

		Ok(index)
	}

	/// Bind `fd`'s local endpoint and fix its single permitted peer.
	pub fn m_bind(&self, fd: usize, local: SocketAddrV4, peer: SocketAddrV4) -> Result<(), MtpError> {
		let handle = {
			let table = self.region.table();
			// `m_bind` only checks the index is in range for bad-socket (msocket.c m_bind, lines
			// 124-151); a free slot's udp_fd is always 0, so it falls through to the not-a-socket
			// check below rather than being rejected here.
			let entry = table.get(fd).ok_or(MtpError::BadSocket)?;
			if !entry.has_socket() {
				return Err(MtpError::NotASocket);
			}
			entry.udp_fd
		};

		{
			let mut ctrl = self.region.control();
			ctrl.request_bind(handle, u32::from(*local.ip()), local.port() as u32);
		}
		self.region.rendezvous_request();

		let err = {
			let ctrl = self.region.control();
			ctrl.err
		};
		if err != 0 {
			return Err(MtpError::Io(io::Error::from_raw_os_error(err)));
		}

		let mut table = self.region.table();
		let entry = table.get_mut(fd).ok_or(MtpError::BadSocket)?;
		entry.source_ip = u32::from(*local.ip());
		entry.source_port = local.port() as u32;
		entry.dest_ip = u32::from(*peer.ip());
		entry.dest_port = peer.port() as u32;

		Ok(())
	}

	/// Enqueue `buf` for transmission to `dst`, returning the number of bytes accepted. The
	/// original implementation always returned 0 here regardless of success; the declared contract
	/// ("number of bytes on success") is honored instead.
	pub fn m_sendto(&self, fd: usize, buf: &[u8], dst: SocketAddrV4) -> Result<usize, MtpError> {
		let mut table = self.region.table();
		let entry = table.get_mut(fd).filter(|e| !e.is_free()).ok_or(MtpError::BadSocket)?;

		if !entry.is_bound() || entry.dest_ip != u32::from(*dst.ip()) || entry.dest_port != dst.port() as u32 {
			return Err(MtpError::NotConnected);
		}

		let slot = entry.first_empty_send_slot().ok_or(MtpError::NoBuffers)?;
		let len = buf.len().min(MESSAGE_SIZE);
		entry.enqueue_send(slot, &buf[..len]);

		Ok(len)
	}

	/// Deliver the lowest-sequence ready message into `buf`, returning `MESSAGE_SIZE` bytes copied
	/// (truncated to `buf`'s length) and the bound peer, per the declared contract.
	pub fn m_recvfrom(&self, fd: usize, buf: &mut [u8]) -> Result<(usize, SocketAddrV4), MtpError> {
		let mut table = self.region.table();
		let entry = table.get_mut(fd).filter(|e| !e.is_free()).ok_or(MtpError::BadSocket)?;

		let slot = entry.lowest_recv_slot();
		if entry.recv_occupied[slot] == 0 {
			return Err(MtpError::NoMessage);
		}

		let peer = SocketAddrV4::new(Ipv4Addr::from(entry.dest_ip), entry.dest_port as u16);

		let mut full = [0u8; MESSAGE_SIZE];
		entry.deliver(slot, &mut full);
		let n = buf.len().min(MESSAGE_SIZE);
		buf[..n].copy_from_slice(&full[..n]);

		Ok((MESSAGE_SIZE, peer))
	}

	/// Release `fd`. Always succeeds locally on an allocated socket; the peer only discovers
	/// silence by absence of ACKs.
	pub fn m_close(&self, fd: usize) -> Result<(), MtpError> {
		let mut table = self.region.table();
		let entry = table.get_mut(fd).ok_or(MtpError::BadSocket)?;
		if !entry.has_socket() {
			return Err(MtpError::NotASocket);
		}
		entry.clear();
		Ok(())
	}
}
