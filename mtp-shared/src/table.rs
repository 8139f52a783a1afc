use utils::bytes::Cast;

use crate::constants::MAX_SOCKETS;
use crate::entry::SocketEntry;

/// The fixed-size socket table: `MAX_SOCKETS` entries, indexed by the client-visible socket
/// descriptor. Cast directly over the mapped shared-memory region by `mtp-ipc`; every access must
/// happen under the table mutex.
#[repr(C)]
pub struct SocketTable {
	entries: [SocketEntry; MAX_SOCKETS],
}

// SAFETY: a single field, so the layout is exactly that field's layout with no padding.
unsafe impl Cast for SocketTable {}

impl SocketTable {
	pub fn zeroed() -> Self {
		Self { entries: core::array::from_fn(|_| SocketEntry::zeroed()) }
	}

	pub fn get(&self, index: usize) -> Option<&SocketEntry> {
		self.entries.get(index)
	}

	pub fn get_mut(&mut self, index: usize) -> Option<&mut SocketEntry> {
		self.entries.get_mut(index)
	}

	/// The first free slot, if any.
	pub fn find_free(&self) -> Option<usize> {
		self.entries.iter().position(SocketEntry::is_free)
	}

	pub fn iter(&self) -> impl Iterator<Item = (usize, &SocketEntry)> {
		self.entries.iter().enumerate()
	}

	pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut SocketEntry)> {
		self.entries.iter_mut().enumerate()
	}

	/// Dump every non-free entry's headline fields at `debug` level. The equivalent of the
	/// original implementation's manual table dump, kept for operators diagnosing a stuck daemon.
	pub fn debug_dump(&self) {
		for (index, entry) in self.iter().filter(|(_, e)| !e.is_free()) {
			log::debug!(
				"socket {index}: pid={} fd={} swnd={} rwnd={} sent={}",
				entry.owner_pid,
				entry.udp_fd,
				entry.swnd_size,
				entry.rwnd_size,
				entry.num_sent
			);
		}
	}
}
