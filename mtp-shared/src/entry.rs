use utils::bytes::Cast;

use crate::constants::{MAX_RECEIVE_BUFFER_SIZE, MAX_SEND_BUFFER_SIZE, MAX_WINDOW_SIZE, MESSAGE_SIZE};

/// Sentinel marking an unused send/receive-window slot.
pub const NO_SEQ: i32 = -1;

/// One row of the shared socket table: the authoritative state of one MTP socket.
///
/// Lives in shared memory (cast directly from the mapped region by [`crate::SocketTable`]); every
/// read or write must happen under the table mutex `mtp-ipc` provides. Fields are grouped by
/// alignment (4-byte fields, then byte arrays) so the layout has no padding.
#[repr(C)]
pub struct SocketEntry {
	pub owner_pid: u32,
	/// Daemon-local UDP file descriptor; 0 before `m_socket` completes, -1 on creation failure.
	/// Only the daemon ever calls `sendto`/`recvfrom` on it.
	pub udp_fd: i32,
	pub source_ip: u32,
	pub source_port: u32,
	pub dest_ip: u32,
	pub dest_port: u32,
	pub send_seq: [u32; MAX_SEND_BUFFER_SIZE],
	pub recv_seq: [u32; MAX_RECEIVE_BUFFER_SIZE],
	pub swnd_size: u32,
	pub swnd_seq: [i32; MAX_WINDOW_SIZE],
	pub rwnd_size: u32,
	pub rwnd_seq: [i32; MAX_WINDOW_SIZE],
	pub num_sent: u32,

	pub free: u8,
	pub send_occupied: [u8; MAX_SEND_BUFFER_SIZE],
	pub send_buffer: [[u8; MESSAGE_SIZE]; MAX_SEND_BUFFER_SIZE],
	pub recv_occupied: [u8; MAX_RECEIVE_BUFFER_SIZE],
	pub recv_buffer: [[u8; MESSAGE_SIZE]; MAX_RECEIVE_BUFFER_SIZE],
}

// SAFETY: `#[repr(C)]` with every field ordered so its offset is already a multiple of its
// alignment (the u32/i32 fields first, each a multiple of 4 bytes, then the byte arrays, whose
// total size is itself a multiple of 4) leaves no padding anywhere, including at the end.
unsafe impl Cast for SocketEntry {}

impl SocketEntry {
	/// The all-zero, `free` representation. Used to initialize the table and by the Reaper.
	pub const fn zeroed() -> Self {
		Self {
			owner_pid: 0,
			udp_fd: 0,
			source_ip: 0,
			source_port: 0,
			dest_ip: 0,
			dest_port: 0,
			send_seq: [0; MAX_SEND_BUFFER_SIZE],
			recv_seq: [0; MAX_RECEIVE_BUFFER_SIZE],
			swnd_size: 0,
			swnd_seq: [NO_SEQ; MAX_WINDOW_SIZE],
			rwnd_size: 0,
			rwnd_seq: [NO_SEQ; MAX_WINDOW_SIZE],
			num_sent: 0,
			free: 1,
			send_occupied: [0; MAX_SEND_BUFFER_SIZE],
			send_buffer: [[0; MESSAGE_SIZE]; MAX_SEND_BUFFER_SIZE],
			recv_occupied: [0; MAX_RECEIVE_BUFFER_SIZE],
			recv_buffer: [[0; MESSAGE_SIZE]; MAX_RECEIVE_BUFFER_SIZE],
		}
	}

	pub fn is_free(&self) -> bool {
		self.free != 0
	}

	/// Tentatively claim this slot for `owner_pid`, under the table lock, before the control-record
	/// rendezvous that creates its UDP socket. Closes the race the original implementation left open
	/// (it released the table lock between finding a free slot and stamping it).
	pub fn claim(&mut self, owner_pid: u32) {
		debug_assert!(self.is_free());
		self.free = 0;
		self.owner_pid = owner_pid;
	}

	/// Undo [`Self::claim`] if the subsequent rendezvous failed.
	pub fn release_claim(&mut self) {
		*self = Self::zeroed();
	}

	/// Finish allocation after the daemon has created the UDP socket: stamp the handle and reset
	/// both windows to their initial state.
	pub fn finish_allocate(&mut self, udp_fd: i32) {
		self.udp_fd = udp_fd;
		self.swnd_size = MAX_WINDOW_SIZE as u32;
		self.swnd_seq = [NO_SEQ; MAX_WINDOW_SIZE];
		self.rwnd_size = MAX_WINDOW_SIZE as u32;
		for (j, slot) in self.recv_seq.iter_mut().enumerate() {
			*slot = (j + 1) as u32;
		}
		self.num_sent = 0;
	}

	pub fn has_socket(&self) -> bool {
		self.udp_fd != 0 && self.udp_fd != -1
	}

	pub fn is_bound(&self) -> bool {
		self.dest_port != 0
	}

	/// Reclaim this entry, whether via `m_close` or the Reaper observing a dead owner.
	pub fn clear(&mut self) {
		*self = Self::zeroed();
	}

	/// First empty send-buffer slot, if any.
	pub fn first_empty_send_slot(&self) -> Option<usize> {
		self.send_occupied.iter().position(|&occ| occ == 0)
	}

	/// Enqueue a message for transmission. Caller has already verified a free slot exists and the
	/// socket is bound to `dst`.
	pub fn enqueue_send(&mut self, slot: usize, payload: &[u8]) -> u32 {
		self.num_sent += 1;
		let seq = self.num_sent;

		self.send_occupied[slot] = 1;
		self.send_seq[slot] = seq;
		self.send_buffer[slot][..payload.len()].copy_from_slice(payload);
		if payload.len() < MESSAGE_SIZE {
			self.send_buffer[slot][payload.len()..].fill(0);
		}

		seq
	}

	/// Rebuild `swnd_seq` from the send buffer: the sequence numbers of the first `swnd_size`
	/// occupied slots in buffer order, in slots `0..swnd_size`; the rest are [`NO_SEQ`].
	pub fn rebuild_swnd(&mut self) {
		self.swnd_seq = [NO_SEQ; MAX_WINDOW_SIZE];

		let mut it = 0;
		for slot in 0..MAX_SEND_BUFFER_SIZE {
			if it >= self.swnd_size as usize || it >= MAX_WINDOW_SIZE {
				break;
			}
			if self.send_occupied[slot] != 0 {
				self.swnd_seq[it] = self.send_seq[slot] as i32;
				it += 1;
			}
		}
	}

	/// Find the occupied send slot whose sequence number is `seq`.
	pub fn send_slot_for_seq(&self, seq: u32) -> Option<usize> {
		(0..MAX_SEND_BUFFER_SIZE).find(|&slot| self.send_occupied[slot] != 0 && self.send_seq[slot] == seq)
	}

	/// Find the occupied send slot whose sequence number matches the wire's mod-16 `seq`. Safe from
	/// ambiguity because `MAX_WINDOW_SIZE` (5) keeps the in-flight window well under 16 (§9).
	pub fn send_slot_for_seq16(&self, seq_mod16: u8) -> Option<usize> {
		(0..MAX_SEND_BUFFER_SIZE).find(|&slot| self.send_occupied[slot] != 0 && (self.send_seq[slot] & 0xf) as u8 == seq_mod16)
	}

	/// Remove a slot from the send buffer by shifting every later slot one position left (FIFO
	/// compaction), leaving the last slot empty. Bounded at `SB - 1`: the original implementation's
	/// shift read one slot past the end of the array at `j = SB - 1`.
	pub fn remove_send_slot(&mut self, slot: usize) {
		for j in slot..MAX_SEND_BUFFER_SIZE - 1 {
			self.send_occupied[j] = self.send_occupied[j + 1];
			self.send_seq[j] = self.send_seq[j + 1];
			self.send_buffer[j] = self.send_buffer[j + 1];
		}

		let last = MAX_SEND_BUFFER_SIZE - 1;
		self.send_occupied[last] = 0;
		self.send_seq[last] = 0;
		self.send_buffer[last] = [0; MESSAGE_SIZE];
	}

	/// Rebuild `rwnd_seq`/`rwnd_size` from the receive buffer's empty slots.
	pub fn rebuild_rwnd(&mut self) {
		self.rwnd_seq = [NO_SEQ; MAX_WINDOW_SIZE];

		let mut it = 0;
		let mut empty = 0;
		for slot in 0..MAX_RECEIVE_BUFFER_SIZE {
			if self.recv_occupied[slot] == 0 {
				empty += 1;
				if it < MAX_WINDOW_SIZE {
					self.rwnd_seq[it] = self.recv_seq[slot] as i32;
					it += 1;
				}
			}
		}

		self.rwnd_size = empty;
	}

	/// Find the empty receive slot whose expected sequence number is `seq`.
	pub fn recv_slot_for_seq(&self, seq: u32) -> Option<usize> {
		(0..MAX_RECEIVE_BUFFER_SIZE).find(|&slot| self.recv_occupied[slot] == 0 && self.recv_seq[slot] == seq)
	}

	/// Find the empty receive slot whose expected sequence number matches the wire's mod-16 `seq`.
	pub fn recv_slot_for_seq16(&self, seq_mod16: u8) -> Option<usize> {
		(0..MAX_RECEIVE_BUFFER_SIZE).find(|&slot| self.recv_occupied[slot] == 0 && (self.recv_seq[slot] & 0xf) as u8 == seq_mod16)
	}

	/// Fill a receive slot with an arrived message's payload.
	pub fn fill_recv_slot(&mut self, slot: usize, payload: &[u8]) {
		self.recv_occupied[slot] = 1;
		self.recv_buffer[slot][..payload.len()].copy_from_slice(payload);
		if payload.len() < MESSAGE_SIZE {
			self.recv_buffer[slot][payload.len()..].fill(0);
		}
	}

	/// The receive slot with the smallest expected sequence number, and whether it is filled.
	pub fn lowest_recv_slot(&self) -> usize {
		(0..MAX_RECEIVE_BUFFER_SIZE).min_by_key(|&slot| self.recv_seq[slot]).expect("receive buffer is non-empty")
	}

	/// Deliver the lowest-sequence filled slot to `buf`, then rotate that slot's expected sequence
	/// number forward to `max(recv_seq) + 1`. Returns the number of bytes copied.
	pub fn deliver(&mut self, slot: usize, buf: &mut [u8]) -> usize {
		let len = buf.len().min(MESSAGE_SIZE);
		buf[..len].copy_from_slice(&self.recv_buffer[slot][..len]);

		self.recv_occupied[slot] = 0;
		self.recv_buffer[slot] = [0; MESSAGE_SIZE];

		let next = self.recv_seq.iter().max().copied().unwrap_or(0) + 1;
		self.recv_seq[slot] = next;

		len
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn zeroed_entry_is_free_with_no_socket() {
		let entry = SocketEntry::zeroed();
		assert!(entry.is_free());
		assert!(!entry.has_socket());
	}

	#[test]
	fn claim_then_finish_allocate_sets_up_windows() {
		let mut entry = SocketEntry::zeroed();
		entry.claim(42);
		assert!(!entry.is_free());
		entry.finish_allocate(7);

		assert_eq!(entry.udp_fd, 7);
		assert_eq!(entry.swnd_size, MAX_WINDOW_SIZE as u32);
		assert_eq!(entry.rwnd_size, MAX_WINDOW_SIZE as u32);
		assert_eq!(entry.recv_seq, [1, 2, 3, 4, 5]);
	}

	#[test]
	fn enqueue_and_rebuild_swnd_tracks_buffer_order() {
		let mut entry = SocketEntry::zeroed();
		entry.claim(1);
		entry.finish_allocate(3);

		let slot_a = entry.first_empty_send_slot().unwrap();
		entry.enqueue_send(slot_a, b"A");
		let slot_b = entry.first_empty_send_slot().unwrap();
		entry.enqueue_send(slot_b, b"B");

		entry.rebuild_swnd();
		assert_eq!(&entry.swnd_seq[..2], &[1, 2]);
		assert_eq!(entry.swnd_seq[2], NO_SEQ);
	}

	#[test]
	fn remove_send_slot_shifts_and_clears_last() {
		let mut entry = SocketEntry::zeroed();
		entry.claim(1);
		entry.finish_allocate(3);

		for msg in [b"A" as &[u8], b"B", b"C"] {
			let slot = entry.first_empty_send_slot().unwrap();
			entry.enqueue_send(slot, msg);
		}

		entry.remove_send_slot(0);
		assert_eq!(entry.send_seq[0], 2);
		assert_eq!(entry.send_seq[1], 3);
		assert_eq!(entry.send_occupied[2], 0);
	}

	#[test]
	fn seq16_lookups_match_full_sequence_numbers_mod_16() {
		let mut entry = SocketEntry::zeroed();
		entry.claim(1);
		entry.finish_allocate(3);
		entry.num_sent = 16;

		let slot = entry.first_empty_send_slot().unwrap();
		entry.enqueue_send(slot, b"A");
		assert_eq!(entry.send_seq[slot], 17);
		assert_eq!(entry.send_slot_for_seq16(1), Some(slot));

		let recv_slot = entry.recv_slot_for_seq(1).unwrap();
		assert_eq!(entry.recv_slot_for_seq16(1), Some(recv_slot));
	}

	#[test]
	fn deliver_rotates_expected_sequence_forward() {
		let mut entry = SocketEntry::zeroed();
		entry.claim(1);
		entry.finish_allocate(3);

		let slot = entry.recv_slot_for_seq(1).unwrap();
		entry.fill_recv_slot(slot, b"A");

		let lowest = entry.lowest_recv_slot();
		assert_eq!(entry.recv_seq[lowest], 1);

		let mut buf = [0u8; MESSAGE_SIZE];
		let n = entry.deliver(lowest, &mut buf);
		assert_eq!(&buf[..n], b"A");
		assert_eq!(entry.recv_seq[lowest], 6);
	}
}
