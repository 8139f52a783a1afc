use std::mem::size_of;
use std::ops::{Deref, DerefMut};
use std::slice;

use mtp_shared::{ControlRecord, SocketTable};
use utils::bytes::cast_mut;
use utils::error::*;

use crate::naming::Names;
use crate::sem::NamedSemaphore;
use crate::shm::ShmSegment;

/// The two shared-memory regions and three semaphores described by the data model, bundled behind
/// one owning type so every access is forced through a guard that holds the right mutex. No
/// pointers ever leave this module; callers only ever see `&SocketTable`/`&ControlRecord`.
pub struct Region {
	table_segment: ShmSegment,
	control_segment: ShmSegment,
	table_mutex: NamedSemaphore,
	control_mutex: NamedSemaphore,
	rendezvous_request: NamedSemaphore,
	rendezvous_complete: NamedSemaphore,
	names: Names,
}

impl Region {
	/// Create both regions and all semaphores fresh. Called once, by the daemon, at startup.
	pub fn create(namespace: &str) -> Result<Self> {
		let names = Names::new(namespace);

		Ok(Self {
			table_segment: ShmSegment::create(&names.table_segment(), size_of::<SocketTable>())?,
			control_segment: ShmSegment::create(&names.control_segment(), size_of::<ControlRecord>())?,
			table_mutex: NamedSemaphore::create(&names.table_mutex(), 1)?,
			control_mutex: NamedSemaphore::create(&names.control_mutex(), 1)?,
			rendezvous_request: NamedSemaphore::create(&names.rendezvous_request(), 0)?,
			rendezvous_complete: NamedSemaphore::create(&names.rendezvous_complete(), 0)?,
			names,
		})
	}

	/// Attach to regions and semaphores a daemon has already created. Called by every client.
	pub fn open(namespace: &str) -> Result<Self> {
		let names = Names::new(namespace);

		Ok(Self {
			table_segment: ShmSegment::open(&names.table_segment(), size_of::<SocketTable>())?,
			control_segment: ShmSegment::open(&names.control_segment(), size_of::<ControlRecord>())?,
			table_mutex: NamedSemaphore::open(&names.table_mutex())?,
			control_mutex: NamedSemaphore::open(&names.control_mutex())?,
			rendezvous_request: NamedSemaphore::open(&names.rendezvous_request())?,
			rendezvous_complete: NamedSemaphore::open(&names.rendezvous_complete())?,
			names,
		})
	}

	/// Lock the socket table for the duration of the returned guard.
	pub fn table(&self) -> TableGuard<'_> {
		self.table_mutex.wait();
		// SAFETY: the segment is sized to exactly one SocketTable and we hold the table mutex, the
		// only synchronization primitive any process uses to access it.
		let bytes = unsafe { slice::from_raw_parts_mut(self.table_segment.as_ptr(), self.table_segment.size()) };
		TableGuard { table: cast_mut(bytes), mutex: &self.table_mutex }
	}

	/// Lock the control record for the duration of the returned guard.
	pub fn control(&self) -> ControlGuard<'_> {
		self.control_mutex.wait();
		// SAFETY: the segment is sized to exactly one ControlRecord and we hold the control mutex.
		let bytes = unsafe { slice::from_raw_parts_mut(self.control_segment.as_ptr(), self.control_segment.size()) };
		ControlGuard { record: cast_mut(bytes), mutex: &self.control_mutex }
	}

	/// Client side of the rendezvous: wake the daemon's control loop and block until it signals
	/// completion. The caller has already written the request into the control record (and
	/// released the guard, so the daemon can take `CTRL_MUTEX`).
	pub fn rendezvous_request(&self) {
		self.rendezvous_request.post();
		self.rendezvous_complete.wait();
	}

	/// Daemon side: block until a client signals a request is ready.
	pub fn wait_for_request(&self) {
		self.rendezvous_request.wait();
	}

	/// Daemon side: signal that the request in the control record has been serviced.
	pub fn complete_request(&self) {
		self.rendezvous_complete.post();
	}

	/// Remove every name this region created. Called once, by the daemon, on shutdown.
	pub fn teardown(&self) {
		ShmSegment::unlink(&self.names.table_segment());
		ShmSegment::unlink(&self.names.control_segment());
		NamedSemaphore::unlink(&self.names.table_mutex());
		NamedSemaphore::unlink(&self.names.control_mutex());
		NamedSemaphore::unlink(&self.names.rendezvous_request());
		NamedSemaphore::unlink(&self.names.rendezvous_complete());
	}
}

/// Exclusive access to the socket table. Releases `STAB_MUTEX` on drop, including when the
/// critical section panics, so one stuck worker cannot wedge the whole daemon; the Reaper's normal
/// liveness scan cleans up whatever entry was left half-mutated.
pub struct TableGuard<'a> {
	table: &'a mut SocketTable,
	mutex: &'a NamedSemaphore,
}

impl Deref for TableGuard<'_> {
	type Target = SocketTable;

	fn deref(&self) -> &SocketTable {
		self.table
	}
}

impl DerefMut for TableGuard<'_> {
	fn deref_mut(&mut self) -> &mut SocketTable {
		self.table
	}
}

impl Drop for TableGuard<'_> {
	fn drop(&mut self) {
		self.mutex.post();
	}
}

/// Exclusive access to the control record. Releases `CTRL_MUTEX` on drop.
pub struct ControlGuard<'a> {
	record: &'a mut ControlRecord,
	mutex: &'a NamedSemaphore,
}

impl Deref for ControlGuard<'_> {
	type Target = ControlRecord;

	fn deref(&self) -> &ControlRecord {
		self.record
	}
}

impl DerefMut for ControlGuard<'_> {
	fn deref_mut(&mut self) -> &mut ControlRecord {
		self.record
	}
}

impl Drop for ControlGuard<'_> {
	fn drop(&mut self) {
		self.mutex.post();
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use std::thread;

	use super::*;

	#[test]
	fn create_then_open_attach_to_the_same_table() {
		let daemon = Region::create("test_region_attach").expect("create");
		daemon.table().get_mut(0).expect("slot 0 exists").claim(42);

		let client = Region::open("test_region_attach").expect("open");
		assert_eq!(client.table().get(0).expect("slot 0 exists").owner_pid, 42);

		daemon.teardown();
	}

	#[test]
	fn rendezvous_hands_off_between_threads() {
		let region = Arc::new(Region::create("test_region_rendezvous").expect("create"));

		let daemon_region = Arc::clone(&region);
		let daemon = thread::spawn(move || {
			daemon_region.wait_for_request();
			daemon_region.control().handle = 7;
			daemon_region.complete_request();
		});

		region.control().request_socket();
		region.rendezvous_request();

		assert_eq!(region.control().handle, 7);
		daemon.join().expect("daemon thread should not panic");
		region.teardown();
	}

	#[test]
	fn table_guard_serializes_concurrent_writers() {
		let region = Arc::new(Region::create("test_region_table_mutex").expect("create"));
		region.table().get_mut(0).expect("slot 0 exists").claim(1);

		let mut handles = Vec::new();
		for _ in 0..8 {
			let region = Arc::clone(&region);
			handles.push(thread::spawn(move || {
				let mut table = region.table();
				let entry = table.get_mut(0).expect("slot 0 exists");
				let before = entry.num_sent;
				entry.num_sent = before + 1;
			}));
		}
		for handle in handles {
			handle.join().expect("writer thread should not panic");
		}

		assert_eq!(region.table().get(0).expect("slot 0 exists").num_sent, 8);
		region.teardown();
	}
}
