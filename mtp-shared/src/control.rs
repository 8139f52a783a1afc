use utils::bytes::Cast;

/// The singleton control record used only during `m_socket`/`m_bind`'s handshake with the daemon
/// control loop, guarded by `CTRL_MUTEX` and cleared after each handoff.
#[repr(C)]
pub struct ControlRecord {
	/// In, for a bind request: the handle to bind. Out, for a new-socket request: the handle the
	/// daemon created, or -1 on failure.
	pub handle: i32,
	/// OS error number on failure, 0 on success.
	pub err: i32,
	pub ip: u32,
	pub port: u32,
	/// Set when this record describes a bind request rather than a fresh-socket request. A `u32`
	/// rather than a `bool`/`u8` so every field is uniformly 4 bytes wide and the layout has no
	/// padding.
	pub is_bind: u32,
}

// SAFETY: all five fields are 4 bytes wide, so `#[repr(C)]` places them back to back with no
// padding.
unsafe impl Cast for ControlRecord {}

impl ControlRecord {
	pub const fn zeroed() -> Self {
		Self { handle: 0, err: 0, ip: 0, port: 0, is_bind: 0 }
	}

	pub fn request_socket(&mut self) {
		*self = Self::zeroed();
	}

	pub fn request_bind(&mut self, handle: i32, ip: u32, port: u32) {
		*self = Self { handle, err: 0, ip, port, is_bind: 1 };
	}

	pub fn fail(&mut self, errno: i32) {
		self.handle = -1;
		self.err = errno;
	}

	pub fn succeed_with_handle(&mut self, handle: i32) {
		self.handle = handle;
		self.err = 0;
	}

	pub fn is_bind_request(&self) -> bool {
		self.is_bind != 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fresh_request_is_not_a_bind() {
		let mut record = ControlRecord::zeroed();
		record.request_socket();
		assert!(!record.is_bind_request());
	}

	#[test]
	fn bind_request_round_trips_fields() {
		let mut record = ControlRecord::zeroed();
		record.request_bind(3, 0x7f000001, 9000);
		assert!(record.is_bind_request());
		assert_eq!(record.handle, 3);
		assert_eq!(record.port, 9000);
	}
}
