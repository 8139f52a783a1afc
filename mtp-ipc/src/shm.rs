use std::ffi::CString;
use std::io;
use std::ptr;

use log::error;
use utils::error::*;

/// A POSIX shared-memory segment (`shm_open` + `mmap`), sized to hold exactly one `T`.
///
/// Unmaps on drop. Does not unlink the backing name; the daemon does that once at shutdown via
/// [`ShmSegment::unlink`].
pub struct ShmSegment {
	ptr: *mut u8,
	size: usize,
}

unsafe impl Send for ShmSegment {}
unsafe impl Sync for ShmSegment {}

impl ShmSegment {
	/// Create a fresh segment of `size` bytes, replacing any existing segment under `name`. Called
	/// once by the daemon at startup.
	pub fn create(name: &str, size: usize) -> Result<Self> {
		let c_name = CString::new(name).expect("segment name has no interior NUL");

		// SAFETY: c_name is a valid NUL-terminated string; shm_unlink is safe to call on a
		// nonexistent name (error ignored, we are clearing the way for O_EXCL below).
		unsafe { libc::shm_unlink(c_name.as_ptr()) };

		// SAFETY: c_name is valid; O_CREAT|O_EXCL|O_RDWR with mode 0600 either creates a fresh
		// segment or fails, never aliasing a segment from a previous, possibly differently-sized,
		// daemon run.
		let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_CREAT | libc::O_EXCL | libc::O_RDWR, 0o600) };
		if fd < 0 {
			error!("shm_open({name}, create) failed: {}", io::Error::last_os_error());
			return Err(());
		}

		// SAFETY: fd is a valid, just-opened shm fd; size fits off_t on any platform this targets.
		if unsafe { libc::ftruncate(fd, size as libc::off_t) } < 0 {
			error!("ftruncate({name}) failed: {}", io::Error::last_os_error());
			unsafe { libc::close(fd) };
			return Err(());
		}

		let segment = Self::map(fd, size, name)?;

		// SAFETY: ptr is a fresh mapping of exactly `size` bytes we just created; zeroing it is
		// always valid and matches every field's `free`/zero initial state.
		unsafe { ptr::write_bytes(segment.ptr, 0, size) };

		Ok(segment)
	}

	/// Attach to a segment a daemon has already created. Called by every client process.
	pub fn open(name: &str, size: usize) -> Result<Self> {
		let c_name = CString::new(name).expect("segment name has no interior NUL");

		// SAFETY: c_name is valid; O_RDWR on an existing segment attaches without altering its size.
		let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };
		if fd < 0 {
			error!("shm_open({name}, open) failed: {}", io::Error::last_os_error());
			return Err(());
		}

		Self::map(fd, size, name)
	}

	fn map(fd: libc::c_int, size: usize, name: &str) -> Result<Self> {
		// SAFETY: fd is a valid shm fd sized to at least `size` bytes by the creator; requesting a
		// kernel-chosen address with MAP_SHARED is always a valid mmap invocation.
		let ptr = unsafe { libc::mmap(ptr::null_mut(), size, libc::PROT_READ | libc::PROT_WRITE, libc::MAP_SHARED, fd, 0) };

		// SAFETY: fd is valid and the mapping (success or failure) does not need it kept open.
		unsafe { libc::close(fd) };

		if ptr == libc::MAP_FAILED {
			error!("mmap({name}) failed: {}", io::Error::last_os_error());
			return Err(());
		}

		Ok(Self { ptr: ptr as *mut u8, size })
	}

	/// Remove the name so no further process can `open` it. Existing mappings remain valid until
	/// unmapped.
	pub fn unlink(name: &str) {
		let c_name = CString::new(name).expect("segment name has no interior NUL");
		// SAFETY: c_name is valid; shm_unlink on a nonexistent name is harmless.
		unsafe { libc::shm_unlink(c_name.as_ptr()) };
	}

	pub fn as_ptr(&self) -> *mut u8 {
		self.ptr
	}

	pub fn size(&self) -> usize {
		self.size
	}
}

impl Drop for ShmSegment {
	fn drop(&mut self) {
		// SAFETY: self.ptr/self.size come from the successful mmap in create()/open() and have not
		// been unmapped before (Drop runs at most once).
		unsafe { libc::munmap(self.ptr as *mut libc::c_void, self.size) };
	}
}
