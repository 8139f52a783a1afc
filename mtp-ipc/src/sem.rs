use std::ffi::CString;
use std::io;

use log::error;
use utils::error::*;

/// A named POSIX semaphore (`sem_open`). Used both as a binary mutex (`STAB_MUTEX`, `CTRL_MUTEX`)
/// and as the two rendezvous slots (`CTRL_RENDEZVOUS`), which are really two independent
/// zero-initialized semaphores rather than one two-slot object.
pub struct NamedSemaphore {
	sem: *mut libc::sem_t,
}

unsafe impl Send for NamedSemaphore {}
unsafe impl Sync for NamedSemaphore {}

impl NamedSemaphore {
	/// Create (or re-create) a named semaphore with the given initial value. Called once by the
	/// daemon at startup.
	pub fn create(name: &str, initial: u32) -> Result<Self> {
		let c_name = CString::new(name).expect("semaphore name has no interior NUL");

		// SAFETY: c_name is valid; unlinking a nonexistent semaphore is harmless and clears the way
		// for a fresh O_CREAT below so a stale semaphore from a previous daemon run can't leak in
		// with the wrong value.
		unsafe { libc::sem_unlink(c_name.as_ptr()) };

		// SAFETY: c_name is valid, mode 0600 and `initial` are in range for sem_open's O_CREAT form.
		let sem = unsafe { libc::sem_open(c_name.as_ptr(), libc::O_CREAT | libc::O_EXCL, 0o600, initial) };
		if sem == libc::SEM_FAILED {
			error!("sem_open({name}, create) failed: {}", io::Error::last_os_error());
			return Err(());
		}

		Ok(Self { sem })
	}

	/// Attach to a semaphore a daemon has already created.
	pub fn open(name: &str) -> Result<Self> {
		let c_name = CString::new(name).expect("semaphore name has no interior NUL");

		// SAFETY: c_name is valid; sem_open without O_CREAT only attaches to an existing semaphore.
		let sem = unsafe { libc::sem_open(c_name.as_ptr(), 0) };
		if sem == libc::SEM_FAILED {
			error!("sem_open({name}, open) failed: {}", io::Error::last_os_error());
			return Err(());
		}

		Ok(Self { sem })
	}

	/// Block until the semaphore's value is positive, then decrement it.
	pub fn wait(&self) {
		loop {
			// SAFETY: self.sem was returned by a successful sem_open and outlives this call.
			let ret = unsafe { libc::sem_wait(self.sem) };
			if ret == 0 {
				return;
			}
			if io::Error::last_os_error().kind() != io::ErrorKind::Interrupted {
				error!("sem_wait failed: {}", io::Error::last_os_error());
				return;
			}
		}
	}

	/// Increment the semaphore's value, waking one waiter if any are blocked in [`Self::wait`].
	pub fn post(&self) {
		// SAFETY: self.sem was returned by a successful sem_open and outlives this call.
		if unsafe { libc::sem_post(self.sem) } != 0 {
			error!("sem_post failed: {}", io::Error::last_os_error());
		}
	}

	/// Remove the name so no further process can `open` it.
	pub fn unlink(name: &str) {
		let c_name = CString::new(name).expect("semaphore name has no interior NUL");
		// SAFETY: c_name is valid; unlinking a nonexistent semaphore is harmless.
		unsafe { libc::sem_unlink(c_name.as_ptr()) };
	}
}

impl Drop for NamedSemaphore {
	fn drop(&mut self) {
		// SAFETY: self.sem comes from a successful sem_open and has not been closed before.
		unsafe { libc::sem_close(self.sem) };
	}
}
