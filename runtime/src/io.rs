use std::io::{self, ErrorKind};
use std::os::fd::RawFd;
use std::time::Duration;

use libc::{poll, pollfd, POLLERR, POLLHUP, POLLIN, POLLNVAL};
use utils::error::*;

fn as_timeout(t: Option<Duration>) -> i32 {
	t.and_then(|d| d.as_millis().try_into().ok()).unwrap_or(-1)
}

/// The readiness of one polled descriptor, returned in the same order the descriptors were
/// passed in.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Readiness {
	/// No event pending for this descriptor within the timeout.
	Idle,
	/// Data is available to read.
	Readable,
	/// The descriptor was closed or is otherwise unusable and should be dropped by the caller.
	Dead,
}

/// Poll a set of raw file descriptors for readability, waiting up to `timeout`.
///
/// Returns one [`Readiness`] per input descriptor, in the same order. An empty `fds` with no
/// timeout would block forever, so callers must not invoke this with an empty set and no
/// timeout.
pub fn poll_readable(fds: &[RawFd], timeout: Option<Duration>) -> Result<Vec<Readiness>> {
	let mut set: Vec<pollfd> = fds.iter().map(|&fd| pollfd { fd, events: POLLIN, revents: 0 }).collect();

	loop {
		let ret = unsafe { poll(set.as_mut_ptr(), set.len().try_into().expect("fewer than u32::MAX fds"), as_timeout(timeout)) };

		if ret >= 0 {
			break;
		}

		let err = io::Error::last_os_error();

		if err.kind() == ErrorKind::Interrupted {
			continue;
		}

		log::error!("poll() failed: {err}");
		return Err(());
	}

	Ok(set
		.iter()
		.map(|entry| {
			if entry.revents & (POLLERR | POLLHUP | POLLNVAL) != 0 {
				Readiness::Dead
			} else if entry.revents & POLLIN != 0 {
				Readiness::Readable
			} else {
				Readiness::Idle
			}
		})
		.collect())
}
