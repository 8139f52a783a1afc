use std::collections::HashSet;
use std::thread;

use mtp_ipc::Region;
use runtime::signal::Shutdown;

use crate::config::Config;
use crate::sockets::SocketRegistry;

/// The Reaper worker (§4.7): reclaims entries whose owning process has exited without calling
/// `m_close`, and reconciles the daemon's own socket registry against what the table still
/// references, so a crashed client's fd doesn't linger for the life of the daemon.
pub fn run(region: &Region, sockets: &SocketRegistry, config: &Config, shutdown: &Shutdown) {
	while !shutdown.requested() {
		thread::sleep(config.gc_interval);
		reap_pass(region, sockets);
	}
}

/// One Reaper sweep's worth of work, factored out of [`run`] so tests can drive a single pass
/// without waiting out a real `GC_INTERVAL`.
pub(crate) fn reap_pass(region: &Region, sockets: &SocketRegistry) {
	let mut table = region.table();
	for (index, entry) in table.iter_mut() {
		if entry.is_free() || entry.owner_pid == 0 {
			continue;
		}

		if !process_is_alive(entry.owner_pid) {
			log::info!("socket {index}: owner pid {} is dead, reclaiming", entry.owner_pid);
			entry.clear();
		}
	}

	let live: HashSet<i32> = table.iter().filter(|(_, e)| !e.is_free() && e.has_socket()).map(|(_, e)| e.udp_fd).collect();
	sockets.retain(&live);
}

/// Liveness probe: `kill(pid, 0)` succeeds iff the process exists and is visible to us, without
/// sending a signal.
fn process_is_alive(pid: u32) -> bool {
	// SAFETY: signal 0 is the documented no-op existence check; pid is read-only input.
	unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(test)]
mod tests {
	use std::process::Command;

	use mtp_ipc::Region;

	use super::*;
	use crate::sockets::SocketRegistry;

	/// Spawn a short-lived child, wait it out so it is fully reaped by us, then return its former
	/// pid — a real, kernel-confirmed-dead pid to probe `process_is_alive` against (scenario 5,
	/// spec §8: "client crash").
	fn dead_pid() -> u32 {
		let mut child = Command::new("true").spawn().expect("spawn a short-lived child");
		let pid = child.id();
		child.wait().expect("wait for child to exit");
		pid
	}

	#[test]
	fn dead_owner_pid_is_not_reported_alive() {
		assert!(!process_is_alive(dead_pid()));
	}

	#[test]
	fn live_owner_pid_is_reported_alive() {
		assert!(process_is_alive(std::process::id()));
	}

	#[test]
	fn one_pass_reclaims_a_dead_owners_entry_and_drops_its_socket() {
		let region = Region::create("rtest_reaper_dead_owner").expect("create region");
		let sockets = SocketRegistry::new();

		let fd = sockets.create().expect("create daemon-side socket");
		{
			let mut table = region.table();
			let entry = table.get_mut(0).expect("slot exists");
			entry.claim(dead_pid());
			entry.finish_allocate(fd);
		}

		reap_pass(&region, &sockets);

		assert!(region.table().get(0).expect("slot exists").is_free(), "entry owned by a dead pid should be reclaimed");
		assert!(sockets.raw_fds().is_empty(), "the reclaimed entry's socket should no longer be retained");

		region.teardown();
	}

	#[test]
	fn one_pass_leaves_a_live_owners_entry_untouched() {
		let region = Region::create("rtest_reaper_live_owner").expect("create region");
		let sockets = SocketRegistry::new();

		let fd = sockets.create().expect("create daemon-side socket");
		{
			let mut table = region.table();
			let entry = table.get_mut(0).expect("slot exists");
			entry.claim(std::process::id());
			entry.finish_allocate(fd);
		}

		reap_pass(&region, &sockets);

		assert!(!region.table().get(0).expect("slot exists").is_free(), "entry owned by a live pid should survive");
		assert_eq!(sockets.raw_fds(), vec![fd]);

		region.teardown();
	}

	#[test]
	fn one_pass_leaves_free_slots_untouched() {
		let region = Region::create("rtest_reaper_free_slots").expect("create region");
		let sockets = SocketRegistry::new();

		reap_pass(&region, &sockets);

		assert!(region.table().get(0).expect("slot exists").is_free());
		region.teardown();
	}
}
