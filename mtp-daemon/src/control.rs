use std::net::{Ipv4Addr, SocketAddrV4};

use mtp_ipc::Region;
use runtime::signal::Shutdown;

use crate::sockets::SocketRegistry;

/// The control loop: services `m_socket`/`m_bind` requests from any client via the rendezvous
/// protocol (§4.4). Runs until shutdown is requested, checked between handoffs — a request already
/// in flight is always completed before the loop exits.
pub fn run(region: &Region, sockets: &SocketRegistry, shutdown: &Shutdown) {
	while !shutdown.requested() {
		region.wait_for_request();

		{
			let mut ctrl = region.control();

			if ctrl.is_bind_request() {
				let addr = SocketAddrV4::new(Ipv4Addr::from(ctrl.ip), ctrl.port as u16);
				match sockets.bind(ctrl.handle, addr) {
					Ok(()) => {
						ctrl.err = 0;
						log::debug!("bound handle {} to {addr}", ctrl.handle);
					}
					Err(err) => {
						log::warn!("bind failed for handle {}: {err}", ctrl.handle);
						ctrl.fail(err.raw_os_error().unwrap_or(libc::EIO));
					}
				}
			} else {
				match sockets.create() {
					Ok(fd) => {
						ctrl.succeed_with_handle(fd);
						log::debug!("created socket handle {fd}");
					}
					Err(err) => {
						log::warn!("socket creation failed: {err}");
						ctrl.fail(err.raw_os_error().unwrap_or(libc::EIO));
					}
				}
			}
		}

		region.complete_request();
	}
}
