use std::net::{Ipv4Addr, SocketAddrV4};
use std::thread;

use mtp_ipc::Region;
use mtp_shared::MESSAGE_SIZE;
use mtp_wire::MAX_DATAGRAM_SIZE;
use runtime::signal::Shutdown;

use crate::config::Config;
use crate::sockets::SocketRegistry;

/// The Sender worker (§4.5): every tick, rebuilds each socket's send window from its buffer and
/// blindly retransmits every populated slot in it. There is no per-message timer — a slot keeps
/// being resent until an ACK removes it or the window shrinks past its position.
pub fn run(region: &Region, sockets: &SocketRegistry, config: &Config, shutdown: &Shutdown) {
	while !shutdown.requested() {
		thread::sleep(config.tick);
		retransmit_tick(region, sockets);
	}
}

/// One Sender tick's worth of work, factored out of [`run`] so tests can drive a single
/// retransmission pass without waiting out a real tick.
pub(crate) fn retransmit_tick(region: &Region, sockets: &SocketRegistry) {
	let mut table = region.table();
	for (index, entry) in table.iter_mut().filter(|(_, e)| !e.is_free()) {
		if !entry.has_socket() || !entry.is_bound() {
			continue;
		}

		entry.rebuild_swnd();

		let dst = SocketAddrV4::new(Ipv4Addr::from(entry.dest_ip), entry.dest_port as u16);
		let mut buf = [0u8; MAX_DATAGRAM_SIZE];

		for it in 0..entry.swnd_size as usize {
			let seq = entry.swnd_seq[it];
			if seq < 0 {
				continue;
			}

			let Some(slot) = entry.send_slot_for_seq(seq as u32) else { continue };
			let n = mtp_wire::encode_data(&mut buf, (seq & 0xf) as u8, &entry.send_buffer[slot][..MESSAGE_SIZE]);

			if let Err(err) = sockets.send_to(entry.udp_fd, &buf[..n], dst) {
				log::warn!("socket {index}: sendto seq {seq} failed: {err}");
			}
		}
	}
}
