use std::net::{Ipv4Addr, SocketAddrV4};

use mtp_ipc::Region;
use mtp_shared::{MAX_SOCKETS, MAX_WINDOW_SIZE, NO_SEQ};
use mtp_wire::{Decoded, MAX_DATAGRAM_SIZE};
use rand::Rng;
use runtime::io::{poll_readable, Readiness};
use runtime::signal::Shutdown;

use crate::config::Config;
use crate::sockets::SocketRegistry;

/// The Receiver worker (§4.6): waits for readability across every bound socket with a per-tick
/// timeout, and on each wakeup either emits keepalive ACKs (timeout) or consumes one datagram per
/// readable socket and applies it to the relevant window.
pub fn run(region: &Region, sockets: &SocketRegistry, config: &Config, shutdown: &Shutdown) {
	while !shutdown.requested() {
		let bound: Vec<(usize, i32)> = {
			let table = region.table();
			(0..MAX_SOCKETS)
				.filter_map(|i| table.get(i))
				.enumerate()
				.filter(|(_, e)| !e.is_free() && e.has_socket() && e.is_bound())
				.map(|(i, e)| (i, e.udp_fd))
				.collect()
		};

		if bound.is_empty() {
			std::thread::sleep(config.tick);
			continue;
		}

		let fds: Vec<i32> = bound.iter().map(|&(_, fd)| fd).collect();
		let readiness = match poll_readable(&fds, Some(config.tick)) {
			Ok(r) => r,
			Err(()) => {
				log::error!("poll() failed in Receiver; terminating worker");
				return;
			}
		};

		if readiness.iter().all(|r| *r == Readiness::Idle) {
			emit_keepalive_acks(region, sockets);
			continue;
		}

		for ((index, fd), ready) in bound.into_iter().zip(readiness) {
			if ready != Readiness::Readable {
				continue;
			}
			receive_one(region, sockets, config, index, fd);
		}
	}
}

/// Timeout path: re-advertise every socket's current receive window as a duplicate cumulative ACK,
/// so a peer whose last ACK was lost (or who is waiting on freshly drained window space) still
/// hears about it.
pub(crate) fn emit_keepalive_acks(region: &Region, sockets: &SocketRegistry) {
	let mut table = region.table();
	for (index, entry) in table.iter_mut().filter(|(_, e)| !e.is_free() && e.has_socket() && e.is_bound()) {
		entry.rebuild_rwnd();

		// Cumulative base is the smallest *expected* (not-yet-received) sequence number, i.e. the
		// smallest empty slot's recv_seq — not the smallest over every slot, which would include a
		// filled-but-undelivered slot and under-acknowledge it (initmsocket.c's R timeout branch
		// minimizes only inside the empty-slot arm).
		let min_expected = entry.rwnd_seq.iter().filter(|&&s| s != NO_SEQ).min().map(|&s| s as u32).unwrap_or(1);
		let dst = SocketAddrV4::new(Ipv4Addr::from(entry.dest_ip), entry.dest_port as u16);

		let mut buf = [0u8; MAX_DATAGRAM_SIZE];
		let n = mtp_wire::encode_ack(&mut buf, ((min_expected.wrapping_sub(1)) & 0xf) as u8, entry.rwnd_size as u8);

		if let Err(err) = sockets.send_to(entry.udp_fd, &buf[..n], dst) {
			log::warn!("socket {index}: keepalive ACK sendto failed: {err}");
		}
	}
}

/// Receive and apply one pending datagram on socket `index` (`fd`). Public within the crate so
/// tests can drive a single receive step without a real `poll` wakeup.
pub(crate) fn receive_one(region: &Region, sockets: &SocketRegistry, config: &Config, index: usize, fd: i32) {
	let mut buf = [0u8; MAX_DATAGRAM_SIZE];
	let n = match sockets.recv_from(fd, &mut buf) {
		Ok((n, _peer)) => n,
		Err(err) => {
			log::warn!("socket {index}: recvfrom failed: {err}");
			return;
		}
	};

	if config.loss_probability > 0.0 && rand::thread_rng().gen_bool(config.loss_probability) {
		log::debug!("socket {index}: datagram dropped (injected loss)");
		return;
	}

	let Some(decoded) = mtp_wire::decode(&buf[..n]) else {
		log::debug!("socket {index}: undersized datagram, ignored");
		return;
	};

	match decoded {
		Decoded::Data { seq_mod16, payload } => handle_data(region, sockets, index, fd, seq_mod16, payload),
		Decoded::Ack { seq_mod16, window } => handle_ack(region, index, seq_mod16, window),
	}
}

fn handle_data(region: &Region, sockets: &SocketRegistry, index: usize, fd: i32, seq_mod16: u8, payload: &[u8]) {
	let (ack_seq, window, dst) = {
		let mut table = region.table();
		let Some(entry) = table.get_mut(index).filter(|e| !e.is_free()) else { return };

		entry.rebuild_rwnd();

		if let Some(slot) = entry.recv_slot_for_seq16(seq_mod16) {
			entry.fill_recv_slot(slot, payload);
			entry.rwnd_size = entry.rwnd_size.saturating_sub(1);
		} else {
			log::debug!("socket {index}: data seq%16={seq_mod16} out-of-window or duplicate, dropped");
		}

		(seq_mod16, entry.rwnd_size as u8, SocketAddrV4::new(Ipv4Addr::from(entry.dest_ip), entry.dest_port as u16))
	};

	let mut buf = [0u8; MAX_DATAGRAM_SIZE];
	let n = mtp_wire::encode_ack(&mut buf, ack_seq, window);
	if let Err(err) = sockets.send_to(fd, &buf[..n], dst) {
		log::warn!("socket {index}: ACK sendto failed: {err}");
	}
}

fn handle_ack(region: &Region, index: usize, seq_mod16: u8, window: u8) {
	let mut table = region.table();
	let Some(entry) = table.get_mut(index).filter(|e| !e.is_free()) else { return };

	match entry.send_slot_for_seq16(seq_mod16) {
		Some(slot) => entry.remove_send_slot(slot),
		None => log::debug!("socket {index}: duplicate ACK seq%16={seq_mod16}"),
	}

	// The wire's wnd field is 3 bits (0..7); a peer only ever advertises its count of empty
	// receive slots, which is bounded by MAX_RECEIVE_BUFFER_SIZE == MAX_WINDOW_SIZE, but clamp
	// defensively so a malformed datagram can never index swnd_seq out of bounds.
	entry.swnd_size = (window as u32).min(MAX_WINDOW_SIZE as u32);
	entry.rebuild_swnd();
}
