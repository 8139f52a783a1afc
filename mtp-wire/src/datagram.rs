use mtp_shared::MESSAGE_SIZE;

use crate::header::Header;

/// Largest possible datagram: one header byte plus a full payload.
pub const MAX_DATAGRAM_SIZE: usize = 1 + MESSAGE_SIZE;

/// A decoded datagram: either an ACK (no payload) or data (payload borrowed from the receive
/// buffer passed to `decode`).
pub enum Decoded<'a> {
	Ack { seq_mod16: u8, window: u8 },
	Data { seq_mod16: u8, payload: &'a [u8] },
}

/// Encode a data datagram into `out`, returning the number of bytes written. `out` must be at
/// least `1 + payload.len()` bytes.
pub fn encode_data(out: &mut [u8], seq_mod16: u8, payload: &[u8]) -> usize {
	out[0] = Header::data(seq_mod16).to_byte();
	out[1..1 + payload.len()].copy_from_slice(payload);
	1 + payload.len()
}

/// Encode an ACK datagram (a single header byte) into `out`, returning 1.
pub fn encode_ack(out: &mut [u8], seq_mod16: u8, window: u8) -> usize {
	out[0] = Header::ack(seq_mod16, window).to_byte();
	1
}

/// Decode a received datagram's header, with `payload` borrowing whatever followed it.
pub fn decode(buf: &[u8]) -> Option<Decoded<'_>> {
	let (&first, rest) = buf.split_first()?;
	let header = Header::from_byte(first);

	Some(if header.ack() {
		Decoded::Ack { seq_mod16: header.seq().value(), window: header.wnd().value() }
	} else {
		Decoded::Data { seq_mod16: header.seq().value(), payload: rest }
	})
}
