use bilge::prelude::*;
use utils::bytes::Cast;

/// Single wire-header byte: `seq:4 | wnd:3 | ack:1`, packed LSB-first (seq occupies bits 0-3).
#[bitsize(8)]
#[derive(Clone, Copy, FromBits, Cast)]
#[repr(C)]
pub struct Header {
	pub seq: u4,
	pub wnd: u3,
	pub ack: bool,
}

impl Header {
	/// Build a data-datagram header: `seq` mod 16, no window/ack bits set.
	pub fn data(seq_mod16: u8) -> Self {
		Self::new(u4::new(seq_mod16), u3::new(0), false)
	}

	/// Build an ACK header carrying a cumulative sequence number and advertised window.
	pub fn ack(seq_mod16: u8, window: u8) -> Self {
		Self::new(u4::new(seq_mod16), u3::new(window), true)
	}

	pub fn to_byte(self) -> u8 {
		let byte: u8 = self.into();
		byte
	}

	pub fn from_byte(byte: u8) -> Self {
		byte.into()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn data_header_round_trips() {
		let header = Header::data(9);
		let decoded = Header::from_byte(header.to_byte());
		assert_eq!(decoded.seq().value(), 9);
		assert!(!decoded.ack());
	}

	#[test]
	fn ack_header_round_trips_window() {
		let header = Header::ack(3, 5);
		let decoded = Header::from_byte(header.to_byte());
		assert_eq!(decoded.seq().value(), 3);
		assert_eq!(decoded.wnd().value(), 5);
		assert!(decoded.ack());
	}
}
