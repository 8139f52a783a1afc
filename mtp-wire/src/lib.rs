//! The one-byte MTP wire header and datagram framing.

mod datagram;
mod header;

pub use datagram::{decode, encode_ack, encode_data, MAX_DATAGRAM_SIZE};
pub use header::Header;
