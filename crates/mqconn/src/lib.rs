//! mqconn - MQTT 3.1.1 / 5.0 connection-lifecycle codec.
//!
//! Encodes and decodes CONNECT, CONNACK and DISCONNECT byte-for-byte for
//! both protocol revisions, including the MQTT 5.0 property blocks. The
//! [`Codec`] picks the right layout for the negotiated [`ProtocolVersion`].
//!
//! ```
//! use mqconn::{Codec, Connack, ConnackCode, Packet, ProtocolVersion};
//!
//! let codec = Codec::new(ProtocolVersion::V311);
//! let mut buf = Vec::new();
//! codec
//!     .encode(&mut Packet::Connack(Connack::new(true, ConnackCode::Accepted)), &mut buf)
//!     .unwrap();
//! assert_eq!(buf, [0x20, 0x02, 0x01, 0x00]);
//!
//! let (packet, used) = codec.decode(&buf).unwrap().unwrap();
//! assert_eq!(used, 4);
//! assert_eq!(packet.packet_type(), mqconn::PacketType::Connack);
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod packet;
pub mod primitive;
pub mod property;
pub mod varint;

pub use crate::codec::Codec;
pub use crate::config::CodecConfig;
pub use crate::error::{EncodeError, Error, ProtocolError, Result};
pub use crate::packet::*;
