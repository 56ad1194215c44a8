//! MQTT connection-lifecycle packets for MQTT 3.1.1 and MQTT 5.0.
//!
//! Each packet implements [`ControlPacket`]: it knows how to write its
//! variable header and payload for a given [`ProtocolVersion`] and how to
//! read them back. Framing (fixed header and remaining length) is shared.

mod connack;
mod connect;
mod disconnect;

use serde::Deserialize;

use crate::error::{EncodeError, ProtocolError, Result};
use crate::primitive::Decoder;
use crate::varint;

pub use connack::{reason_code, Connack, ConnackCode, ConnackProperties};
pub use connect::{connect_protocol_version, Connect, ConnectProperties, Will, WillProperties};
pub use disconnect::{Disconnect, DisconnectProperties};

/// MQTT Control Packet Types (4 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    Connack = 2,
    Publish = 3,
    Puback = 4,
    Pubrec = 5,
    Pubrel = 6,
    Pubcomp = 7,
    Subscribe = 8,
    Suback = 9,
    Unsubscribe = 10,
    Unsuback = 11,
    Pingreq = 12,
    Pingresp = 13,
    Disconnect = 14,
    Auth = 15,
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::Connack),
            3 => Ok(PacketType::Publish),
            4 => Ok(PacketType::Puback),
            5 => Ok(PacketType::Pubrec),
            6 => Ok(PacketType::Pubrel),
            7 => Ok(PacketType::Pubcomp),
            8 => Ok(PacketType::Subscribe),
            9 => Ok(PacketType::Suback),
            10 => Ok(PacketType::Unsubscribe),
            11 => Ok(PacketType::Unsuback),
            12 => Ok(PacketType::Pingreq),
            13 => Ok(PacketType::Pingresp),
            14 => Ok(PacketType::Disconnect),
            15 => Ok(PacketType::Auth),
            _ => Err(ProtocolError::InvalidPacketType(value)),
        }
    }
}

/// Negotiated protocol revision.
///
/// The discriminant is the protocol level byte carried in CONNECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "u8")]
#[repr(u8)]
pub enum ProtocolVersion {
    /// MQTT 3.1.1: fixed layouts, no properties.
    #[default]
    V311 = 4,
    /// MQTT 5.0: adds property blocks.
    V5 = 5,
}

impl ProtocolVersion {
    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn has_properties(self) -> bool {
        self == ProtocolVersion::V5
    }
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = ProtocolError;

    fn try_from(level: u8) -> std::result::Result<Self, Self::Error> {
        match level {
            4 => Ok(ProtocolVersion::V311),
            5 => Ok(ProtocolVersion::V5),
            _ => Err(ProtocolError::UnsupportedProtocolVersion(level)),
        }
    }
}

/// Quality of Service levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
#[allow(clippy::enum_variant_names)] // MQTT protocol names
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = ProtocolError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(ProtocolError::MalformedPacket(format!(
                "Invalid QoS: {}",
                value
            ))),
        }
    }
}

/// A packet with a fixed type and a revision-dependent body.
///
/// `encode_body` / `decode_body` handle everything after the remaining
/// length. The provided `encode` and `decode` add and check the fixed header.
pub trait ControlPacket: Sized {
    const PACKET_TYPE: PacketType;

    fn packet_type(&self) -> PacketType {
        Self::PACKET_TYPE
    }

    /// Append the variable header and payload to `body`.
    fn encode_body(
        &self,
        version: ProtocolVersion,
        body: &mut Vec<u8>,
    ) -> std::result::Result<(), EncodeError>;

    /// Called once the whole packet has been appended to the output.
    /// Packets whose encoding has a side effect on their fields apply it here.
    fn encoded(&mut self) {}

    /// Parse a complete variable header and payload.
    fn decode_body(body: &[u8], version: ProtocolVersion) -> Result<Self>;

    /// Encode the whole packet, appending to `buf` only on success.
    fn encode(&mut self, version: ProtocolVersion, buf: &mut Vec<u8>) -> Result<()> {
        let mut body = Vec::new();
        self.encode_body(version, &mut body)?;
        write_frame(Self::PACKET_TYPE, &body, buf)?;
        self.encoded();
        Ok(())
    }

    /// Decode one complete packet. `frame` must hold exactly the fixed
    /// header and the number of bytes its remaining length announces.
    fn decode(frame: &[u8], version: ProtocolVersion) -> Result<Self> {
        let body = read_frame(frame, Self::PACKET_TYPE)?;
        Self::decode_body(body, version)
    }
}

/// Connection-lifecycle packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Connect),
    Connack(Connack),
    Disconnect(Disconnect),
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(p) => p.packet_type(),
            Packet::Connack(p) => p.packet_type(),
            Packet::Disconnect(p) => p.packet_type(),
        }
    }

    pub fn encode(&mut self, version: ProtocolVersion, buf: &mut Vec<u8>) -> Result<()> {
        match self {
            Packet::Connect(p) => p.encode(version, buf),
            Packet::Connack(p) => p.encode(version, buf),
            Packet::Disconnect(p) => p.encode(version, buf),
        }
    }

    /// Decode one complete frame, dispatching on its packet type.
    pub fn decode(frame: &[u8], version: ProtocolVersion) -> Result<Self> {
        let packet_type = match peek_packet_type(frame)? {
            Some(packet_type) => packet_type,
            None => return Err(ProtocolError::IncompletePacket { needed: 1, have: 0 }.into()),
        };
        match packet_type {
            PacketType::Connect => Ok(Packet::Connect(Connect::decode(frame, version)?)),
            PacketType::Connack => Ok(Packet::Connack(Connack::decode(frame, version)?)),
            PacketType::Disconnect => {
                Ok(Packet::Disconnect(Disconnect::decode(frame, version)?))
            }
            other => Err(ProtocolError::MalformedPacket(format!(
                "Unexpected packet type: {:?}",
                other
            ))
            .into()),
        }
    }
}

impl From<Connect> for Packet {
    fn from(p: Connect) -> Self {
        Packet::Connect(p)
    }
}

impl From<Connack> for Packet {
    fn from(p: Connack) -> Self {
        Packet::Connack(p)
    }
}

impl From<Disconnect> for Packet {
    fn from(p: Disconnect) -> Self {
        Packet::Disconnect(p)
    }
}

/// Read the packet type from the first byte of `buf`, if any.
pub fn peek_packet_type(buf: &[u8]) -> Result<Option<PacketType>> {
    match buf.first() {
        Some(&b) => Ok(Some(PacketType::try_from(b >> 4)?)),
        None => Ok(None),
    }
}

/// Write fixed header, remaining length and body.
fn write_frame(
    packet_type: PacketType,
    body: &[u8],
    buf: &mut Vec<u8>,
) -> std::result::Result<(), EncodeError> {
    let mut len_buf = Vec::with_capacity(varint::MAX_LEN);
    varint::encode(body.len(), &mut len_buf)?;

    buf.reserve(1 + len_buf.len() + body.len());
    buf.push((packet_type as u8) << 4);
    buf.extend_from_slice(&len_buf);
    buf.extend_from_slice(body);
    Ok(())
}

/// Check the fixed header of a single complete frame and return its body.
fn read_frame(frame: &[u8], expected: PacketType) -> std::result::Result<&[u8], ProtocolError> {
    let mut dec = Decoder::new(frame);
    let fixed_header = dec.read_u8()?;
    let packet_type = PacketType::try_from(fixed_header >> 4)?;
    if packet_type != expected {
        return Err(ProtocolError::MalformedPacket(format!(
            "Expected {:?}, got {:?}",
            expected, packet_type
        )));
    }

    // CONNECT, CONNACK and DISCONNECT reserve all four flag bits
    let flags = fixed_header & 0x0F;
    if flags != 0 {
        return Err(ProtocolError::MalformedPacket(format!(
            "{:?} fixed header flags must be 0, got {:#04x}",
            packet_type, flags
        )));
    }

    let remaining_len = dec.read_variable_byte_integer()?;
    let body = dec.read_bytes(remaining_len)?;
    if !dec.is_empty() {
        return Err(ProtocolError::MalformedPacket(format!(
            "{} trailing bytes after {:?}",
            dec.remaining(),
            packet_type
        )));
    }
    Ok(body)
}

/// Fail if `props` holds anything under a revision without properties.
pub(crate) fn check_properties_allowed<P: Default + PartialEq>(
    props: &P,
    version: ProtocolVersion,
    packet_type: PacketType,
) -> std::result::Result<(), EncodeError> {
    if !version.has_properties() && *props != P::default() {
        return Err(EncodeError::PropertiesNotAllowed(packet_type));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_version_levels() {
        assert_eq!(ProtocolVersion::try_from(4).unwrap(), ProtocolVersion::V311);
        assert_eq!(ProtocolVersion::try_from(5).unwrap(), ProtocolVersion::V5);
        assert_eq!(
            ProtocolVersion::try_from(3),
            Err(ProtocolError::UnsupportedProtocolVersion(3))
        );
        assert_eq!(ProtocolVersion::V5.level(), 5);
        assert!(!ProtocolVersion::V311.has_properties());
    }

    #[test]
    fn test_peek_packet_type() {
        assert_eq!(peek_packet_type(&[]).unwrap(), None);
        assert_eq!(
            peek_packet_type(&[0x20, 0x02]).unwrap(),
            Some(PacketType::Connack)
        );
        assert!(peek_packet_type(&[0x00]).is_err());
    }

    #[test]
    fn test_write_frame() {
        let mut buf = vec![0xAA];
        write_frame(PacketType::Disconnect, &[], &mut buf).unwrap();
        assert_eq!(buf, vec![0xAA, 0xE0, 0x00]);

        let body = vec![0u8; 200];
        let mut buf = Vec::new();
        write_frame(PacketType::Connect, &body, &mut buf).unwrap();
        assert_eq!(&buf[..3], &[0x10, 0xC8, 0x01]);
        assert_eq!(buf.len(), 203);
    }

    #[test]
    fn test_read_frame_rejects_wrong_type() {
        assert!(matches!(
            read_frame(&[0x20, 0x00], PacketType::Disconnect),
            Err(ProtocolError::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_read_frame_rejects_flags() {
        assert!(matches!(
            read_frame(&[0xE1, 0x00], PacketType::Disconnect),
            Err(ProtocolError::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_read_frame_length_mismatch() {
        assert_eq!(
            read_frame(&[0x20, 0x02, 0x00], PacketType::Connack),
            Err(ProtocolError::IncompletePacket { needed: 2, have: 1 })
        );
        assert!(matches!(
            read_frame(&[0x20, 0x02, 0x00, 0x00, 0x00], PacketType::Connack),
            Err(ProtocolError::MalformedPacket(_))
        ));
        assert_eq!(
            read_frame(&[0x20, 0x80, 0x80, 0x80, 0x80], PacketType::Connack),
            Err(ProtocolError::InvalidRemainingLength)
        );
    }

    #[test]
    fn test_packet_decode_dispatch() {
        let packet = Packet::decode(&[0x20, 0x02, 0x01, 0x00], ProtocolVersion::V311).unwrap();
        assert_eq!(packet.packet_type(), PacketType::Connack);

        let packet = Packet::decode(&[0xE0, 0x00], ProtocolVersion::V311).unwrap();
        assert_eq!(packet, Packet::Disconnect(Disconnect::default()));

        assert!(Packet::decode(&[0xC0, 0x00], ProtocolVersion::V311).is_err());
        assert!(Packet::decode(&[], ProtocolVersion::V311).is_err());
    }
}
