//! Revision-aware packet codec.
//!
//! [`Codec`] fixes the negotiated [`ProtocolVersion`] and an inbound size
//! limit, then dispatches to the packet encoders and decoders. It carries no
//! mutable state and can be shared between threads.

use crate::config::CodecConfig;
use crate::error::{ProtocolError, Result};
use crate::packet::{Packet, PacketType, ProtocolVersion};
use crate::varint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    version: ProtocolVersion,
    max_packet_size: u32,
}

impl Codec {
    /// Codec for `version` without a packet size limit.
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            version,
            max_packet_size: 0,
        }
    }

    pub fn from_config(config: &CodecConfig) -> Result<Self> {
        config.validate().map_err(crate::error::Error::Config)?;
        Ok(Self {
            version: config.protocol_version,
            max_packet_size: config.max_packet_size,
        })
    }

    /// Reject inbound packets larger than `max` bytes (0 = no limit).
    pub fn with_max_packet_size(mut self, max: u32) -> Self {
        self.max_packet_size = max;
        self
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn max_packet_size(&self) -> u32 {
        self.max_packet_size
    }

    /// Encode `packet`, appending to `buf` only on success.
    pub fn encode(&self, packet: &mut Packet, buf: &mut Vec<u8>) -> Result<()> {
        packet.encode(self.version, buf)
    }

    /// Try to decode one packet from the front of `buf`.
    ///
    /// Returns `Ok(Some((packet, bytes_consumed)))` if a complete packet is
    /// available, `Ok(None)` if more data is needed, or `Err` on protocol
    /// errors.
    pub fn decode(&self, buf: &[u8]) -> Result<Option<(Packet, usize)>> {
        let Some(&fixed_header) = buf.first() else {
            return Ok(None);
        };
        let packet_type = PacketType::try_from(fixed_header >> 4)?;

        let Some((remaining_len, len_bytes)) = varint::decode(&buf[1..])? else {
            return Ok(None);
        };

        let total_len = 1 + len_bytes + remaining_len;
        if self.max_packet_size > 0 && total_len > self.max_packet_size as usize {
            log::debug!(
                "Rejecting {:?} of {} bytes (max {})",
                packet_type,
                total_len,
                self.max_packet_size
            );
            return Err(ProtocolError::PacketTooLarge {
                size: total_len,
                max: self.max_packet_size as usize,
            }
            .into());
        }

        if buf.len() < total_len {
            return Ok(None);
        }

        let frame = &buf[..total_len];
        let packet = Packet::decode(frame, self.version)?;
        log::trace!("Decoded {:?} ({} bytes)", packet_type, total_len);
        Ok(Some((packet, total_len)))
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(ProtocolVersion::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::packet::{Connack, ConnackCode, Disconnect, DisconnectProperties};

    #[test]
    fn test_decode_empty_and_partial() {
        let codec = Codec::new(ProtocolVersion::V311);
        assert!(codec.decode(&[]).unwrap().is_none());
        assert!(codec.decode(&[0x20]).unwrap().is_none());
        assert!(codec.decode(&[0x20, 0x02, 0x00]).unwrap().is_none());
    }

    #[test]
    fn test_decode_stream_of_packets() {
        let codec = Codec::new(ProtocolVersion::V311);
        let mut buf = Vec::new();
        codec
            .encode(&mut Connack::new(false, ConnackCode::Accepted).into(), &mut buf)
            .unwrap();
        codec
            .encode(&mut Disconnect::default().into(), &mut buf)
            .unwrap();

        let (first, used) = codec.decode(&buf).unwrap().unwrap();
        assert_eq!(used, 4);
        assert_eq!(first.packet_type(), PacketType::Connack);

        let (second, used2) = codec.decode(&buf[used..]).unwrap().unwrap();
        assert_eq!(used2, 2);
        assert_eq!(second, Packet::Disconnect(Disconnect::default()));
    }

    #[test]
    fn test_decode_packet_too_large() {
        let codec = Codec::new(ProtocolVersion::V5).with_max_packet_size(8);
        let mut buf = Vec::new();
        let mut packet: Packet = Disconnect::new(0x80)
            .properties(DisconnectProperties {
                reason_string: "too long for the limit".into(),
                ..Default::default()
            })
            .into();
        codec.encode(&mut packet, &mut buf).unwrap();

        // Size is checked from the header alone
        assert!(matches!(
            codec.decode(&buf[..2]),
            Err(Error::Protocol(ProtocolError::PacketTooLarge { max: 8, .. }))
        ));
    }

    #[test]
    fn test_decode_rejects_other_packet_types() {
        let codec = Codec::new(ProtocolVersion::V311);
        assert!(matches!(
            codec.decode(&[0xC0, 0x00]),
            Err(Error::Protocol(ProtocolError::MalformedPacket(_)))
        ));
        assert!(matches!(
            codec.decode(&[0x00, 0x00]),
            Err(Error::Protocol(ProtocolError::InvalidPacketType(0)))
        ));
    }

    #[test]
    fn test_from_config() {
        let config = CodecConfig {
            protocol_version: ProtocolVersion::V5,
            max_packet_size: 512,
        };
        let codec = Codec::from_config(&config).unwrap();
        assert_eq!(codec.version(), ProtocolVersion::V5);
        assert_eq!(codec.max_packet_size(), 512);

        let config = CodecConfig {
            max_packet_size: u32::MAX,
            ..Default::default()
        };
        assert!(matches!(Codec::from_config(&config), Err(Error::Config(_))));
    }
}
