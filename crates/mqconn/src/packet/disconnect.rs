//! DISCONNECT packet.
//!
//! MQTT 3.1.1 DISCONNECT has no variable header or payload. MQTT 5.0 adds a
//! reason code and properties, both of which may be left off when they hold
//! their defaults.

use super::{check_properties_allowed, reason_code, ControlPacket, PacketType, ProtocolVersion};
use crate::error::{EncodeError, ProtocolError, Result};
use crate::primitive::Decoder;
use crate::property::{
    read_property_block, PropertyId, PropertySet, PropertyWriter, RawProperties,
};

/// MQTT v5 DISCONNECT properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisconnectProperties {
    /// Only a client may send this. Enforcing that is up to the caller.
    pub session_expiry_interval: u32,
    pub reason_string: String,
    pub user_properties: Vec<(String, String)>,
    pub server_reference: String,
}

impl PropertySet for DisconnectProperties {
    fn props(&self, w: &mut PropertyWriter) -> std::result::Result<(), EncodeError> {
        w.u32(PropertyId::SessionExpiryInterval, self.session_expiry_interval);
        w.string(PropertyId::ReasonString, &self.reason_string)?;
        w.string(PropertyId::ServerReference, &self.server_reference)?;
        w.user_properties(&self.user_properties)
    }

    fn set_props(&mut self, raw: &RawProperties<'_>) -> std::result::Result<(), ProtocolError> {
        if let Some(v) = raw.u32(PropertyId::SessionExpiryInterval) {
            self.session_expiry_interval = v;
        }
        if let Some(v) = raw.string(PropertyId::ReasonString)? {
            self.reason_string = v;
        }
        if let Some(v) = raw.string(PropertyId::ServerReference)? {
            self.server_reference = v;
        }
        self.user_properties = raw.user_properties()?;
        Ok(())
    }
}

/// DISCONNECT packet data.
///
/// Reason code 0x00 is a normal disconnect, 0x04 asks the server to still
/// publish the will message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Disconnect {
    pub reason_code: u8,
    /// MQTT v5 properties. Must stay at the default under v3.1.1.
    pub properties: DisconnectProperties,
}

impl Disconnect {
    pub fn new(reason_code: u8) -> Self {
        Self {
            reason_code,
            properties: DisconnectProperties::default(),
        }
    }

    pub fn properties(mut self, properties: DisconnectProperties) -> Self {
        self.properties = properties;
        self
    }
}

impl ControlPacket for Disconnect {
    const PACKET_TYPE: PacketType = PacketType::Disconnect;

    fn encode_body(
        &self,
        version: ProtocolVersion,
        body: &mut Vec<u8>,
    ) -> std::result::Result<(), EncodeError> {
        check_properties_allowed(&self.properties, version, PacketType::Disconnect)?;

        if !version.has_properties() {
            if self.reason_code != reason_code::NORMAL_DISCONNECTION {
                return Err(EncodeError::NotRepresentable("DISCONNECT reason code"));
            }
            return Ok(());
        }

        let mut w = PropertyWriter::new();
        self.properties.props(&mut w)?;

        // Reason code and property length may be omitted when they are defaults
        if w.as_bytes().is_empty() {
            if self.reason_code != reason_code::NORMAL_DISCONNECTION {
                body.push(self.reason_code);
            }
            return Ok(());
        }

        body.push(self.reason_code);
        w.finish(body)
    }

    fn decode_body(body: &[u8], version: ProtocolVersion) -> Result<Self> {
        if !version.has_properties() {
            if !body.is_empty() {
                return Err(ProtocolError::RevisionMismatch(
                    "MQTT 3.1.1 DISCONNECT has no variable header",
                )
                .into());
            }
            return Ok(Disconnect::default());
        }

        let mut dec = Decoder::new(body);
        let reason_code = if dec.is_empty() {
            reason_code::NORMAL_DISCONNECTION
        } else {
            dec.read_u8()?
        };
        let properties = if dec.is_empty() {
            DisconnectProperties::default()
        } else {
            read_property_block::<DisconnectProperties>(&mut dec)?
        };

        if !dec.is_empty() {
            return Err(ProtocolError::MalformedPacket(format!(
                "{} unexpected bytes after DISCONNECT properties",
                dec.remaining()
            ))
            .into());
        }

        Ok(Disconnect {
            reason_code,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn encode(disconnect: &mut Disconnect, version: ProtocolVersion) -> Vec<u8> {
        let mut buf = Vec::new();
        disconnect.encode(version, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_v311_is_empty() {
        let buf = encode(&mut Disconnect::default(), ProtocolVersion::V311);
        assert_eq!(buf, vec![0xE0, 0x00]);
        let decoded = Disconnect::decode(&buf, ProtocolVersion::V311).unwrap();
        assert_eq!(decoded, Disconnect::default());
    }

    #[test]
    fn test_v311_rejects_reason_code_and_properties() {
        let mut buf = Vec::new();
        assert!(matches!(
            Disconnect::new(reason_code::DISCONNECT_WITH_WILL).encode(ProtocolVersion::V311, &mut buf),
            Err(Error::Encode(EncodeError::NotRepresentable(_)))
        ));
        assert!(matches!(
            Disconnect::default()
                .properties(DisconnectProperties {
                    reason_string: "bye".into(),
                    ..Default::default()
                })
                .encode(ProtocolVersion::V311, &mut buf),
            Err(Error::Encode(EncodeError::PropertiesNotAllowed(PacketType::Disconnect)))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_v311_decode_rejects_payload() {
        assert!(matches!(
            Disconnect::decode(&[0xE0, 0x01, 0x04], ProtocolVersion::V311),
            Err(Error::Protocol(ProtocolError::RevisionMismatch(_)))
        ));
    }

    #[test]
    fn test_v5_short_forms() {
        let buf = encode(&mut Disconnect::default(), ProtocolVersion::V5);
        assert_eq!(buf, vec![0xE0, 0x00]);
        let decoded = Disconnect::decode(&buf, ProtocolVersion::V5).unwrap();
        assert_eq!(decoded, Disconnect::default());

        let buf = encode(
            &mut Disconnect::new(reason_code::DISCONNECT_WITH_WILL),
            ProtocolVersion::V5,
        );
        assert_eq!(buf, vec![0xE0, 0x01, 0x04]);
        let decoded = Disconnect::decode(&buf, ProtocolVersion::V5).unwrap();
        assert_eq!(decoded, Disconnect::new(reason_code::DISCONNECT_WITH_WILL));
    }

    #[test]
    fn test_v5_with_properties() {
        let mut disconnect = Disconnect::new(reason_code::SERVER_MOVED).properties(
            DisconnectProperties {
                session_expiry_interval: 0,
                reason_string: "moved".into(),
                user_properties: vec![("a".into(), "1".into()), ("b".into(), "2".into())],
                server_reference: "b:1883".into(),
            },
        );
        let buf = encode(&mut disconnect, ProtocolVersion::V5);
        assert_eq!(&buf[..4], &[0xE0, buf.len() as u8 - 2, 0x9D, buf.len() as u8 - 4]);
        // reason string before server reference, user properties last
        assert_eq!(buf[4], 0x1F);

        let decoded = Disconnect::decode(&buf, ProtocolVersion::V5).unwrap();
        assert_eq!(decoded, disconnect);
    }

    #[test]
    fn test_v5_session_expiry_is_accepted() {
        let mut disconnect = Disconnect::default().properties(DisconnectProperties {
            session_expiry_interval: 30,
            ..Default::default()
        });
        let buf = encode(&mut disconnect, ProtocolVersion::V5);
        assert_eq!(
            buf,
            vec![0xE0, 0x07, 0x00, 0x05, 0x11, 0x00, 0x00, 0x00, 0x1E]
        );
        assert_eq!(
            Disconnect::decode(&buf, ProtocolVersion::V5).unwrap(),
            disconnect
        );
    }

    #[test]
    fn test_v5_decode_rejects_unknown_property() {
        assert!(matches!(
            Disconnect::decode(&[0xE0, 0x04, 0x00, 0x02, 0x00, 0x00], ProtocolVersion::V5),
            Err(Error::Protocol(ProtocolError::UnknownProperty(0x00)))
        ));
    }
}
