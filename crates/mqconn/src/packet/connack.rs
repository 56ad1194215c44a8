//! CONNACK packet.

use bytes::Bytes;

use super::{check_properties_allowed, ControlPacket, PacketType, ProtocolVersion, QoS};
use crate::error::{EncodeError, ProtocolError, Result};
use crate::primitive::Decoder;
use crate::property::{
    read_property_block, write_property_block, PropertyId, PropertySet, PropertyWriter,
    RawProperties,
};

/// CONNACK return codes (MQTT 3.1.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnackCode {
    Accepted = 0,
    UnacceptableProtocolVersion = 1,
    IdentifierRejected = 2,
    ServerUnavailable = 3,
    BadUsernamePassword = 4,
    NotAuthorized = 5,
}

impl From<ConnackCode> for u8 {
    fn from(code: ConnackCode) -> u8 {
        code as u8
    }
}

/// MQTT v5 reason codes valid in CONNACK and DISCONNECT.
/// Constants rather than an enum since 0x00 means "success" in CONNACK and
/// "normal disconnection" in DISCONNECT.
pub mod reason_code {
    pub const SUCCESS: u8 = 0x00;
    pub const NORMAL_DISCONNECTION: u8 = 0x00;
    pub const DISCONNECT_WITH_WILL: u8 = 0x04;
    pub const UNSPECIFIED_ERROR: u8 = 0x80;
    pub const MALFORMED_PACKET: u8 = 0x81;
    pub const PROTOCOL_ERROR: u8 = 0x82;
    pub const IMPLEMENTATION_SPECIFIC_ERROR: u8 = 0x83;
    pub const UNSUPPORTED_PROTOCOL_VERSION: u8 = 0x84;
    pub const CLIENT_IDENTIFIER_NOT_VALID: u8 = 0x85;
    pub const BAD_USER_NAME_OR_PASSWORD: u8 = 0x86;
    pub const NOT_AUTHORIZED: u8 = 0x87;
    pub const SERVER_UNAVAILABLE: u8 = 0x88;
    pub const SERVER_BUSY: u8 = 0x89;
    pub const BANNED: u8 = 0x8A;
    pub const SERVER_SHUTTING_DOWN: u8 = 0x8B;
    pub const BAD_AUTHENTICATION_METHOD: u8 = 0x8C;
    pub const KEEP_ALIVE_TIMEOUT: u8 = 0x8D;
    pub const SESSION_TAKEN_OVER: u8 = 0x8E;
    pub const TOPIC_NAME_INVALID: u8 = 0x90;
    pub const RECEIVE_MAXIMUM_EXCEEDED: u8 = 0x93;
    pub const PACKET_TOO_LARGE: u8 = 0x95;
    pub const QUOTA_EXCEEDED: u8 = 0x97;
    pub const ADMINISTRATIVE_ACTION: u8 = 0x98;
    pub const PAYLOAD_FORMAT_INVALID: u8 = 0x99;
    pub const RETAIN_NOT_SUPPORTED: u8 = 0x9A;
    pub const QOS_NOT_SUPPORTED: u8 = 0x9B;
    pub const USE_ANOTHER_SERVER: u8 = 0x9C;
    pub const SERVER_MOVED: u8 = 0x9D;
    pub const CONNECTION_RATE_EXCEEDED: u8 = 0x9F;
    pub const MAXIMUM_CONNECT_TIME: u8 = 0xA0;
}

/// MQTT v5 CONNACK properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnackProperties {
    /// Overrides the session expiry interval the client asked for.
    pub session_expiry_interval: u32,
    pub receive_maximum: u16,
    pub maximum_qos: QoS,
    pub retain_available: bool,
    pub maximum_packet_size: u32,
    /// Set when the client connected with an empty client id.
    pub assigned_client_identifier: String,
    pub topic_alias_maximum: u16,
    pub reason_string: String,
    pub user_properties: Vec<(String, String)>,
    pub wildcard_subscription_available: bool,
    pub subscription_identifiers_available: bool,
    pub shared_subscription_available: bool,
    /// Keep alive assigned by the server, replacing the client's.
    pub server_keep_alive: u16,
    pub response_information: String,
    pub server_reference: String,
    pub authentication_method: String,
    pub authentication_data: Bytes,
}

impl PropertySet for ConnackProperties {
    fn props(&self, w: &mut PropertyWriter) -> std::result::Result<(), EncodeError> {
        w.u32(PropertyId::SessionExpiryInterval, self.session_expiry_interval);
        w.u16(PropertyId::ReceiveMaximum, self.receive_maximum);
        w.byte(PropertyId::MaximumQos, self.maximum_qos as u8);
        w.bool(PropertyId::RetainAvailable, self.retain_available);
        w.u32(PropertyId::MaximumPacketSize, self.maximum_packet_size);
        w.string(
            PropertyId::AssignedClientIdentifier,
            &self.assigned_client_identifier,
        )?;
        w.u16(PropertyId::TopicAliasMaximum, self.topic_alias_maximum);
        w.string(PropertyId::ReasonString, &self.reason_string)?;
        w.bool(
            PropertyId::WildcardSubscriptionAvailable,
            self.wildcard_subscription_available,
        );
        w.bool(
            PropertyId::SubscriptionIdentifierAvailable,
            self.subscription_identifiers_available,
        );
        w.bool(
            PropertyId::SharedSubscriptionAvailable,
            self.shared_subscription_available,
        );
        w.u16(PropertyId::ServerKeepAlive, self.server_keep_alive);
        w.string(PropertyId::ResponseInformation, &self.response_information)?;
        w.string(PropertyId::ServerReference, &self.server_reference)?;
        w.string(PropertyId::AuthenticationMethod, &self.authentication_method)?;
        w.binary(PropertyId::AuthenticationData, &self.authentication_data)?;
        w.user_properties(&self.user_properties)
    }

    fn set_props(&mut self, raw: &RawProperties<'_>) -> std::result::Result<(), ProtocolError> {
        if let Some(v) = raw.u32(PropertyId::SessionExpiryInterval) {
            self.session_expiry_interval = v;
        }
        if let Some(v) = raw.u16(PropertyId::ReceiveMaximum) {
            self.receive_maximum = v;
        }
        if let Some(v) = raw.byte(PropertyId::MaximumQos) {
            self.maximum_qos = QoS::try_from(v).map_err(|_| ProtocolError::MalformedProperty {
                id: PropertyId::MaximumQos as u8,
                reason: "maximum QoS must be 0, 1 or 2",
            })?;
        }
        if let Some(v) = raw.bool(PropertyId::RetainAvailable) {
            self.retain_available = v;
        }
        if let Some(v) = raw.u32(PropertyId::MaximumPacketSize) {
            self.maximum_packet_size = v;
        }
        if let Some(v) = raw.string(PropertyId::AssignedClientIdentifier)? {
            self.assigned_client_identifier = v;
        }
        if let Some(v) = raw.u16(PropertyId::TopicAliasMaximum) {
            self.topic_alias_maximum = v;
        }
        if let Some(v) = raw.string(PropertyId::ReasonString)? {
            self.reason_string = v;
        }
        if let Some(v) = raw.bool(PropertyId::WildcardSubscriptionAvailable) {
            self.wildcard_subscription_available = v;
        }
        if let Some(v) = raw.bool(PropertyId::SubscriptionIdentifierAvailable) {
            self.subscription_identifiers_available = v;
        }
        if let Some(v) = raw.bool(PropertyId::SharedSubscriptionAvailable) {
            self.shared_subscription_available = v;
        }
        if let Some(v) = raw.u16(PropertyId::ServerKeepAlive) {
            self.server_keep_alive = v;
        }
        if let Some(v) = raw.string(PropertyId::ResponseInformation)? {
            self.response_information = v;
        }
        if let Some(v) = raw.string(PropertyId::ServerReference)? {
            self.server_reference = v;
        }
        if let Some(v) = raw.string(PropertyId::AuthenticationMethod)? {
            self.authentication_method = v;
        }
        if let Some(v) = raw.binary(PropertyId::AuthenticationData) {
            self.authentication_data = v;
        }
        self.user_properties = raw.user_properties()?;
        Ok(())
    }
}

/// CONNACK packet data.
///
/// `code` is carried as-is: a [`ConnackCode`] under MQTT 3.1.1, a
/// [`reason_code`] under MQTT 5.0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Connack {
    pub session_present: bool,
    pub code: u8,
    /// MQTT v5 properties. Must stay at the default under v3.1.1.
    pub properties: ConnackProperties,
}

impl Connack {
    pub fn new(session_present: bool, code: impl Into<u8>) -> Self {
        Self {
            session_present,
            code: code.into(),
            properties: ConnackProperties::default(),
        }
    }

    pub fn properties(mut self, properties: ConnackProperties) -> Self {
        self.properties = properties;
        self
    }
}

impl ControlPacket for Connack {
    const PACKET_TYPE: PacketType = PacketType::Connack;

    fn encode_body(
        &self,
        version: ProtocolVersion,
        body: &mut Vec<u8>,
    ) -> std::result::Result<(), EncodeError> {
        check_properties_allowed(&self.properties, version, PacketType::Connack)?;

        body.push(if self.session_present { 1 } else { 0 });
        body.push(self.code);
        if version.has_properties() {
            write_property_block(&self.properties, body)?;
        }
        Ok(())
    }

    fn decode_body(body: &[u8], version: ProtocolVersion) -> Result<Self> {
        let mut dec = Decoder::new(body);

        // Bits 7-1 of the acknowledge flags are reserved
        let ack_flags = dec.read_u8()?;
        if ack_flags > 1 {
            return Err(ProtocolError::MalformedPacket(format!(
                "Invalid CONNACK acknowledge flags: {:#04x}",
                ack_flags
            ))
            .into());
        }
        let code = dec.read_u8()?;

        let properties = if !version.has_properties() {
            if !dec.is_empty() {
                return Err(ProtocolError::RevisionMismatch(
                    "MQTT 3.1.1 CONNACK carries exactly two bytes",
                )
                .into());
            }
            ConnackProperties::default()
        } else if dec.is_empty() {
            ConnackProperties::default()
        } else {
            read_property_block::<ConnackProperties>(&mut dec)?
        };

        if !dec.is_empty() {
            return Err(ProtocolError::MalformedPacket(format!(
                "{} unexpected bytes after CONNACK properties",
                dec.remaining()
            ))
            .into());
        }

        Ok(Connack {
            session_present: ack_flags == 1,
            code,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_encode_v311() {
        let mut connack = Connack::new(true, ConnackCode::Accepted);
        let mut buf = Vec::new();
        connack.encode(ProtocolVersion::V311, &mut buf).unwrap();
        assert_eq!(buf, vec![0x20, 0x02, 0x01, 0x00]);
    }

    #[test]
    fn test_encode_v5_without_properties() {
        let mut connack = Connack::new(false, reason_code::NOT_AUTHORIZED);
        let mut buf = Vec::new();
        connack.encode(ProtocolVersion::V5, &mut buf).unwrap();
        assert_eq!(buf, vec![0x20, 0x03, 0x00, 0x87, 0x00]);
    }

    #[test]
    fn test_v5_session_expiry_scenario() {
        let mut connack = Connack::new(false, reason_code::SUCCESS).properties(ConnackProperties {
            session_expiry_interval: 3600,
            ..Default::default()
        });
        let mut buf = Vec::new();
        connack.encode(ProtocolVersion::V5, &mut buf).unwrap();
        assert_eq!(
            buf,
            vec![0x20, 0x08, 0x00, 0x00, 0x05, 0x11, 0x00, 0x00, 0x0E, 0x10]
        );

        let decoded = Connack::decode(&buf, ProtocolVersion::V5).unwrap();
        assert!(!decoded.session_present);
        assert_eq!(decoded.code, 0);
        assert_eq!(
            decoded.properties,
            ConnackProperties {
                session_expiry_interval: 3600,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_roundtrip_v5_all_properties() {
        let mut connack = Connack::new(true, reason_code::SUCCESS).properties(ConnackProperties {
            session_expiry_interval: 60,
            receive_maximum: 100,
            maximum_qos: QoS::AtLeastOnce,
            retain_available: true,
            maximum_packet_size: 65536,
            assigned_client_identifier: "auto-1f3a".into(),
            topic_alias_maximum: 8,
            reason_string: "welcome".into(),
            user_properties: vec![("region".into(), "eu".into()), ("region".into(), "us".into())],
            wildcard_subscription_available: true,
            subscription_identifiers_available: true,
            shared_subscription_available: true,
            server_keep_alive: 45,
            response_information: "resp/".into(),
            server_reference: "other:1883".into(),
            authentication_method: "TOKEN".into(),
            authentication_data: Bytes::from_static(b"abc"),
        });
        let mut buf = Vec::new();
        connack.encode(ProtocolVersion::V5, &mut buf).unwrap();
        let decoded = Connack::decode(&buf, ProtocolVersion::V5).unwrap();
        assert_eq!(decoded, connack);
    }

    #[test]
    fn test_v311_rejects_properties() {
        let mut connack = Connack::new(false, 0u8).properties(ConnackProperties {
            retain_available: true,
            ..Default::default()
        });
        let mut buf = Vec::new();
        assert!(matches!(
            connack.encode(ProtocolVersion::V311, &mut buf),
            Err(Error::Encode(EncodeError::PropertiesNotAllowed(PacketType::Connack)))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_default_bag_roundtrips_in_both_revisions() {
        for version in [ProtocolVersion::V311, ProtocolVersion::V5] {
            let mut connack = Connack::new(false, 0u8);
            let mut buf = Vec::new();
            connack.encode(version, &mut buf).unwrap();
            assert_eq!(Connack::decode(&buf, version).unwrap(), connack);
        }
    }

    #[test]
    fn test_decode_v311_with_extra_bytes() {
        assert!(matches!(
            Connack::decode(&[0x20, 0x03, 0x00, 0x00, 0x00], ProtocolVersion::V311),
            Err(Error::Protocol(ProtocolError::RevisionMismatch(_)))
        ));
    }

    #[test]
    fn test_decode_v5_missing_property_length() {
        let decoded = Connack::decode(&[0x20, 0x02, 0x00, 0x00], ProtocolVersion::V5).unwrap();
        assert_eq!(decoded, Connack::new(false, 0u8));
    }

    #[test]
    fn test_decode_rejects_reserved_ack_flags() {
        assert!(matches!(
            Connack::decode(&[0x20, 0x02, 0x02, 0x00], ProtocolVersion::V311),
            Err(Error::Protocol(ProtocolError::MalformedPacket(_)))
        ));
    }

    #[test]
    fn test_decode_ignores_foreign_known_properties() {
        // Will delay interval is a known identifier but means nothing here
        let frame = [0x20, 0x08, 0x00, 0x00, 0x05, 0x18, 0x00, 0x00, 0x00, 0x0A];
        let decoded = Connack::decode(&frame, ProtocolVersion::V5).unwrap();
        assert_eq!(decoded.properties, ConnackProperties::default());
    }

    #[test]
    fn test_decode_invalid_maximum_qos() {
        let frame = [0x20, 0x05, 0x00, 0x00, 0x02, 0x24, 0x03];
        assert!(matches!(
            Connack::decode(&frame, ProtocolVersion::V5),
            Err(Error::Protocol(ProtocolError::MalformedProperty { id: 0x24, .. }))
        ));
    }

    #[test]
    fn test_decode_truncated_property_block() {
        let frame = [0x20, 0x04, 0x00, 0x00, 0x05, 0x11];
        assert!(matches!(
            Connack::decode(&frame, ProtocolVersion::V5),
            Err(Error::Protocol(ProtocolError::IncompletePacket { .. }))
        ));
    }
}
