//! CONNECT packet.
//!
//! Layout after the fixed header:
//! protocol name, protocol level, connect flags, keep alive, properties (v5),
//! then the payload: client id, will (properties (v5), topic, message),
//! username, password. Optional payload sections are present only when their
//! flag bit is set.

use bytes::Bytes;

use super::{check_properties_allowed, ControlPacket, PacketType, ProtocolVersion, QoS};
use crate::error::{EncodeError, ProtocolError, Result};
use crate::primitive::{encode_length_prefixed, Decoder};
use crate::property::{
    read_property_block, write_property_block, PropertyId, PropertySet, PropertyWriter,
    RawProperties,
};

/// Protocol name for MQTT 3.1.1 and 5.0.
pub const PROTOCOL_NAME: &str = "MQTT";

const FLAG_RESERVED: u8 = 0x01;
const FLAG_CLEAN_SESSION: u8 = 0x02;
const FLAG_WILL: u8 = 0x04;
const FLAG_WILL_QOS_SHIFT: u8 = 3;
const FLAG_WILL_RETAIN: u8 = 0x20;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_USERNAME: u8 = 0x80;

/// MQTT v5 CONNECT properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectProperties {
    /// Seconds the session outlives the connection. 0 ends it on close,
    /// `u32::MAX` never expires.
    pub session_expiry_interval: u32,
    /// Concurrent QoS 1/2 publications the client will process.
    pub receive_maximum: u16,
    pub maximum_packet_size: u32,
    pub topic_alias_maximum: u16,
    pub request_response_information: bool,
    pub request_problem_information: bool,
    pub user_properties: Vec<(String, String)>,
    /// Extended authentication is only performed when this is set.
    pub authentication_method: String,
    pub authentication_data: Bytes,
}

impl PropertySet for ConnectProperties {
    fn props(&self, w: &mut PropertyWriter) -> std::result::Result<(), EncodeError> {
        w.u32(PropertyId::SessionExpiryInterval, self.session_expiry_interval);
        w.u16(PropertyId::ReceiveMaximum, self.receive_maximum);
        w.u32(PropertyId::MaximumPacketSize, self.maximum_packet_size);
        w.u16(PropertyId::TopicAliasMaximum, self.topic_alias_maximum);
        w.bool(
            PropertyId::RequestResponseInformation,
            self.request_response_information,
        );
        w.bool(
            PropertyId::RequestProblemInformation,
            self.request_problem_information,
        );
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
        if let Some(v) = raw.u32(PropertyId::MaximumPacketSize) {
            self.maximum_packet_size = v;
        }
        if let Some(v) = raw.u16(PropertyId::TopicAliasMaximum) {
            self.topic_alias_maximum = v;
        }
        if let Some(v) = raw.bool(PropertyId::RequestResponseInformation) {
            self.request_response_information = v;
        }
        if let Some(v) = raw.bool(PropertyId::RequestProblemInformation) {
            self.request_problem_information = v;
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

/// MQTT v5 Will properties, carried in the payload ahead of the will topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WillProperties {
    pub will_delay_interval: u32,
    pub payload_format_indicator: u8,
    pub message_expiry_interval: u32,
    pub content_type: String,
    pub response_topic: String,
    pub correlation_data: Bytes,
    pub user_properties: Vec<(String, String)>,
}

impl PropertySet for WillProperties {
    fn props(&self, w: &mut PropertyWriter) -> std::result::Result<(), EncodeError> {
        w.u32(PropertyId::WillDelayInterval, self.will_delay_interval);
        w.byte(
            PropertyId::PayloadFormatIndicator,
            self.payload_format_indicator,
        );
        w.u32(PropertyId::MessageExpiryInterval, self.message_expiry_interval);
        w.string(PropertyId::ContentType, &self.content_type)?;
        w.string(PropertyId::ResponseTopic, &self.response_topic)?;
        w.binary(PropertyId::CorrelationData, &self.correlation_data)?;
        w.user_properties(&self.user_properties)
    }

    fn set_props(&mut self, raw: &RawProperties<'_>) -> std::result::Result<(), ProtocolError> {
        if let Some(v) = raw.u32(PropertyId::WillDelayInterval) {
            self.will_delay_interval = v;
        }
        if let Some(v) = raw.byte(PropertyId::PayloadFormatIndicator) {
            self.payload_format_indicator = v;
        }
        if let Some(v) = raw.u32(PropertyId::MessageExpiryInterval) {
            self.message_expiry_interval = v;
        }
        if let Some(v) = raw.string(PropertyId::ContentType)? {
            self.content_type = v;
        }
        if let Some(v) = raw.string(PropertyId::ResponseTopic)? {
            self.response_topic = v;
        }
        if let Some(v) = raw.binary(PropertyId::CorrelationData) {
            self.correlation_data = v;
        }
        self.user_properties = raw.user_properties()?;
        Ok(())
    }
}

/// Will message configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Will {
    pub topic: String,
    pub message: Bytes,
    pub qos: QoS,
    pub retain: bool,
    /// MQTT v5 will properties. Must stay at the default under v3.1.1.
    pub properties: WillProperties,
}

impl Will {
    /// Create a new will message with QoS 0 and no retain.
    pub fn new(topic: impl Into<String>, message: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    pub fn properties(mut self, properties: WillProperties) -> Self {
        self.properties = properties;
        self
    }
}

/// CONNECT packet data.
///
/// The connect flags byte is derived from these fields on every encode.
/// A successful encode with an empty `client_id` sets `clean_session` to
/// true on the packet itself; a failed encode leaves the packet unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub protocol_name: String,
    pub protocol_version: ProtocolVersion,
    pub clean_session: bool,
    pub keep_alive: u16,
    pub client_id: String,
    pub will: Option<Will>,
    pub username: Option<String>,
    pub password: Option<Bytes>,
    /// MQTT v5 properties. Must stay at the default under v3.1.1.
    pub properties: ConnectProperties,
}

impl Default for Connect {
    fn default() -> Self {
        Self {
            protocol_name: PROTOCOL_NAME.to_string(),
            protocol_version: ProtocolVersion::V311,
            clean_session: false,
            keep_alive: 0,
            client_id: String::new(),
            will: None,
            username: None,
            password: None,
            properties: ConnectProperties::default(),
        }
    }
}

impl Connect {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Default::default()
        }
    }

    /// Switch to MQTT 5.0.
    pub fn mqtt5(mut self) -> Self {
        self.protocol_version = ProtocolVersion::V5;
        self
    }

    pub fn keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive = seconds;
        self
    }

    pub fn clean_session(mut self, clean: bool) -> Self {
        self.clean_session = clean;
        self
    }

    pub fn will(mut self, will: Will) -> Self {
        self.will = Some(will);
        self
    }

    pub fn credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<Bytes>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn properties(mut self, properties: ConnectProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Compute the connect flags byte.
    ///
    /// An empty client id always sets the clean session bit.
    pub fn flags(&self) -> u8 {
        let mut flags = 0u8;
        if self.clean_session || self.client_id.is_empty() {
            flags |= FLAG_CLEAN_SESSION;
        }
        if let Some(ref will) = self.will {
            flags |= FLAG_WILL;
            flags |= (will.qos as u8) << FLAG_WILL_QOS_SHIFT;
            if will.retain {
                flags |= FLAG_WILL_RETAIN;
            }
        }
        if self.password.is_some() {
            flags |= FLAG_PASSWORD;
        }
        if self.username.is_some() {
            flags |= FLAG_USERNAME;
        }
        flags
    }
}

impl ControlPacket for Connect {
    const PACKET_TYPE: PacketType = PacketType::Connect;

    fn encode_body(
        &self,
        version: ProtocolVersion,
        body: &mut Vec<u8>,
    ) -> std::result::Result<(), EncodeError> {
        if self.protocol_version != version {
            return Err(EncodeError::VersionMismatch {
                packet: self.protocol_version,
                codec: version,
            });
        }
        check_properties_allowed(&self.properties, version, PacketType::Connect)?;
        if let Some(ref will) = self.will {
            check_properties_allowed(&will.properties, version, PacketType::Connect)?;
        }

        let flags = self.flags();

        // Variable header
        encode_length_prefixed(self.protocol_name.as_bytes(), body)?;
        body.push(version.level());
        body.push(flags);
        body.extend_from_slice(&self.keep_alive.to_be_bytes());
        if version.has_properties() {
            write_property_block(&self.properties, body)?;
        }

        // Payload
        encode_length_prefixed(self.client_id.as_bytes(), body)?;
        if let Some(ref will) = self.will {
            if version.has_properties() {
                write_property_block(&will.properties, body)?;
            }
            encode_length_prefixed(will.topic.as_bytes(), body)?;
            encode_length_prefixed(&will.message, body)?;
        }
        if let Some(ref username) = self.username {
            encode_length_prefixed(username.as_bytes(), body)?;
        }
        if let Some(ref password) = self.password {
            encode_length_prefixed(password, body)?;
        }
        Ok(())
    }

    fn encoded(&mut self) {
        if self.client_id.is_empty() && !self.clean_session {
            log::debug!("Empty client id, forcing clean session");
            self.clean_session = true;
        }
    }

    fn decode_body(body: &[u8], version: ProtocolVersion) -> Result<Self> {
        let mut dec = Decoder::new(body);

        let protocol_name = dec.read_string()?;
        if protocol_name != PROTOCOL_NAME {
            return Err(ProtocolError::InvalidProtocolName(protocol_name).into());
        }

        let level = dec.read_u8()?;
        let protocol_version = ProtocolVersion::try_from(level)?;
        if protocol_version != version {
            return Err(ProtocolError::RevisionMismatch(
                "CONNECT protocol level does not match the negotiated revision",
            )
            .into());
        }

        let flags = dec.read_u8()?;
        if (flags & FLAG_RESERVED) != 0 {
            return Err(ProtocolError::InvalidConnectFlags(flags).into());
        }
        let clean_session = (flags & FLAG_CLEAN_SESSION) != 0;
        let will_flag = (flags & FLAG_WILL) != 0;
        let will_qos = QoS::try_from((flags >> FLAG_WILL_QOS_SHIFT) & 0x03)?;
        let will_retain = (flags & FLAG_WILL_RETAIN) != 0;
        let password_flag = (flags & FLAG_PASSWORD) != 0;
        let username_flag = (flags & FLAG_USERNAME) != 0;

        // MQTT-3.1.2-11/13/15: will QoS and retain require the will flag
        if !will_flag && (will_qos != QoS::AtMostOnce || will_retain) {
            return Err(ProtocolError::InvalidConnectFlags(flags).into());
        }

        let keep_alive = dec.read_u16()?;

        let properties = if version.has_properties() {
            read_property_block::<ConnectProperties>(&mut dec)?
        } else {
            ConnectProperties::default()
        };

        let client_id = dec.read_string()?;

        let will = if will_flag {
            let will_properties = if version.has_properties() {
                read_property_block::<WillProperties>(&mut dec)?
            } else {
                WillProperties::default()
            };
            let topic = dec.read_string()?;
            let message = Bytes::copy_from_slice(dec.read_binary()?);
            Some(Will {
                topic,
                message,
                qos: will_qos,
                retain: will_retain,
                properties: will_properties,
            })
        } else {
            None
        };

        let username = if username_flag {
            Some(dec.read_string()?)
        } else {
            None
        };

        let password = if password_flag {
            Some(Bytes::copy_from_slice(dec.read_binary()?))
        } else {
            None
        };

        if !dec.is_empty() {
            return Err(ProtocolError::MalformedPacket(format!(
                "{} unexpected bytes after CONNECT payload",
                dec.remaining()
            ))
            .into());
        }

        Ok(Connect {
            protocol_name,
            protocol_version,
            clean_session,
            keep_alive,
            client_id,
            will,
            username,
            password,
            properties,
        })
    }
}

/// Read the protocol level of a CONNECT frame without decoding the rest.
///
/// Used to pick the revision for a new connection before a full decode.
pub fn connect_protocol_version(frame: &[u8]) -> Result<ProtocolVersion> {
    let mut dec = Decoder::new(frame);
    let packet_type = PacketType::try_from(dec.read_u8()? >> 4)?;
    if packet_type != PacketType::Connect {
        return Err(ProtocolError::MalformedPacket(format!(
            "Expected Connect, got {:?}",
            packet_type
        ))
        .into());
    }
    dec.read_variable_byte_integer()?;
    let protocol_name = dec.read_string()?;
    if protocol_name != PROTOCOL_NAME {
        return Err(ProtocolError::InvalidProtocolName(protocol_name).into());
    }
    Ok(ProtocolVersion::try_from(dec.read_u8()?)?)
}
