//! MQTT v5 property (TLV) codec.
//!
//! A property block is a sequence of `identifier byte + typed value` entries
//! preceded by its length as a Variable Byte Integer. Encoding goes through
//! [`PropertyWriter`], which drops zero values. Decoding first collects the
//! block into a [`RawProperties`] table borrowed from the input, then each
//! packet's [`PropertySet`] picks out the identifiers it understands.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::{EncodeError, ProtocolError};
use crate::primitive::{self, Decoder};
use crate::varint;

/// Wire type of a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    Byte,
    /// A byte restricted to 0 or 1.
    Bool,
    TwoByteInteger,
    FourByteInteger,
    VariableByteInteger,
    Utf8String,
    BinaryData,
    Utf8StringPair,
}

/// MQTT v5 property identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PropertyId {
    PayloadFormatIndicator = 0x01,
    MessageExpiryInterval = 0x02,
    ContentType = 0x03,
    ResponseTopic = 0x08,
    CorrelationData = 0x09,
    SubscriptionIdentifier = 0x0B,
    SessionExpiryInterval = 0x11,
    AssignedClientIdentifier = 0x12,
    ServerKeepAlive = 0x13,
    AuthenticationMethod = 0x15,
    AuthenticationData = 0x16,
    RequestProblemInformation = 0x17,
    WillDelayInterval = 0x18,
    RequestResponseInformation = 0x19,
    ResponseInformation = 0x1A,
    ServerReference = 0x1C,
    ReasonString = 0x1F,
    ReceiveMaximum = 0x21,
    TopicAliasMaximum = 0x22,
    TopicAlias = 0x23,
    MaximumQos = 0x24,
    RetainAvailable = 0x25,
    UserProperty = 0x26,
    MaximumPacketSize = 0x27,
    WildcardSubscriptionAvailable = 0x28,
    SubscriptionIdentifierAvailable = 0x29,
    SharedSubscriptionAvailable = 0x2A,
}

impl PropertyId {
    /// The value type carried by this identifier.
    pub fn value_type(self) -> PropertyType {
        use PropertyId::*;
        match self {
            PayloadFormatIndicator | MaximumQos => PropertyType::Byte,
            RequestProblemInformation
            | RequestResponseInformation
            | RetainAvailable
            | WildcardSubscriptionAvailable
            | SubscriptionIdentifierAvailable
            | SharedSubscriptionAvailable => PropertyType::Bool,
            ServerKeepAlive | ReceiveMaximum | TopicAliasMaximum | TopicAlias => {
                PropertyType::TwoByteInteger
            }
            MessageExpiryInterval
            | SessionExpiryInterval
            | WillDelayInterval
            | MaximumPacketSize => PropertyType::FourByteInteger,
            SubscriptionIdentifier => PropertyType::VariableByteInteger,
            ContentType
            | ResponseTopic
            | AssignedClientIdentifier
            | AuthenticationMethod
            | ResponseInformation
            | ServerReference
            | ReasonString => PropertyType::Utf8String,
            CorrelationData | AuthenticationData => PropertyType::BinaryData,
            UserProperty => PropertyType::Utf8StringPair,
        }
    }
}

impl TryFrom<u8> for PropertyId {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use PropertyId::*;
        Ok(match value {
            0x01 => PayloadFormatIndicator,
            0x02 => MessageExpiryInterval,
            0x03 => ContentType,
            0x08 => ResponseTopic,
            0x09 => CorrelationData,
            0x0B => SubscriptionIdentifier,
            0x11 => SessionExpiryInterval,
            0x12 => AssignedClientIdentifier,
            0x13 => ServerKeepAlive,
            0x15 => AuthenticationMethod,
            0x16 => AuthenticationData,
            0x17 => RequestProblemInformation,
            0x18 => WillDelayInterval,
            0x19 => RequestResponseInformation,
            0x1A => ResponseInformation,
            0x1C => ServerReference,
            0x1F => ReasonString,
            0x21 => ReceiveMaximum,
            0x22 => TopicAliasMaximum,
            0x23 => TopicAlias,
            0x24 => MaximumQos,
            0x25 => RetainAvailable,
            0x26 => UserProperty,
            0x27 => MaximumPacketSize,
            0x28 => WildcardSubscriptionAvailable,
            0x29 => SubscriptionIdentifierAvailable,
            0x2A => SharedSubscriptionAvailable,
            _ => return Err(ProtocolError::UnknownProperty(value)),
        })
    }
}

/// A typed property bag belonging to one packet type.
///
/// `props` writes the non-zero fields in declaration order with user
/// properties last; `set_props` reads back the identifiers the packet
/// recognizes and ignores the rest.
pub trait PropertySet: Default {
    fn props(&self, w: &mut PropertyWriter) -> Result<(), EncodeError>;

    fn set_props(&mut self, raw: &RawProperties<'_>) -> Result<(), ProtocolError>;
}

/// Builds a property block, omitting zero and empty values.
#[derive(Debug, Default)]
pub struct PropertyWriter {
    buf: Vec<u8>,
}

impl PropertyWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn byte(&mut self, id: PropertyId, value: u8) {
        debug_assert_eq!(id.value_type(), PropertyType::Byte);
        if value != 0 {
            self.buf.push(id as u8);
            self.buf.push(value);
        }
    }

    pub fn bool(&mut self, id: PropertyId, value: bool) {
        debug_assert_eq!(id.value_type(), PropertyType::Bool);
        if value {
            self.buf.push(id as u8);
            self.buf.push(1);
        }
    }

    pub fn u16(&mut self, id: PropertyId, value: u16) {
        debug_assert_eq!(id.value_type(), PropertyType::TwoByteInteger);
        if value != 0 {
            self.buf.push(id as u8);
            self.buf.extend_from_slice(&value.to_be_bytes());
        }
    }

    pub fn u32(&mut self, id: PropertyId, value: u32) {
        debug_assert_eq!(id.value_type(), PropertyType::FourByteInteger);
        if value != 0 {
            self.buf.push(id as u8);
            self.buf.extend_from_slice(&value.to_be_bytes());
        }
    }

    pub fn varint(&mut self, id: PropertyId, value: usize) -> Result<(), EncodeError> {
        debug_assert_eq!(id.value_type(), PropertyType::VariableByteInteger);
        if value != 0 {
            let mut encoded = Vec::with_capacity(varint::MAX_LEN);
            varint::encode(value, &mut encoded)?;
            self.buf.push(id as u8);
            self.buf.extend_from_slice(&encoded);
        }
        Ok(())
    }

    pub fn string(&mut self, id: PropertyId, value: &str) -> Result<(), EncodeError> {
        debug_assert_eq!(id.value_type(), PropertyType::Utf8String);
        self.data(id, value.as_bytes())
    }

    pub fn binary(&mut self, id: PropertyId, value: &[u8]) -> Result<(), EncodeError> {
        debug_assert_eq!(id.value_type(), PropertyType::BinaryData);
        self.data(id, value)
    }

    fn data(&mut self, id: PropertyId, value: &[u8]) -> Result<(), EncodeError> {
        if value.is_empty() {
            return Ok(());
        }
        if value.len() > primitive::MAX_FIELD_LEN {
            return Err(EncodeError::FieldTooLong(value.len()));
        }
        self.buf.push(id as u8);
        primitive::encode_length_prefixed(value, &mut self.buf)
    }

    /// One entry per pair, in order. Pairs are written even when empty.
    pub fn user_properties(&mut self, pairs: &[(String, String)]) -> Result<(), EncodeError> {
        for (key, value) in pairs {
            for field in [key, value] {
                if field.len() > primitive::MAX_FIELD_LEN {
                    return Err(EncodeError::FieldTooLong(field.len()));
                }
            }
            self.buf.push(PropertyId::UserProperty as u8);
            primitive::encode_length_prefixed(key.as_bytes(), &mut self.buf)?;
            primitive::encode_length_prefixed(value.as_bytes(), &mut self.buf)?;
        }
        Ok(())
    }

    /// Encoded block without its length prefix.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Append the property length and the block to `out`.
    pub fn finish(self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        varint::encode(self.buf.len(), out)?;
        out.extend_from_slice(&self.buf);
        Ok(())
    }
}

/// Property values as they appeared on the wire, keyed by identifier.
///
/// Values borrow from the packet being decoded. Singletons keep the last
/// occurrence; user properties keep every occurrence in order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RawProperties<'a> {
    values: BTreeMap<PropertyId, &'a [u8]>,
    user_properties: Vec<(&'a [u8], &'a [u8])>,
}

impl<'a> RawProperties<'a> {
    /// Parse a property block whose length prefix has already been consumed.
    pub fn parse(block: &'a [u8]) -> Result<Self, ProtocolError> {
        let mut dec = Decoder::new(block);
        let mut raw = RawProperties::default();

        while !dec.is_empty() {
            let id_byte = dec.read_u8()?;
            let id = match PropertyId::try_from(id_byte) {
                Ok(id) => id,
                Err(e) => {
                    log::debug!("Rejecting unknown property identifier {:#04x}", id_byte);
                    return Err(e);
                }
            };
            let truncated = |_: ProtocolError| ProtocolError::MalformedProperty {
                id: id_byte,
                reason: "truncated value",
            };

            let value = match id.value_type() {
                PropertyType::Byte => dec.read_bytes(1).map_err(truncated)?,
                PropertyType::Bool => {
                    let value = dec.read_bytes(1).map_err(truncated)?;
                    if value[0] > 1 {
                        return Err(ProtocolError::MalformedProperty {
                            id: id_byte,
                            reason: "boolean must be 0 or 1",
                        });
                    }
                    value
                }
                PropertyType::TwoByteInteger => dec.read_bytes(2).map_err(truncated)?,
                PropertyType::FourByteInteger => dec.read_bytes(4).map_err(truncated)?,
                PropertyType::VariableByteInteger => {
                    let rest = dec.rest();
                    let (_, consumed) = varint::decode(rest)
                        .map_err(|_| ProtocolError::MalformedProperty {
                            id: id_byte,
                            reason: "variable byte integer too long",
                        })?
                        .ok_or(ProtocolError::MalformedProperty {
                            id: id_byte,
                            reason: "truncated value",
                        })?;
                    dec.read_bytes(consumed)?
                }
                PropertyType::Utf8String | PropertyType::BinaryData => {
                    dec.read_binary().map_err(truncated)?
                }
                PropertyType::Utf8StringPair => {
                    let key = dec.read_binary().map_err(truncated)?;
                    let value = dec.read_binary().map_err(truncated)?;
                    raw.user_properties.push((key, value));
                    continue;
                }
            };

            if raw.values.insert(id, value).is_some() {
                log::trace!("Duplicate property {:?}, keeping last value", id);
            }
        }

        Ok(raw)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.user_properties.is_empty()
    }

    pub fn contains(&self, id: PropertyId) -> bool {
        self.values.contains_key(&id)
    }

    pub fn byte(&self, id: PropertyId) -> Option<u8> {
        self.values.get(&id).and_then(|v| v.first().copied())
    }

    pub fn bool(&self, id: PropertyId) -> Option<bool> {
        self.byte(id).map(|b| b == 1)
    }

    pub fn u16(&self, id: PropertyId) -> Option<u16> {
        self.values
            .get(&id)
            .and_then(|v| <[u8; 2]>::try_from(*v).ok())
            .map(u16::from_be_bytes)
    }

    pub fn u32(&self, id: PropertyId) -> Option<u32> {
        self.values
            .get(&id)
            .and_then(|v| <[u8; 4]>::try_from(*v).ok())
            .map(u32::from_be_bytes)
    }

    pub fn varint(&self, id: PropertyId) -> Option<usize> {
        let raw = self.values.get(&id)?;
        varint::decode(raw).ok().flatten().map(|(value, _)| value)
    }

    pub fn string(&self, id: PropertyId) -> Result<Option<String>, ProtocolError> {
        self.values
            .get(&id)
            .map(|v| primitive::utf8_string(v))
            .transpose()
    }

    pub fn binary(&self, id: PropertyId) -> Option<Bytes> {
        self.values.get(&id).map(|v| Bytes::copy_from_slice(v))
    }

    pub fn user_properties(&self) -> Result<Vec<(String, String)>, ProtocolError> {
        self.user_properties
            .iter()
            .map(|(k, v)| Ok((primitive::utf8_string(k)?, primitive::utf8_string(v)?)))
            .collect()
    }
}

/// Write `props` with its length prefix.
pub(crate) fn write_property_block<P: PropertySet>(
    props: &P,
    buf: &mut Vec<u8>,
) -> Result<(), EncodeError> {
    let mut w = PropertyWriter::new();
    props.props(&mut w)?;
    w.finish(buf)
}

/// Read a length-prefixed property block and interpret it as `P`.
pub(crate) fn read_property_block<P: PropertySet>(dec: &mut Decoder<'_>) -> Result<P, ProtocolError> {
    let len = dec.read_variable_byte_integer()?;
    let block = dec.read_bytes(len)?;
    let raw = RawProperties::parse(block)?;
    let mut props = P::default();
    props.set_props(&raw)?;
    Ok(props)
}
