//! Error types for mqconn.

use thiserror::Error;

use crate::packet::{PacketType, ProtocolVersion};

/// Main error type for mqconn.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Config error: {0}")]
    Config(String),
}

/// Errors raised while parsing inbound bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid packet type: {0}")]
    InvalidPacketType(u8),

    #[error("Invalid remaining length encoding")]
    InvalidRemainingLength,

    #[error("Incomplete packet: need {needed} bytes, have {have}")]
    IncompletePacket { needed: usize, have: usize },

    #[error("Packet too large: {size} bytes exceeds maximum {max}")]
    PacketTooLarge { size: usize, max: usize },

    #[error("Unknown property identifier: {0:#04x}")]
    UnknownProperty(u8),

    #[error("Malformed property {id:#04x}: {reason}")]
    MalformedProperty { id: u8, reason: &'static str },

    #[error("Revision mismatch: {0}")]
    RevisionMismatch(&'static str),

    #[error("Invalid protocol name: expected 'MQTT', got '{0}'")]
    InvalidProtocolName(String),

    #[error("Unsupported protocol version: {0}")]
    UnsupportedProtocolVersion(u8),

    #[error("Invalid connect flags: {0:#04x}")]
    InvalidConnectFlags(u8),

    #[error("Invalid UTF-8 string")]
    InvalidUtf8,

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),
}

/// Caller contract violations detected while encoding.
///
/// Nothing is appended to the output buffer when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Value {0} exceeds the variable byte integer range")]
    VarIntOverflow(usize),

    #[error("Field of {0} bytes exceeds the 65535 byte length prefix")]
    FieldTooLong(usize),

    #[error("{0:?} properties are not allowed under MQTT 3.1.1")]
    PropertiesNotAllowed(PacketType),

    #[error("CONNECT is {packet:?} but the codec speaks {codec:?}")]
    VersionMismatch {
        packet: ProtocolVersion,
        codec: ProtocolVersion,
    },

    #[error("Not representable under MQTT 3.1.1: {0}")]
    NotRepresentable(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
