//! Length-prefixed data and the bounded read cursor shared by all decoders.
//!
//! MQTT strings and binary fields are written as a two byte big-endian length
//! followed by the data itself.

use crate::error::{EncodeError, ProtocolError};
use crate::varint;

/// Largest payload a two byte length prefix can describe.
pub const MAX_FIELD_LEN: usize = u16::MAX as usize;

/// Append `data` to `buf` behind its two byte length.
///
/// # Example
/// ```
/// use mqconn::primitive::encode_length_prefixed;
/// let mut buf = Vec::new();
/// encode_length_prefixed(b"dev1", &mut buf).unwrap();
/// assert_eq!(&buf, &[0x00, 0x04, b'd', b'e', b'v', b'1']);
/// ```
pub fn encode_length_prefixed(data: &[u8], buf: &mut Vec<u8>) -> Result<(), EncodeError> {
    if data.len() > MAX_FIELD_LEN {
        return Err(EncodeError::FieldTooLong(data.len()));
    }
    buf.extend_from_slice(&(data.len() as u16).to_be_bytes());
    buf.extend_from_slice(data);
    Ok(())
}

/// Split a length-prefixed field off the front of `bytes`.
///
/// Returns `(data, rest)`.
pub fn decode_length_prefixed(bytes: &[u8]) -> Result<(&[u8], &[u8]), ProtocolError> {
    let mut dec = Decoder::new(bytes);
    let data = dec.read_binary()?;
    Ok((data, dec.rest()))
}

/// Read cursor over an immutable byte slice.
///
/// Every read is bounds-checked and fails with
/// [`ProtocolError::IncompletePacket`] instead of panicking.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Bytes not consumed yet.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn incomplete(&self, needed: usize) -> ProtocolError {
        ProtocolError::IncompletePacket {
            needed,
            have: self.remaining(),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        if self.pos >= self.buf.len() {
            return Err(self.incomplete(1));
        }
        let b = self.buf[self.pos];
        self.pos += 1;
        Ok(b)
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < len {
            return Err(self.incomplete(len));
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Read length-prefixed binary data.
    pub fn read_binary(&mut self) -> Result<&'a [u8], ProtocolError> {
        let len = self.read_u16()? as usize;
        self.read_bytes(len)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, ProtocolError> {
        let bytes = self.read_binary()?;
        utf8_string(bytes)
    }

    /// Read a Variable Byte Integer. Running out of input before the
    /// terminating byte is an incomplete packet, not a "need more data".
    pub fn read_variable_byte_integer(&mut self) -> Result<usize, ProtocolError> {
        match varint::decode(self.rest())? {
            Some((value, consumed)) => {
                self.pos += consumed;
                Ok(value)
            }
            None => Err(self.incomplete(self.remaining() + 1)),
        }
    }
}

/// Validate an MQTT UTF-8 string.
///
/// MQTT-1.5.3-2: a UTF-8 string MUST NOT contain the null character U+0000.
pub(crate) fn utf8_string(bytes: &[u8]) -> Result<String, ProtocolError> {
    if bytes.contains(&0u8) {
        return Err(ProtocolError::MalformedPacket(
            "UTF-8 string must not contain null character".into(),
        ));
    }
    String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_length_prefixed_empty() {
        let mut buf = Vec::new();
        encode_length_prefixed(b"", &mut buf).unwrap();
        assert_eq!(&buf, &[0x00, 0x00]);
    }

    #[test]
    fn test_encode_length_prefixed_too_long() {
        let data = vec![0u8; MAX_FIELD_LEN + 1];
        let mut buf = Vec::new();
        assert_eq!(
            encode_length_prefixed(&data, &mut buf),
            Err(EncodeError::FieldTooLong(65536))
        );
        assert!(buf.is_empty());

        let data = vec![0u8; MAX_FIELD_LEN];
        encode_length_prefixed(&data, &mut buf).unwrap();
        assert_eq!(&buf[..2], &[0xFF, 0xFF]);
        assert_eq!(buf.len(), MAX_FIELD_LEN + 2);
    }

    #[test]
    fn test_decode_length_prefixed() {
        let (data, rest) = decode_length_prefixed(&[0x00, 0x02, b'h', b'i', 0x7F]).unwrap();
        assert_eq!(data, b"hi");
        assert_eq!(rest, &[0x7F]);
    }

    #[test]
    fn test_decode_length_prefixed_truncated() {
        assert_eq!(
            decode_length_prefixed(&[0x00, 0x05, b'h', b'i']),
            Err(ProtocolError::IncompletePacket { needed: 5, have: 2 })
        );
        assert!(decode_length_prefixed(&[0x00]).is_err());
    }

    #[test]
    fn test_read_string_rejects_null() {
        let mut dec = Decoder::new(&[0x00, 0x02, b'a', 0x00]);
        assert!(matches!(
            dec.read_string(),
            Err(ProtocolError::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_read_string_rejects_invalid_utf8() {
        let mut dec = Decoder::new(&[0x00, 0x02, 0xC3, 0x28]);
        assert_eq!(dec.read_string(), Err(ProtocolError::InvalidUtf8));
    }

    #[test]
    fn test_read_variable_byte_integer_truncated() {
        let mut dec = Decoder::new(&[0x80, 0x80]);
        assert!(matches!(
            dec.read_variable_byte_integer(),
            Err(ProtocolError::IncompletePacket { .. })
        ));

        let mut dec = Decoder::new(&[0x80, 0x01, 0x05]);
        assert_eq!(dec.read_variable_byte_integer().unwrap(), 128);
        assert_eq!(dec.read_u8().unwrap(), 0x05);
        assert!(dec.is_empty());
    }

    #[test]
    fn test_fixed_width_reads() {
        let mut dec = Decoder::new(&[0x00, 0x3C, 0x00, 0x00, 0x0E, 0x10]);
        assert_eq!(dec.read_u16().unwrap(), 60);
        assert_eq!(dec.read_u32().unwrap(), 3600);
        assert_eq!(
            dec.read_u8(),
            Err(ProtocolError::IncompletePacket { needed: 1, have: 0 })
        );
    }
}
