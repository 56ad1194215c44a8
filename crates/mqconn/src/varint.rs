//! Variable Byte Integer codec.
//!
//! Used for the remaining length of every packet and for the length prefix
//! of MQTT 5.0 property blocks. Seven value bits per byte, least significant
//! group first; bit 7 set means another byte follows. At most four bytes,
//! so the largest value is [`MAX_VALUE`].

use crate::error::{EncodeError, ProtocolError};

/// Largest value representable in four bytes.
pub const MAX_VALUE: usize = 268_435_455;

/// Maximum number of bytes in an encoded value.
pub const MAX_LEN: usize = 4;

const CONTINUATION: u8 = 0x80;
const VALUE_MASK: u8 = 0x7F;

/// Decode a variable byte integer from the front of `buf`.
///
/// Returns `Ok(Some((value, bytes_consumed)))` once a terminating byte is
/// seen, `Ok(None)` if `buf` ends first, or `Err` if the fourth byte still
/// has its continuation bit set.
///
/// ```
/// let (value, used) = mqconn::varint::decode(&[0xC1, 0x02, 0xFF]).unwrap().unwrap();
/// assert_eq!((value, used), (321, 2));
/// ```
pub fn decode(buf: &[u8]) -> Result<Option<(usize, usize)>, ProtocolError> {
    let mut value = 0usize;
    for (i, &byte) in buf.iter().take(MAX_LEN).enumerate() {
        value |= usize::from(byte & VALUE_MASK) << (7 * i);
        if byte & CONTINUATION == 0 {
            return Ok(Some((value, i + 1)));
        }
    }

    if buf.len() >= MAX_LEN {
        return Err(ProtocolError::InvalidRemainingLength);
    }
    Ok(None)
}

/// Append `value` to `buf` in its shortest form.
///
/// Returns the number of bytes written. Values above [`MAX_VALUE`] are
/// rejected and leave `buf` untouched.
///
/// ```
/// let mut buf = vec![0x10];
/// assert_eq!(mqconn::varint::encode(321, &mut buf).unwrap(), 2);
/// assert_eq!(buf, [0x10, 0xC1, 0x02]);
/// ```
pub fn encode(value: usize, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
    if value > MAX_VALUE {
        return Err(EncodeError::VarIntOverflow(value));
    }

    let len = encoded_len(value);
    let mut rest = value;
    for i in 0..len {
        let group = (rest & VALUE_MASK as usize) as u8;
        rest >>= 7;
        buf.push(if i + 1 < len { group | CONTINUATION } else { group });
    }
    Ok(len)
}

/// Number of bytes [`encode`] writes for `value`.
pub fn encoded_len(value: usize) -> usize {
    match value {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}
