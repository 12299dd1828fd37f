//! LEB128 and QSH "growing" integer encodings.

use super::error::FormatError;

/// Longest accepted varint, in bytes.
pub const MAX_VARINT_LEN: usize = 10;

/// A growing delta equal to this marker is followed by the real delta as leb128.
pub const GROWING_MARKER: u64 = 268_435_455;

pub fn put_uleb128(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

pub fn put_leb128(out: &mut Vec<u8>, mut value: i64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Encode `value` as a delta from `last`, escaping deltas the short form can't hold.
pub fn put_growing(out: &mut Vec<u8>, value: i64, last: i64) {
    let delta = value.wrapping_sub(last);
    match u64::try_from(delta) {
        Ok(d) if d < GROWING_MARKER => put_uleb128(out, d),
        _ => {
            put_uleb128(out, GROWING_MARKER);
            put_leb128(out, delta);
        }
    }
}

pub fn put_relative(out: &mut Vec<u8>, value: i64, last: i64) {
    put_leb128(out, value.wrapping_sub(last));
}

/// Decode an unsigned LEB128 from a byte source. `offset` is only used for errors.
pub(crate) fn decode_uleb128<F>(offset: u64, mut next: F) -> Result<u64, FormatError>
where
    F: FnMut() -> Result<u8, FormatError>,
{
    let mut result = 0u64;
    let mut shift = 0u32;
    for _ in 0..MAX_VARINT_LEN {
        let byte = next()?;
        result |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
    Err(FormatError::VarintOverflow { offset })
}

pub(crate) fn decode_leb128<F>(offset: u64, mut next: F) -> Result<i64, FormatError>
where
    F: FnMut() -> Result<u8, FormatError>,
{
    let mut result = 0i64;
    let mut shift = 0u32;
    for _ in 0..MAX_VARINT_LEN {
        let byte = next()?;
        result |= i64::from(byte & 0x7f) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if shift < 64 && byte & 0x40 != 0 {
                result |= -1i64 << shift;
            }
            return Ok(result);
        }
    }
    Err(FormatError::VarintOverflow { offset })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decode_u(bytes: &[u8]) -> Result<u64, FormatError> {
        let mut it = bytes.iter().copied();
        decode_uleb128(0, || {
            it.next().ok_or(FormatError::Truncated {
                context: "test",
                offset: 0,
            })
        })
    }

    fn decode_s(bytes: &[u8]) -> Result<i64, FormatError> {
        let mut it = bytes.iter().copied();
        decode_leb128(0, || {
            it.next().ok_or(FormatError::Truncated {
                context: "test",
                offset: 0,
            })
        })
    }

    #[test]
    fn known_encodings() {
        let mut out = Vec::new();
        put_uleb128(&mut out, 624_485);
        assert_eq!(out, [0xE5, 0x8E, 0x26]);

        out.clear();
        put_leb128(&mut out, -123_456);
        assert_eq!(out, [0xC0, 0xBB, 0x78]);

        out.clear();
        put_leb128(&mut out, 63);
        assert_eq!(out, [0x3F]);
        out.clear();
        put_leb128(&mut out, 64);
        assert_eq!(out, [0xC0, 0x00]);
    }

    #[test]
    fn growing_escapes_negative_and_large_deltas() {
        let mut out = Vec::new();
        put_growing(&mut out, 100, 90);
        assert_eq!(out, [10]);

        out.clear();
        put_growing(&mut out, 80, 90);
        let mut expected = Vec::new();
        put_uleb128(&mut expected, GROWING_MARKER);
        put_leb128(&mut expected, -10);
        assert_eq!(out, expected);
    }

    #[test]
    fn overlong_varint_is_rejected() {
        let bytes = [0x80u8; 11];
        assert!(matches!(
            decode_u(&bytes),
            Err(FormatError::VarintOverflow { .. })
        ));
        assert!(matches!(
            decode_s(&bytes),
            Err(FormatError::VarintOverflow { .. })
        ));
    }

    #[test]
    fn truncated_varint_is_reported() {
        assert!(matches!(
            decode_u(&[0x80, 0x80]),
            Err(FormatError::Truncated { .. })
        ));
    }

    proptest! {
        #[test]
        fn uleb128_agrees(value in any::<u64>()) {
            let mut out = Vec::new();
            put_uleb128(&mut out, value);
            prop_assert!(out.len() <= MAX_VARINT_LEN);
            prop_assert_eq!(decode_u(&out).unwrap(), value);
        }

        #[test]
        fn leb128_agrees(value in any::<i64>()) {
            let mut out = Vec::new();
            put_leb128(&mut out, value);
            prop_assert!(out.len() <= MAX_VARINT_LEN);
            prop_assert_eq!(decode_s(&out).unwrap(), value);
        }
    }
}
