//! Byte-level reader over a (possibly gzip-wrapped) capture stream.

use flate2::bufread::GzDecoder;
use std::io::{BufRead, BufReader, Read};

use super::error::FormatError;
use super::varint::{decode_leb128, decode_uleb128, GROWING_MARKER};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub(crate) struct DataReader<'a> {
    inner: Box<dyn BufRead + 'a>,
    offset: u64,
}

impl<'a> DataReader<'a> {
    /// Wrap `read`, transparently inflating it when it starts with the gzip magic.
    pub fn new<R: Read + 'a>(read: R) -> Result<Self, FormatError> {
        let mut buffered = BufReader::new(read);
        let gzipped = fill(&mut buffered)?.starts_with(&GZIP_MAGIC);
        let inner: Box<dyn BufRead + 'a> = if gzipped {
            Box::new(BufReader::new(GzDecoder::new(buffered)))
        } else {
            Box::new(buffered)
        };
        Ok(Self { inner, offset: 0 })
    }

    /// Offset into the decompressed stream.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn at_eof(&mut self) -> Result<bool, FormatError> {
        Ok(fill(&mut self.inner)?.is_empty())
    }

    pub fn read_u8(&mut self, context: &'static str) -> Result<u8, FormatError> {
        let byte = match fill(&mut self.inner)?.first() {
            Some(&b) => b,
            None => {
                return Err(FormatError::Truncated {
                    context,
                    offset: self.offset,
                })
            }
        };
        self.inner.consume(1);
        self.offset += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, len: usize, context: &'static str) -> Result<Vec<u8>, FormatError> {
        // Length prefixes come from untrusted input; don't preallocate them.
        let mut buf = Vec::new();
        let read = (&mut self.inner).take(len as u64).read_to_end(&mut buf)?;
        self.offset += read as u64;
        if read < len {
            return Err(FormatError::Truncated {
                context,
                offset: self.offset,
            });
        }
        Ok(buf)
    }

    fn read_array<const N: usize>(
        &mut self,
        context: &'static str,
    ) -> Result<[u8; N], FormatError> {
        let mut buf = [0u8; N];
        for slot in buf.iter_mut() {
            *slot = self.read_u8(context)?;
        }
        Ok(buf)
    }

    pub fn read_u16(&mut self, context: &'static str) -> Result<u16, FormatError> {
        Ok(u16::from_le_bytes(self.read_array(context)?))
    }

    pub fn read_i64(&mut self, context: &'static str) -> Result<i64, FormatError> {
        Ok(i64::from_le_bytes(self.read_array(context)?))
    }

    pub fn read_f64(&mut self, context: &'static str) -> Result<f64, FormatError> {
        Ok(f64::from_le_bytes(self.read_array(context)?))
    }

    pub fn read_uleb128(&mut self, context: &'static str) -> Result<u64, FormatError> {
        let start = self.offset;
        decode_uleb128(start, || self.read_u8(context))
    }

    pub fn read_leb128(&mut self, context: &'static str) -> Result<i64, FormatError> {
        let start = self.offset;
        decode_leb128(start, || self.read_u8(context))
    }

    pub fn read_growing(&mut self, last: i64, context: &'static str) -> Result<i64, FormatError> {
        let delta = match self.read_uleb128(context)? {
            GROWING_MARKER => self.read_leb128(context)?,
            d => i64::try_from(d).map_err(|_| FormatError::ValueOverflow(context))?,
        };
        last.checked_add(delta)
            .ok_or(FormatError::ValueOverflow(context))
    }

    pub fn read_relative(&mut self, last: i64, context: &'static str) -> Result<i64, FormatError> {
        let delta = self.read_leb128(context)?;
        last.checked_add(delta)
            .ok_or(FormatError::ValueOverflow(context))
    }

    pub fn read_string(&mut self, context: &'static str) -> Result<String, FormatError> {
        let len = self.read_uleb128(context)?;
        let len = usize::try_from(len).map_err(|_| FormatError::ValueOverflow(context))?;
        let start = self.offset;
        let bytes = self.read_bytes(len, context)?;
        String::from_utf8(bytes).map_err(|_| FormatError::InvalidString { offset: start })
    }
}

fn fill<R: BufRead + ?Sized>(reader: &mut R) -> Result<&[u8], FormatError> {
    Ok(reader.fill_buf()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qsh::varint::{put_growing, put_leb128, put_uleb128};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn reads_mixed_primitives() {
        let mut bytes = vec![7u8];
        bytes.extend_from_slice(&0x1234u16.to_le_bytes());
        put_uleb128(&mut bytes, 3);
        bytes.extend_from_slice(b"abc");
        put_growing(&mut bytes, 1_000, 990);
        put_leb128(&mut bytes, -5);

        let mut r = DataReader::new(bytes.as_slice()).unwrap();
        assert_eq!(r.read_u8("a").unwrap(), 7);
        assert_eq!(r.read_u16("b").unwrap(), 0x1234);
        assert_eq!(r.read_string("c").unwrap(), "abc");
        assert_eq!(r.read_growing(990, "d").unwrap(), 1_000);
        assert_eq!(r.read_relative(10, "e").unwrap(), 5);
        assert!(r.at_eof().unwrap());
        assert_eq!(r.offset(), bytes.len() as u64);
    }

    #[test]
    fn truncation_reports_context_and_offset() {
        let mut r = DataReader::new(&[1u8, 2][..]).unwrap();
        match r.read_i64("start time") {
            Err(FormatError::Truncated { context, offset }) => {
                assert_eq!(context, "start time");
                assert_eq!(offset, 2);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
    }

    #[test]
    fn gzip_input_is_inflated() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&[42, 43]).unwrap();
        let compressed = enc.finish().unwrap();

        let mut r = DataReader::new(compressed.as_slice()).unwrap();
        assert_eq!(r.read_u8("x").unwrap(), 42);
        assert_eq!(r.read_u8("x").unwrap(), 43);
        assert!(r.at_eof().unwrap());
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut bytes = Vec::new();
        put_uleb128(&mut bytes, 2);
        bytes.extend_from_slice(&[0xff, 0xfe]);
        let mut r = DataReader::new(bytes.as_slice()).unwrap();
        assert!(matches!(
            r.read_string("s"),
            Err(FormatError::InvalidString { offset: 1 })
        ));
    }
}
