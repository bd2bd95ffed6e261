use std::io::{self, Read};

/// Encode a u64 as a variable-length integer
pub fn encode_varint_u64(mut value: u64, buf: &mut Vec<u8>) {
    loop {
        if value < 0x80 {
            buf.push(value as u8);
            break;
        }
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
}

/// Decode a u64 variable-length integer
/// Returns (value, bytes_consumed)
pub fn decode_varint_u64(buf: &[u8]) -> Option<(u64, usize)> {
    let mut result: u64 = 0;
    let mut shift = 0;

    for (i, &byte) in buf.iter().enumerate() {
        if shift >= 64 {
            return None;
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }

        shift += 7;
    }

    None
}

/// Zigzag-map a signed value so small magnitudes stay small as varints
#[inline]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[inline]
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Append a varint length followed by the raw bytes
pub fn encode_bytes(bytes: &[u8], buf: &mut Vec<u8>) {
    encode_varint_u64(bytes.len() as u64, buf);
    buf.extend_from_slice(bytes);
}

/// Forward-only cursor over an encoded buffer (usually a mmap'ed file)
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_varint(&mut self) -> io::Result<u64> {
        let (value, consumed) = decode_varint_u64(&self.buf[self.pos..])
            .ok_or_else(|| invalid_data(format!("malformed varint at offset {}", self.pos)))?;
        self.pos += consumed;
        Ok(value)
    }

    pub fn read_signed(&mut self) -> io::Result<i64> {
        self.read_varint().map(zigzag_decode)
    }

    pub fn read_slice(&mut self, len: usize) -> io::Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(invalid_data(format!(
                "need {} bytes at offset {}, only {} left",
                len,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Read a varint-prefixed byte string
    pub fn read_bytes(&mut self) -> io::Result<&'a [u8]> {
        let len = self.read_varint()? as usize;
        self.read_slice(len)
    }

    pub fn read_str(&mut self) -> io::Result<&'a str> {
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes).map_err(|e| invalid_data(e.to_string()))
    }

    pub fn read_u32_le(&mut self) -> io::Result<u32> {
        let bytes = self.read_slice(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// Shorthand for the error every decoder in this crate reports on bad input
pub fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Read a u32 in little-endian format
pub fn read_u32_le<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Read a u64 in little-endian format
pub fn read_u64_le<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_boundaries() {
        let values = [0, 1, 127, 128, 16383, 16384, u64::MAX];
        for value in values {
            let mut buf = Vec::new();
            encode_varint_u64(value, &mut buf);
            let (decoded, consumed) = decode_varint_u64(&buf).unwrap();
            assert_eq!(value, decoded);
            assert_eq!(consumed, buf.len());
        }
    }

    #[test]
    fn test_zigzag_keeps_small_negatives_short() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_decode(zigzag_encode(i64::MIN)), i64::MIN);
        assert_eq!(zigzag_decode(zigzag_encode(i64::MAX)), i64::MAX);
    }

    #[test]
    fn test_cursor_rejects_overrun() {
        let mut buf = Vec::new();
        encode_varint_u64(10, &mut buf);
        buf.extend_from_slice(b"abc");

        let mut cursor = ByteCursor::new(&buf);
        let err = cursor.read_bytes().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_cursor_reads_strings_in_order() {
        let mut buf = Vec::new();
        encode_bytes(b"concept", &mut buf);
        encode_varint_u64(zigzag_encode(-42), &mut buf);

        let mut cursor = ByteCursor::new(&buf);
        assert_eq!(cursor.read_str().unwrap(), "concept");
        assert_eq!(cursor.read_signed().unwrap(), -42);
        assert_eq!(cursor.remaining(), 0);
    }
}
