use thiserror::Error;

/// Errors that can occur while reading wire data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// The packet ended before the requested value could be read.
    #[error("unexpected end of packet: needed {needed} more byte(s) at offset {offset}")]
    UnexpectedEnd { offset: usize, needed: usize },
}

/// Append-only cursor over a growable byte buffer.
///
/// All multi-byte values are emitted in host byte order; the wire format is
/// packed and both endpoints are assumed to share an architecture.
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_ne_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_ne_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_ne_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Current write position, equal to the number of bytes written so far.
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    /// Overwrites a single already-written byte, e.g. a header field whose
    /// final value is only known after the payload is serialized.
    pub fn patch_u8(&mut self, offset: usize, value: u8) {
        self.buf[offset] = value;
    }

    /// Moves the tail starting at `src` down to `dst` and truncates.
    ///
    /// Used by multi-part serialization to shift overflow bytes to the spot
    /// right after the part header once the full bytes have been sent.
    pub fn shift_tail(&mut self, src: usize, dst: usize) {
        debug_assert!(dst <= src && src <= self.buf.len());
        self.buf.copy_within(src.., dst);
        let tail_len = self.buf.len() - src;
        self.buf.truncate(dst + tail_len);
    }

    pub fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
    }

    pub fn reserve(&mut self, additional: usize) {
        self.buf.reserve(additional);
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

impl Default for ByteWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Read cursor over a received packet slice.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    cursor: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, cursor: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.cursor
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        let bytes = self.read_bytes(1)?;
        Ok(bytes[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_ne_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_f32(&mut self) -> Result<f32, WireError> {
        let bytes = self.read_bytes(4)?;
        Ok(f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < len {
            return Err(WireError::UnexpectedEnd {
                offset: self.cursor,
                needed: len - self.remaining(),
            });
        }
        let start = self.cursor;
        self.cursor += len;
        Ok(&self.buf[start..self.cursor])
    }

    /// Returns the unread tail without advancing the cursor.
    pub fn tail(&self) -> &'a [u8] {
        &self.buf[self.cursor..]
    }
}
