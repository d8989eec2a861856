//! # Binary Buffer
//!
//! Growable byte buffer with a read cursor and little-endian primitives.
//!
//! Writes append at the end; reads advance the cursor. A read that needs more
//! bytes than remain fails with [`ProtocolError::InsufficientData`] and leaves
//! the cursor where it was.

use crate::error::{ProtocolError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    data: Vec<u8>,
    cursor: usize,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            cursor: 0,
        }
    }

    /// Number of unread bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Total committed length, read bytes included.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Unread bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.cursor..]
    }

    /// Drop already-read bytes and rewind the cursor.
    pub fn truncate(&mut self) {
        self.data.drain(..self.cursor);
        self.cursor = 0;
    }

    /// Discard committed bytes past `len`, keeping the cursor in range.
    pub fn truncate_to(&mut self, len: usize) {
        self.data.truncate(len);
        self.cursor = self.cursor.min(self.data.len());
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.cursor = 0;
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    // ----- writes -----

    pub fn write_u8(&mut self, v: u8) {
        self.data.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i8(&mut self, v: i8) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i16(&mut self, v: i16) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_bytes(&mut self, v: &[u8]) {
        self.data.extend_from_slice(v);
    }

    /// Overwrite two bytes at an absolute offset; used to backfill frame lengths.
    pub fn put_u16_at(&mut self, offset: usize, v: u16) -> Result<()> {
        let end = offset + 2;
        if end > self.data.len() {
            return Err(ProtocolError::InsufficientData {
                needed: end,
                available: self.data.len(),
            });
        }
        self.data[offset..end].copy_from_slice(&v.to_le_bytes());
        Ok(())
    }

    /// Write exactly `n` bytes of `s`, zero padded or cut short.
    pub fn write_fixed_string(&mut self, s: &str, n: usize) {
        let bytes = s.as_bytes();
        let take = bytes.len().min(n);
        self.data.extend_from_slice(&bytes[..take]);
        self.data.resize(self.data.len() + (n - take), 0);
    }

    /// NUL-terminated string. Interior NULs would truncate the field on the
    /// other side, so they are dropped.
    pub fn write_cstring(&mut self, s: &str) {
        self.write_cbytes(s.as_bytes());
    }

    pub fn write_cbytes(&mut self, v: &[u8]) {
        self.data.extend(v.iter().copied().filter(|&b| b != 0));
        self.data.push(0);
    }

    // ----- reads -----

    fn take(&mut self, n: usize) -> Result<&[u8]> {
        let available = self.remaining();
        if n > available {
            return Err(ProtocolError::InsufficientData {
                needed: n,
                available,
            });
        }
        let start = self.cursor;
        self.cursor += n;
        Ok(&self.data[start..start + n])
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.read_array().map(i8::from_le_bytes)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.read_array().map(i16::from_le_bytes)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_array().map(i32::from_le_bytes)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.read_array().map(i64::from_le_bytes)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.take(n).map(<[u8]>::to_vec)
    }

    /// Read `n` bytes and strip trailing NUL padding.
    pub fn read_fixed_string(&mut self, n: usize) -> Result<String> {
        let raw = self.take(n)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    /// Bytes up to (not including) the next NUL; the NUL itself is consumed.
    pub fn read_cbytes(&mut self) -> Result<Vec<u8>> {
        let unread = self.as_slice();
        let Some(nul) = unread.iter().position(|&b| b == 0) else {
            return Err(ProtocolError::InsufficientData {
                needed: unread.len() + 1,
                available: unread.len(),
            });
        };
        let out = unread[..nul].to_vec();
        self.cursor += nul + 1;
        Ok(out)
    }

    pub fn read_cstring(&mut self) -> Result<String> {
        let raw = self.read_cbytes()?;
        Ok(match String::from_utf8(raw) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        Self { data, cursor: 0 }
    }
}

impl From<&[u8]> for Buffer {
    fn from(data: &[u8]) -> Self {
        Self::from(data.to_vec())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_layout() {
        let mut buf = Buffer::new();
        buf.write_u16(0x0102);
        buf.write_u32(0x0304_0506);
        buf.write_i8(-1);
        assert_eq!(buf.as_slice(), &[0x02, 0x01, 0x06, 0x05, 0x04, 0x03, 0xFF]);
    }

    #[test]
    fn test_mixed_reads() {
        let mut buf = Buffer::new();
        buf.write_u8(7);
        buf.write_i16(-2);
        buf.write_u64(u64::MAX - 1);
        buf.write_i64(i64::MIN);
        buf.write_cstring("hello");
        buf.write_fixed_string("IX", 4);

        assert_eq!(buf.read_u8().unwrap(), 7);
        assert_eq!(buf.read_i16().unwrap(), -2);
        assert_eq!(buf.read_u64().unwrap(), u64::MAX - 1);
        assert_eq!(buf.read_i64().unwrap(), i64::MIN);
        assert_eq!(buf.read_cstring().unwrap(), "hello");
        assert_eq!(buf.read_fixed_string(4).unwrap(), "IX");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_short_read_leaves_cursor() {
        let mut buf = Buffer::from(vec![1, 2, 3]);
        assert!(matches!(
            buf.read_u32(),
            Err(ProtocolError::InsufficientData {
                needed: 4,
                available: 3
            })
        ));
        assert_eq!(buf.remaining(), 3);
        assert_eq!(buf.read_u16().unwrap(), 0x0201);
    }

    #[test]
    fn test_unterminated_cstring() {
        let mut buf = Buffer::from(b"abc".as_slice());
        assert!(buf.read_cstring().is_err());
        assert_eq!(buf.remaining(), 3);
    }

    #[test]
    fn test_truncate_compacts() {
        let mut buf = Buffer::from(vec![1, 2, 3, 4, 5]);
        buf.read_u16().unwrap();
        buf.truncate();
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.as_slice(), &[3, 4, 5]);
        buf.write_u8(6);
        assert_eq!(buf.read_array::<4>().unwrap(), [3, 4, 5, 6]);
    }

    #[test]
    fn test_backfill() {
        let mut buf = Buffer::new();
        buf.write_u32(0);
        buf.put_u16_at(2, 0xBEEF).unwrap();
        assert_eq!(buf.as_slice(), &[0, 0, 0xEF, 0xBE]);
        assert!(buf.put_u16_at(3, 1).is_err());
    }

    #[test]
    fn test_cstring_drops_interior_nul() {
        let mut buf = Buffer::new();
        buf.write_cstring("a\0b");
        assert_eq!(buf.as_slice(), b"ab\0");
    }
}
