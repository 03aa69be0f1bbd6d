use byteorder::{ByteOrder, LittleEndian};

use crate::{Error, Result};

/// Bounds-checked little-endian reader over a byte buffer.
///
/// Every read either returns exactly the requested bytes or fails with
/// [`Error::OutOfBounds`]; the position only moves on success.
pub struct BinaryCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BinaryCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Return the next `n` bytes and advance past them.
    pub fn read(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::OutOfBounds {
                offset: self.pos,
                wanted: n,
                available: self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.read(n).map(|_| ())
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        self.read(4).map(LittleEndian::read_u32)
    }

    /// Move to an absolute position; the end of the buffer is a valid target.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::OutOfBounds {
                offset: pos,
                wanted: 0,
                available: 0,
            });
        }
        self.pos = pos;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_words() {
        let data = [0x02, 0x01, 0x08, 0x00, 0xAA];
        let mut cursor = BinaryCursor::new(&data);
        assert_eq!(cursor.read_u32_le().unwrap(), 0x0008_0102);
        assert_eq!(cursor.position(), 4);
        assert_eq!(cursor.read(1).unwrap(), &[0xAA]);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn overrun_fails_without_moving() {
        let data = [1, 2, 3];
        let mut cursor = BinaryCursor::new(&data);
        cursor.skip(1).unwrap();

        let err = cursor.read_u32_le().unwrap_err();
        assert!(matches!(
            err,
            Error::OutOfBounds {
                offset: 1,
                wanted: 4,
                available: 2
            }
        ));
        assert_eq!(cursor.position(), 1);
        assert_eq!(cursor.read(2).unwrap(), &[2, 3]);
    }

    #[test]
    fn seek_allows_end_but_not_beyond() {
        let data = [0u8; 8];
        let mut cursor = BinaryCursor::new(&data);
        cursor.seek(8).unwrap();
        assert_eq!(cursor.remaining(), 0);
        assert!(cursor.seek(9).is_err());
    }
}
