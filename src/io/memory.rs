use super::ReadAt;
use crate::Result;
use async_trait::async_trait;

/// In-memory archive source, used for archives assembled on the fly
pub struct MemoryReader {
    data: Vec<u8>,
}

impl MemoryReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

#[async_trait]
impl ReadAt for MemoryReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let start = offset.min(self.data.len() as u64) as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
