use super::ReadAt;
use crate::Result;
use async_trait::async_trait;
use std::path::Path;

/// Local file reader with random access support
pub struct LocalFileReader {
    file: std::fs::File,
    size: u64,
}

impl LocalFileReader {
    pub fn new(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self { file, size })
    }
}

#[async_trait]
impl ReadAt for LocalFileReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            Ok(self.file.read_at(buf, offset)?)
        }

        #[cfg(windows)]
        {
            // seek_read moves the handle's cursor, which nothing else relies on
            use std::os::windows::fs::FileExt;
            Ok(self.file.seek_read(buf, offset)?)
        }

        #[cfg(not(any(unix, windows)))]
        {
            use std::io::{Read, Seek, SeekFrom};
            let mut file = &self.file;
            file.seek(SeekFrom::Start(offset))?;
            Ok(file.read(buf)?)
        }
    }

    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn reads_at_offsets() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();

        let reader = LocalFileReader::new(tmp.path()).unwrap();
        assert_eq!(reader.size(), 10);

        let mut buf = [0u8; 4];
        reader.read_exact_at(3, &mut buf).await.unwrap();
        assert_eq!(&buf, b"3456");
    }

    #[tokio::test]
    async fn short_source_is_an_error() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"abc").unwrap();

        let reader = LocalFileReader::new(tmp.path()).unwrap();
        let mut buf = [0u8; 8];
        assert!(reader.read_exact_at(0, &mut buf).await.is_err());
    }
}
