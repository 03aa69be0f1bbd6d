use flate2::read::DeflateDecoder;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::io::ReadAt;
use crate::{Error, Result};

use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipFileEntry};

const MAX_DEFLATE_RATIO: u64 = 1032;
const MAX_PREALLOC: u64 = 64 << 20;

/// ZIP file extractor
pub struct ZipExtractor<R: ReadAt> {
    parser: ZipParser<R>,
}

impl<R: ReadAt> ZipExtractor<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            parser: ZipParser::new(reader),
        }
    }

    /// List all entries in the archive, in Central Directory order
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        self.parser.list_files().await
    }

    /// Extract file data to memory, verifying size and CRC-32
    pub async fn extract_to_memory(&self, entry: &ZipFileEntry) -> Result<Vec<u8>> {
        if entry.is_encrypted() {
            return Err(Error::MalformedArchive(format!(
                "{} is encrypted",
                entry.file_name
            )));
        }

        let data_offset = self.parser.get_data_offset(entry).await?;
        let mut raw = vec![0u8; entry.compressed_size as usize];
        self.parser
            .reader()
            .read_exact_at(data_offset, &mut raw)
            .await?;

        let data = match entry.compression_method {
            CompressionMethod::Stored => raw,
            CompressionMethod::Deflated => {
                // The declared size is untrusted; deflate cannot expand past 1032:1
                let capacity = entry
                    .uncompressed_size
                    .min(entry.compressed_size.saturating_mul(MAX_DEFLATE_RATIO))
                    .min(MAX_PREALLOC);
                let mut out = Vec::with_capacity(capacity as usize);
                DeflateDecoder::new(raw.as_slice())
                    .take(entry.uncompressed_size.saturating_add(1))
                    .read_to_end(&mut out)
                    .map_err(|e| {
                        Error::MalformedArchive(format!(
                            "corrupt deflate stream in {}: {e}",
                            entry.file_name
                        ))
                    })?;
                out
            }
            CompressionMethod::Unknown(method) => {
                return Err(Error::MalformedArchive(format!(
                    "unsupported compression method {method} for {}",
                    entry.file_name
                )));
            }
        };

        if data.len() as u64 != entry.uncompressed_size {
            return Err(Error::MalformedArchive(format!(
                "{} inflated to {} bytes, expected {}",
                entry.file_name,
                data.len(),
                entry.uncompressed_size
            )));
        }
        if crc32fast::hash(&data) != entry.crc32 {
            return Err(Error::MalformedArchive(format!(
                "CRC-32 mismatch in {}",
                entry.file_name
            )));
        }

        Ok(data)
    }

    /// Extract file to disk
    pub async fn extract_to_file(&self, entry: &ZipFileEntry, output_path: &Path) -> Result<()> {
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let data = self.extract_to_memory(entry).await?;

        let mut file = fs::File::create(output_path).await?;
        file.write_all(&data).await?;
        file.flush().await?;

        Ok(())
    }
}
