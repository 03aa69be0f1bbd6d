//! Streaming ZIP archive writer.
//!
//! Emits local file headers and data as entries are added, then the
//! Central Directory and End of Central Directory record on
//! [`ZipWriter::finish`]. Only the ZIP32 format is produced; inputs that
//! need ZIP64 are rejected with [`Error::ArchiveTooLarge`].
//!
//! Every entry carries the same timestamp and an MS-DOS "version made by"
//! host, so archives do not depend on the packing machine's file system.

use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::Write;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{Error, Result};

use super::structures::{
    CDFH_SIGNATURE, CompressionMethod, DosDateTime, EndOfCentralDirectory, LFH_SIGNATURE,
};

/// Version 2.0: deflate and directories
const VERSION_NEEDED: u16 = 20;
/// Host system 0 (MS-DOS/FAT) in the high byte, APPNOTE version 2.0 in the low byte
const VERSION_MADE_BY: u16 = 20;
/// General purpose flag bit 11: name is UTF-8
const FLAG_UTF8: u16 = 0x0800;
/// MS-DOS directory attribute
const DOS_ATTR_DIRECTORY: u32 = 0x10;

const ZIP32_LIMIT: u64 = 0xFFFF_FFFF;

struct CentralRecord {
    name: Vec<u8>,
    flags: u16,
    method: u16,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    lfh_offset: u32,
    external_attrs: u32,
}

/// Writes a ZIP archive to any async sink
pub struct ZipWriter<W: AsyncWrite + Unpin> {
    out: W,
    offset: u64,
    records: Vec<CentralRecord>,
    timestamp: DosDateTime,
}

impl<W: AsyncWrite + Unpin> ZipWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            offset: 0,
            records: Vec::new(),
            timestamp: DosDateTime::now(),
        }
    }

    /// Use a fixed timestamp for every entry written from now on.
    pub fn with_timestamp(mut self, timestamp: DosDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn entry_count(&self) -> usize {
        self.records.len()
    }

    /// Append a file entry, compressing it with `method`.
    pub async fn add_file(
        &mut self,
        name: &str,
        data: &[u8],
        method: CompressionMethod,
    ) -> Result<()> {
        let compressed = match method {
            CompressionMethod::Stored => None,
            CompressionMethod::Deflated => Some(deflate_bytes(data)?),
            CompressionMethod::Unknown(m) => {
                return Err(Error::MalformedArchive(format!(
                    "cannot write {name} with compression method {m}"
                )));
            }
        };
        let payload = compressed.as_deref().unwrap_or(data);
        self.write_entry(name, data, payload, method.as_u16(), 0)
            .await
    }

    /// Append a directory entry. `name` must end with `/`.
    pub async fn add_directory(&mut self, name: &str) -> Result<()> {
        debug_assert!(name.ends_with('/'));
        self.write_entry(name, &[], &[], CompressionMethod::Stored.as_u16(), DOS_ATTR_DIRECTORY)
            .await
    }

    async fn write_entry(
        &mut self,
        name: &str,
        data: &[u8],
        payload: &[u8],
        method: u16,
        external_attrs: u32,
    ) -> Result<()> {
        if self.records.len() >= 0xFFFF {
            return Err(Error::ArchiveTooLarge(
                "more than 65534 entries".to_string(),
            ));
        }
        if data.len() as u64 >= ZIP32_LIMIT || payload.len() as u64 >= ZIP32_LIMIT {
            return Err(Error::ArchiveTooLarge(format!("{name} exceeds 4 GiB")));
        }
        if self.offset >= ZIP32_LIMIT {
            return Err(Error::ArchiveTooLarge(format!(
                "{name} would start beyond 4 GiB"
            )));
        }
        let name_len = u16::try_from(name.len())
            .map_err(|_| Error::ArchiveTooLarge(format!("entry name too long: {name}")))?;

        let flags = if name.is_ascii() { 0 } else { FLAG_UTF8 };
        let crc32 = crc32fast::hash(data);

        let mut header = Vec::with_capacity(30 + name.len());
        header.extend_from_slice(LFH_SIGNATURE);
        put_u16(&mut header, VERSION_NEEDED);
        put_u16(&mut header, flags);
        put_u16(&mut header, method);
        put_u16(&mut header, self.timestamp.time);
        put_u16(&mut header, self.timestamp.date);
        put_u32(&mut header, crc32);
        put_u32(&mut header, payload.len() as u32);
        put_u32(&mut header, data.len() as u32);
        put_u16(&mut header, name_len);
        put_u16(&mut header, 0);
        header.extend_from_slice(name.as_bytes());

        self.out.write_all(&header).await?;
        self.out.write_all(payload).await?;

        self.records.push(CentralRecord {
            name: name.as_bytes().to_vec(),
            flags,
            method,
            crc32,
            compressed_size: payload.len() as u32,
            uncompressed_size: data.len() as u32,
            lfh_offset: self.offset as u32,
            external_attrs,
        });
        self.offset += (header.len() + payload.len()) as u64;
        Ok(())
    }

    /// Write the Central Directory and EOCD, flush, and hand back the sink.
    pub async fn finish(mut self) -> Result<W> {
        let cd_start = self.offset;
        let mut directory = Vec::new();
        for record in &self.records {
            directory.extend_from_slice(CDFH_SIGNATURE);
            put_u16(&mut directory, VERSION_MADE_BY);
            put_u16(&mut directory, VERSION_NEEDED);
            put_u16(&mut directory, record.flags);
            put_u16(&mut directory, record.method);
            put_u16(&mut directory, self.timestamp.time);
            put_u16(&mut directory, self.timestamp.date);
            put_u32(&mut directory, record.crc32);
            put_u32(&mut directory, record.compressed_size);
            put_u32(&mut directory, record.uncompressed_size);
            put_u16(&mut directory, record.name.len() as u16);
            put_u16(&mut directory, 0); // extra
            put_u16(&mut directory, 0); // comment
            put_u16(&mut directory, 0); // disk number start
            put_u16(&mut directory, 0); // internal attributes
            put_u32(&mut directory, record.external_attrs);
            put_u32(&mut directory, record.lfh_offset);
            directory.extend_from_slice(&record.name);
        }

        if cd_start >= ZIP32_LIMIT || cd_start + directory.len() as u64 >= ZIP32_LIMIT {
            return Err(Error::ArchiveTooLarge(
                "Central Directory would start beyond 4 GiB".to_string(),
            ));
        }

        let count = self.records.len() as u16;
        let mut eocd = Vec::with_capacity(EndOfCentralDirectory::SIZE);
        eocd.extend_from_slice(EndOfCentralDirectory::SIGNATURE);
        put_u16(&mut eocd, 0); // this disk
        put_u16(&mut eocd, 0); // disk with Central Directory
        put_u16(&mut eocd, count);
        put_u16(&mut eocd, count);
        put_u32(&mut eocd, directory.len() as u32);
        put_u32(&mut eocd, cd_start as u32);
        put_u16(&mut eocd, 0); // comment length

        self.out.write_all(&directory).await?;
        self.out.write_all(&eocd).await?;
        self.out.flush().await?;
        Ok(self.out)
    }
}

fn deflate_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}
