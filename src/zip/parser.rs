//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Read the Central Directory to get metadata for all files
//! 4. For extraction, read each file's Local File Header and data
//!
//! Entries are returned in Central Directory order, which is the order
//! the packer later reproduces.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::sync::Arc;

use crate::io::ReadAt;
use crate::{Error, Result};

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

fn malformed(msg: impl Into<String>) -> Error {
    Error::MalformedArchive(msg.into())
}

/// Low-level ZIP file parser.
///
/// This struct handles reading and parsing ZIP structures from
/// a data source. It's generic over the reader type so tests can
/// feed it in-memory archives.
///
/// ## Usage
///
/// Typically used through [`ZipExtractor`](super::ZipExtractor)
/// rather than directly.
pub struct ZipParser<R: ReadAt> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    /// Create a new parser for the given reader.
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// The EOCD is located at the end of the ZIP file. This method
    /// handles both the simple case (no comment) and archives with
    /// comments by searching backwards for the signature.
    ///
    /// # Returns
    ///
    /// A tuple of (EOCD record, offset of EOCD in file).
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedArchive`] if no valid EOCD can be found.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        if self.size < EndOfCentralDirectory::SIZE as u64 {
            return Err(malformed("file is too small to be a ZIP archive"));
        }

        // Common case first: no archive comment
        let offset = self.size - EndOfCentralDirectory::SIZE as u64;
        let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
        self.reader.read_exact_at(offset, &mut buf).await?;

        if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && &buf[20..22] == b"\x00\x00" {
            let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
            return Ok((eocd, offset));
        }

        // EOCD not at expected location - search backwards through
        // the largest possible comment.
        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf).await?;

        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                // The comment length field must account for exactly the remaining bytes
                let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;

                if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                    let eocd = EndOfCentralDirectory::from_bytes(
                        &buf[i..i + EndOfCentralDirectory::SIZE],
                    )?;
                    return Ok((eocd, search_start + i as u64));
                }
            }
        }

        Err(malformed("no End of Central Directory record found"))
    }

    /// Read the ZIP64 End of Central Directory record.
    ///
    /// Called when the regular EOCD indicates ZIP64 extensions are needed
    /// (fields set to 0xFFFF or 0xFFFFFFFF).
    pub async fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64EOCD> {
        // The ZIP64 EOCD Locator is located immediately before the regular EOCD
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE as u64)
            .ok_or_else(|| malformed("missing ZIP64 locator"))?;
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.reader
            .read_exact_at(locator_offset, &mut locator_buf)
            .await?;

        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;
        if locator
            .eocd64_offset
            .checked_add(Zip64EOCD::MIN_SIZE as u64)
            .is_none_or(|end| end > self.size)
        {
            return Err(malformed("ZIP64 End of Central Directory is out of range"));
        }

        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.reader
            .read_exact_at(locator.eocd64_offset, &mut eocd64_buf)
            .await?;

        Zip64EOCD::from_bytes(&eocd64_buf)
    }

    /// List all entries in the ZIP archive, in Central Directory order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedArchive`] if the directory is missing,
    /// spans several disks, or points outside the file.
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        let (eocd, eocd_offset) = self.find_eocd().await?;
        if eocd.is_multi_disk() {
            return Err(malformed("multi-disk archives are not supported"));
        }

        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset).await?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        if cd_offset.saturating_add(cd_size) > self.size {
            return Err(malformed("Central Directory extends past end of file"));
        }
        // Every header is at least CDFH_MIN_SIZE bytes, which bounds the count
        if total_entries.saturating_mul(CDFH_MIN_SIZE as u64) > cd_size {
            return Err(malformed(format!(
                "Central Directory of {cd_size} bytes cannot hold {total_entries} entries"
            )));
        }

        // Read the entire Central Directory in one request
        let mut cd_data = vec![0u8; cd_size as usize];
        self.reader.read_exact_at(cd_offset, &mut cd_data).await?;

        let mut entries = Vec::with_capacity(total_entries as usize);
        let mut cursor = Cursor::new(cd_data.as_slice());

        for index in 0..total_entries {
            let entry = Self::parse_cdfh(&mut cursor).map_err(|e| match e {
                Error::Io(io) => malformed(format!("truncated Central Directory entry {index}: {io}")),
                other => other,
            })?;
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Parse a Central Directory File Header from a cursor.
    ///
    /// The CDFH contains metadata about a file in the archive, including
    /// its name, sizes, and location of the actual file data.
    fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> Result<ZipFileEntry> {
        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig)?;
        if sig != CDFH_SIGNATURE {
            return Err(malformed("invalid Central Directory File Header"));
        }

        let _version_made_by = cursor.read_u16::<LittleEndian>()?;
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let last_mod_time = cursor.read_u16::<LittleEndian>()?;
        let last_mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>()?;
        let file_comment_length = cursor.read_u16::<LittleEndian>()?;
        let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let _external_attrs = cursor.read_u32::<LittleEndian>()?;
        let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

        let mut file_name_bytes = vec![0u8; file_name_length as usize];
        cursor.read_exact(&mut file_name_bytes)?;
        let file_name = String::from_utf8(file_name_bytes)
            .map_err(|_| malformed("entry name is not valid UTF-8"))?;

        // Directory entries end with '/'
        let is_directory = file_name.ends_with('/');

        // ZIP64 extended information lives in extra field 0x0001
        let extra_field_end = cursor.position() + extra_field_length as u64;
        if extra_field_end > cursor.get_ref().len() as u64 {
            return Err(malformed(format!("extra field of {file_name} is truncated")));
        }

        while cursor.position() + 4 <= extra_field_end {
            let header_id = cursor.read_u16::<LittleEndian>()?;
            let field_size = cursor.read_u16::<LittleEndian>()?;
            let field_end = cursor.position() + field_size as u64;

            if header_id == 0x0001 {
                // Fields are present only if the matching header field is saturated
                if uncompressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                    uncompressed_size = cursor.read_u64::<LittleEndian>()?;
                }
                if compressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                    compressed_size = cursor.read_u64::<LittleEndian>()?;
                }
                if lfh_offset == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                    lfh_offset = cursor.read_u64::<LittleEndian>()?;
                }
            }
            cursor.set_position(field_end.min(extra_field_end));
        }

        cursor.set_position(extra_field_end);

        // Skip over the file comment (we don't use it)
        let comment_end = cursor.position() + file_comment_length as u64;
        if comment_end > cursor.get_ref().len() as u64 {
            return Err(malformed(format!("comment of {file_name} is truncated")));
        }
        cursor.set_position(comment_end);

        Ok(ZipFileEntry {
            file_name,
            flags,
            compression_method: CompressionMethod::from_u16(compression_method),
            compressed_size,
            uncompressed_size,
            crc32,
            lfh_offset,
            last_mod_time,
            last_mod_date,
            is_directory,
        })
    }

    /// Get the actual data offset for a file entry.
    ///
    /// The Local File Header (LFH) has variable-length fields (filename,
    /// extra field) that may differ from the Central Directory entry.
    /// This method reads the LFH to calculate where the actual file
    /// data begins.
    pub async fn get_data_offset(&self, entry: &ZipFileEntry) -> Result<u64> {
        let out_of_range =
            || malformed(format!("local header of {} is out of range", entry.file_name));
        if entry
            .lfh_offset
            .checked_add(LFH_SIZE as u64)
            .is_none_or(|end| end > self.size)
        {
            return Err(out_of_range());
        }

        let mut lfh_buf = vec![0u8; LFH_SIZE];
        self.reader.read_exact_at(entry.lfh_offset, &mut lfh_buf).await?;

        if &lfh_buf[0..4] != LFH_SIGNATURE {
            return Err(malformed(format!(
                "invalid Local File Header for {}",
                entry.file_name
            )));
        }

        let mut cursor = Cursor::new(&lfh_buf);
        cursor.set_position(26); // Offset to filename length field

        let file_name_length = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as u64;

        // Data starts after: LFH (30 bytes) + filename + extra field
        let data_offset = entry
            .lfh_offset
            .checked_add(LFH_SIZE as u64 + file_name_length + extra_field_length)
            .ok_or_else(out_of_range)?;

        if data_offset.saturating_add(entry.compressed_size) > self.size {
            return Err(malformed(format!(
                "data of {} extends past end of file",
                entry.file_name
            )));
        }

        Ok(data_offset)
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}
