//! ZIP archive reading and writing.
//!
//! APK, AAB and IPA packages are all plain ZIP containers. This module reads
//! them through the Central Directory and writes them back out.
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - [`parser`]: Low-level parsing of ZIP structures from raw bytes
//! - [`extractor`]: Entry decompression and extraction to memory or disk
//! - [`writer`]: Streaming ZIP32 writer used when repacking
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions when reading
//! - STORED (no compression) and DEFLATE methods
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods
//! - The writer never emits ZIP64 records

mod extractor;
mod parser;
mod structures;
mod writer;

pub use extractor::ZipExtractor;
pub use parser::ZipParser;
pub use structures::*;
pub use writer::ZipWriter;

#[cfg(test)]
pub(crate) mod fixtures {
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use std::io::Write;

    /// A one-entry deflated archive whose Central Directory record takes the
    /// uncompressed size and local header offset from a ZIP64 extra field.
    /// The local header itself sits at offset 0.
    pub fn zip64_entry(
        name: &str,
        payload: &[u8],
        uncompressed_size: u64,
        lfh_offset: u64,
    ) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).unwrap();
        let compressed = encoder.finish().unwrap();
        let crc = crc32fast::hash(payload);

        let mut out = Vec::new();
        out.extend_from_slice(b"PK\x03\x04");
        out.extend_from_slice(&45u16.to_le_bytes()); // version needed
        out.extend_from_slice(&0u16.to_le_bytes()); // flags
        out.extend_from_slice(&8u16.to_le_bytes()); // deflated
        out.extend_from_slice(&[0; 4]); // time, date
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&compressed);

        let cd_offset = out.len();
        let mut extra = Vec::new();
        extra.extend_from_slice(&1u16.to_le_bytes());
        extra.extend_from_slice(&16u16.to_le_bytes());
        extra.extend_from_slice(&uncompressed_size.to_le_bytes());
        extra.extend_from_slice(&lfh_offset.to_le_bytes());

        out.extend_from_slice(b"PK\x01\x02");
        out.extend_from_slice(&45u16.to_le_bytes()); // made by
        out.extend_from_slice(&45u16.to_le_bytes()); // needed
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&8u16.to_le_bytes());
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        out.extend_from_slice(&u32::MAX.to_le_bytes()); // uncompressed, see extra
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // comment
        out.extend_from_slice(&0u16.to_le_bytes()); // disk
        out.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
        out.extend_from_slice(&0u32.to_le_bytes()); // external attrs
        out.extend_from_slice(&u32::MAX.to_le_bytes()); // offset, see extra
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&extra);
        let cd_size = out.len() - cd_offset;

        out.extend_from_slice(b"PK\x05\x06");
        out.extend_from_slice(&[0; 4]); // disk numbers
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&(cd_size as u32).to_le_bytes());
        out.extend_from_slice(&(cd_offset as u32).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }
}
