//! Package name recovery from a compiled (binary XML) `AndroidManifest.xml`.
//!
//! The manifest is a stream of little-endian chunks. Only what is needed to
//! reach the root `<manifest>` start tag is decoded: the string pool, then a
//! scan over resource-map and namespace chunks up to the first start tag.
//! The first start tag is the only one inspected.

use super::cursor::BinaryCursor;
use crate::{Error, Result};

/// Outer XML chunk header (type + size), skipped unconditionally
const XML_HEADER_SIZE: usize = 8;
/// Bytes of a chunk header after its type word: size, line number, comment
const NODE_HEADER_REST: usize = 12;

const RES_STRING_POOL_TYPE: u32 = 0x0001;
const CHUNK_RESOURCE_MAP: u32 = 0x0008_0180;
const CHUNK_START_NAMESPACE: u32 = 0x0010_0100;
const CHUNK_END_NAMESPACE: u32 = 0x0010_0101;
const CHUNK_START_TAG: u32 = 0x0010_0102;

const ATTRIBUTE_WORDS: usize = 5;
const PACKAGE_ATTRIBUTE: &str = "package";
const AMPERSAND: u16 = b'&' as u16;

/// UTF-16 string pool of a compiled XML document.
struct StringPool {
    offsets: Vec<u32>,
    data: Vec<u8>,
}

impl StringPool {
    fn parse(cursor: &mut BinaryCursor<'_>) -> Result<Self> {
        let chunk_start = cursor.position();
        let chunk_type = cursor.read_u32_le()?;
        if chunk_type & 0xFFFF != RES_STRING_POOL_TYPE {
            return Err(Error::MalformedManifest(format!(
                "expected string pool chunk, found type {chunk_type:#010x}"
            )));
        }

        let chunk_size = cursor.read_u32_le()? as usize;
        let string_count = cursor.read_u32_le()? as usize;
        let style_count = cursor.read_u32_le()? as usize;
        let _flags = cursor.read_u32_le()?;
        let strings_offset = cursor.read_u32_le()? as usize;
        let styles_offset = cursor.read_u32_le()? as usize;

        let chunk_end = chunk_start
            .checked_add(chunk_size)
            .ok_or_else(|| Error::MalformedManifest("string pool size overflows".to_string()))?;

        let mut offsets = Vec::with_capacity(string_count.min(cursor.remaining() / 4));
        for _ in 0..string_count {
            offsets.push(cursor.read_u32_le()?);
        }
        let style_bytes = style_count.checked_mul(4).ok_or_else(|| {
            Error::MalformedManifest("style offset table size overflows".to_string())
        })?;
        cursor.skip(style_bytes)?;

        let strings_end = if styles_offset != 0 {
            styles_offset.min(chunk_size)
        } else {
            chunk_size
        };
        let span = strings_end.checked_sub(strings_offset).ok_or_else(|| {
            Error::MalformedManifest(format!(
                "strings start at {strings_offset} beyond their end at {strings_end}"
            ))
        })?;

        cursor.seek(chunk_start + strings_offset)?;
        let data = cursor.read(span / 4 * 4)?.to_vec();

        // Style data, if any, runs to the end of the chunk
        cursor.seek(chunk_end)?;

        Ok(Self { offsets, data })
    }

    fn unit_at(&self, offset: usize) -> Result<u16> {
        match self.data.get(offset..offset + 2) {
            Some(b) => Ok(u16::from_le_bytes([b[0], b[1]])),
            None => Err(Error::MalformedManifest(format!(
                "string data read at {offset} is out of range"
            ))),
        }
    }

    /// Decode string `index`: a u16 length followed by that many UTF-16 units.
    ///
    /// `&` units are dropped as they are read.
    fn get(&self, index: u32) -> Result<String> {
        let offset = *self.offsets.get(index as usize).ok_or_else(|| {
            Error::MalformedManifest(format!(
                "string index {index} out of range ({} strings)",
                self.offsets.len()
            ))
        })? as usize;

        let length = self.unit_at(offset)? as usize;
        let mut units = Vec::with_capacity(length);
        for i in 1..=length {
            let unit = self.unit_at(offset + i * 2)?;
            if unit != AMPERSAND {
                units.push(unit);
            }
        }
        Ok(String::from_utf16_lossy(&units))
    }
}

/// The string indices and value type of one start-tag attribute.
#[derive(Debug, Clone, Copy)]
struct AttributeRecord {
    name: u32,
    raw_value: u32,
    /// High byte of the typed-value header word
    #[cfg_attr(not(test), expect(dead_code))]
    value_type: u8,
}

/// Scan forward to the first start tag and return its attributes.
///
/// Returns `None` if the stream ends cleanly before any start tag.
fn first_start_tag(cursor: &mut BinaryCursor<'_>) -> Result<Option<Vec<AttributeRecord>>> {
    while cursor.remaining() > 0 {
        let chunk_type = cursor.read_u32_le()?;
        match chunk_type {
            CHUNK_RESOURCE_MAP => {
                let chunk_size = cursor.read_u32_le()? as usize;
                let words = (chunk_size / 4).checked_sub(2).ok_or_else(|| {
                    Error::MalformedManifest(format!(
                        "resource map chunk size {chunk_size} is smaller than its header"
                    ))
                })?;
                cursor.skip(words * 4)?;
            }
            CHUNK_START_NAMESPACE | CHUNK_END_NAMESPACE => {
                cursor.skip(NODE_HEADER_REST)?;
                cursor.skip(8)?; // prefix, uri
            }
            CHUNK_START_TAG => {
                cursor.skip(NODE_HEADER_REST)?;
                cursor.skip(12)?; // namespace, name, attribute start/size
                // High half carries the id attribute index
                let count = (cursor.read_u32_le()? & 0xFFFF) as usize;
                cursor.skip(4)?; // class and style attribute indices

                let mut words = Vec::with_capacity(count * ATTRIBUTE_WORDS);
                for _ in 0..count * ATTRIBUTE_WORDS {
                    words.push(cursor.read_u32_le()?);
                }
                for i in (3..words.len()).step_by(ATTRIBUTE_WORDS) {
                    words[i] >>= 24;
                }

                let attributes = words
                    .chunks_exact(ATTRIBUTE_WORDS)
                    .map(|w| AttributeRecord {
                        name: w[1],
                        raw_value: w[2],
                        value_type: w[3] as u8,
                    })
                    .collect();
                return Ok(Some(attributes));
            }
            _ => cursor.skip(NODE_HEADER_REST)?,
        }
    }
    Ok(None)
}

fn find_package(data: &[u8]) -> Result<Option<String>> {
    let mut cursor = BinaryCursor::new(data);
    cursor.skip(XML_HEADER_SIZE)?;

    let pool = StringPool::parse(&mut cursor)?;
    let Some(attributes) = first_start_tag(&mut cursor)? else {
        return Ok(None);
    };

    for attribute in &attributes {
        if pool.get(attribute.name)? == PACKAGE_ATTRIBUTE {
            return pool.get(attribute.raw_value).map(Some);
        }
    }
    Ok(None)
}

/// Return the `package` attribute of the manifest's root tag.
///
/// `Ok(None)` means the first start tag carries no `package` attribute.
///
/// # Errors
///
/// [`Error::MalformedManifest`] for truncated or inconsistent chunk data.
pub fn extract_package(data: &[u8]) -> Result<Option<String>> {
    find_package(data).map_err(|e| match e {
        Error::OutOfBounds { .. } => Error::MalformedManifest(e.to_string()),
        other => other,
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Builders for small compiled-XML documents.

    fn put(buf: &mut Vec<u8>, value: u32) {
        buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn string_pool(strings: &[&str]) -> Vec<u8> {
        let mut offsets = Vec::new();
        let mut data = Vec::new();
        for s in strings {
            offsets.push(data.len() as u32);
            let units: Vec<u16> = s.encode_utf16().collect();
            data.extend_from_slice(&(units.len() as u16).to_le_bytes());
            for u in units {
                data.extend_from_slice(&u.to_le_bytes());
            }
            data.extend_from_slice(&[0, 0]);
        }
        while data.len() % 4 != 0 {
            data.push(0);
        }

        let strings_offset = 28 + 4 * strings.len() as u32;
        let mut chunk = Vec::new();
        put(&mut chunk, 0x001C_0001);
        put(&mut chunk, strings_offset + data.len() as u32);
        put(&mut chunk, strings.len() as u32);
        put(&mut chunk, 0); // styles
        put(&mut chunk, 0); // flags: UTF-16
        put(&mut chunk, strings_offset);
        put(&mut chunk, 0);
        for o in offsets {
            put(&mut chunk, o);
        }
        chunk.extend_from_slice(&data);
        chunk
    }

    pub fn resource_map(ids: &[u32]) -> Vec<u8> {
        let mut chunk = Vec::new();
        put(&mut chunk, 0x0008_0180);
        put(&mut chunk, 8 + 4 * ids.len() as u32);
        for id in ids {
            put(&mut chunk, *id);
        }
        chunk
    }

    pub fn start_namespace(prefix: u32, uri: u32) -> Vec<u8> {
        let mut chunk = Vec::new();
        put(&mut chunk, 0x0010_0100);
        put(&mut chunk, 24);
        put(&mut chunk, 1); // line
        put(&mut chunk, 0xFFFF_FFFF); // comment
        put(&mut chunk, prefix);
        put(&mut chunk, uri);
        chunk
    }

    /// Start tag with `(name, value)` string-typed attributes.
    pub fn start_tag(tag_name: u32, attributes: &[(u32, u32)]) -> Vec<u8> {
        let mut chunk = Vec::new();
        put(&mut chunk, 0x0010_0102);
        put(&mut chunk, 36 + 20 * attributes.len() as u32);
        put(&mut chunk, 2); // line
        put(&mut chunk, 0xFFFF_FFFF); // comment
        put(&mut chunk, 0xFFFF_FFFF); // namespace
        put(&mut chunk, tag_name);
        put(&mut chunk, 0x0014_0014); // attribute start / size
        // id attribute index in the high half must be ignored
        put(&mut chunk, (3 << 16) | attributes.len() as u32);
        put(&mut chunk, 0); // class / style
        for (name, value) in attributes {
            put(&mut chunk, 0xFFFF_FFFF);
            put(&mut chunk, *name);
            put(&mut chunk, *value);
            put(&mut chunk, 0x0300_0008); // size 8, type string
            put(&mut chunk, *value);
        }
        chunk
    }

    pub fn document(chunks: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = chunks.concat();
        let mut doc = Vec::new();
        put(&mut doc, 0x0008_0003);
        put(&mut doc, 8 + body.len() as u32);
        doc.extend_from_slice(&body);
        doc
    }
}
