//! Collision renaming for case-insensitive file systems.
//!
//! Two archive entries whose paths differ only in case (`Foo.txt`,
//! `foo.txt`) would overwrite each other when extracted on a
//! case-insensitive file system. Every entry after the first one of such a
//! group is extracted under a renamed path whose base name is a stable hash
//! of the original path; the [`RenameTable`] maps it back when repacking.

use std::collections::{BTreeMap, HashMap};

use crate::{Error, Result};

/// Width of the decimal hash that replaces a colliding base name
const HASH_DIGITS: usize = 8;
const HASH_MODULUS: u32 = 100_000_000;

/// Key under which two paths collide on a case-insensitive file system
pub fn collision_key(path: &str) -> String {
    path.to_lowercase()
}

/// Deterministic fixed-width decimal hash of `input` (CRC-32 of its UTF-8 bytes).
pub fn stable_hash(input: &str) -> String {
    format!(
        "{:0width$}",
        crc32fast::hash(input.as_bytes()) % HASH_MODULUS,
        width = HASH_DIGITS
    )
}

/// Replace the base name (file name minus extension) of the last path
/// segment with `replacement`, keeping directories and extension.
///
/// A name without an extension, or a dot-file, is replaced whole.
pub fn replace_base_name(path: &str, replacement: &str) -> String {
    let (dir, file) = match path.rfind('/') {
        Some(i) => path.split_at(i + 1),
        None => ("", path),
    };
    let ext = match file.rfind('.') {
        Some(i) if i > 0 => &file[i..],
        _ => "",
    };
    format!("{dir}{replacement}{ext}")
}

/// Bijective mapping between host-safe renamed paths and original archive paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameTable {
    to_original: BTreeMap<String, String>,
    to_renamed: HashMap<String, String>,
}

impl RenameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `original` is stored on disk as `renamed`.
    ///
    /// # Errors
    ///
    /// Fails if either side is already mapped, which would break the bijection.
    pub fn insert(&mut self, renamed: String, original: String) -> Result<()> {
        if self.to_original.contains_key(&renamed) || self.to_renamed.contains_key(&original) {
            return Err(Error::MalformedArchive(format!(
                "duplicate rename mapping {renamed} -> {original}"
            )));
        }
        self.to_renamed.insert(original.clone(), renamed.clone());
        self.to_original.insert(renamed, original);
        Ok(())
    }

    /// Original archive path for a renamed host path
    pub fn original_of(&self, renamed: &str) -> Option<&str> {
        self.to_original.get(renamed).map(String::as_str)
    }

    /// Host path an original archive path was extracted to, if it was renamed
    pub fn renamed_of(&self, original: &str) -> Option<&str> {
        self.to_renamed.get(original).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.to_original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_original.is_empty()
    }

    /// `(renamed, original)` pairs ordered by renamed path
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.to_original
            .iter()
            .map(|(r, o)| (r.as_str(), o.as_str()))
    }
}
