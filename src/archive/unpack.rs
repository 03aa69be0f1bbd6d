use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

use crate::io::{LocalFileReader, ReadAt};
use crate::zip::{CompressionMethod, ZipExtractor, ZipFileEntry};
use crate::{Error, Result};

use super::compression::CompressionTable;
use super::rename::{RenameTable, collision_key, replace_base_name, stable_hash};

/// What unpacking learned about the archive, needed to repack it faithfully
#[derive(Debug, Clone, Default)]
pub struct UnpackReport {
    pub compression: CompressionTable,
    pub renames: RenameTable,
}

/// An entry scheduled for extraction
struct Planned<'a> {
    entry: &'a ZipFileEntry,
    host_path: PathBuf,
}

/// Opens a package archive and extracts it collision-safely
pub struct ArchiveUnpacker<R: ReadAt> {
    extractor: ZipExtractor<R>,
}

impl ArchiveUnpacker<LocalFileReader> {
    pub fn open(archive_path: &Path) -> Result<Self> {
        let reader = LocalFileReader::new(archive_path)?;
        Ok(Self::new(Arc::new(reader)))
    }
}

impl<R: ReadAt> ArchiveUnpacker<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            extractor: ZipExtractor::new(reader),
        }
    }

    /// Build the compression and rename tables, and extract every entry
    /// under `destination` when one is given.
    ///
    /// All entries are validated before anything is written, so a rejected
    /// archive leaves `destination` untouched.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedArchive`] for an unreadable Central Directory,
    /// unsupported compression, or entry paths escaping the destination.
    pub async fn unpack(&self, destination: Option<&Path>) -> Result<UnpackReport> {
        let entries = self.extractor.list_files().await?;

        let mut report = UnpackReport::default();
        let mut seen = HashSet::with_capacity(entries.len());
        let mut plan = Vec::with_capacity(entries.len());

        for entry in &entries {
            if entry.is_encrypted() {
                return Err(Error::MalformedArchive(format!(
                    "{} is encrypted",
                    entry.file_name
                )));
            }
            let method = match entry.compression_method {
                CompressionMethod::Unknown(m) => {
                    return Err(Error::MalformedArchive(format!(
                        "{} uses unsupported compression method {m}",
                        entry.file_name
                    )));
                }
                known => known,
            };

            let original = entry.file_name.clone();
            let mut host_name = original.clone();
            // Directory entries carry no data, so sharing a folded name is harmless
            if !entry.is_directory && !seen.insert(collision_key(&original)) {
                host_name = unique_rename(&original, &mut seen);
                debug!("Renaming {original} to {host_name} (case collision)");
                report.renames.insert(host_name.clone(), original.clone())?;
            }

            let host_path = safe_relative_path(&host_name)?;
            report.compression.insert(original, method);
            plan.push(Planned { entry, host_path });
        }

        if !report.renames.is_empty() {
            info!(
                "{} entries renamed to avoid case-insensitive collisions",
                report.renames.len()
            );
        }

        if let Some(destination) = destination {
            fs::create_dir_all(destination).await?;
            for Planned { entry, host_path } in plan {
                let target = destination.join(&host_path);
                if entry.is_directory {
                    fs::create_dir_all(&target).await?;
                } else {
                    debug!("  extracting: {}", entry.file_name);
                    self.extractor.extract_to_file(entry, &target).await?;
                }
            }
        }

        Ok(report)
    }
}

/// Unpack the archive at `archive_path`, optionally extracting it.
pub async fn unpack(archive_path: &Path, destination: Option<&Path>) -> Result<UnpackReport> {
    ArchiveUnpacker::open(archive_path)?.unpack(destination).await
}

/// Renamed path for `original` whose collision key is not taken yet.
///
/// The hash input is salted with an attempt counter until the result is free.
fn unique_rename(original: &str, seen: &mut HashSet<String>) -> String {
    let mut attempt = 0u32;
    loop {
        let input = if attempt == 0 {
            original.to_string()
        } else {
            format!("{original}#{attempt}")
        };
        let candidate = replace_base_name(original, &stable_hash(&input));
        if seen.insert(collision_key(&candidate)) {
            return candidate;
        }
        attempt += 1;
    }
}

/// Archive entry name as a relative host path, refusing anything that could
/// land outside the extraction root.
fn safe_relative_path(name: &str) -> Result<PathBuf> {
    let trimmed = name.trim_end_matches('/');
    if trimmed.is_empty() || name.starts_with('/') || name.contains('\\') {
        return Err(Error::MalformedArchive(format!(
            "refusing unsafe entry path {name:?}"
        )));
    }

    let mut path = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::MalformedArchive(format!(
                    "refusing unsafe entry path {name:?}"
                )));
            }
        }
    }
    if path.as_os_str().is_empty() {
        return Err(Error::MalformedArchive(format!(
            "refusing unsafe entry path {name:?}"
        )));
    }
    Ok(path)
}
