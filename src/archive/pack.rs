use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::zip::{DosDateTime, ZipWriter};
use crate::{Error, Result};

use super::compression::CompressionTable;
use super::rename::RenameTable;

/// A file or directory found under the source tree, under its archive name
#[derive(Debug)]
struct PackItem {
    /// Original archive path (`dir/` for directories)
    name: String,
    /// `None` for directories
    source: Option<PathBuf>,
}

/// Rebuild a package archive from `source_dir`.
///
/// Renamed host paths are restored to their original archive paths and each
/// file is compressed with the method the original archive used for it.
/// Entries keep their original Central Directory order, followed by files
/// that are new to the tree, sorted by path.
///
/// The archive is assembled in a temporary file next to `output` and only
/// moved into place once complete.
pub async fn pack(
    source_dir: &Path,
    output: &Path,
    compression: &CompressionTable,
    renames: &RenameTable,
) -> Result<()> {
    let items = collect(source_dir, compression, renames)?;
    let timestamp = DosDateTime::now();

    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).await?;
    let staging = tempfile::Builder::new()
        .prefix(".hybridpack-")
        .suffix(".zip")
        .tempfile_in(&parent)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // NamedTempFile is created 0600
        staging
            .as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))?;
    }

    let file = fs::File::from_std(staging.as_file().try_clone()?);
    let mut writer = ZipWriter::new(BufWriter::new(file)).with_timestamp(timestamp);

    for item in &items {
        match &item.source {
            None => writer.add_directory(&item.name).await?,
            Some(path) => {
                let data = fs::read(path).await.map_err(|e| {
                    io::Error::new(e.kind(), format!("reading {}: {e}", path.display()))
                })?;
                let method = compression.method_for(&item.name);
                debug!("  adding: {} ({:?})", item.name, method);
                writer.add_file(&item.name, &data, method).await?;
            }
        }
    }

    let mut sink = writer.finish().await?;
    sink.flush().await?;
    sink.into_inner().sync_all().await?;

    staging.persist(output).map_err(|e| {
        io::Error::new(e.error.kind(), format!("{}: {}", output.display(), e.error))
    })?;
    Ok(())
}

/// Walk `source_dir` and return the entries to write, in archive order.
fn collect(
    source_dir: &Path,
    compression: &CompressionTable,
    renames: &RenameTable,
) -> Result<Vec<PackItem>> {
    if !source_dir.is_dir() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", source_dir.display()),
        )));
    }
    let mut known = Vec::new();
    let mut fresh = Vec::new();

    for entry in WalkDir::new(source_dir).follow_links(false).min_depth(1) {
        let entry = entry.map_err(|e| {
            io::Error::other(format!("walking {}: {e}", source_dir.display()))
        })?;
        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|_| io::Error::other("walked outside the source directory"))?;
        let host_name = archive_name(relative)?;

        let file_type = entry.file_type();
        let item = if file_type.is_dir() {
            let name = format!("{host_name}/");
            // Only directories the original archive listed get an entry
            if !compression.contains(&name) {
                continue;
            }
            PackItem { name, source: None }
        } else if file_type.is_file() {
            let name = renames
                .original_of(&host_name)
                .map(str::to_string)
                .unwrap_or(host_name);
            PackItem {
                name,
                source: Some(entry.into_path()),
            }
        } else {
            warn!("Skipping {}: not a regular file", entry.path().display());
            continue;
        };

        match compression.position(&item.name) {
            Some(position) => known.push((position, item)),
            None => fresh.push(item),
        }
    }

    known.sort_by_key(|(position, _)| *position);
    fresh.sort_by(|a, b| a.name.cmp(&b.name));
    if !fresh.is_empty() {
        debug!("{} entries are new to the archive", fresh.len());
    }

    Ok(known
        .into_iter()
        .map(|(_, item)| item)
        .chain(fresh)
        .collect())
}

/// Forward-slash archive name for a path relative to the source root
fn archive_name(relative: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        let part = component.as_os_str().to_str().ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} is not valid UTF-8", relative.display()),
            ))
        })?;
        parts.push(part);
    }
    Ok(parts.join("/"))
}
