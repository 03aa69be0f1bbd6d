//! Collision-safe unpacking and faithful repacking of package archives.
//!
//! [`unpack`] records the compression method of every entry and renames
//! entries that would collide on a case-insensitive file system. [`pack`]
//! consumes both tables to rebuild an archive with the original paths,
//! methods and entry order.

mod compression;
mod pack;
mod rename;
mod unpack;

pub use compression::CompressionTable;
pub use pack::pack;
pub use rename::{RenameTable, collision_key, replace_base_name, stable_hash};
pub use unpack::{ArchiveUnpacker, UnpackReport, unpack};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::zip::{CompressionMethod, DosDateTime, ZipWriter};
    use std::path::Path;

    async fn write_zip(path: &Path, entries: &[(&str, &[u8], CompressionMethod)]) {
        let mut writer = ZipWriter::new(Vec::new()).with_timestamp(DosDateTime::EPOCH);
        for (name, data, method) in entries {
            if name.ends_with('/') {
                writer.add_directory(name).await.unwrap();
            } else {
                writer.add_file(name, data, *method).await.unwrap();
            }
        }
        std::fs::write(path, writer.finish().await.unwrap()).unwrap();
    }

    /// `(path, method, data)` of every entry, in archive order
    async fn read_zip(path: &Path) -> Vec<(String, CompressionMethod, Vec<u8>)> {
        use crate::io::LocalFileReader;
        use crate::zip::ZipExtractor;
        use std::sync::Arc;

        let extractor = ZipExtractor::new(Arc::new(LocalFileReader::new(path).unwrap()));
        let mut out = Vec::new();
        for entry in extractor.list_files().await.unwrap() {
            let data = extractor.extract_to_memory(&entry).await.unwrap();
            out.push((entry.file_name.clone(), entry.compression_method, data));
        }
        out
    }

    #[tokio::test]
    async fn round_trip_preserves_paths_methods_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("app.apk");
        let entries: &[(&str, &[u8], CompressionMethod)] = &[
            ("AndroidManifest.xml", b"\x03\x00\x08\x00manifest", CompressionMethod::Deflated),
            ("META-INF/", b"", CompressionMethod::Stored),
            ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\r\n", CompressionMethod::Deflated),
            ("resources.arsc", &[0u8; 64], CompressionMethod::Stored),
            ("assets/www/index.js", b"console.log('hi')", CompressionMethod::Deflated),
            ("lib/arm64-v8a/libapp.so", b"\x7fELF", CompressionMethod::Stored),
        ];
        write_zip(&input, entries).await;

        let extracted = dir.path().join("extracted");
        let report = unpack(&input, Some(&extracted)).await.unwrap();
        let output = dir.path().join("repacked.apk");
        pack(&extracted, &output, &report.compression, &report.renames)
            .await
            .unwrap();

        let repacked = read_zip(&output).await;
        let expected: Vec<_> = entries
            .iter()
            .map(|(n, d, m)| (n.to_string(), *m, d.to_vec()))
            .collect();
        assert_eq!(repacked, expected);
    }

    #[tokio::test]
    async fn case_collisions_survive_a_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("app.apk");
        write_zip(
            &input,
            &[
                ("Foo.txt", b"upper", CompressionMethod::Deflated),
                ("foo.txt", b"lower", CompressionMethod::Stored),
            ],
        )
        .await;

        let extracted = dir.path().join("extracted");
        let report = unpack(&input, Some(&extracted)).await.unwrap();
        assert_eq!(report.renames.len(), 1);
        let on_disk = report.renames.renamed_of("foo.txt").unwrap();
        assert_eq!(std::fs::read(extracted.join("Foo.txt")).unwrap(), b"upper");
        assert_eq!(std::fs::read(extracted.join(on_disk)).unwrap(), b"lower");

        let output = dir.path().join("out.apk");
        pack(&extracted, &output, &report.compression, &report.renames)
            .await
            .unwrap();
        assert_eq!(
            read_zip(&output).await,
            [
                ("Foo.txt".to_string(), CompressionMethod::Deflated, b"upper".to_vec()),
                ("foo.txt".to_string(), CompressionMethod::Stored, b"lower".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn new_files_default_to_deflated() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("app.apk");
        write_zip(
            &input,
            &[("resources.arsc", b"table", CompressionMethod::Stored)],
        )
        .await;

        let extracted = dir.path().join("extracted");
        let report = unpack(&input, Some(&extracted)).await.unwrap();
        std::fs::create_dir_all(extracted.join("assets")).unwrap();
        std::fs::write(extracted.join("assets/guard.js"), b"protected").unwrap();

        let output = dir.path().join("out.apk");
        pack(&extracted, &output, &report.compression, &report.renames)
            .await
            .unwrap();
        assert_eq!(
            read_zip(&output).await,
            [
                ("resources.arsc".to_string(), CompressionMethod::Stored, b"table".to_vec()),
                ("assets/guard.js".to_string(), CompressionMethod::Deflated, b"protected".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn rejects_files_without_a_central_directory() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.apk");
        std::fs::write(&input, b"definitely not a zip archive").unwrap();

        let err = unpack(&input, None).await.unwrap_err();
        assert!(matches!(err, Error::MalformedArchive(_)));
    }
}
