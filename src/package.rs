//! Package kinds and their on-disk layout conventions.

use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::{Error, Result};

const PAYLOAD_DIR: &str = "Payload";

/// The three ZIP-based package formats the pipeline accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    /// Android application package
    Apk,
    /// Android app bundle
    Aab,
    /// iOS application archive
    Ipa,
}

impl PackageKind {
    /// Detect the kind from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("apk") => Ok(PackageKind::Apk),
            Some("aab") => Ok(PackageKind::Aab),
            Some("ipa") => Ok(PackageKind::Ipa),
            _ => Err(Error::Config(format!(
                "{} is not an .apk, .aab or .ipa file",
                path.display()
            ))),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            PackageKind::Apk => "apk",
            PackageKind::Aab => "aab",
            PackageKind::Ipa => "ipa",
        }
    }

    pub fn is_android(&self) -> bool {
        !matches!(self, PackageKind::Ipa)
    }

    /// Suffix of the transform's target-type flag
    pub fn platform(&self) -> &'static str {
        if self.is_android() { "android" } else { "ios" }
    }

    /// Archive path of the compiled Android manifest
    pub fn manifest_path(&self) -> Option<&'static str> {
        match self {
            PackageKind::Apk => Some("AndroidManifest.xml"),
            PackageKind::Aab => Some("base/manifest/AndroidManifest.xml"),
            PackageKind::Ipa => None,
        }
    }

    /// Where the protected package goes when no output is given:
    /// `app.protected.unsigned.apk`, `app.protected.unsigned.aab`, `app-protected.ipa`.
    pub fn default_output(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "package".to_string());
        let name = match self {
            PackageKind::Ipa => format!("{stem}-protected.ipa"),
            _ => format!("{stem}.protected.unsigned.{}", self.extension()),
        };
        input.with_file_name(name)
    }
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PackageKind::Apk => "APK",
            PackageKind::Aab => "AAB",
            PackageKind::Ipa => "IPA",
        })
    }
}

/// Relative path (`Payload/<name>.app`) of the first app bundle under `root`.
pub async fn find_app_bundle(root: &Path) -> Result<Option<PathBuf>> {
    let payload = root.join(PAYLOAD_DIR);
    if !fs::metadata(&payload).await.is_ok_and(|m| m.is_dir()) {
        return Ok(None);
    }
    let mut bundles = Vec::new();
    let mut entries = fs::read_dir(&payload).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() && entry.file_name().to_string_lossy().ends_with(".app") {
            bundles.push(entry.file_name());
        }
    }
    // read_dir order is unspecified
    bundles.sort();
    Ok(bundles
        .into_iter()
        .next()
        .map(|name| Path::new(PAYLOAD_DIR).join(name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_kind_from_extension() {
        assert_eq!(PackageKind::from_path(Path::new("a/App.APK")).unwrap(), PackageKind::Apk);
        assert_eq!(PackageKind::from_path(Path::new("b.aab")).unwrap(), PackageKind::Aab);
        assert_eq!(PackageKind::from_path(Path::new("c.ipa")).unwrap(), PackageKind::Ipa);
        assert!(matches!(
            PackageKind::from_path(Path::new("d.zip")),
            Err(Error::Config(_))
        ));
        assert!(PackageKind::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn default_output_names() {
        assert_eq!(
            PackageKind::Apk.default_output(Path::new("/tmp/app.apk")),
            PathBuf::from("/tmp/app.protected.unsigned.apk")
        );
        assert_eq!(
            PackageKind::Aab.default_output(Path::new("bundle.aab")),
            PathBuf::from("bundle.protected.unsigned.aab")
        );
        assert_eq!(
            PackageKind::Ipa.default_output(Path::new("/x/Demo.ipa")),
            PathBuf::from("/x/Demo-protected.ipa")
        );
    }

    #[tokio::test]
    async fn finds_app_bundle_under_payload() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_app_bundle(dir.path()).await.unwrap().is_none());

        std::fs::create_dir_all(dir.path().join("Payload/Zed.app")).unwrap();
        std::fs::create_dir_all(dir.path().join("Payload/Demo.app")).unwrap();
        std::fs::write(dir.path().join("Payload/readme.app"), b"not a dir").unwrap();
        assert_eq!(
            find_app_bundle(dir.path()).await.unwrap(),
            Some(PathBuf::from("Payload/Demo.app"))
        );
    }

    #[tokio::test]
    async fn payload_file_is_not_a_bundle_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Payload"), b"flat").unwrap();
        assert_eq!(find_app_bundle(dir.path()).await.unwrap(), None);
    }
}
