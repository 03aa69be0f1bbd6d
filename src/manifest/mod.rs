//! Application identifier recovery.
//!
//! Android packages carry the identifier as the `package` attribute of the
//! root manifest tag, either as compiled binary XML (APK, see [`axml`]) or
//! as a protobuf message (AAB, see [`proto`]). IPA bundles carry it as
//! `CFBundleIdentifier` in `Info.plist` (see [`info_plist`]).
//!
//! Every extractor returns `Result<Option<String>>`: `Ok(None)` is an
//! ordinary "not found", errors mean the data could not be decoded.

pub mod axml;
mod cursor;
pub mod info_plist;
pub mod proto;

pub use cursor::BinaryCursor;

use std::path::Path;
use tokio::fs;
use tracing::debug;

use crate::Result;
use crate::package::{PackageKind, find_app_bundle};

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

/// Recover the application identifier from an extracted package tree.
///
/// A missing manifest file is "not found"; unreadable or undecodable
/// manifests are errors the caller may treat as non-fatal.
pub async fn recover_package_id(
    kind: PackageKind,
    extracted_root: &Path,
) -> Result<Option<String>> {
    match kind {
        PackageKind::Apk | PackageKind::Aab => {
            let Some(relative) = kind.manifest_path() else {
                return Ok(None);
            };
            let path = extracted_root.join(relative);
            if !is_file(&path).await {
                debug!("No manifest at {}", path.display());
                return Ok(None);
            }
            let data = fs::read(&path).await?;
            if kind == PackageKind::Aab {
                proto::extract_package(&data)
            } else {
                axml::extract_package(&data)
            }
        }
        PackageKind::Ipa => {
            let Some(bundle) = find_app_bundle(extracted_root).await? else {
                return Ok(None);
            };
            let path = extracted_root.join(bundle).join(info_plist::INFO_PLIST);
            if !is_file(&path).await {
                return Ok(None);
            }
            info_plist::bundle_identifier(&path).await
        }
    }
}
