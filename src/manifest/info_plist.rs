//! `Info.plist` handling for IPA bundles.

use std::io::Cursor;
use std::path::Path;
use tokio::fs;

use crate::Result;

pub const INFO_PLIST: &str = "Info.plist";
const BUNDLE_IDENTIFIER_KEY: &str = "CFBundleIdentifier";

/// Serialization used when rewriting `Info.plist`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlistFormat {
    Xml,
    Binary,
}

async fn read_value(path: &Path) -> Result<plist::Value> {
    let data = fs::read(path).await?;
    Ok(plist::Value::from_reader(Cursor::new(data))?)
}

/// Read `CFBundleIdentifier` from an `Info.plist` in any supported encoding.
pub async fn bundle_identifier(plist_path: &Path) -> Result<Option<String>> {
    let value = read_value(plist_path).await?;
    Ok(value
        .as_dictionary()
        .and_then(|dict| dict.get(BUNDLE_IDENTIFIER_KEY))
        .and_then(|id| id.as_string())
        .map(str::to_owned))
}

/// Rewrite `<app_dir>/Info.plist` in `format`. A missing file is not an error.
///
/// Returns whether a file was converted.
pub async fn convert(app_dir: &Path, format: PlistFormat) -> Result<bool> {
    let path = app_dir.join(INFO_PLIST);
    if !fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
        return Ok(false);
    }
    let value = read_value(&path).await?;
    let mut encoded = Vec::new();
    match format {
        PlistFormat::Xml => value.to_writer_xml(&mut encoded)?,
        PlistFormat::Binary => value.to_writer_binary(&mut encoded)?,
    }
    fs::write(&path, encoded).await?;
    Ok(true)
}
