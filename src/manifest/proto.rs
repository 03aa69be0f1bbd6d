//! Package name recovery from a bundle (AAB) manifest.
//!
//! Bundles store `AndroidManifest.xml` as a protobuf message. Instead of a
//! full decode, the buffer is searched for the attribute key `package`; the
//! attribute value is expected to be the next length-delimited field.

use super::cursor::BinaryCursor;
use crate::{Error, Result};

const PACKAGE_KEY: &[u8] = b"package";
const WIRE_TYPE_LENGTH_DELIMITED: u8 = 2;

fn wire_type(tag: u8) -> u8 {
    tag & 0x3
}

/// Return the package name that follows the first `package` key.
///
/// `Ok(None)` when the key is absent or the following field is not a
/// length-delimited string.
///
/// # Errors
///
/// [`Error::UnexpectedLayout`] when the key is not framed as a 7-byte
/// length-delimited field, or the value runs past the buffer or is not UTF-8.
pub fn extract_package(data: &[u8]) -> Result<Option<String>> {
    let Some(key_at) = data
        .windows(PACKAGE_KEY.len())
        .position(|w| w == PACKAGE_KEY)
    else {
        return Ok(None);
    };

    if key_at < 2 {
        return Err(Error::UnexpectedLayout(
            "no field header before package key".to_string(),
        ));
    }
    let key_tag = data[key_at - 2];
    let key_len = data[key_at - 1];
    if key_len as usize != PACKAGE_KEY.len() || wire_type(key_tag) != WIRE_TYPE_LENGTH_DELIMITED {
        return Err(Error::UnexpectedLayout(format!(
            "package key framed with tag {key_tag:#04x}, length {key_len}"
        )));
    }

    let value = read_value(data, key_at + PACKAGE_KEY.len()).map_err(|e| match e {
        Error::OutOfBounds { .. } => Error::UnexpectedLayout(format!("package value: {e}")),
        other => other,
    })?;
    let Some(value) = value else {
        return Ok(None);
    };

    String::from_utf8(value.to_vec())
        .map(Some)
        .map_err(|_| Error::UnexpectedLayout("package value is not UTF-8".to_string()))
}

/// Read the `(tag, length)` header at `at` and the value bytes behind it.
fn read_value(data: &[u8], at: usize) -> Result<Option<&[u8]>> {
    let mut cursor = BinaryCursor::new(data);
    cursor.seek(at)?;
    let header = cursor.read(2)?;
    let (tag, len) = (header[0], header[1]);
    if wire_type(tag) != WIRE_TYPE_LENGTH_DELIMITED {
        return Ok(None);
    }
    cursor.read(len as usize).map(Some)
}
