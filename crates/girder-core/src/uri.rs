//! Minimal `file://` URI conversion.
//!
//! BSP identifies documents, build targets and directories by URI. We only
//! ever deal in `file` URIs, so a small hand-rolled codec keeps this crate
//! dependency-free. Percent-encoding follows RFC 3986: unreserved bytes and
//! `/` pass through, everything else is escaped.

use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriError {
    NotAbsolute(PathBuf),
    NotFileScheme(String),
    InvalidEncoding(String),
}

impl fmt::Display for UriError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UriError::NotAbsolute(path) => {
                write!(f, "path is not absolute: {}", path.display())
            }
            UriError::NotFileScheme(uri) => write!(f, "not a file:// URI: {uri}"),
            UriError::InvalidEncoding(uri) => write!(f, "invalid percent-encoding in URI: {uri}"),
        }
    }
}

impl std::error::Error for UriError {}

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}

/// Convert an absolute path to a `file://` URI.
pub fn path_to_file_uri(path: &Path) -> Result<String, UriError> {
    if !path.is_absolute() {
        return Err(UriError::NotAbsolute(path.to_path_buf()));
    }

    let raw = path.to_string_lossy();
    let mut uri = String::with_capacity(raw.len() + 8);
    uri.push_str("file://");

    #[cfg(windows)]
    {
        // `C:\x` becomes `file:///C:/x`.
        uri.push('/');
    }

    for byte in raw.bytes() {
        let byte = if cfg!(windows) && byte == b'\\' {
            b'/'
        } else {
            byte
        };
        if is_unreserved(byte) || matches!(byte, b'/' | b':') {
            uri.push(byte as char);
        } else {
            uri.push('%');
            uri.push_str(&format!("{byte:02X}"));
        }
    }

    Ok(uri)
}

/// Convert a `file://` URI back to a path, decoding percent-escapes.
///
/// Query and fragment parts are stripped; build-target URIs carry a
/// `?sourceset=` query over a plain directory URI.
pub fn file_uri_to_path(uri: &str) -> Result<PathBuf, UriError> {
    let rest = uri
        .strip_prefix("file://")
        .ok_or_else(|| UriError::NotFileScheme(uri.to_string()))?;

    let rest = match rest.find(['?', '#']) {
        Some(idx) => &rest[..idx],
        None => rest,
    };

    let mut bytes = Vec::with_capacity(rest.len());
    let mut iter = rest.bytes();
    while let Some(byte) = iter.next() {
        if byte == b'%' {
            let hi = iter.next();
            let lo = iter.next();
            let (Some(hi), Some(lo)) = (hi, lo) else {
                return Err(UriError::InvalidEncoding(uri.to_string()));
            };
            let decode = |b: u8| -> Option<u8> { (b as char).to_digit(16).map(|d| d as u8) };
            let (Some(hi), Some(lo)) = (decode(hi), decode(lo)) else {
                return Err(UriError::InvalidEncoding(uri.to_string()));
            };
            bytes.push(hi << 4 | lo);
        } else {
            bytes.push(byte);
        }
    }

    let decoded = String::from_utf8(bytes).map_err(|_| UriError::InvalidEncoding(uri.to_string()))?;

    #[cfg(windows)]
    {
        // `file:///C:/x` carries a leading slash before the drive letter.
        let trimmed = decoded.trim_start_matches('/');
        if trimmed.len() >= 2 && trimmed.as_bytes()[1] == b':' {
            return Ok(PathBuf::from(trimmed.replace('/', "\\")));
        }
    }

    Ok(PathBuf::from(decoded))
}
