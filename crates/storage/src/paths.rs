//! Deterministic storage layout for keyed data files.
//!
//! A key maps to one directory segment per dimension, in dimension order,
//! and the file itself is always named `data.<ext>`:
//!
//! ```text
//! {key: NAME=coastline, ZOOM=3}, image/png  ->  NAME=coastline/ZOOM=3/data.png
//! ```
//!
//! Characters outside `[A-Za-z0-9._-]` in dimension names and identifiers
//! are written as `+XX` (uppercase hex of each UTF-8 byte), so `=`, `/` and
//! `+` never appear unescaped inside a segment.

use dataset::{DataKey, DataKeyElement};
use datastore_common::{StoreError, StoreResult};

/// File stem shared by every data file.
pub const DATA_FILE_STEM: &str = "data";

/// Extension used when a content type has no registered extension.
pub const FALLBACK_EXTENSION: &str = "bin";

const CONTENT_TYPES: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/tiff", "tif"),
    ("image/webp", "webp"),
    ("application/json", "json"),
    ("text/plain", "txt"),
    ("text/csv", "csv"),
    ("application/xml", "xml"),
    ("application/x-netcdf", "nc"),
    ("application/x-grib2", "grib2"),
    ("application/x-parquet", "parquet"),
    ("application/octet-stream", "bin"),
];

/// Extension for a content type; unknown types map to [`FALLBACK_EXTENSION`].
pub fn extension_for(content_type: &str) -> &'static str {
    let base = content_type.split(';').next().unwrap_or("").trim();
    CONTENT_TYPES
        .iter()
        .find(|(ct, _)| ct.eq_ignore_ascii_case(base))
        .map(|(_, ext)| *ext)
        .unwrap_or(FALLBACK_EXTENSION)
}

/// Content type for an extension, if registered.
pub fn content_type_for(extension: &str) -> Option<&'static str> {
    let extension = extension.to_ascii_lowercase();
    let extension = match extension.as_str() {
        "jpeg" => "jpg",
        "tiff" => "tif",
        other => other,
    };
    CONTENT_TYPES
        .iter()
        .find(|(_, ext)| *ext == extension)
        .map(|(ct, _)| *ct)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'-' => out.push(byte as char),
            _ => out.push_str(&format!("+{:02X}", byte)),
        }
    }
    out
}

fn unescape(text: &str) -> StoreResult<String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'+' {
            let hex = text
                .get(i + 1..i + 3)
                .ok_or_else(|| StoreError::Parse(format!("truncated escape in '{}'", text)))?;
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|_| StoreError::Parse(format!("bad escape '+{}' in '{}'", hex, text)))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|e| StoreError::Parse(format!("'{}' is not UTF-8: {}", text, e)))
}

/// A data file location decoded from a relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKeyPath {
    pub key: DataKey,
    /// Extension of the data file, empty when it has none.
    pub extension: String,
}

/// Path builder for the key layout.
pub struct KeyPath;

impl KeyPath {
    /// Directory holding the data file for `key`; empty for the empty key.
    pub fn directory(key: &DataKey) -> String {
        key.elements()
            .map(|e| format!("{}={}", escape(e.dimension().name()), escape(e.identifier())))
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Full relative path of the data file for `key` with `content_type`.
    pub fn file(key: &DataKey, content_type: &str) -> String {
        let name = format!("{}.{}", DATA_FILE_STEM, extension_for(content_type));
        Self::join(&Self::directory(key), &name)
    }

    /// Join two path fragments with `/`, skipping empty ones.
    pub fn join(prefix: &str, rest: &str) -> String {
        let prefix = prefix.trim_matches('/');
        let rest = rest.trim_start_matches('/');
        match (prefix.is_empty(), rest.is_empty()) {
            (true, _) => rest.to_string(),
            (false, true) => prefix.to_string(),
            (false, false) => format!("{}/{}", prefix, rest),
        }
    }

    /// Whether a file name is `data` or `data.<ext>`.
    pub fn is_data_file_name(name: &str) -> bool {
        match name.split_once('.') {
            Some((stem, _)) => stem == DATA_FILE_STEM,
            None => name == DATA_FILE_STEM,
        }
    }

    /// Decode a relative path produced by [`KeyPath::file`].
    ///
    /// Returns `Ok(None)` when the last segment is not a data file, and a
    /// parse error when a directory segment is not `dimension=identifier`.
    pub fn parse(relative: &str) -> StoreResult<Option<ParsedKeyPath>> {
        let relative = relative.trim_matches('/');
        let (directory, name) = match relative.rsplit_once('/') {
            Some((directory, name)) => (directory, name),
            None => ("", relative),
        };
        if !Self::is_data_file_name(name) {
            return Ok(None);
        }
        let extension = name.split_once('.').map(|(_, ext)| ext).unwrap_or("");

        let mut elements = Vec::new();
        for segment in directory.split('/').filter(|s| !s.is_empty()) {
            let (dimension, identifier) = segment.split_once('=').ok_or_else(|| {
                StoreError::Parse(format!(
                    "path segment '{}' in '{}' is not dimension=identifier",
                    segment, relative
                ))
            })?;
            elements.push(DataKeyElement::of(&unescape(dimension)?, &unescape(identifier)?));
        }

        Ok(Some(ParsedKeyPath {
            key: DataKey::from_elements(elements)?,
            extension: extension.to_string(),
        }))
    }
}
