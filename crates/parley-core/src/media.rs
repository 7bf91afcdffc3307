//! Media type resolution for attachments.

use std::path::Path;

use crate::constants::media::{EXTENSION_TYPES, OCTET_STREAM};

/// Resolve the effective media type of a file.
///
/// A declared type wins unless it is empty or the generic binary type; then
/// the file extension is looked up, falling back to the generic binary type.
pub fn classify(declared: Option<&str>, file_name: &str) -> String {
    if let Some(declared) = declared.map(str::trim) {
        if !declared.is_empty() && declared != OCTET_STREAM {
            return declared.to_string();
        }
    }

    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .and_then(|ext| {
            EXTENSION_TYPES
                .iter()
                .find(|(known, _)| *known == ext)
                .map(|(_, mime)| mime.to_string())
        })
        .unwrap_or_else(|| OCTET_STREAM.to_string())
}

pub fn is_image(media_type: &str) -> bool {
    media_type.starts_with("image/")
}
