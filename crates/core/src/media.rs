//! Image MIME type and file extension mapping.

use std::path::Path;

/// Extension used when a MIME type is missing or unrecognized.
pub const DEFAULT_IMAGE_EXTENSION: &str = "jpg";

const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/bmp", "bmp"),
    ("image/webp", "webp"),
    ("image/tiff", "tiff"),
    ("image/svg+xml", "svg"),
    ("image/jpeg", "jpg"),
];

/// File extension for an image `Content-Type`, defaulting to `jpg`.
///
/// Parameters such as `; charset=...` are ignored.
pub fn extension_for_mime(content_type: Option<&str>) -> &'static str {
    let Some(content_type) = content_type else {
        return DEFAULT_IMAGE_EXTENSION;
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    MIME_EXTENSIONS
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
        .unwrap_or(DEFAULT_IMAGE_EXTENSION)
}

/// MIME type for a file name or bare extension (`cover.png`, `png`).
pub fn mime_for_extension(name: &str) -> Option<&'static str> {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or(name)
        .to_ascii_lowercase();
    let ext = if ext == "jpeg" { "jpg".to_string() } else { ext };

    MIME_EXTENSIONS
        .iter()
        .find(|(_, e)| *e == ext)
        .map(|(mime, _)| *mime)
}
