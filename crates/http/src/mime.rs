//! File-extension to MIME-type lookup.
//!
//! Used by the file sender to populate `Content-Type` on download replies.

const MAPPINGS: &[(&str, &str)] = &[
    ("bmp", "image/bmp"),
    ("css", "text/css"),
    ("csv", "text/csv"),
    ("gif", "image/gif"),
    ("gz", "application/gzip"),
    ("htm", "text/html"),
    ("html", "text/html"),
    ("ico", "image/x-icon"),
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpeg"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("svg", "image/svg+xml"),
    ("txt", "text/plain"),
    ("wav", "audio/wav"),
    ("webp", "image/webp"),
    ("xml", "text/xml"),
    ("zip", "application/zip"),
];

/// Maps a file extension (without the dot, case-insensitive) to a MIME
/// type. Unknown extensions fall back to `application/octet-stream`.
pub fn extension_to_type(extension: &str) -> &'static str {
    let lower = extension.to_ascii_lowercase();
    MAPPINGS
        .iter()
        .find(|(ext, _)| *ext == lower)
        .map(|(_, mime)| *mime)
        .unwrap_or("application/octet-stream")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions() {
        assert_eq!(extension_to_type("html"), "text/html");
        assert_eq!(extension_to_type("JSON"), "application/json");
        assert_eq!(extension_to_type("Zip"), "application/zip");
    }

    #[test]
    fn unknown_extension_is_octet_stream() {
        assert_eq!(extension_to_type("bin"), "application/octet-stream");
        assert_eq!(extension_to_type(""), "application/octet-stream");
    }
}
