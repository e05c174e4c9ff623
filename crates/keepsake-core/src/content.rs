//! Content-type resolution for incoming attachments.
//!
//! Blob-key extensions derive from the *effective* content type, not the
//! declared one: magic-byte detection is authoritative for binary media, so
//! a PNG uploaded as `image/jpeg` still lands at a `.png` key and is served
//! back with the right type. Declared types are only trusted for formats
//! that genuinely lack magic bytes (`image/svg+xml` and friends).

/// Resolve the effective content type from the declared type and the bytes.
///
/// 1. Magic-byte detection via `infer` wins when it recognizes the data.
/// 2. Binary media claims (`image/*`, `audio/*`, `video/*`) that the data
///    does not back up are downgraded to `application/octet-stream`; the
///    declared type mismatches the payload.
/// 3. Everything else passes the declared type through.
pub fn effective_content_type(declared: &str, data: &[u8]) -> String {
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }

    let declared = declared.trim();
    if declared.is_empty() || claimed_is_binary(declared) {
        return "application/octet-stream".to_string();
    }

    declared.to_string()
}

/// True for declared types that always carry recognizable magic bytes.
fn claimed_is_binary(claimed: &str) -> bool {
    // SVG is XML text; every other image/audio/video format has a signature
    if claimed == "image/svg+xml" {
        return false;
    }
    claimed.starts_with("image/")
        || claimed.starts_with("audio/")
        || claimed.starts_with("video/")
        || claimed == "application/pdf"
        || claimed == "application/zip"
}

/// Map a content type to the blob-key extension.
///
/// Unknown types fall back to `bin`; the key stays well-formed either way.
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/heif" => "heif",
        "image/heic" => "heic",
        "image/avif" => "avif",
        "image/bmp" => "bmp",
        "image/tiff" => "tiff",
        "image/svg+xml" => "svg",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}
