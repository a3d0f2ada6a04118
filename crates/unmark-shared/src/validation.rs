//! Upload validation.
//!
//! Runs synchronously before any store or network access: a rejected upload
//! never consumes quota and never reaches the remote service.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::ImageFormat;

use crate::constants::MAX_UPLOAD_SIZE;
use crate::error::UnmarkError;

/// Accepted upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    WebP,
}

impl ImageKind {
    pub fn mime(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
            ImageKind::WebP => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
            ImageKind::WebP => "webp",
        }
    }

    /// Sniff the format from magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match image::guess_format(bytes).ok()? {
            ImageFormat::Jpeg => Some(ImageKind::Jpeg),
            ImageFormat::Png => Some(ImageKind::Png),
            ImageFormat::WebP => Some(ImageKind::WebP),
            _ => None,
        }
    }
}

/// A decoded upload that passed validation.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub kind: ImageKind,
}

impl ImageUpload {
    /// Encode as a `data:` URL, the form the remote service accepts inline.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.kind.mime(), STANDARD.encode(&self.bytes))
    }
}

/// Decode a base64 payload (plain or `data:<mime>;base64,` URL) and validate it.
pub fn decode_upload(input: &str) -> Result<ImageUpload, UnmarkError> {
    let encoded = strip_data_url(input.trim());
    if encoded.is_empty() {
        return Err(UnmarkError::Validation("Image is required".into()));
    }

    // Cheap upper bound before allocating the decoded buffer.
    if encoded.len() / 4 * 3 > MAX_UPLOAD_SIZE + 3 {
        return Err(too_large());
    }

    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| UnmarkError::Validation(format!("Invalid base64 image: {e}")))?;

    validate_upload(bytes)
}

/// Validate raw image bytes: non-empty, within the size cap, JPEG/PNG/WebP.
pub fn validate_upload(bytes: Vec<u8>) -> Result<ImageUpload, UnmarkError> {
    if bytes.is_empty() {
        return Err(UnmarkError::Validation("Image is empty".into()));
    }
    if bytes.len() > MAX_UPLOAD_SIZE {
        return Err(too_large());
    }

    let kind = ImageKind::sniff(&bytes).ok_or_else(|| {
        UnmarkError::Validation("Unsupported image type. Use JPEG, PNG or WebP.".into())
    })?;

    Ok(ImageUpload { bytes, kind })
}

fn strip_data_url(input: &str) -> &str {
    if !input.starts_with("data:") {
        return input;
    }
    match input.split_once(',') {
        Some((_, payload)) => payload,
        None => "",
    }
}

fn too_large() -> UnmarkError {
    UnmarkError::Validation(format!(
        "Image too large (max {} MB)",
        MAX_UPLOAD_SIZE / (1024 * 1024)
    ))
}
