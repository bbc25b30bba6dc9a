use std::fmt;
use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::ImageLoadError;

/// An image held in memory together with its declared mime type
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl EncodedImage {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ImageLoadError> {
        let data = fs::read(path)?;
        Ok(Self::new(guess_image_mime(path), data))
    }

    pub fn from_base64(mime_type: impl Into<String>, encoded: &str) -> Result<Self, ImageLoadError> {
        let data = BASE64.decode(encoded.trim())?;
        Ok(Self::new(mime_type, data))
    }

    /// Parse `data:<mime>;base64,<payload>`
    pub fn from_data_url(url: &str) -> Result<Self, ImageLoadError> {
        let rest = url.strip_prefix("data:").ok_or(ImageLoadError::InvalidDataUrl)?;
        let (header, payload) = rest.split_once(',').ok_or(ImageLoadError::InvalidDataUrl)?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or(ImageLoadError::InvalidDataUrl)?;
        Self::from_base64(mime_type, payload)
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.data)
    }

    /// File extension for saving, derived from the mime type
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            "image/heic" | "image/heif" => "heic",
            _ => "png",
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// Payloads can be megabytes; keep Debug output short
impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

impl fmt::Display for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.mime_type, format_size(self.data.len()))
    }
}

fn guess_image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" | "heif" => "image/heic",
        _ => "image/png",
    }
}

fn format_size(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_data_url_decodes() {
        let image = EncodedImage::from_data_url("data:image/webp;base64,iVBORw==").unwrap();
        assert_eq!(image, EncodedImage::new("image/webp", vec![0x89, b'P', b'N', b'G']));
        assert_eq!(image.to_base64(), "iVBORw==");
    }

    #[test]
    fn test_data_url_rejects_plain_text() {
        assert!(matches!(
            EncodedImage::from_data_url("iVBORw=="),
            Err(ImageLoadError::InvalidDataUrl)
        ));
        assert!(matches!(
            EncodedImage::from_data_url("data:image/png,raw"),
            Err(ImageLoadError::InvalidDataUrl)
        ));
    }

    #[test]
    fn test_bad_base64_is_error() {
        assert!(matches!(
            EncodedImage::from_base64("image/png", "not base64!"),
            Err(ImageLoadError::Base64(_))
        ));
    }

    #[test]
    fn test_from_path_guesses_mime() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("photo.JPG");
        fs::write(&path, [1u8, 2, 3]).unwrap();

        let image = EncodedImage::from_path(&path).unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.data, vec![1, 2, 3]);
        assert_eq!(image.extension(), "jpg");
    }

    #[test]
    fn test_from_missing_path_is_io_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            EncodedImage::from_path(&dir.path().join("nope.png")),
            Err(ImageLoadError::Io(_))
        ));
    }

    #[test]
    fn test_display_is_short() {
        let image = EncodedImage::new("image/png", vec![0; 2048]);
        assert_eq!(image.to_string(), "image/png (2.0 KB)");
        assert_eq!(format!("{:?}", image), "EncodedImage { mime_type: \"image/png\", len: 2048 }");
    }
}
