use thiserror::Error;

/// Failures of a single generate/edit request
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("No API key configured. Set GEMINI_API_KEY or add api_key to the config file.")]
    MissingCredential,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Gemini API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("No image data was returned.")]
    GenerationFailed,

    #[error("Invalid image payload: {0}")]
    InvalidPayload(String),

    #[error("Image request was interrupted: {0}")]
    Interrupted(String),
}

/// Failures reading or decoding an image supplied by the user
#[derive(Debug, Error)]
pub enum ImageLoadError {
    #[error("Failed to read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a base64 data URL")]
    InvalidDataUrl,

    #[error("Invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_error_display_api() {
        let e = ImageError::Api {
            status: 400,
            message: "bad prompt".to_string(),
        };
        assert_eq!(e.to_string(), "Gemini API error 400: bad prompt");
    }

    #[test]
    fn image_error_display_generation_failed() {
        assert_eq!(
            ImageError::GenerationFailed.to_string(),
            "No image data was returned."
        );
    }

    #[test]
    fn config_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let e: ConfigError = json_err.into();
        assert!(e.to_string().starts_with("Invalid config file:"));
    }
}
