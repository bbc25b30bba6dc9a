use async_trait::async_trait;
use reqwest::Client;

use super::gemini::{self, Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, ImageConfig, Part};
use crate::config::Config;
use crate::error::ImageError;
use crate::image::EncodedImage;

const SQUARE_ASPECT_RATIO: &str = "1:1";

/// Result of a generate/edit request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOutput {
    pub image: EncodedImage,
    pub caption: Option<String>,
}

/// Produces one image from a prompt, optionally conditioned on a reference.
///
/// With a reference the request is an edit of that image; without one it is
/// a fresh generation.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    async fn generate_or_edit(
        &self,
        prompt: &str,
        reference: Option<&EncodedImage>,
    ) -> Result<ImageOutput, ImageError>;
}

#[derive(Clone)]
pub struct GeminiImageClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl GeminiImageClient {
    pub fn new(api_key: Option<String>, base_url: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.to_string(),
            model: model.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.resolve_api_key(), config.base_url(), config.image_model())
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ImageBackend for GeminiImageClient {
    async fn generate_or_edit(
        &self,
        prompt: &str,
        reference: Option<&EncodedImage>,
    ) -> Result<ImageOutput, ImageError> {
        let api_key = self.api_key.as_deref().ok_or(ImageError::MissingCredential)?;

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        tracing::debug!(
            "Requesting image {} from {}",
            if reference.is_some() { "edit" } else { "generation" },
            url
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&build_request(prompt, reference))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = gemini::error_message(&body);
            tracing::error!("Image request rejected with {}: {}", status, message);
            return Err(ImageError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let response: GenerateContentResponse = response.json().await?;
        extract_output(&response)
    }
}

fn build_request(prompt: &str, reference: Option<&EncodedImage>) -> GenerateContentRequest {
    let mut parts = Vec::with_capacity(2);
    if let Some(image) = reference {
        parts.push(Part::inline_data(image.mime_type.clone(), image.to_base64()));
    }
    parts.push(Part::text(prompt));

    GenerateContentRequest {
        contents: vec![Content::user(parts)],
        system_instruction: None,
        generation_config: Some(GenerationConfig {
            response_modalities: Some(vec!["TEXT".to_string(), "IMAGE".to_string()]),
            image_config: Some(ImageConfig {
                aspect_ratio: SQUARE_ASPECT_RATIO.to_string(),
            }),
        }),
    }
}

/// First inline image is the result, first text part the caption
fn extract_output(response: &GenerateContentResponse) -> Result<ImageOutput, ImageError> {
    let parts = response.parts();

    let inline = parts
        .iter()
        .find_map(|p| p.inline_data.as_ref())
        .ok_or_else(|| {
            tracing::error!("Image response contained no inline image");
            ImageError::GenerationFailed
        })?;

    let image = EncodedImage::from_base64(inline.mime_type.clone(), &inline.data)
        .map_err(|e| ImageError::InvalidPayload(e.to_string()))?;
    if image.is_empty() {
        return Err(ImageError::GenerationFailed);
    }

    let caption = parts
        .iter()
        .filter(|p| !p.is_thought())
        .find_map(|p| p.text.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    Ok(ImageOutput { image, caption })
}
