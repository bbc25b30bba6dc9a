//! Vision controller: reference image, prompt, and the generate/edit cycle
//!
//! Canvas state is transient and owned here alone. Requests run on a
//! spawned task so the caller's event loop keeps turning; the outcome is
//! collected with [`VisionController::next_outcome`] and applied with
//! [`VisionController::apply_outcome`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::ai::{ImageBackend, ImageOutput};
use crate::error::{ImageError, ImageLoadError};
use crate::image::EncodedImage;

/// Shown when a generate/edit request fails
pub const GENERATION_FAILED_ALERT: &str = "An error occurred while generating the image.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisionState {
    Idle,
    Generating,
}

/// What the studio currently shows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Canvas {
    pub reference_image: Option<EncodedImage>,
    pub generated_image: Option<EncodedImage>,
    pub prompt: String,
    pub status_caption: Option<String>,
}

pub struct VisionController {
    backend: Arc<dyn ImageBackend>,
    canvas: Canvas,
    task: Option<JoinHandle<Result<ImageOutput, ImageError>>>,
    alert: Option<String>,
}

impl VisionController {
    pub fn new(backend: Arc<dyn ImageBackend>) -> Self {
        Self {
            backend,
            canvas: Canvas::default(),
            task: None,
            alert: None,
        }
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn state(&self) -> VisionState {
        if self.task.is_some() {
            VisionState::Generating
        } else {
            VisionState::Idle
        }
    }

    pub fn is_generating(&self) -> bool {
        self.task.is_some()
    }

    pub fn prompt(&self) -> &str {
        &self.canvas.prompt
    }

    pub fn prompt_mut(&mut self) -> &mut String {
        &mut self.canvas.prompt
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.canvas.prompt = prompt.into();
    }

    /// Pending blocking notification, if any
    pub fn alert(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    pub fn dismiss_alert(&mut self) {
        self.alert = None;
    }

    /// Replace the reference image and drop any generated image.
    ///
    /// Only allowed while idle.
    pub fn select_reference(&mut self, image: EncodedImage) -> bool {
        if self.is_generating() {
            return false;
        }
        tracing::debug!("Selected reference image {}", image);
        self.canvas.reference_image = Some(image);
        self.canvas.generated_image = None;
        true
    }

    /// Load a reference image from disk; `Ok(false)` when busy
    pub fn load_reference(&mut self, path: &Path) -> Result<bool, ImageLoadError> {
        if self.is_generating() {
            return Ok(false);
        }
        let image = EncodedImage::from_path(path)?;
        Ok(self.select_reference(image))
    }

    pub fn can_process(&self) -> bool {
        !self.is_generating() && !self.canvas.prompt.trim().is_empty()
    }

    /// Start a generate/edit request for the current prompt and reference.
    ///
    /// Rejected when the prompt is blank or a request is already running.
    pub fn handle_process(&mut self) -> bool {
        if !self.can_process() {
            return false;
        }

        let backend = Arc::clone(&self.backend);
        let prompt = self.canvas.prompt.clone();
        let reference = self.canvas.reference_image.clone();
        tracing::info!(
            "Starting image {} request",
            if reference.is_some() { "edit" } else { "generation" }
        );

        self.task = Some(tokio::spawn(async move {
            backend.generate_or_edit(&prompt, reference.as_ref()).await
        }));
        true
    }

    /// Wait for the running request; pends forever while idle
    pub async fn next_outcome(&mut self) -> Result<ImageOutput, ImageError> {
        match self.task.as_mut() {
            Some(task) => match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(ImageError::Interrupted(e.to_string())),
            },
            None => std::future::pending().await,
        }
    }

    /// Store a finished request's result; a failure leaves the canvas as it was
    pub fn apply_outcome(&mut self, outcome: Result<ImageOutput, ImageError>) {
        if self.task.take().is_none() {
            return;
        }

        match outcome {
            Ok(output) => {
                tracing::info!("Image ready: {}", output.image);
                self.canvas.generated_image = Some(output.image);
                self.canvas.status_caption = output.caption;
            }
            Err(e) => {
                tracing::error!("Image request failed: {}", e);
                self.alert = Some(GENERATION_FAILED_ALERT.to_string());
            }
        }
    }

    /// Run one request to completion; false if it was rejected
    pub async fn process(&mut self) -> bool {
        if !self.handle_process() {
            return false;
        }
        let outcome = self.next_outcome().await;
        self.apply_outcome(outcome);
        true
    }

    /// Reset all four canvas fields; only allowed while idle
    pub fn clear_canvas(&mut self) -> bool {
        if self.is_generating() {
            return false;
        }
        self.canvas = Canvas::default();
        true
    }

    /// Write the generated image into `dir` as `aion-vision-<millis>.<ext>`
    pub fn save_generated(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let image = self.canvas.generated_image.as_ref().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no generated image to save")
        })?;

        std::fs::create_dir_all(dir)?;
        let file_name = format!(
            "aion-vision-{}.{}",
            chrono::Utc::now().timestamp_millis(),
            image.extension()
        );
        let path = dir.join(file_name);
        std::fs::write(&path, &image.data)?;
        tracing::info!("Saved generated image to {:?}", path);
        Ok(path)
    }
}
