pub mod gemini;
pub mod image;
pub mod stream;

pub use image::{GeminiImageClient, ImageBackend, ImageOutput};
pub use stream::{ChatBackend, GeminiChatClient, StreamEvent, StreamFailure};
